use std::io::Write;
use std::sync::Mutex;

use recall_stream::prelude::*;

/// Which lane of output the terminal cursor currently sits in.
#[derive(Debug, PartialEq, Eq)]
enum Lane {
    Answer,
    Narration(Source),
    Tool,
}

struct RenderState {
    out: Box<dyn Write + Send>,
    lane: Option<Lane>,
    // Bytes of the current narration block already written.
    printed: usize,
    // Bytes of the answer already written; survives lane switches.
    answer_printed: usize,
}

impl RenderState {
    fn switch_lane(&mut self, lane: Lane) {
        if self.lane.as_ref() == Some(&lane) {
            return;
        }
        if self.lane.is_some() {
            let _ = writeln!(self.out);
        }
        match &lane {
            Lane::Answer => {
                let _ = writeln!(self.out, "[answer]");
            }
            Lane::Narration(source) => {
                let _ = writeln!(self.out, "[{}]", source.label());
            }
            Lane::Tool => {}
        }
        self.lane = Some(lane);
        self.printed = 0;
    }

    fn answer(&mut self, text: &str) {
        if text.len() == self.answer_printed {
            return;
        }
        self.switch_lane(Lane::Answer);
        let printed = write_suffix(&mut self.out, self.answer_printed, text);
        self.answer_printed = printed;
    }

    fn narration(&mut self, source: &Source, content: &str) {
        self.switch_lane(Lane::Narration(source.clone()));
        let printed = write_suffix(&mut self.out, self.printed, content);
        self.printed = printed;
    }

    fn narration_complete(&mut self, source: &Source) {
        if self.lane.as_ref() == Some(&Lane::Narration(source.clone())) {
            // The next block from this source starts on a fresh line.
            self.lane = None;
            self.printed = 0;
            let _ = writeln!(self.out);
        }
    }

    fn tool_line(&mut self, line: &str) {
        self.switch_lane(Lane::Tool);
        let _ = writeln!(self.out, "{line}");
        let _ = self.out.flush();
    }

    fn reset(&mut self) {
        if self.lane.take().is_some() {
            let _ = writeln!(self.out);
        }
        self.printed = 0;
        self.answer_printed = 0;
    }
}

/// Writes the part of `text` past `printed` and returns the new length.
fn write_suffix(out: &mut dyn Write, printed: usize, text: &str) -> usize {
    // A shorter or diverging text means the block was replaced; reprint it.
    let suffix = match text.get(printed..) {
        Some(rest) => rest,
        None => {
            let _ = writeln!(out);
            text
        }
    };
    let _ = write!(out, "{suffix}");
    let _ = out.flush();
    text.len()
}

/// Writes a live session to the terminal.
///
/// Callbacks carry cumulative text, so only the unseen suffix is printed.
/// Narration goes to stdout under a `[source]` header; failures go to
/// stderr.
pub struct TerminalSink {
    state: Mutex<RenderState>,
    show_narration: bool,
}

impl TerminalSink {
    pub fn new(show_narration: bool) -> Self {
        Self::with_writer(Box::new(std::io::stdout()), show_narration)
    }

    fn with_writer(out: Box<dyn Write + Send>, show_narration: bool) -> Self {
        Self {
            state: Mutex::new(RenderState {
                out,
                lane: None,
                printed: 0,
                answer_printed: 0,
            }),
            show_narration,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RenderState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RenderSink for TerminalSink {
    fn on_answer(&self, text: &str) {
        self.lock().answer(text);
    }

    fn on_narration(&self, source: &Source, content: &str) {
        if self.show_narration {
            self.lock().narration(source, content);
        }
    }

    fn on_narration_complete(&self, source: &Source) {
        if self.show_narration {
            self.lock().narration_complete(source);
        }
    }

    fn on_tool_call_start(&self, call: &ToolCallRecord) {
        let line = match call.input_text() {
            Some(input) => format!("> {} ... {}", call.source.label(), one_line(&input)),
            None => format!("> {} ...", call.source.label()),
        };
        self.lock().tool_line(&line);
    }

    fn on_tool_call_end(&self, call: &ToolCallRecord) {
        let status = match call.state {
            ToolCallState::Ready => "done",
            ToolCallState::Error => "failed",
            ToolCallState::Loading => "running",
        };
        let line = match call.output_text() {
            Some(output) if call.state == ToolCallState::Ready => {
                format!("< {} {status}: {}", call.source.label(), one_line(&output))
            }
            _ => format!("< {} {status}", call.source.label()),
        };
        self.lock().tool_line(&line);
    }

    fn on_failure(&self, message: &str) {
        self.lock().reset();
        eprintln!("error: {message}");
    }

    fn on_finished(&self, outcome: &SessionOutcome) {
        let mut state = self.lock();
        if state.lane.is_some() && outcome.state() == SessionState::Completed {
            let _ = writeln!(state.out);
        }
    }
}

const PREVIEW_CHARS: usize = 120;

fn one_line(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}
