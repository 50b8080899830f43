//! Timeline reconstruction from classified events.
//!
//! The reconstructor applies events strictly in arrival order and keeps:
//! the accumulated answer, per-source narration blocks, and an ordered
//! sequence of render-ready items. Items are appended only when the
//! trailing item does not already represent the same `(kind, source)`;
//! otherwise the trailing item is mutated in place.

use std::collections::HashMap;

use crate::event::ClassifiedEvent;
use crate::model::Source;

/// One contiguous run of narration from a single source.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct NarrationBlock {
    pub content: String,
    pub is_complete: bool,
}

impl NarrationBlock {
    fn open(token: &str) -> Self {
        Self {
            content: token.to_string(),
            is_complete: false,
        }
    }
}

/// Lifecycle of a tool call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallState {
    Loading,
    Ready,
    Error,
}

/// Status record of one tool invocation.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ToolCallRecord {
    pub source: Source,
    pub state: ToolCallState,
    pub input: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
}

impl ToolCallRecord {
    /// Output as display text: strings verbatim, other JSON pretty-printed.
    pub fn output_text(&self) -> Option<String> {
        self.output.as_ref().map(render_payload)
    }

    /// Input as display text, same rules as [`ToolCallRecord::output_text`].
    pub fn input_text(&self) -> Option<String> {
        self.input.as_ref().map(render_payload)
    }
}

fn render_payload(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// A render-ready entry of the timeline.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineItem {
    Assistant {
        source: Source,
        blocks: Vec<NarrationBlock>,
    },
    ToolCall(ToolCallRecord),
}

impl TimelineItem {
    pub fn source(&self) -> &Source {
        match self {
            Self::Assistant { source, .. } => source,
            Self::ToolCall(record) => &record.source,
        }
    }
}

/// What a single [`Timeline::apply`] call changed.
///
/// The session controller turns these into render callbacks.
#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    /// Nothing observable changed.
    None,
    /// The accumulated answer grew.
    Answer,
    /// Narration for `source` grew; `item` is the timeline index touched.
    /// `reopened` is the tool call moved from `ready` back to `loading`.
    Narration {
        source: Source,
        item: usize,
        reopened: Option<usize>,
    },
    /// The latest narration block for `source` was sealed.
    NarrationComplete { source: Source },
    /// A tool call item was appended at `item`.
    ToolCallStarted { item: usize },
    /// The tool call item at `item` was resolved.
    ToolCallResolved { item: usize },
    /// Upstream signalled normal completion.
    Completed,
    /// Upstream signalled a fatal error.
    Failed { message: String },
}

/// Per-session reconstructed state.
#[derive(Clone, Debug, Default)]
pub struct Timeline {
    answer: String,
    narration: HashMap<Source, Vec<NarrationBlock>>,
    latest_tool_call: HashMap<Source, usize>,
    items: Vec<TimelineItem>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated final-answer text.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Ordered render-ready items.
    pub fn items(&self) -> &[TimelineItem] {
        &self.items
    }

    /// Every narration block seen for `source`, across timeline items.
    pub fn narration(&self, source: &Source) -> &[NarrationBlock] {
        self.narration.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Latest tool call record started by `source`.
    pub fn tool_call(&self, source: &Source) -> Option<&ToolCallRecord> {
        let index = *self.latest_tool_call.get(source)?;
        match self.items.get(index) {
            Some(TimelineItem::ToolCall(record)) => Some(record),
            _ => None,
        }
    }

    /// Tool call record at timeline index `item`, if that item is one.
    pub fn tool_call_at(&self, item: usize) -> Option<&ToolCallRecord> {
        match self.items.get(item) {
            Some(TimelineItem::ToolCall(record)) => Some(record),
            _ => None,
        }
    }

    /// Content of the last narration block of the item at `item`.
    pub fn narration_at(&self, item: usize) -> Option<&str> {
        match self.items.get(item) {
            Some(TimelineItem::Assistant { blocks, .. }) => {
                blocks.last().map(|b| b.content.as_str())
            }
            _ => None,
        }
    }

    /// Applies one event in arrival order.
    pub fn apply(&mut self, event: ClassifiedEvent) -> Change {
        match event {
            ClassifiedEvent::AnswerToken { token } => {
                if token.is_empty() {
                    return Change::None;
                }
                self.answer.push_str(&token);
                Change::Answer
            }
            ClassifiedEvent::ThinkingToken { source, token } => self.thinking(source, &token),
            ClassifiedEvent::ThinkingComplete { source } => self.seal(source),
            ClassifiedEvent::NarrationToken { .. } => Change::None,
            ClassifiedEvent::ToolCallStart { source, input } => {
                let item = self.items.len();
                self.items.push(TimelineItem::ToolCall(ToolCallRecord {
                    source: source.clone(),
                    state: ToolCallState::Loading,
                    input,
                    output: None,
                }));
                self.latest_tool_call.insert(source, item);
                Change::ToolCallStarted { item }
            }
            ClassifiedEvent::ToolCallEnd { source, output } => {
                let found = self.items.iter_mut().enumerate().rev().find_map(|(i, item)| {
                    match item {
                        TimelineItem::ToolCall(record)
                            if record.source == source
                                && record.state == ToolCallState::Loading =>
                        {
                            Some((i, record))
                        }
                        _ => None,
                    }
                });
                match found {
                    Some((item, record)) => {
                        record.state = ToolCallState::Ready;
                        record.output = output;
                        Change::ToolCallResolved { item }
                    }
                    None => Change::None,
                }
            }
            ClassifiedEvent::StreamEnd => Change::Completed,
            ClassifiedEvent::StreamError { message } => Change::Failed { message },
        }
    }

    /// Discards the partial answer and moves every loading tool call to
    /// `error`. Returns the indices of the items that changed.
    pub fn fail(&mut self) -> Vec<usize> {
        self.answer.clear();
        let mut failed = Vec::new();
        for (i, item) in self.items.iter_mut().enumerate() {
            if let TimelineItem::ToolCall(record) = item
                && record.state == ToolCallState::Loading
            {
                record.state = ToolCallState::Error;
                failed.push(i);
            }
        }
        failed
    }

    fn thinking(&mut self, source: Source, token: &str) -> Change {
        append_or_open(self.narration.entry(source.clone()).or_default(), token);

        let trailing = match self.items.last_mut() {
            Some(TimelineItem::Assistant {
                source: item_source,
                blocks,
            }) if *item_source == source => {
                append_or_open(blocks, token);
                true
            }
            _ => false,
        };
        if !trailing {
            self.items.push(TimelineItem::Assistant {
                source: source.clone(),
                blocks: vec![NarrationBlock::open(token)],
            });
        }
        let item = self.items.len() - 1;

        // A narrating sub-agent is still running.
        let mut reopened = None;
        if !source.is_primary()
            && let Some(&index) = self.latest_tool_call.get(&source)
            && let Some(TimelineItem::ToolCall(record)) = self.items.get_mut(index)
            && record.state != ToolCallState::Loading
        {
            record.state = ToolCallState::Loading;
            reopened = Some(index);
        }

        Change::Narration {
            source,
            item,
            reopened,
        }
    }

    fn seal(&mut self, source: Source) -> Change {
        let Some(last) = self.narration.get_mut(&source).and_then(|b| b.last_mut()) else {
            return Change::None;
        };
        last.is_complete = true;
        let item_block = self.items.iter_mut().rev().find_map(|item| match item {
            TimelineItem::Assistant {
                source: item_source,
                blocks,
            } if *item_source == source => blocks.last_mut(),
            _ => None,
        });
        if let Some(block) = item_block {
            block.is_complete = true;
        }
        Change::NarrationComplete { source }
    }
}

fn append_or_open(blocks: &mut Vec<NarrationBlock>, token: &str) {
    match blocks.last_mut() {
        Some(block) if !block.is_complete => block.content.push_str(token),
        _ => blocks.push(NarrationBlock::open(token)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn thinking(source: Source, token: &str) -> ClassifiedEvent {
        ClassifiedEvent::ThinkingToken {
            source,
            token: token.into(),
        }
    }

    fn start(name: &str) -> ClassifiedEvent {
        ClassifiedEvent::ToolCallStart {
            source: Source::named(name),
            input: None,
        }
    }

    fn end(name: &str, output: serde_json::Value) -> ClassifiedEvent {
        ClassifiedEvent::ToolCallEnd {
            source: Source::named(name),
            output: Some(output),
        }
    }

    #[test]
    fn answer_tokens_accumulate_outside_the_item_sequence() {
        let mut timeline = Timeline::new();
        assert_eq!(
            timeline.apply(ClassifiedEvent::AnswerToken { token: "Hel".into() }),
            Change::Answer
        );
        timeline.apply(ClassifiedEvent::AnswerToken { token: "lo".into() });
        assert_eq!(timeline.answer(), "Hello");
        assert!(timeline.items().is_empty());
        assert_eq!(timeline.apply(ClassifiedEvent::StreamEnd), Change::Completed);
    }

    #[test]
    fn consecutive_thinking_for_same_source_merges_into_one_block() {
        let mut timeline = Timeline::new();
        timeline.apply(thinking(Source::Primary, "a"));
        timeline.apply(thinking(Source::Primary, "b"));
        assert_eq!(
            timeline.items(),
            &[TimelineItem::Assistant {
                source: Source::Primary,
                blocks: vec![NarrationBlock {
                    content: "ab".into(),
                    is_complete: false
                }],
            }]
        );
        assert_eq!(timeline.narration(&Source::Primary).len(), 1);
    }

    #[test]
    fn interleaved_source_does_not_merge_into_other_block() {
        let mut timeline = Timeline::new();
        timeline.apply(thinking(Source::Primary, "a"));
        timeline.apply(thinking(Source::named("web"), "x"));
        timeline.apply(thinking(Source::Primary, "b"));

        assert_eq!(timeline.items().len(), 3);
        assert_eq!(timeline.narration_at(0), Some("a"));
        assert_eq!(timeline.narration_at(1), Some("x"));
        assert_eq!(timeline.narration_at(2), Some("b"));
        // Per-source store keeps growing the still-open block.
        assert_eq!(timeline.narration(&Source::Primary)[0].content, "ab");
        assert_eq!(timeline.narration(&Source::named("web"))[0].content, "x");
    }

    #[test]
    fn thinking_complete_seals_block_and_next_token_opens_new_one() {
        let mut timeline = Timeline::new();
        timeline.apply(thinking(Source::Primary, "first"));
        assert_eq!(
            timeline.apply(ClassifiedEvent::ThinkingComplete {
                source: Source::Primary
            }),
            Change::NarrationComplete {
                source: Source::Primary
            }
        );
        timeline.apply(thinking(Source::Primary, "second"));

        let TimelineItem::Assistant { blocks, .. } = &timeline.items()[0] else {
            panic!("expected assistant item");
        };
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].is_complete);
        assert_eq!(blocks[1].content, "second");
        assert!(!blocks[1].is_complete);
        assert_eq!(timeline.narration(&Source::Primary).len(), 2);
    }

    #[test]
    fn thinking_complete_without_blocks_is_a_no_op() {
        let mut timeline = Timeline::new();
        assert_eq!(
            timeline.apply(ClassifiedEvent::ThinkingComplete {
                source: Source::named("ghost")
            }),
            Change::None
        );
        assert!(timeline.items().is_empty());
    }

    #[test]
    fn tool_call_end_resolves_most_recent_loading_record() {
        let mut timeline = Timeline::new();
        timeline.apply(start("search"));
        timeline.apply(start("search"));
        assert_eq!(
            timeline.apply(end("search", json!("out"))),
            Change::ToolCallResolved { item: 1 }
        );
        assert_eq!(
            timeline.tool_call_at(0).map(|r| r.state),
            Some(ToolCallState::Loading)
        );
        let second = timeline.tool_call_at(1).expect("second call");
        assert_eq!(second.state, ToolCallState::Ready);
        assert_eq!(second.output, Some(json!("out")));

        // The next end falls through to the older one.
        timeline.apply(end("search", json!("older")));
        assert_eq!(
            timeline.tool_call_at(0).map(|r| r.state),
            Some(ToolCallState::Ready)
        );
    }

    #[test]
    fn unmatched_tool_call_end_is_ignored() {
        let mut timeline = Timeline::new();
        assert_eq!(timeline.apply(end("web", json!(1))), Change::None);
        timeline.apply(start("web"));
        timeline.apply(end("web", json!(1)));
        assert_eq!(timeline.apply(end("web", json!(2))), Change::None);
        assert_eq!(timeline.items().len(), 1);
        assert_eq!(
            timeline.tool_call(&Source::named("web")).and_then(|r| r.output.clone()),
            Some(json!(1))
        );
    }

    #[test]
    fn tool_call_and_its_narration_stay_distinct_items() {
        let mut timeline = Timeline::new();
        timeline.apply(start("web"));
        timeline.apply(thinking(Source::named("web"), "x"));
        timeline.apply(end("web", json!("y")));
        timeline.apply(ClassifiedEvent::StreamEnd);

        let items = timeline.items();
        assert_eq!(items.len(), 2);
        assert!(matches!(
            &items[0],
            TimelineItem::ToolCall(ToolCallRecord { state: ToolCallState::Ready, output: Some(out), .. })
                if *out == json!("y")
        ));
        assert!(matches!(
            &items[1],
            TimelineItem::Assistant { source, blocks } if *source == Source::named("web") && blocks[0].content == "x"
        ));
    }

    #[test]
    fn sub_agent_narration_reopens_its_latest_tool_call() {
        let mut timeline = Timeline::new();
        timeline.apply(start("web"));
        timeline.apply(end("web", json!("done early")));
        assert_eq!(
            timeline.tool_call(&Source::named("web")).map(|r| r.state),
            Some(ToolCallState::Ready)
        );
        let change = timeline.apply(thinking(Source::named("web"), "still going"));
        assert_eq!(
            change,
            Change::Narration {
                source: Source::named("web"),
                item: 1,
                reopened: Some(0),
            }
        );
        assert_eq!(
            timeline.tool_call(&Source::named("web")).map(|r| r.state),
            Some(ToolCallState::Loading)
        );

        // Already loading: nothing to reopen.
        let change = timeline.apply(thinking(Source::named("web"), "!"));
        assert!(matches!(change, Change::Narration { reopened: None, .. }));

        // Primary narration never touches tool calls.
        timeline.apply(start("assistant"));
        timeline.apply(end("assistant", json!(0)));
        timeline.apply(thinking(Source::Primary, "p"));
        assert_eq!(
            timeline.tool_call(&Source::named("assistant")).map(|r| r.state),
            Some(ToolCallState::Ready)
        );
    }

    #[test]
    fn narration_tokens_are_not_surfaced() {
        let mut timeline = Timeline::new();
        let change = timeline.apply(ClassifiedEvent::NarrationToken {
            source: Source::named("web"),
            token: "fetching".into(),
        });
        assert_eq!(change, Change::None);
        assert!(timeline.items().is_empty());
    }

    #[test]
    fn fail_clears_answer_and_errors_loading_calls() {
        let mut timeline = Timeline::new();
        timeline.apply(ClassifiedEvent::AnswerToken {
            token: "partial".into(),
        });
        timeline.apply(start("a"));
        timeline.apply(start("b"));
        timeline.apply(end("b", json!(null)));
        assert_eq!(timeline.fail(), vec![0]);
        assert_eq!(timeline.answer(), "");
        assert_eq!(
            timeline.tool_call_at(0).map(|r| r.state),
            Some(ToolCallState::Error)
        );
        assert_eq!(
            timeline.tool_call_at(1).map(|r| r.state),
            Some(ToolCallState::Ready)
        );
    }

    #[test]
    fn stream_error_reports_upstream_message() {
        let mut timeline = Timeline::new();
        assert_eq!(
            timeline.apply(ClassifiedEvent::StreamError {
                message: "boom".into()
            }),
            Change::Failed {
                message: "boom".into()
            }
        );
    }

    #[test]
    fn output_text_renders_strings_verbatim_and_json_pretty() {
        let record = ToolCallRecord {
            source: Source::named("web"),
            state: ToolCallState::Ready,
            input: Some(json!({"q": "rust"})),
            output: Some(json!("plain")),
        };
        assert_eq!(record.output_text().as_deref(), Some("plain"));
        assert_eq!(
            record.input_text().as_deref(),
            Some("{\n  \"q\": \"rust\"\n}")
        );
    }

    #[test]
    fn items_serialize_with_source_labels() {
        let mut timeline = Timeline::new();
        timeline.apply(thinking(Source::Primary, "hm"));
        timeline.apply(start("web"));
        timeline.apply(end("web", json!("y")));

        let value = serde_json::to_value(timeline.items()).expect("json");
        assert_eq!(
            value,
            json!([
                {
                    "kind": "assistant",
                    "source": "assistant",
                    "blocks": [{"content": "hm", "is_complete": false}]
                },
                {
                    "kind": "tool_call",
                    "source": "web",
                    "state": "ready",
                    "input": null,
                    "output": "y"
                }
            ])
        );
    }
}
