use crate::model::Source;
use crate::session::SessionOutcome;
use crate::timeline::ToolCallRecord;

/// Rendering boundary for a live session.
///
/// Every callback receives cumulative, already-merged values; a renderer
/// never has to stitch deltas together itself. Callbacks run on the
/// session task, so implementations should return quickly.
pub trait RenderSink: Send + Sync {
    /// Coalesced accumulated answer text.
    fn on_answer(&self, text: &str);

    /// Current content of the open narration block for `source`.
    fn on_narration(&self, _source: &Source, _content: &str) {}

    /// The latest narration block for `source` was sealed.
    fn on_narration_complete(&self, _source: &Source) {}

    /// A tool call entered the timeline in `loading` state, or a named
    /// source narrating again moved its last call back to `loading`.
    fn on_tool_call_start(&self, _call: &ToolCallRecord) {}

    /// A tool call reached `ready` (matching end) or `error` (session failure).
    fn on_tool_call_end(&self, _call: &ToolCallRecord) {}

    /// User-visible failure text that replaces any partial answer.
    fn on_failure(&self, _message: &str) {}

    /// Terminal outcome, delivered once for live sessions.
    fn on_finished(&self, _outcome: &SessionOutcome) {}
}
