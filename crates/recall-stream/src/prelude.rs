//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, ClientConfig, ClientError, HttpTransport, QueryMode, QueryRequest, RenderSink,
    SessionController, SessionHandle, SessionOutcome, SessionState, Source, TimelineItem,
    ToolCallRecord, ToolCallState,
};
