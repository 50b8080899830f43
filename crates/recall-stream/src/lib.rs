//! Streaming event protocol client for a remote assistant.
//!
//! Turns a long-lived HTTP response of `data:` records into an ordered,
//! incrementally updated timeline of answer text, narration and tool calls.
//!
//! Pipeline, leaf first: [`decode::ChunkDecoder`] -> [`framing::EventFramer`]
//! -> [`event::classify`] -> [`timeline::Timeline`] ->
//! [`delivery::DeliveryScheduler`], driven by a [`SessionController`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use recall_stream::prelude::*;
//!
//! struct Print;
//!
//! impl RenderSink for Print {
//!     fn on_answer(&self, text: &str) {
//!         println!("{text}");
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let config = ClientConfig::from_env()?;
//! let controller =
//!     SessionController::with_config(Arc::new(HttpTransport::new(config.clone())?), &config);
//! let outcome = controller
//!     .submit(QueryRequest::deep("what did I save last week?"), Arc::new(Print))?
//!     .finish()
//!     .await?;
//! println!("{:?}", outcome.state());
//! # Ok(())
//! # }
//! ```

/// Client configuration.
pub mod config;
/// Stateful UTF-8 chunk decoding.
pub mod decode;
/// Coalesced answer delivery.
pub mod delivery;
/// Public error types.
pub mod errors;
/// Record classification.
pub mod event;
/// Line-oriented record framing.
pub mod framing;
/// Sources, query modes and requests.
pub mod model;
/// Logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Session lifecycle and the controller.
pub mod session;
/// Rendering boundary.
pub mod sink;
/// Timeline reconstruction.
pub mod timeline;
/// Transport seam and HTTP implementation.
pub mod transport;

pub use config::ClientConfig;
pub use errors::{ClientError, DropReason, GENERIC_FAILURE_MESSAGE, TransportError};
pub use event::ClassifiedEvent;
pub use model::{QueryMode, QueryRequest, Source};
pub use session::{AbortHandle, SessionController, SessionHandle, SessionOutcome, SessionState};
pub use sink::RenderSink;
pub use timeline::{NarrationBlock, Timeline, TimelineItem, ToolCallRecord, ToolCallState};
pub use transport::{ByteStream, HttpTransport, Transport, TransportResponse};
