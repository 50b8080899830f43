//! Transport seam and the reqwest-backed HTTP implementation.

use std::pin::Pin;

use futures::StreamExt as _;
use tracing::debug;

use crate::config::ClientConfig;
use crate::errors::{ClientError, TransportError};
use crate::model::QueryRequest;

/// Response body as an ordered stream of raw chunks.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

/// What the transport got back for one request.
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Body stream; `None` when the response carried no readable body.
    pub body: Option<ByteStream>,
}

impl TransportResponse {
    /// Successful response with the given body.
    pub fn ok(body: ByteStream) -> Self {
        Self {
            status: 200,
            body: Some(body),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues the streaming request. Authentication, routing and retries
/// (there are none) belong to the implementation.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: &QueryRequest) -> Result<TransportResponse, TransportError>;
}

/// `Transport` over HTTP using reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    /// Creates a transport from explicit client configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a transport using `RECALL_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &QueryRequest) -> Result<TransportResponse, TransportError> {
        let url = self.config.stream_url();
        debug!(url = %url, mode = ?request.mode, "opening response stream");
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request.to_body())
            .send()
            .await
            .map_err(|e| TransportError::request(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::status(status.as_u16(), body));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::read(e.to_string())));
        Ok(TransportResponse {
            status: status.as_u16(),
            body: Some(Box::pin(body)),
        })
    }
}
