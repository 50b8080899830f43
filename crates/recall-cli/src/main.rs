mod render;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use recall_stream::observability::init_observability;
use recall_stream::prelude::*;
use tracing::{debug, info};

use crate::render::TerminalSink;

#[derive(Parser, Debug)]
#[command(name = "recall")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ask a question and watch the answer stream in")]
struct Cli {
    /// Question to send upstream
    #[arg(value_name = "QUERY")]
    query: String,

    /// Use deep research mode instead of chat
    #[arg(long)]
    deep: bool,

    /// Base URL of the upstream service
    #[arg(long, env = "RECALL_BASE_URL", value_name = "URL")]
    base_url: Option<String>,

    /// Streaming route path
    #[arg(long, env = "RECALL_STREAM_PATH", value_name = "PATH")]
    stream_path: Option<String>,

    /// Answer coalescing window in milliseconds
    #[arg(long, value_name = "MS")]
    coalesce_ms: Option<u64>,

    /// Hide narration and only render tool calls and the answer
    #[arg(long)]
    quiet: bool,

    /// Print the final timeline as JSON after the stream ends
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig, ClientError> {
        let mut config = ClientConfig::from_env()?;
        if let Some(url) = &self.base_url {
            config = config.base_url(url.clone());
        }
        if let Some(path) = &self.stream_path {
            config = config.stream_path(path.clone());
        }
        if let Some(ms) = self.coalesce_ms {
            config = config.coalesce_interval(Duration::from_millis(ms));
        }
        config.validate()?;
        Ok(config)
    }

    fn request(&self) -> QueryRequest {
        if self.deep {
            QueryRequest::deep(self.query.clone())
        } else {
            QueryRequest::chat(self.query.clone())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = dotenvy::dotenv();
    init_observability("warn");

    let cli = Cli::parse();
    let config = cli.client_config()?;
    debug!(url = %config.base_url, "resolved client config");

    let transport = Arc::new(HttpTransport::new(config.clone())?);
    let controller = SessionController::with_config(transport, &config);
    let sink = Arc::new(TerminalSink::new(!cli.quiet));

    let handle = controller.submit(cli.request(), sink)?;
    let abort = handle.abort_handle();
    info!(session = %handle.id(), "session submitted");

    let finished = handle.finish();
    tokio::pin!(finished);
    let outcome = tokio::select! {
        outcome = &mut finished => outcome?,
        _ = tokio::signal::ctrl_c() => {
            abort.abort();
            finished.await?
        }
    };

    match outcome {
        SessionOutcome::Completed {
            timeline,
            terminated,
        } => {
            if !terminated {
                eprintln!("warning: stream ended without a completion marker");
            }
            if cli.json {
                let report = serde_json::json!({
                    "answer": timeline.answer(),
                    "items": timeline.items(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Ok(())
        }
        SessionOutcome::Failed { message, .. } => {
            // The sink has already shown the message.
            debug!(%message, "session failed");
            std::process::exit(1);
        }
        SessionOutcome::Cancelled => {
            eprintln!("cancelled");
            std::process::exit(130);
        }
    }
}
