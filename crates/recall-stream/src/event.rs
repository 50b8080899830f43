//! Classification of raw records into the closed set of stream events.

use crate::errors::DropReason;
use crate::framing::RawEvent;
use crate::model::Source;

/// A decoded upstream record.
#[derive(Clone, Debug, PartialEq)]
pub enum ClassifiedEvent {
    /// Final-answer text.
    AnswerToken { token: String },
    /// Reasoning narration from the primary assistant or a sub-agent.
    ThinkingToken { source: Source, token: String },
    /// Seals the latest narration block for `source`.
    ThinkingComplete { source: Source },
    /// Non-reasoning narration; never surfaced as timeline text.
    NarrationToken { source: Source, token: String },
    /// A tool or sub-agent invocation began.
    ToolCallStart {
        source: Source,
        input: Option<serde_json::Value>,
    },
    /// A tool or sub-agent invocation finished.
    ToolCallEnd {
        source: Source,
        output: Option<serde_json::Value>,
    },
    /// Upstream finished normally.
    StreamEnd,
    /// Upstream reported a fatal error.
    StreamError { message: String },
}

impl ClassifiedEvent {
    /// Short stable name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AnswerToken { .. } => "answer_token",
            Self::ThinkingToken { .. } => "thinking_token",
            Self::ThinkingComplete { .. } => "thinking_complete",
            Self::NarrationToken { .. } => "narration_token",
            Self::ToolCallStart { .. } => "tool_call_start",
            Self::ToolCallEnd { .. } => "tool_call_end",
            Self::StreamEnd => "stream_end",
            Self::StreamError { .. } => "stream_error",
        }
    }

    /// Returns true for `StreamEnd` and `StreamError`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StreamEnd | Self::StreamError { .. })
    }
}

const KNOWN_TYPES: &[&str] = &[
    "token",
    "thinking",
    "thinking_complete",
    "narration",
    "tool_call_start",
    "tool_start",
    "tool_call_end",
    "tool_end",
    "done",
    "error",
];

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireRecord {
    Token {
        token: String,
    },
    Thinking {
        token: String,
        #[serde(default, alias = "source")]
        tool_name: Option<String>,
    },
    ThinkingComplete {
        #[serde(default, alias = "source")]
        tool_name: Option<String>,
    },
    Narration {
        token: String,
        #[serde(default, alias = "source")]
        tool_name: Option<String>,
    },
    #[serde(alias = "tool_start")]
    ToolCallStart {
        #[serde(alias = "source")]
        tool_name: String,
        #[serde(default)]
        input: Option<serde_json::Value>,
    },
    #[serde(alias = "tool_end")]
    ToolCallEnd {
        #[serde(alias = "source")]
        tool_name: String,
        #[serde(default)]
        output: Option<serde_json::Value>,
    },
    Done,
    Error {
        message: String,
    },
}

impl From<WireRecord> for ClassifiedEvent {
    fn from(record: WireRecord) -> Self {
        match record {
            WireRecord::Token { token } => Self::AnswerToken { token },
            WireRecord::Thinking { token, tool_name } => Self::ThinkingToken {
                source: Source::from_wire(tool_name),
                token,
            },
            WireRecord::ThinkingComplete { tool_name } => Self::ThinkingComplete {
                source: Source::from_wire(tool_name),
            },
            WireRecord::Narration { token, tool_name } => Self::NarrationToken {
                source: Source::from_wire(tool_name),
                token,
            },
            WireRecord::ToolCallStart { tool_name, input } => Self::ToolCallStart {
                source: Source::from_wire(Some(tool_name)),
                input: input.filter(|v| !v.is_null()),
            },
            WireRecord::ToolCallEnd { tool_name, output } => Self::ToolCallEnd {
                source: Source::from_wire(Some(tool_name)),
                output: output.filter(|v| !v.is_null()),
            },
            WireRecord::Done => Self::StreamEnd,
            WireRecord::Error { message } => Self::StreamError { message },
        }
    }
}

/// Classifies one raw record.
///
/// Unknown `type` values and malformed payloads come back as a
/// [`DropReason`]; the caller logs and skips them.
pub fn classify(raw: &RawEvent) -> Result<ClassifiedEvent, DropReason> {
    let value: serde_json::Value = serde_json::from_str(raw.as_str())
        .map_err(|e| DropReason::Malformed(format!("invalid JSON payload: {e}")))?;
    let Some(kind) = value.get("type").and_then(|v| v.as_str()) else {
        return Err(DropReason::Malformed("missing string `type` field".into()));
    };
    if !KNOWN_TYPES.contains(&kind) {
        return Err(DropReason::UnknownType(kind.to_string()));
    }
    let kind = kind.to_string();
    let record: WireRecord = serde_json::from_value(value)
        .map_err(|e| DropReason::Malformed(format!("invalid `{kind}` record: {e}")))?;
    Ok(record.into())
}
