use std::fmt;

/// Logical speaker of a narration or tool-call event.
///
/// Serializes as its display label, so snapshots read the same as the
/// rendered timeline.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Source {
    /// The primary assistant answering the query.
    Primary,
    /// A named sub-agent or tool (for example `web_search`).
    Named(String),
}

impl Source {
    /// Creates a named source.
    pub fn named(value: impl Into<String>) -> Self {
        Self::Named(value.into())
    }

    /// Maps an optional wire name onto a source; absent means the primary assistant.
    pub fn from_wire(name: Option<String>) -> Self {
        match name {
            Some(name) if !name.trim().is_empty() => Self::Named(name),
            _ => Self::Primary,
        }
    }

    /// Returns true for the primary assistant.
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Primary)
    }

    /// Display label used by renderers.
    pub fn label(&self) -> &str {
        match self {
            Self::Primary => "assistant",
            Self::Named(name) => name,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl serde::Serialize for Source {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl From<&str> for Source {
    fn from(value: &str) -> Self {
        Self::named(value)
    }
}

impl From<String> for Source {
    fn from(value: String) -> Self {
        Self::named(value)
    }
}

/// Selects plain chat or the extended, agentic "probe" behavior upstream.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    Chat,
    Deep,
}

impl QueryMode {
    pub fn is_deep(self) -> bool {
        matches!(self, Self::Deep)
    }
}

/// One outbound query handed to the transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueryRequest {
    /// User query text.
    pub query: String,
    /// Chat vs. extended behavior.
    pub mode: QueryMode,
}

impl QueryRequest {
    /// Creates a plain chat request.
    pub fn chat(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: QueryMode::Chat,
        }
    }

    /// Creates an extended (deep) request.
    pub fn deep(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: QueryMode::Deep,
        }
    }

    /// JSON body understood by the upstream route.
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "query": self.query,
            "isDeep": self.mode.is_deep(),
        })
    }
}
