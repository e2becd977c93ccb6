use serde::{Deserialize, Serialize};

/// A channel record handed over by the ingestion layer
///
/// Channels are treated as immutable. Validation returns annotated copies
/// through [`Channel::with_validation`] and never mutates the caller's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub group: Option<String>,
    pub stream_url: String,
    /// Which ingestion source produced the record
    #[serde(default)]
    pub source: Option<String>,
    /// Set by validation, false until a probe succeeds
    #[serde(default)]
    pub validated: bool,
}

impl Channel {
    pub fn new<I: Into<String>, N: Into<String>, U: Into<String>>(
        id: I,
        name: N,
        stream_url: U,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            group: None,
            stream_url: stream_url.into(),
            source: None,
            validated: false,
        }
    }

    pub fn with_group<S: Into<String>>(mut self, group: S) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_source<S: Into<String>>(mut self, source: S) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Copy of this channel carrying the validation result
    ///
    /// When `preferred_url` is given the copy points at it instead of the
    /// original stream URL.
    pub fn with_validation(&self, is_valid: bool, preferred_url: Option<&str>) -> Self {
        let mut annotated = self.clone();
        annotated.validated = is_valid;
        if let Some(url) = preferred_url {
            annotated.stream_url = url.to_string();
        }
        annotated
    }
}
