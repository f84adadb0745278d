use serde::{Deserialize, Serialize};

/// Citation id of a fact that no source document backs.
pub const UNATTRIBUTED: i64 = -1;

/// A single curated piece of content plus its provenance.
///
/// Fields are private so a fact cannot change once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    content: String,
    citation_id: i64,
    metadata: Vec<(String, String)>,
}

impl FactRecord {
    pub fn new(content: impl Into<String>, citation_id: i64) -> Self {
        Self {
            content: content.into(),
            citation_id,
            metadata: Vec::new(),
        }
    }

    /// Builder used while constructing a fact. Metadata keeps insertion
    /// order; a repeated key replaces the earlier value in place.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.metadata.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.metadata.push((key, value)),
        }
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn citation_id(&self) -> i64 {
        self.citation_id
    }

    pub fn is_attributed(&self) -> bool {
        self.citation_id != UNATTRIBUTED
    }

    pub fn metadata(&self) -> &[(String, String)] {
        &self.metadata
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
