use serde::Serialize;

use crate::error::ExtractionFailure;
use crate::model::llm_decode::{decode_record, StructuredRecord};
use crate::model::message::ConversationTurn;

/// The four products of a run, handed to whatever presents them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunArtifacts {
    pub topic: String,
    pub conversation: Vec<ConversationTurn>,
    pub outline: Option<String>,
    pub article: Option<String>,
    pub polished_article: Option<String>,
}

impl RunArtifacts {
    /// The final article text: polished when available, else the draft.
    pub fn final_article(&self) -> Option<&str> {
        self.polished_article
            .as_deref()
            .or(self.article.as_deref())
    }

    /// The final article decoded as a JSON object, when the generator wrote one.
    pub fn structured_article(&self) -> Option<Result<StructuredRecord, ExtractionFailure>> {
        self.final_article().map(decode_record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_article_prefers_polished_text() {
        let artifacts = RunArtifacts {
            topic: "Rust".into(),
            article: Some("draft".into()),
            polished_article: Some(r#"{"title": "Rust"}"#.into()),
            ..Default::default()
        };

        let record = artifacts.structured_article().unwrap().unwrap();
        assert_eq!(record["title"], "Rust");
    }

    #[test]
    fn plain_prose_is_an_extraction_failure() {
        let artifacts = RunArtifacts {
            article: Some("Rust is a language.".into()),
            ..Default::default()
        };
        assert!(artifacts.structured_article().unwrap().is_err());
        assert!(RunArtifacts::default().structured_article().is_none());
    }
}
