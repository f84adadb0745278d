use std::path::PathBuf;

use thiserror::Error;

/// Why a generation call produced no usable text.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationFailure {
    #[error("transport failure: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("response envelope is not valid JSON: {0}")]
    Envelope(String),

    #[error("response envelope has no generated text")]
    ContentMissing,

    #[error("generation endpoint reported an error: {0}")]
    Upstream(String),
}

/// How far extraction got before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStage {
    NoSpanFound,
    ParseFailed,
    ParseFailedAfterRepair,
}

impl ExtractionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStage::NoSpanFound => "no-span-found",
            ExtractionStage::ParseFailed => "parse-failed",
            ExtractionStage::ParseFailedAfterRepair => "parse-failed-after-repair",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("could not extract a structured record ({}): {detail}", .stage.as_str())]
pub struct ExtractionFailure {
    pub stage: ExtractionStage,
    pub detail: String,
    /// The generator output exactly as received.
    pub raw: String,
}

#[derive(Debug, Error)]
#[error("failed to persist fact under '{path}': {reason}")]
pub struct InsertionFailure {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid config: {0}")]
    Validation(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("a topic is required to start a curation run")]
    MissingTopic,

    #[error("stage '{0}' requires a curation run to have been started")]
    NotStarted(&'static str),
}
