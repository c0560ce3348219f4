//! Error types for the report bot.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found. A blank one was written to {path}. {hint}")]
    MissingFile { path: PathBuf, hint: String },

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the file index and the config store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store file {path} is unreadable: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Chat transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to fetch attachment on channel {name}: {reason}")]
    FetchFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Errors from filling the document template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template archive error: {0}")]
    Archive(String),

    #[error("Template XML error: {0}")]
    Xml(String),

    #[error("Invalid template: {0}")]
    Invalid(String),
}

/// Errors from chart rendering.
#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("Chart rendering failed: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single converter attempt failure.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} exited with status {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Converter timed out after {0:?}")]
    Timeout(Duration),

    #[error("No output produced at {0}")]
    NoOutput(PathBuf),
}

/// Artifact pipeline errors. Each one ends the current generation run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Template not found: {0}")]
    TemplateMissing(PathBuf),

    #[error("Template fill failed: {0}")]
    Template(#[from] TemplateError),

    #[error("Chart generation failed: {0}")]
    Chart(#[from] ChartError),

    #[error("No converter produced a PDF ({})", .attempts.join("; "))]
    ConversionFailed { attempts: Vec<String> },

    #[error("File index error: {0}")]
    Store(#[from] StoreError),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
