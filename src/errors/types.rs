//! Error type definitions.
//!
//! [`AppError`] is the single concrete error type returned by every core
//! subsystem. [`ErrorKind`] is the taxonomy from the specification's error
//! handling design: the Scheduler's retry policy and the Progress Service's
//! structured error detail both classify failures through `AppError::kind`
//! rather than matching on message text.

use thiserror::Error;

/// Coarse classification of an [`AppError`], independent of which
/// subsystem raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    PreconditionFailed,
    Conflict,
    Integrity,
    Resource,
    Transient,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Whether the Scheduler's runner should retry an operation that failed
    /// with this kind (spec: only `Transient` is retry-eligible).
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    #[error("already exists: {resource} {name}")]
    AlreadyExists { resource: String, name: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("precondition failed: {message}")]
    PreconditionFailed { message: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("integrity violation: {message}")]
    Integrity { message: String },

    #[error("resource exhausted: {message}")]
    Resource { message: String },

    #[error("transient failure: {message}")]
    Transient { message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("stage '{stage_name}' ({stage_id}) failed: {source}")]
    Stage {
        stage_id: String,
        stage_name: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    pub fn not_found(resource: impl Into<String>, id: impl std::fmt::Display) -> Self {
        Self::NotFound { resource: resource.into(), id: id.to_string() }
    }

    pub fn already_exists(resource: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists { resource: resource.into(), name: name.into() }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity { message: message.into() }
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource { message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Wrap this error with the identity of the pipeline stage that raised
    /// it, as the orchestrator does before handing the error to the
    /// Progress Service.
    pub fn into_stage(self, stage_id: impl Into<String>, stage_name: impl Into<String>) -> Self {
        Self::Stage {
            stage_id: stage_id.into(),
            stage_name: stage_name.into(),
            source: Box::new(self),
        }
    }

    /// Classify this error into the taxonomy kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            AppError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            AppError::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            AppError::Conflict { .. } => ErrorKind::Conflict,
            AppError::Integrity { .. } => ErrorKind::Integrity,
            AppError::Resource { .. } => ErrorKind::Resource,
            AppError::Transient { .. } => ErrorKind::Transient,
            AppError::Cancelled => ErrorKind::Cancelled,
            AppError::Internal { .. } => ErrorKind::Internal,
            AppError::Stage { source, .. } => source.kind(),
            AppError::Http(_) => ErrorKind::Transient,
            AppError::Io(_) => ErrorKind::Internal,
            AppError::Json(_) => ErrorKind::Internal,
        }
    }

    /// The stage id this error is attributed to, if it was wrapped via
    /// [`AppError::into_stage`].
    pub fn stage_id(&self) -> Option<&str> {
        match self {
            AppError::Stage { stage_id, .. } => Some(stage_id),
            _ => None,
        }
    }
}

// --- Sentinel errors named by the specification, expressed as constructors
// over the taxonomy above rather than as separate types, so callers can
// still match by kind/message while the type surface stays small.

impl AppError {
    pub fn source_not_found(id: impl std::fmt::Display) -> Self {
        Self::not_found("source", id)
    }

    pub fn ingestion_in_progress(source_id: impl std::fmt::Display) -> Self {
        Self::conflict(format!("ingestion already in progress for source {source_id}"))
    }

    pub fn handler_unavailable(kind: impl std::fmt::Display) -> Self {
        Self::precondition_failed(format!("no ingestion handler available for source kind '{kind}'"))
    }

    pub fn no_sources() -> Self {
        Self::precondition_failed("proxy has no configured sources")
    }

    pub fn pipeline_already_running(proxy_id: impl std::fmt::Display) -> Self {
        Self::conflict(format!("pipeline already running for proxy {proxy_id}"))
    }

    pub fn insufficient_disk_space(available: u64, required: u64) -> Self {
        Self::resource(format!(
            "insufficient disk space: {available} bytes available, {required} bytes required"
        ))
    }

    pub fn backup_exists(filename: impl std::fmt::Display) -> Self {
        Self::already_exists("backup", filename.to_string())
    }

    pub fn invalid_filename(filename: impl std::fmt::Display) -> Self {
        Self::invalid_argument(format!("invalid backup filename: {filename}"))
    }

    pub fn archive_corrupt(reason: impl std::fmt::Display) -> Self {
        Self::integrity(format!("archive corrupt: {reason}"))
    }

    pub fn integrity_check_failed(result: impl std::fmt::Display) -> Self {
        Self::integrity(format!("database integrity check failed: {result}"))
    }

    pub fn checksum_mismatch() -> Self {
        Self::integrity("checksum mismatch")
    }

    pub fn no_daemons_available() -> Self {
        Self::resource("no daemons available to service this transcode profile")
    }

    pub fn client_overrun() -> Self {
        Self::resource("client lagged beyond the ring buffer window and was dropped")
    }
}
