use std::path::PathBuf;

use thiserror::Error;

use crate::parser::ParseError;
use crate::transport::{RateLimitError, TransportError};
use crate::version::generator::GenerationError;
use crate::version::types::Stage;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Pending update not found: {0}")]
    NotFound(String),

    #[error("Invalid status: {0:?}")]
    InvalidTransition(String),
}

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse package list {path:?}: {source}")]
    PackageList {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid package id: {0:?} (expected category/name)")]
    InvalidPackageId(String),
}

/// Failure of a single extraction stage
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl StageError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            StageError::Transport(TransportError::Cancelled)
                | StageError::RateLimit(RateLimitError::Cancelled)
        )
    }
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Check cancelled")]
    Cancelled,

    #[error("No released version of {0} found in overlay")]
    NoCurrentVersion(String),

    #[error("No upstream source configured for {0}")]
    NoSource(String),

    #[error("All stages failed for {package} (last stage: {last_stage}): {primary}")]
    AllStagesFailed {
        package: String,
        last_stage: Stage,
        /// Error of the primary stage
        primary: StageError,
    },

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
