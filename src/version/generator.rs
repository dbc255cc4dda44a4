//! Text-generation provider used as the last extraction stage

#[cfg(test)]
use mockall::automock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Text generation failed: {0}")]
    Provider(String),

    #[error("Text generation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Text generation returned no version")]
    EmptyVersion,
}

/// Extracts a version from arbitrary upstream content
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait VersionGenerator: Send + Sync {
    /// Returns the upstream version found in `content` as directed by `prompt`
    async fn generate_version(&self, content: &str, prompt: &str)
    -> Result<String, GenerationError>;
}
