//! Error taxonomy shared by the build-service client and the link resolver.

use std::fmt::Display;

/// Errors surfaced by project resolution and the build-service collaborator.
///
/// Nothing in this crate recovers from these locally: every failure aborts the
/// current operation and is handed back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ObsError {
    /// The build service has no metadata for the named project.
    #[error("Project {0} not found")]
    ProjectNotFound(String),

    /// A document fetched from the build service could not be decoded.
    #[error("Malformed metadata for {project}: {reason}")]
    MalformedMetadata { project: String, reason: String },

    /// A metadata-dependent operation was called on a project constructed
    /// without fetching its metadata.
    #[error("Metadata of project {0} has not been loaded")]
    MetadataNotLoaded(String),

    /// Any other build-service failure, passed through unchanged.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl ObsError {
    pub fn malformed(project: &str, reason: impl Display) -> Self {
        ObsError::MalformedMetadata {
            project: project.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ObsError::ProjectNotFound(_))
    }
}

pub type Result<T, E = ObsError> = std::result::Result<T, E>;
