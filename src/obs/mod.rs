//! Build-service collaborator.
//!
//! The link resolver only needs three primitives from the build service:
//! fetching a project's meta document, saving one, and listing a project's
//! packages. They are expressed by [`BuildService`] so the resolver can be
//! exercised against a mock. [`ObsClient`] implements them over the REST/XML
//! API and additionally carries the entity lifecycle verbs (packages, files,
//! groups, persons, requests).

mod client;
mod directory;

use async_trait::async_trait;

use crate::error::Result;

pub use client::{DEFAULT_API_URL, ObsClient};
pub use directory::parse_directory;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BuildService: Send + Sync {
    /// Fetch the raw meta document of a project.
    /// Fails with `ProjectNotFound` when the service has no such project.
    async fn fetch_project_meta(&self, project: &str) -> Result<String>;

    /// Store `meta` as the meta document of `project`, creating it if needed.
    async fn save_project_meta(&self, project: &str, meta: &str) -> Result<()>;

    /// Names of the packages a project owns, in the service's listing order.
    async fn list_packages(&self, project: &str) -> Result<Vec<String>>;
}
