pub mod commands;
pub mod config;
pub mod error;
pub mod http;
pub mod metadata;
pub mod obs;
pub mod package;
pub mod project;
pub mod runtime;
pub mod workflow;
pub mod xml;

pub use error::{ObsError, Result};
pub use metadata::ProjectMetadata;
pub use obs::{BuildService, ObsClient};
pub use package::RemotePackage;
pub use project::RemoteProject;

/// Test utilities for building fake build-service states.
#[cfg(test)]
pub mod test_utils {
    use crate::error::ObsError;
    use crate::obs::MockBuildService;
    use std::collections::HashMap;

    /// Minimal project meta document declaring `links`.
    pub fn project_meta(name: &str, links: &[&str]) -> String {
        let links: String = links
            .iter()
            .map(|link| format!("  <link project=\"{}\"/>\n", link))
            .collect();
        format!(
            "<project name=\"{}\">\n  <title/>\n  <description/>\n{}</project>\n",
            name, links
        )
    }

    /// A mock service that knows the given `(project, links, packages)`.
    /// Every other project is reported as not found.
    pub fn mock_service(projects: &[(&str, &[&str], &[&str])]) -> MockBuildService {
        let metas: HashMap<String, String> = projects
            .iter()
            .map(|(name, links, _)| (name.to_string(), project_meta(name, links)))
            .collect();
        let packages: HashMap<String, Vec<String>> = projects
            .iter()
            .map(|(name, _, pkgs)| {
                (
                    name.to_string(),
                    pkgs.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect();

        let mut service = MockBuildService::new();
        service.expect_fetch_project_meta().returning(move |name| {
            metas
                .get(name)
                .cloned()
                .ok_or_else(|| ObsError::ProjectNotFound(name.to_string()))
        });
        service.expect_list_packages().returning(move |name| {
            packages
                .get(name)
                .cloned()
                .ok_or_else(|| ObsError::ProjectNotFound(name.to_string()))
        });
        service
    }
}
