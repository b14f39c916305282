//! Projects on the build service and the packages they inherit through links.

use indexmap::IndexMap;
use log::{debug, info};

use crate::error::{ObsError, Result};
use crate::metadata::{ProjectMetadata, rewrite_for_subproject};
use crate::obs::BuildService;
use crate::package::RemotePackage;

/// A project on the build service side.
///
/// Not a local checkout: every query round-trips to the service, and nothing
/// beyond the parsed meta document is cached.
pub struct RemoteProject<'a, S: BuildService> {
    service: &'a S,
    name: String,
    metadata: Option<ProjectMetadata>,
}

impl<S: BuildService> std::fmt::Debug for RemoteProject<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProject")
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl<'a, S: BuildService> RemoteProject<'a, S> {
    /// A handle without metadata. Use [`RemoteProject::find`] unless the
    /// metadata is attached with [`RemoteProject::with_metadata`].
    pub fn new(service: &'a S, name: impl Into<String>) -> Self {
        Self {
            service,
            name: name.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: ProjectMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> Option<&ProjectMetadata> {
        self.metadata.as_ref()
    }

    /// Metadata, or `MetadataNotLoaded` when the project was never fetched.
    pub fn loaded_metadata(&self) -> Result<&ProjectMetadata> {
        self.metadata
            .as_ref()
            .ok_or_else(|| ObsError::MetadataNotLoaded(self.name.clone()))
    }

    /// Fetch and parse the metadata of `name`.
    /// Fails with `ProjectNotFound` if the service has no such project.
    #[tracing::instrument(skip(service))]
    pub async fn find(service: &'a S, name: &str) -> Result<Self> {
        let content = ProjectMetadata::load(service, name).await?;
        let metadata = ProjectMetadata::parse(name, &content)?;
        Ok(Self::new(service, name).with_metadata(metadata))
    }

    /// Create `<self>:<name>` with a copy of this project's meta.
    ///
    /// Title and description are replaced where given; everything else,
    /// links included, is inherited verbatim. The new project does not link
    /// back to this one.
    #[tracing::instrument(skip(self), fields(parent = %self.name))]
    pub async fn create_subproject(
        &self,
        name: &str,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<RemoteProject<'a, S>> {
        let raw = ProjectMetadata::load(self.service, &self.name).await?;
        let fullname = format!("{}:{}", self.name, name);
        let modified = rewrite_for_subproject(&raw, &self.name, &fullname, title, description)?;
        ProjectMetadata::save(self.service, &fullname, &modified).await?;
        info!("created project {}", fullname);

        let metadata = ProjectMetadata::parse(&fullname, &modified)?;
        Ok(RemoteProject::new(self.service, fullname).with_metadata(metadata))
    }

    /// Projects this one links to, never including this project itself.
    pub async fn linked_projects(&self, recursive: bool) -> Result<Vec<RemoteProject<'a, S>>> {
        self.loaded_metadata()?
            .linked_projects_of(&self.name, self.service, recursive)
            .await
    }

    /// Packages of this project, optionally with the ones it inherits.
    ///
    /// Inherited packages come from the recursive link closure. A package is
    /// only inherited when neither its name nor its release name is already
    /// taken, so own packages and packages of earlier links win. Patchinfos
    /// and kernel live patches are never inherited. The order of the result
    /// is not meaningful.
    #[tracing::instrument(skip(self), fields(project = %self.name))]
    pub async fn get_packages(&self, inherited: bool) -> Result<Vec<RemotePackage>> {
        let own = self.own_packages().await?;
        if !inherited {
            return Ok(own);
        }

        let linked = self.linked_projects(true).await?;

        let mut merge = InheritedMerge::new(own);
        for project in &linked {
            for package in project.own_packages().await? {
                merge.offer(package);
            }
        }
        Ok(merge.into_packages())
    }

    async fn own_packages(&self) -> Result<Vec<RemotePackage>> {
        let names = self.service.list_packages(&self.name).await?;
        debug!("{} owns {} package(s)", self.name, names.len());
        Ok(names
            .into_iter()
            .map(|name| RemotePackage::new(name, self.name.as_str()))
            .collect())
    }
}

/// Packages that are generated by maintenance automation and must never
/// leak into a project through a link.
fn never_inherited(name: &str) -> bool {
    let patchinfo = name
        .strip_prefix("patchinfo.")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
    patchinfo || name.starts_with("kernel-livepatch-")
}

/// Keyed package set where the first writer wins.
///
/// Own packages are keyed by name; inherited ones by release name, so every
/// later alias of an inherited package is rejected as well.
struct InheritedMerge {
    packages: IndexMap<String, RemotePackage>,
}

impl InheritedMerge {
    fn new(own: Vec<RemotePackage>) -> Self {
        let mut packages = IndexMap::with_capacity(own.len());
        for package in own {
            packages.entry(package.name.clone()).or_insert(package);
        }
        Self { packages }
    }

    /// Add an inherited package unless it is shadowed or excluded.
    fn offer(&mut self, package: RemotePackage) -> bool {
        if self.packages.contains_key(&package.name) {
            return false;
        }
        if never_inherited(&package.name) {
            debug!("not inheriting {}", package);
            return false;
        }
        if self.packages.contains_key(package.release_name()) {
            debug!("{} is an alias of an already present package", package);
            return false;
        }

        self.packages
            .insert(package.release_name().to_string(), package);
        true
    }

    fn into_packages(self) -> Vec<RemotePackage> {
        self.packages.into_values().collect()
    }
}
