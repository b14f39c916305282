use anyhow::Result;
use log::info;
use std::io::Write;

use crate::{
    obs::{BuildService, ObsClient},
    project::RemoteProject,
    workflow::ProjectMetaBuilder,
};

/// Create `<parent>:<name>` from the parent's meta and print its full name.
#[tracing::instrument(skip(service, out))]
pub async fn subproject<S: BuildService>(
    service: &S,
    parent: &str,
    name: &str,
    title: Option<&str>,
    description: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    let parent = RemoteProject::new(service, parent);
    let child = parent.create_subproject(name, title, description).await?;
    writeln!(out, "{}", child.name())?;
    Ok(())
}

/// Create or overwrite a project from `meta`.
#[tracing::instrument(skip(service, meta), fields(project = %meta.name))]
pub async fn create_project<S: BuildService>(service: &S, meta: &ProjectMetaBuilder) -> Result<()> {
    meta.save(service).await?;
    info!("saved project {}", meta.name);
    Ok(())
}

#[tracing::instrument(skip(client))]
pub async fn delete_project(client: &ObsClient, name: &str) -> Result<()> {
    client.delete_project(name).await?;
    Ok(())
}
