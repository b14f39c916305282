use anyhow::Result;
use std::io::Write;

use crate::{obs::BuildService, project::RemoteProject};

/// Print the projects `project` links to, one per line.
#[tracing::instrument(skip(service, out))]
pub async fn links<S: BuildService>(
    service: &S,
    project: &str,
    recursive: bool,
    out: &mut impl Write,
) -> Result<()> {
    let root = RemoteProject::find(service, project).await?;
    for linked in root.linked_projects(recursive).await? {
        writeln!(out, "{}", linked.name())?;
    }
    Ok(())
}
