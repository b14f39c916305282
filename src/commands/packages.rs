use anyhow::Result;
use log::debug;
use std::io::Write;

use crate::{obs::BuildService, project::RemoteProject};

/// Print the packages of `project` as `project/name` lines, or as JSON.
#[tracing::instrument(skip(service, out))]
pub async fn packages<S: BuildService>(
    service: &S,
    project: &str,
    inherited: bool,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let project = RemoteProject::find(service, project).await?;
    let packages = project.get_packages(inherited).await?;
    debug!("{} package(s) in {}", packages.len(), project.name());

    if json {
        serde_json::to_writer_pretty(&mut *out, &packages)?;
        writeln!(out)?;
    } else {
        for package in &packages {
            writeln!(out, "{}", package)?;
        }
    }
    Ok(())
}
