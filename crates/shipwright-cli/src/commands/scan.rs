//! `shipwright scan`.

use anyhow::{Context, Result};
use shipwright_core::CancellationToken;
use shipwright_project::{ProjectError, scan_projects};
use std::path::Path;

use super::{Options, Session};

pub async fn scan(
    opts: &Options,
    root: &Path,
    blueprint: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let projects = scan_projects(root)
        .await
        .map_err(shipwright_core::Error::from)?;

    if !blueprint {
        for project in &projects {
            println!("{}", project.rel_path);
        }
        return Ok(());
    }

    let session = Session::new(opts);
    for found in &projects {
        match session.loader().load(&found.path, cancel).await {
            Ok(project) => println!("{}: {}", found.rel_path, project.name),
            // A root blueprint holding only `global`.
            Err(ProjectError::NoBlueprint(_)) => continue,
            Err(e) => {
                return Err(shipwright_core::Error::from(e))
                    .with_context(|| format!("failed to load project at {}", found.path.display()));
            }
        }
    }
    Ok(())
}
