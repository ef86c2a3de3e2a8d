//! `shipwright run`.

use anyhow::{Context, Result};
use shipwright_core::CancellationToken;
use shipwright_executor::{BuildDriver, BuildOptions};
use std::path::Path;
use tracing::info;

use super::{Options, Session};

pub async fn run(
    opts: &Options,
    path: &Path,
    target: &str,
    no_output: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let session = Session::new(opts);
    let project = session
        .load(path, cancel)
        .await
        .with_context(|| format!("target {}", target))?;
    let (stores, _) = session.secret_stores(&project).await;

    let mut build = BuildOptions {
        no_output,
        ..Default::default()
    };
    if let Some(dir) = &opts.workdir {
        build = build.with_artifact_dir(dir);
    }

    info!(project = %project.name, target = %target, "Running target");
    session
        .driver(stores)
        .run_target(&project, target, &build, cancel)
        .await
        .map_err(shipwright_core::Error::from)
        .with_context(|| format!("{}+{}", project.name, target))?;
    println!("{}+{}: succeeded", project.name, target);
    Ok(())
}
