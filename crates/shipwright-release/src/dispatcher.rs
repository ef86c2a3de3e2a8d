//! Release dispatch: events, build, publish.

use shipwright_core::{CancellationToken, Error, RunId, ensure_active};
use shipwright_project::Project;
use tracing::{Instrument, error, info, info_span};

use crate::context::ReleaseContext;
use crate::error::{ReleaseError, ReleaseResult, ReleaseState};
use crate::events::EventEvaluator;
use crate::providers::resolve_provider;

/// Runs named releases of a project.
pub struct ReleaseDispatcher {
    ctx: ReleaseContext,
    events: EventEvaluator,
}

impl ReleaseDispatcher {
    pub fn new(ctx: ReleaseContext) -> Self {
        Self {
            ctx,
            events: EventEvaluator::new(),
        }
    }

    pub fn context(&self) -> &ReleaseContext {
        &self.ctx
    }

    /// Run one release. Returns [`ReleaseState::Skipped`] when no event
    /// fires and `force` is not set, without touching any external system.
    pub async fn release(
        &self,
        project: &Project,
        name: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> ReleaseResult<ReleaseState> {
        let run_id = RunId::new();
        let span = info_span!("release", run_id = %run_id, project = %project.name, release = %name);
        let result = self
            .run(project, name, force, cancel)
            .instrument(span.clone())
            .await
            .map_err(|e| ReleaseError::new(&project.name, name, e));

        let _entered = span.enter();
        match &result {
            Ok(state) => info!(state = %state, "Release finished"),
            Err(e) => error!(state = %e.state(), error = %e.source, "Release failed"),
        }
        result
    }

    async fn run(
        &self,
        project: &Project,
        name: &str,
        force: bool,
        cancel: &CancellationToken,
    ) -> shipwright_core::Result<ReleaseState> {
        let release = project
            .release(name)
            .ok_or_else(|| Error::Config(format!("unknown release: {}", name)))?;
        let provider = resolve_provider(name, release)?;
        let target = release.target.as_deref().unwrap_or(name);

        if force {
            info!("Release forced, skipping event checks");
        } else if !self.events.any_firing(project, &release.on) {
            info!("No release event is firing, skipping release");
            return Ok(ReleaseState::Skipped);
        }

        ensure_active(cancel)?;

        if let Some(opts) = provider.build_options(&self.ctx) {
            info!(target = %target, "Running release target");
            self.ctx
                .driver
                .run_target(project, target, &opts, cancel)
                .await?;
        }

        provider.publish(&self.ctx, project, target, cancel).await?;
        Ok(ReleaseState::Succeeded)
    }
}
