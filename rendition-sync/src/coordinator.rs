//! Reconciliation coordinator.
//!
//! ## Run state machine
//!
//! ```text
//! Start → LoadBaseline → FetchCurrent → ComputeDelta ─┬─ NoChange ──┬─ PersistBaseline → Done
//!                                                     └─ ApplyPlan ─┘
//! ```
//!
//! Any step may fall into `Error`. The baseline is read once and written at
//! most once; it is never written after a hard failure, so a retried run
//! recomputes the same delta.

use serde::Serialize;

use rendition_core::{
    AssetClass, Catalog, CatalogScope, ProjectId, RenditionConfig, SnapshotKey,
};
use rendition_renderer::{DocumentRenderer, RenditionLayout};

use crate::delta::{compute_delta, AssetFilter, Delta};
use crate::driver::RenditionDriver;
use crate::error::ReconcileError;
use crate::plan::ActionPlan;
use crate::reader::{read_catalog, SiblingClasses};
use crate::remote::Collaborators;
use crate::runlog::RunLog;
use crate::thumbnail::{ThumbnailJob, ThumbnailReport};

/// One reconciliation invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    /// Required; `None` or blank fails the run.
    pub project_id: Option<String>,
    pub class: AssetClass,
    pub scope: CatalogScope,
}

impl ReconcileRequest {
    pub fn new(project_id: impl Into<String>, class: AssetClass) -> Self {
        Self {
            project_id: Some(project_id.into()),
            class,
            scope: CatalogScope::All,
        }
    }

    pub fn with_scope(mut self, scope: CatalogScope) -> Self {
        self.scope = scope;
        self
    }

    /// Validated snapshot key for this request.
    pub fn key(&self) -> Result<SnapshotKey, ReconcileError> {
        let raw = self
            .project_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ReconcileError::MissingProjectId)?;
        let project = ProjectId::parse(raw)
            .map_err(|_| ReconcileError::InvalidProjectId(raw.to_string()))?;
        Ok(SnapshotKey::new(project, self.class))
    }
}

/// Step of a run, recorded in [`RunDebug::state_trace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Start,
    LoadBaseline,
    FetchCurrent,
    ComputeDelta,
    NoChange,
    ApplyPlan,
    PersistBaseline,
    Done,
    Error,
}

/// Optional diagnostics, present only when `config.debug` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunDebug {
    pub state_trace: Vec<RunState>,
    pub baseline_present: bool,
    pub delta: Option<Delta>,
    pub plan: Option<ActionPlan>,
    pub thumbnails: Option<ThumbnailReport>,
}

/// Structured outcome handed back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    /// No hard failure in the catalog fetch or the generate phase.
    pub success: bool,
    pub success_log: Vec<String>,
    pub warning_log: Vec<String>,
    pub error_log: Vec<String>,
    /// The computed delta was non-empty.
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<RunDebug>,
}

/// Mutable bookkeeping for one run.
struct Run {
    log: RunLog,
    debug: RunDebug,
    changed: bool,
}

impl Run {
    fn enter(&mut self, state: RunState) {
        tracing::debug!("run state → {state:?}");
        self.debug.state_trace.push(state);
    }

    fn fail(&mut self, err: &ReconcileError) {
        self.log.error(err.to_string());
        self.enter(RunState::Error);
    }
}

/// Runs reconciliation for any (project, asset-class) key.
///
/// Holds no per-key state; callers must keep at most one run in flight per
/// key (see the worker crate's dispatcher).
pub struct Coordinator {
    config: RenditionConfig,
    collaborators: Collaborators,
    renderer: DocumentRenderer,
}

impl Coordinator {
    pub fn new(config: RenditionConfig, collaborators: Collaborators) -> Result<Self, ReconcileError> {
        let renderer = DocumentRenderer::new(config.template_dir.as_deref())?;
        Ok(Self {
            config,
            collaborators,
            renderer,
        })
    }

    pub fn config(&self) -> &RenditionConfig {
        &self.config
    }

    /// Execute one run. Failures are reported through the result, never
    /// returned as `Err`.
    pub fn run(&self, request: &ReconcileRequest) -> ReconciliationResult {
        let mut run = Run {
            log: RunLog::new(),
            debug: RunDebug::default(),
            changed: false,
        };
        let success = self.drive(request, &mut run);

        let RunLog {
            success: success_log,
            warning: warning_log,
            error: error_log,
        } = run.log;
        ReconciliationResult {
            success,
            success_log,
            warning_log,
            error_log,
            changed: run.changed,
            debug: self.config.debug.then_some(run.debug),
        }
    }

    fn drive(&self, request: &ReconcileRequest, run: &mut Run) -> bool {
        run.enter(RunState::Start);
        let key = match request.key() {
            Ok(key) => key,
            Err(err) => {
                run.fail(&err);
                return false;
            }
        };
        let prepared = RenditionLayout::new(&self.config, key.class)
            .map_err(ReconcileError::from)
            .and_then(|layout| {
                let filter = AssetFilter::new(&self.config.class(key.class).filter)?;
                let siblings = SiblingClasses::of(&self.config, key.class)?;
                Ok((layout, filter, siblings))
            });
        let (layout, filter, siblings) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                run.fail(&err);
                return false;
            }
        };

        run.enter(RunState::LoadBaseline);
        let baseline = match self.collaborators.snapshots.load(&key) {
            Ok(baseline) => baseline,
            Err(err) => {
                run.log
                    .warning(format!("baseline for {key} unusable, starting cold: {err}"));
                None
            }
        };
        run.debug.baseline_present = baseline.is_some();

        run.enter(RunState::FetchCurrent);
        let fetch = || {
            read_catalog(
                self.collaborators.catalog.as_ref(),
                &key.project,
                &request.scope,
                key.class,
                &filter,
                &layout,
                &siblings,
            )
        };
        let current = match fetch() {
            Ok(current) => current,
            Err(err) => {
                run.fail(&err);
                return false;
            }
        };

        run.enter(RunState::ComputeDelta);
        let delta = match compute_delta(&filter, baseline.as_ref(), &current, &layout) {
            Ok(delta) => delta,
            Err(err) => {
                run.fail(&err);
                return false;
            }
        };
        tracing::info!("{key}: {}", delta.summary());
        for (derived, sources) in &delta.collisions {
            let sources: Vec<&str> = sources.iter().map(String::as_str).collect();
            run.log.warning(format!(
                "{derived} is derived from several sources ({}); only one survives",
                sources.join(", ")
            ));
        }
        run.changed = !delta.is_empty();

        if delta.is_empty() {
            run.enter(RunState::NoChange);
            run.debug.delta = Some(delta);
            run.log.success(format!("{key}: no changes"));
            if baseline.is_some() {
                run.enter(RunState::Done);
                return true;
            }
            return self.persist(&key, &current, run);
        }

        run.enter(RunState::ApplyPlan);
        let plan = ActionPlan::from_delta(&delta);
        run.debug.delta = Some(delta);
        tracing::info!("{key}: {}", plan.summary());

        let driver = RenditionDriver {
            project: &key.project,
            scope: &request.scope,
            layout: &layout,
            renderer: &self.renderer,
            config: &self.config,
            collaborators: &self.collaborators,
        };
        let outcome = driver.apply(&plan, &current);
        run.debug.plan = Some(plan);
        run.log.extend(outcome.log);
        if outcome.hard_failure {
            run.enter(RunState::Error);
            return false;
        }

        if !outcome.generated.is_empty() {
            let job = ThumbnailJob {
                project: &key.project,
                layout: &layout,
                store: self.collaborators.store.as_ref(),
                thumbnailer: self.collaborators.thumbnailer.as_ref(),
                max_size: self.config.thumbnail_max_size,
                workers: self.config.thumbnail_workers(),
            };
            run.debug.thumbnails = Some(job.run(&outcome.generated, &mut run.log));
        }

        // Persist what the remote looks like after the mutations.
        let refreshed = match fetch() {
            Ok(refreshed) => refreshed,
            Err(err) => {
                run.fail(&err);
                return false;
            }
        };
        self.persist(&key, &refreshed, run)
    }

    fn persist(&self, key: &SnapshotKey, catalog: &Catalog, run: &mut Run) -> bool {
        run.enter(RunState::PersistBaseline);
        match self.collaborators.snapshots.save(catalog, key) {
            Ok(()) => {
                run.log
                    .success(format!("{key}: baseline saved ({} entries)", catalog.len()));
                run.enter(RunState::Done);
                true
            }
            Err(err) => {
                run.fail(&err);
                false
            }
        }
    }
}
