//! Rendition driver: turns an [`ActionPlan`] into remote operations.
//!
//! Phases run strictly in order: generate → move → remove. A generate
//! failure aborts the run as a hard failure; move and remove failures are
//! logged as warnings.

use std::path::{Path, PathBuf};

use rendition_core::{AssetRecord, Catalog, CatalogScope, ProjectId, RenditionConfig};
use rendition_renderer::{BatchContext, DocumentRenderer, RenditionLayout};

use crate::error::ReconcileError;
use crate::plan::ActionPlan;
use crate::remote::{Collaborators, RasterizeOutput, RasterizeRequest, RenderedBinary};
use crate::runlog::RunLog;

/// File name of the staged aggregation document.
pub const STAGED_DOCUMENT: &str = "batch.xml";

/// What the driver did for one plan.
#[derive(Debug, Default)]
pub struct DriverOutcome {
    pub log: RunLog,
    /// Set when the generate phase failed; later phases did not run.
    pub hard_failure: bool,
    /// Primary rendition paths produced by the generate phase.
    pub generated: Vec<String>,
}

/// Executes one plan for one (project, asset-class).
pub struct RenditionDriver<'a> {
    pub project: &'a ProjectId,
    pub scope: &'a CatalogScope,
    pub layout: &'a RenditionLayout,
    pub renderer: &'a DocumentRenderer,
    pub config: &'a RenditionConfig,
    pub collaborators: &'a Collaborators,
}

impl RenditionDriver<'_> {
    /// Run all three phases. `current` supplies the records of the sources
    /// being generated.
    pub fn apply(&self, plan: &ActionPlan, current: &Catalog) -> DriverOutcome {
        let mut outcome = DriverOutcome::default();

        if !plan.to_generate.is_empty() {
            let result = if self.layout.class().uses_rasterizer() {
                self.rasterize(plan, current, &mut outcome.log)
            } else {
                self.convert_images(plan, &mut outcome.log)
            };
            match result {
                Ok(generated) => outcome.generated = generated,
                Err(err) => {
                    outcome.log.record(&err);
                    outcome.hard_failure = err.blocks_commit();
                    return outcome;
                }
            }
        }

        if !plan.to_move.is_empty() {
            self.move_renditions(plan, &mut outcome.log);
        }
        if !plan.to_remove.is_empty() {
            self.remove_renditions(plan, &mut outcome.log);
        }
        outcome
    }

    // -----------------------------------------------------------------------
    // Generate
    // -----------------------------------------------------------------------

    fn convert_images(&self, plan: &ActionPlan, log: &mut RunLog) -> Result<Vec<String>, ReconcileError> {
        let paths: Vec<String> = plan.to_generate.iter().cloned().collect();
        let created = self
            .collaborators
            .converter
            .convert_images(self.project, self.scope, &paths)
            .map_err(|e| self.batch_err(e.to_string()))?;

        log.success(format!(
            "created {created} of {} image rendition(s) for {}",
            paths.len(),
            self.project
        ));
        let primaries = paths.iter().map(|p| self.layout.primary_path(p));
        if created >= paths.len() {
            return Ok(primaries.collect());
        }
        log.warning(format!(
            "{} image rendition(s) were not created and will be retried",
            paths.len() - created
        ));
        // The converter only reports a count; keep the primaries that exist.
        Ok(primaries.filter(|primary| self.primary_exists(primary)).collect())
    }

    fn primary_exists(&self, primary: &str) -> bool {
        match self.collaborators.store.open(self.project, primary) {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!("{primary} not produced: {err}");
                false
            }
        }
    }

    fn rasterize(
        &self,
        plan: &ActionPlan,
        current: &Catalog,
        log: &mut RunLog,
    ) -> Result<Vec<String>, ReconcileError> {
        let class = self.layout.class();
        let language = self.config.language.as_deref();
        let records: Vec<&AssetRecord> = plan
            .to_generate
            .iter()
            .filter_map(|path| current.get(path))
            .collect();

        let ctx = BatchContext::new(self.project, self.layout, language, &records);
        let document = self.renderer.render_batch(&ctx)?;

        let staged = self.staged_document_path();
        self.stage(&staged, &document)?;
        let response = self.collaborators.rasterizer.rasterize(&RasterizeRequest {
            project: self.project,
            class,
            document: &document,
            staged_at: &staged,
        });
        let binaries = match response {
            Ok(RasterizeOutput::Binaries(binaries)) => Ok(binaries),
            Ok(RasterizeOutput::Mailbox(dir)) => Ok(self.collect_mailbox(&dir, &records, log)),
            Err(err) => Err(self.batch_err(err.to_string())),
        };
        if let Err(err) = std::fs::remove_file(&staged) {
            tracing::debug!("could not remove staged {}: {err}", staged.display());
        }
        let binaries = binaries?;

        let mut generated = Vec::new();
        for record in &records {
            let Some(binary) = primary_binary(&binaries, &record.path, language) else {
                log.warning(format!(
                    "rasterizer produced no rendition for {}; will retry",
                    record.path
                ));
                continue;
            };
            let primary = self.layout.primary_path(&record.path);
            self.collaborators
                .store
                .put(self.project, &primary, &binary.bytes)
                .map_err(|e| self.batch_err(format!("storing {primary}: {e}")))?;
            generated.push(primary);
        }

        log.success(format!(
            "rasterized {} of {} {class} source(s) for {}",
            generated.len(),
            records.len(),
            self.project
        ));
        Ok(generated)
    }

    /// `<staging_dir>/<project>/<class>/batch.xml`
    fn staged_document_path(&self) -> PathBuf {
        self.config
            .staging_dir
            .join(&self.project.0)
            .join(self.layout.class().as_str())
            .join(STAGED_DOCUMENT)
    }

    fn stage(&self, path: &Path, document: &str) -> Result<(), ReconcileError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| self.batch_err(format!("staging {}: {e}", dir.display())))?;
        }
        std::fs::write(path, document)
            .map_err(|e| self.batch_err(format!("staging {}: {e}", path.display())))
    }

    /// Pick up primaries dropped under their deterministic mailbox names.
    fn collect_mailbox(
        &self,
        dir: &Path,
        records: &[&AssetRecord],
        log: &mut RunLog,
    ) -> Vec<RenderedBinary> {
        let language = self.config.language.as_deref();
        let mut binaries = Vec::new();
        for record in records {
            let file = dir.join(self.layout.mailbox_name(&record.path, None, language));
            match std::fs::read(&file) {
                Ok(bytes) => {
                    if let Err(err) = std::fs::remove_file(&file) {
                        tracing::debug!("could not clear mailbox {}: {err}", file.display());
                    }
                    binaries.push(RenderedBinary {
                        source_path: record.path.clone(),
                        sub_id: None,
                        language: language.map(str::to_string),
                        bytes,
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => log.warning(format!("reading {}: {err}", file.display())),
            }
        }
        binaries
    }

    fn batch_err(&self, reason: String) -> ReconcileError {
        ReconcileError::ConversionBatch {
            class: self.layout.class(),
            reason,
        }
    }

    // -----------------------------------------------------------------------
    // Move / remove
    // -----------------------------------------------------------------------

    fn move_renditions(&self, plan: &ActionPlan, log: &mut RunLog) {
        let mut pairs = Vec::new();
        for (old, new) in &plan.to_move {
            // Regenerated in this run; moving would clobber the fresh file.
            if plan.to_generate.contains(new) {
                log.warning(format!(
                    "no reusable rendition for renamed source {old}; regenerated for {new}"
                ));
            } else {
                pairs.push((old.clone(), new.clone()));
            }
        }
        if pairs.is_empty() {
            return;
        }

        let class = self.layout.class();
        match self
            .collaborators
            .store
            .move_renditions(self.project, class, &pairs)
        {
            Ok(moved) => {
                log.success(format!("moved {moved} rendition(s) for {} renamed source(s)", pairs.len()));
                if moved < pairs.len() {
                    log.warning(format!(
                        "{} renamed source(s) had no rendition to move",
                        pairs.len() - moved
                    ));
                }
            }
            Err(err) => log.record(&ReconcileError::MoveOrRemove {
                operation: "move renditions",
                reason: err.to_string(),
            }),
        }
    }

    fn remove_renditions(&self, plan: &ActionPlan, log: &mut RunLog) {
        let paths: Vec<String> = plan.to_remove.iter().cloned().collect();
        let class = self.layout.class();
        match self
            .collaborators
            .store
            .remove_renditions(self.project, class, &paths)
        {
            Ok(removed) => log.success(format!(
                "removed {removed} rendition(s) for {} path(s)",
                paths.len()
            )),
            Err(err) => log.record(&ReconcileError::MoveOrRemove {
                operation: "remove renditions",
                reason: err.to_string(),
            }),
        }
    }
}

/// The primary (no sub-identifier) binary for `source`, preferring the
/// configured language over a language-neutral one.
fn primary_binary<'b>(
    binaries: &'b [RenderedBinary],
    source: &str,
    language: Option<&str>,
) -> Option<&'b RenderedBinary> {
    let mut fallback = None;
    for binary in binaries
        .iter()
        .filter(|b| b.source_path == source && b.sub_id.is_none())
    {
        if binary.language.as_deref() == language {
            return Some(binary);
        }
        if binary.language.is_none() && fallback.is_none() {
            fallback = Some(binary);
        }
    }
    fallback
}
