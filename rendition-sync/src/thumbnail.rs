//! Thumbnail post-processor.
//!
//! Each freshly produced primary rendition is read back from the store with
//! a bounded read, handed to the [`Thumbnailer`], and the result replaces
//! the thumbnail (delete, then put). Files are independent, so the work runs
//! on a bounded rayon pool; a failing file never aborts the batch.

use std::io::Read;

use rayon::prelude::*;
use serde::Serialize;

use rendition_core::ProjectId;
use rendition_renderer::RenditionLayout;

use crate::error::ReconcileError;
use crate::remote::{RenditionStore, Thumbnailer};
use crate::runlog::RunLog;

/// Counts for one thumbnail batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ThumbnailReport {
    pub candidates: usize,
    pub created: usize,
    pub failed: usize,
}

struct Created {
    primary: String,
    /// `(read, declared)` when the stream ended early.
    short_read: Option<(u64, u64)>,
}

/// Settings for one post-processing batch.
pub struct ThumbnailJob<'a> {
    pub project: &'a ProjectId,
    pub layout: &'a RenditionLayout,
    pub store: &'a dyn RenditionStore,
    pub thumbnailer: &'a dyn Thumbnailer,
    pub max_size: u32,
    pub workers: usize,
}

impl ThumbnailJob<'_> {
    /// Produce thumbnails for `primaries`. Log lines are appended in input
    /// order.
    pub fn run(&self, primaries: &[String], log: &mut RunLog) -> ThumbnailReport {
        let mut report = ThumbnailReport {
            candidates: primaries.len(),
            ..ThumbnailReport::default()
        };
        if primaries.is_empty() {
            return report;
        }

        let results: Vec<Result<Created, ReconcileError>> =
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers.max(1))
                .build()
            {
                Ok(pool) => pool.install(|| primaries.par_iter().map(|p| self.process(p)).collect()),
                Err(err) => {
                    tracing::warn!("thumbnail pool unavailable ({err}); running inline");
                    primaries.iter().map(|p| self.process(p)).collect()
                }
            };

        for result in results {
            match result {
                Ok(created) => {
                    if let Some((read, declared)) = created.short_read {
                        log.warning(format!(
                            "short read for {}: {read} of {declared} bytes",
                            created.primary
                        ));
                    }
                    report.created += 1;
                }
                Err(err) => {
                    log.error(err.to_string());
                    report.failed += 1;
                }
            }
        }

        log.success(format!(
            "created {} of {} thumbnail(s)",
            report.created, report.candidates
        ));
        report
    }

    fn process(&self, primary: &str) -> Result<Created, ReconcileError> {
        let fail = |reason: String| ReconcileError::Thumbnail {
            path: primary.to_string(),
            reason,
        };

        let handle = self
            .store
            .open(self.project, primary)
            .map_err(|e| fail(e.to_string()))?;
        let declared = handle.declared_len;
        let bytes = read_bounded(handle.reader, declared).map_err(|e| fail(e.to_string()))?;
        let read = bytes.len() as u64;

        let thumbnail = self
            .thumbnailer
            .thumbnail(&bytes, self.max_size)
            .map_err(|e| fail(e.to_string()))?;
        let target = self
            .layout
            .thumbnail_path(primary)
            .map_err(|e| fail(e.to_string()))?;

        self.store
            .delete(self.project, &target)
            .map_err(|e| fail(format!("clearing {target}: {e}")))?;
        self.store
            .put(self.project, &target, &thumbnail)
            .map_err(|e| fail(format!("writing {target}: {e}")))?;
        tracing::debug!("thumbnail {target} ({} bytes)", thumbnail.len());

        Ok(Created {
            primary: primary.to_string(),
            short_read: (read < declared).then_some((read, declared)),
        })
    }
}

/// Read until `declared` bytes or EOF, whichever comes first.
pub fn read_bounded(reader: impl Read, declared: u64) -> std::io::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(declared.min(1 << 20) as usize);
    reader.take(declared).read_to_end(&mut bytes)?;
    Ok(bytes)
}
