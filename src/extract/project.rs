//! Project-level extraction: fan files out to their extractor and merge.

use std::panic::{self, AssertUnwindSafe};

use rayon::prelude::*;

use crate::artifact::ExtractionResult;

use super::ExtractorRegistry;

/// A file handed to the driver. Reading it is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Identifier used in artifacts and errors, usually a relative path.
    pub id: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

/// Runs a registry over a set of files.
pub struct Project<'r> {
    registry: &'r ExtractorRegistry,
}

impl<'r> Project<'r> {
    pub fn new(registry: &'r ExtractorRegistry) -> Self {
        Self { registry }
    }

    /// Extract every file in parallel and merge into one result.
    ///
    /// Files no extractor handles are skipped and not counted as scanned. A
    /// panic inside an extractor becomes an extraction error for that file.
    /// The merged result is sorted and deduplicated, so the output does not
    /// depend on scheduling or on input order.
    pub fn extract_sources(&self, files: &[SourceFile]) -> ExtractionResult {
        let results: Vec<ExtractionResult> = files
            .par_iter()
            .filter_map(|file| self.extract_one(file))
            .collect();

        let mut merged = ExtractionResult::new();
        for result in results {
            merged.merge(result);
        }
        merged.finalize();

        tracing::debug!(
            "extracted {} artifacts from {} files ({} errors)",
            merged.artifacts.len(),
            merged.scanned,
            merged.errors.len()
        );
        merged
    }

    fn extract_one(&self, file: &SourceFile) -> Option<ExtractionResult> {
        let Some(extractor) = self.registry.for_file(&file.id) else {
            tracing::debug!("no extractor for {}, skipping", file.id);
            return None;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            extractor.extract(&file.content, &file.id)
        }));
        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("{} extractor panicked on {}", extractor.name(), file.id);
                let mut failed = ExtractionResult::new();
                failed.error(&file.id, None, format!("{} extractor failed", extractor.name()));
                failed.scanned = 1;
                failed
            }
        };

        for error in &result.errors {
            tracing::warn!("{}", error);
        }
        Some(result)
    }
}
