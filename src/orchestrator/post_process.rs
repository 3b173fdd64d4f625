//! Post-run processing: history auto-save and exports.

use crate::model::RunReport;
use crate::storage;
use std::path::{Path, PathBuf};

/// Result of post-run processing, ready for presentation layers.
pub struct ProcessedRun {
    pub export_messages: Vec<String>,
    pub auto_saved_path: Option<PathBuf>,
}

/// Save to history and export. Failures become messages; the run outcome
/// is already decided at this point.
pub fn process_run_completion(
    report: &RunReport,
    auto_save: bool,
    export_json: Option<&Path>,
) -> ProcessedRun {
    let auto_saved_path = if auto_save {
        match storage::save_run(report) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "failed to save run history");
                None
            }
        }
    } else {
        None
    };

    let mut export_messages = Vec::new();
    if let Some(path) = export_json {
        match storage::export_json(path, report) {
            Ok(()) => export_messages.push(format!("Exported JSON: {}", path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    ProcessedRun {
        export_messages,
        auto_saved_path,
    }
}
