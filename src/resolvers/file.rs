// src/resolvers/file.rs

use async_trait::async_trait;
use std::io::ErrorKind;

use crate::config::FileSnapshotConfig;
use crate::errors::{GradeError, Result};
use crate::resolvers::SnapshotResolver;
use crate::snapshot::WorkbookSnapshot;

/// Serves snapshots saved as `<dir>/<spreadsheet_id>.json`.
///
/// Useful for grading exported workbooks offline and for fixtures.
pub struct FileResolver {
    config: FileSnapshotConfig,
}

impl FileResolver {
    pub fn new(config: FileSnapshotConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SnapshotResolver for FileResolver {
    fn name(&self) -> &str {
        "file"
    }

    async fn resolve(&self, spreadsheet_id: &str) -> Result<WorkbookSnapshot> {
        let path = self.config.dir.join(format!("{}.json", spreadsheet_id));
        log::debug!("Reading snapshot {}", path.display());

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(GradeError::InvalidSpreadsheetReference(spreadsheet_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_str(&contents)?)
    }
}
