// src/resolvers/mod.rs

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};

use crate::config::{AppConfig, ResolverConfig};
use crate::errors::Result;
use crate::snapshot::WorkbookSnapshot;

pub mod file;
pub mod google_sheets;

/// A source of spreadsheet snapshots.
///
/// Implementations fetch every sheet of a spreadsheet together with what was
/// typed into each cell. The grading engine never talks to a spreadsheet backend
/// directly; a resolver is built once and handed to whoever grades.
#[async_trait]
pub trait SnapshotResolver: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Fetches the workbook identified by `spreadsheet_id`.
    ///
    /// # Arguments
    /// * `spreadsheet_id` - A bare id as returned by [`extract_spreadsheet_id`].
    async fn resolve(&self, spreadsheet_id: &str) -> Result<WorkbookSnapshot>;
}

fn url_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/d/([A-Za-z0-9_-]+)").expect("valid regex"))
}

fn bare_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"))
}

/// Pulls the spreadsheet id out of a sheet URL, or accepts a bare id.
pub fn extract_spreadsheet_id(url_or_id: &str) -> Option<String> {
    let trimmed = url_or_id.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains("/d/") {
        return url_id_pattern()
            .captures(trimmed)
            .map(|caps| caps[1].to_string());
    }
    if bare_id_pattern().is_match(trimmed) {
        return Some(trimmed.to_string());
    }
    None
}

/// Builds the resolver selected by configuration, if any.
pub fn build_resolver(
    config: &AppConfig,
    client: &reqwest::Client,
) -> Option<Arc<dyn SnapshotResolver>> {
    match config.resolver.as_ref()? {
        ResolverConfig::GoogleSheets(google) => Some(Arc::new(
            google_sheets::GoogleSheetsResolver::new(client.clone(), google.clone()),
        )),
        ResolverConfig::File(file) => Some(Arc::new(file::FileResolver::new(file.clone()))),
    }
}
