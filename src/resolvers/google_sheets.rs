// src/resolvers/google_sheets.rs

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Instant;

use crate::config::GoogleSheetsConfig;
use crate::errors::{GradeError, Result};
use crate::resolvers::SnapshotResolver;
use crate::snapshot::{CellContent, CellRef, SheetSnapshot, WorkbookSnapshot};

/// Only the parts of the grid the grader reads.
const GRID_FIELDS: &str =
    "sheets(properties(title),data(startRow,startColumn,rowData(values(userEnteredValue))))";

/// Resolves snapshots through the Google Sheets v4 REST API.
pub struct GoogleSheetsResolver {
    client: Client,
    config: GoogleSheetsConfig,
}

#[derive(Deserialize)]
struct SpreadsheetResponse {
    #[serde(default)]
    sheets: Vec<SheetResponse>,
}

#[derive(Deserialize)]
struct SheetResponse {
    properties: SheetProperties,
    #[serde(default)]
    data: Vec<GridData>,
}

#[derive(Deserialize)]
struct SheetProperties {
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridData {
    #[serde(default)]
    start_row: u32,
    #[serde(default)]
    start_column: u32,
    #[serde(default)]
    row_data: Vec<RowData>,
}

#[derive(Deserialize)]
struct RowData {
    #[serde(default)]
    values: Vec<CellData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CellData {
    #[serde(default)]
    user_entered_value: Option<ExtendedValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtendedValue {
    formula_value: Option<String>,
    number_value: Option<f64>,
    string_value: Option<String>,
    bool_value: Option<bool>,
}

impl ExtendedValue {
    fn into_content(self) -> Option<CellContent> {
        if let Some(text) = self.formula_value {
            return Some(CellContent::Formula { text });
        }
        if let Some(value) = self.number_value {
            return Some(CellContent::Number { value });
        }
        if let Some(value) = self.string_value {
            return Some(CellContent::String { value });
        }
        // Sheets shows booleans as TRUE/FALSE; keep them comparable as text.
        self.bool_value.map(|b| CellContent::string(if b { "TRUE" } else { "FALSE" }))
    }
}

fn into_workbook(response: SpreadsheetResponse) -> WorkbookSnapshot {
    let mut workbook = WorkbookSnapshot::new();
    for sheet in response.sheets {
        let mut cells = SheetSnapshot::new();
        for grid in sheet.data {
            for (row_offset, row) in grid.row_data.into_iter().enumerate() {
                for (col_offset, cell) in row.values.into_iter().enumerate() {
                    let Some(content) = cell.user_entered_value.and_then(ExtendedValue::into_content)
                    else {
                        continue;
                    };
                    let cell_ref = CellRef::from_row_col(
                        grid.start_row + row_offset as u32,
                        grid.start_column + col_offset as u32,
                    );
                    cells.insert(cell_ref, content);
                }
            }
        }
        workbook.push_sheet(sheet.properties.title, cells);
    }
    workbook
}

impl GoogleSheetsResolver {
    /// Creates a new `GoogleSheetsResolver`.
    pub fn new(client: Client, config: GoogleSheetsConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl SnapshotResolver for GoogleSheetsResolver {
    fn name(&self) -> &str {
        "google-sheets"
    }

    /// Fetches grid data for every sheet, including formula text.
    async fn resolve(&self, spreadsheet_id: &str) -> Result<WorkbookSnapshot> {
        let url = format!(
            "{}/v4/spreadsheets/{}",
            self.config.api_base.trim_end_matches('/'),
            spreadsheet_id
        );

        log::info!("📡 Fetching spreadsheet {} from Google Sheets", spreadsheet_id);

        let mut request = self
            .client
            .get(&url)
            .query(&[("includeGridData", "true"), ("fields", GRID_FIELDS)]);

        request = match (&self.config.access_token, &self.config.api_key) {
            (Some(token), _) => request.bearer_auth(token),
            (None, Some(key)) => request.query(&[("key", key.as_str())]),
            (None, None) => return Err(GradeError::ResolverUnavailable),
        };

        let start = Instant::now();
        let resp = request.send().await?;
        let status = resp.status();
        let latency_ms = start.elapsed().as_millis() as u64;

        log::info!("📥 Google Sheets response status: {} ({}ms)", status, latency_ms);

        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error body".to_string());
            return Err(GradeError::ApiError {
                status: status.as_u16(),
                body: error_body,
            });
        }

        let body: serde_json::Value = resp.json().await?;
        let response: SpreadsheetResponse = serde_json::from_value(body.clone())
            .map_err(|_| GradeError::UnexpectedResponse(body.to_string()))?;

        Ok(into_workbook(response))
    }
}
