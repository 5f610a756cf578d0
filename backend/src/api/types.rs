//! REST API response types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::BulkEditConfig;
use crate::parser::TabularDocument;
use crate::reconcile::BatchReport;
use crate::report::ChangeReport;

/// Response to a preview or import upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready" (no rejected rows) or "warning"
    pub status: String,

    /// Structured change report
    pub report: ChangeReport,

    /// The same report as text
    pub text: String,

    pub document: DocumentInfo,
}

/// What was read from the upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub file_name: Option<String>,
    pub encoding: String,
    pub columns: Vec<String>,
    pub row_count: usize,
}

impl BatchResponse {
    pub fn new(
        file_name: Option<String>,
        document: &TabularDocument,
        batch: &BatchReport,
        config: &BulkEditConfig,
    ) -> Self {
        let report = ChangeReport::from_batch(batch, config);
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: if batch.has_failures() { "warning" } else { "ready" }.to_string(),
            text: report.render_text(),
            report,
            document: DocumentInfo {
                file_name,
                encoding: document.encoding.clone(),
                columns: document.headers.clone(),
                row_count: document.lines.len() + document.rejected.len(),
            },
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "report": null,
    })
}

/// Error response for a batch stopped on a row failure.
pub fn aborted_response(row: u64, sheet: Option<&str>, message: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "aborted",
        "error": message,
        "failure": { "row": row, "sheet": sheet, "message": message },
        "report": null,
    })
}
