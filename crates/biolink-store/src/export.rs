//! # Queue Export Surface
//!
//! Read-only reporting over the sync queue: structured records for operator
//! tooling and flat delimited text for spreadsheet import. No part of the
//! queue state machine lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use biolink_core::{SyncItem, SyncItemKind, SyncPriority, SyncStatus};

/// One queue item flattened for reporting. Payloads are summarized by size,
/// not included: exports travel to spreadsheets and dashboards, not back
/// into the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueExportRow {
    pub id: String,
    pub kind: SyncItemKind,
    pub status: SyncStatus,
    pub priority: SyncPriority,
    pub attempts: u32,
    pub device_id: Option<String>,
    pub user_id: Option<String>,
    pub payload_bytes: usize,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl From<&SyncItem> for QueueExportRow {
    fn from(item: &SyncItem) -> Self {
        QueueExportRow {
            id: item.id.clone(),
            kind: item.kind,
            status: item.status,
            priority: item.priority,
            attempts: item.attempts,
            device_id: item.device_id.clone(),
            user_id: item.user_id.clone(),
            payload_bytes: item.payload.to_string().len(),
            last_error: item.last_error.clone(),
            created_at: item.created_at,
            last_attempt_at: item.last_attempt_at,
        }
    }
}

/// Builds structured export rows for a set of items.
pub fn queue_export_rows(items: &[SyncItem]) -> Vec<QueueExportRow> {
    items.iter().map(QueueExportRow::from).collect()
}

/// Renders items as delimited text with a header row.
///
/// Fields containing the delimiter, quotes, or newlines are quoted
/// CSV-style so the output loads cleanly in spreadsheet tools.
pub fn queue_to_delimited(items: &[SyncItem], delimiter: char) -> String {
    let header = [
        "id",
        "kind",
        "status",
        "priority",
        "attempts",
        "device_id",
        "user_id",
        "payload_bytes",
        "last_error",
        "created_at",
        "last_attempt_at",
    ];

    let mut out = String::new();
    out.push_str(&header.join(&delimiter.to_string()));
    out.push('\n');

    for item in items {
        let row = QueueExportRow::from(item);
        let rank = format!("{}", row.priority.rank());
        let fields: Vec<String> = vec![
            row.id,
            row.kind.to_string(),
            row.status.to_string(),
            rank,
            row.attempts.to_string(),
            row.device_id.unwrap_or_default(),
            row.user_id.unwrap_or_default(),
            row.payload_bytes.to_string(),
            row.last_error.unwrap_or_default(),
            row.created_at.to_rfc3339(),
            row.last_attempt_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        ];

        let escaped: Vec<String> = fields
            .into_iter()
            .map(|f| escape_field(&f, delimiter))
            .collect();
        out.push_str(&escaped.join(&delimiter.to_string()));
        out.push('\n');
    }

    out
}

/// Quotes a field when it contains the delimiter, a quote, or a newline.
fn escape_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_export_row_from_item() {
        let item = SyncItem::new(SyncItemKind::Measurement, json!({"glucose": 5.4}))
            .with_device("dev-1")
            .with_priority(SyncPriority::High);

        let row = QueueExportRow::from(&item);
        assert_eq!(row.id, item.id);
        assert_eq!(row.kind, SyncItemKind::Measurement);
        assert_eq!(row.device_id.as_deref(), Some("dev-1"));
        assert!(row.payload_bytes > 0);
    }

    #[test]
    fn test_delimited_output_shape() {
        let items = vec![
            SyncItem::new(SyncItemKind::Measurement, json!({"v": 1})),
            SyncItem::new(SyncItemKind::Feedback, json!({"v": 2})),
        ];

        let text = queue_to_delimited(&items, ',');
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3); // header + 2 rows
        assert!(lines[0].starts_with("id,kind,status"));
        assert!(lines[1].contains("measurement"));
        assert!(lines[2].contains("feedback"));
    }

    #[test]
    fn test_field_escaping() {
        let mut item = SyncItem::new(SyncItemKind::Feedback, json!({}));
        item.last_error = Some("connect failed, retrying \"later\"".into());

        let text = queue_to_delimited(&[item], ',');
        assert!(text.contains("\"connect failed, retrying \"\"later\"\"\""));
    }
}
