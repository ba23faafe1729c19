//! # Device Table Export
//!
//! Read-only reporting over the registry: structured records for operator
//! tooling and flat delimited text for spreadsheet import.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use biolink_core::{ConnectionType, DeviceRecord, DeviceStatus};

/// One device flattened for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceExportRow {
    pub id: String,
    pub serial: String,
    pub name: String,
    pub model: String,
    pub firmware_version: String,
    pub connection_type: ConnectionType,
    pub status: DeviceStatus,
    pub signal_quality: u8,
    pub battery_percent: Option<u8>,
    pub measurement_count: u64,
    pub error_count: u64,
    pub last_seen: DateTime<Utc>,
    pub last_measurement: Option<DateTime<Utc>>,
}

impl From<&DeviceRecord> for DeviceExportRow {
    fn from(record: &DeviceRecord) -> Self {
        DeviceExportRow {
            id: record.id.clone(),
            serial: record.serial.clone(),
            name: record.name.clone(),
            model: record.model.clone(),
            firmware_version: record.firmware_version.clone(),
            connection_type: record.connection_type,
            status: record.status,
            signal_quality: record.signal_quality,
            battery_percent: record.battery_percent,
            measurement_count: record.measurement_count,
            error_count: record.error_count,
            last_seen: record.last_seen,
            last_measurement: record.last_measurement,
        }
    }
}

/// Builds structured export rows for a set of records.
pub fn device_export_rows(records: &[DeviceRecord]) -> Vec<DeviceExportRow> {
    records.iter().map(DeviceExportRow::from).collect()
}

/// Renders records as delimited text with a header row, quoting fields that
/// contain the delimiter.
pub fn devices_to_delimited(records: &[DeviceRecord], delimiter: char) -> String {
    let header = [
        "id",
        "serial",
        "name",
        "model",
        "firmware_version",
        "connection_type",
        "status",
        "signal_quality",
        "battery_percent",
        "measurement_count",
        "error_count",
        "last_seen",
        "last_measurement",
    ];

    let mut out = String::new();
    out.push_str(&header.join(&delimiter.to_string()));
    out.push('\n');

    for record in records {
        let fields: Vec<String> = vec![
            record.id.clone(),
            record.serial.clone(),
            record.name.clone(),
            record.model.clone(),
            record.firmware_version.clone(),
            record.connection_type.to_string(),
            record.status.to_string(),
            record.signal_quality.to_string(),
            record
                .battery_percent
                .map(|b| b.to_string())
                .unwrap_or_default(),
            record.measurement_count.to_string(),
            record.error_count.to_string(),
            record.last_seen.to_rfc3339(),
            record
                .last_measurement
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
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

    fn record(id: &str, name: &str) -> DeviceRecord {
        let mut record = DeviceRecord::placeholder(id, Utc::now());
        record.name = name.to_string();
        record.status = DeviceStatus::Online;
        record
    }

    #[test]
    fn test_export_rows() {
        let records = vec![record("a", "Analyzer A"), record("b", "Analyzer B")];
        let rows = device_export_rows(&records);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "a");
        assert_eq!(rows[0].status, DeviceStatus::Online);
    }

    #[test]
    fn test_delimited_output() {
        let records = vec![record("a", "Ward 3, bed 2")];
        let text = devices_to_delimited(&records, ',');
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("id,serial,name"));
        // Name containing the delimiter gets quoted
        assert!(lines[1].contains("\"Ward 3, bed 2\""));
    }
}
