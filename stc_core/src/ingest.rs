//! Probe log ingestion: raw CSV cells in, cleaned chronological readings out.
//!
//! Cells are mapped through an explicit column table; each column names the
//! field it fills and the converter that validates it. A row that fails any
//! converter is skipped and counted.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::config::IngestCfg;
use crate::error::{Result, StcError};
use crate::types::LogEntry;

/// Excel serial day of 1970-01-01.
pub const EXCEL_UNIX_EPOCH_DAYS: i64 = 25_569;
/// Serials are compared at 4 decimals; keys are `round(serial * 10^4)`.
const SERIAL_SCALE: f64 = 10_000.0;
/// 86 400 000 ms per day spread over 10^4 key steps.
const MS_PER_KEY_STEP: i64 = 8_640;

#[derive(Debug, Clone, PartialEq)]
pub struct CleanedLog {
    pub entries: Vec<LogEntry>,
    pub skipped_rows: usize,
    pub duplicate_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Label,
    Serial,
    Temp,
}

#[derive(Debug, Clone, Copy)]
enum Converter {
    NonEmptyText,
    Number,
}

struct ColumnSpec {
    column: usize,
    field: Field,
    converter: Converter,
}

const COLUMNS: [ColumnSpec; 3] = [
    ColumnSpec {
        column: 0,
        field: Field::Label,
        converter: Converter::NonEmptyText,
    },
    ColumnSpec {
        column: 1,
        field: Field::Serial,
        converter: Converter::Number,
    },
    ColumnSpec {
        column: 3,
        field: Field::Temp,
        converter: Converter::Number,
    },
];

enum Value {
    Text,
    Number(f64),
}

fn convert(converter: Converter, raw: &str) -> Option<Value> {
    let raw = raw.trim();
    match converter {
        Converter::NonEmptyText => (!raw.is_empty()).then_some(Value::Text),
        Converter::Number => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Value::Number),
    }
}

/// A row that passed every converter.
struct RawReading {
    serial_key: i64,
    temp: f64,
}

fn parse_row<S: AsRef<str>>(cells: &[S]) -> Option<RawReading> {
    let mut serial = None;
    let mut temp = None;
    for spec in &COLUMNS {
        let cell = cells.get(spec.column)?;
        match (spec.field, convert(spec.converter, cell.as_ref())?) {
            (Field::Label, _) => {}
            (Field::Serial, Value::Number(v)) => serial = Some(v),
            (Field::Temp, Value::Number(v)) => temp = Some(v),
            (_, Value::Text) => return None,
        }
    }
    let key = (serial? * SERIAL_SCALE).round();
    // keeps the key and the derived millisecond timestamp inside i64
    if !(0.0..1e12).contains(&key) {
        return None;
    }
    Some(RawReading {
        serial_key: key as i64,
        temp: temp?,
    })
}

/// Absolute UTC time of a 4-decimal Excel serial key.
fn serial_key_to_time(key: i64) -> Option<DateTime<Utc>> {
    let ms = key
        .checked_sub(EXCEL_UNIX_EPOCH_DAYS * 10_000)?
        .checked_mul(MS_PER_KEY_STEP)?;
    DateTime::from_timestamp_millis(ms)
}

/// Clean a raw probe export.
///
/// Skips the fixed header rows, drops rows failing the column table,
/// de-duplicates on the 4-decimal serial (first occurrence wins), clamps
/// temperatures, sorts by time and keeps at most `max_logs` readings.
pub fn ingest<R, S>(rows: &[R], cfg: &IngestCfg) -> Result<CleanedLog>
where
    R: AsRef<[S]>,
    S: AsRef<str>,
{
    let mut skipped_rows = 0usize;
    let mut duplicate_rows = 0usize;
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for row in rows.iter().skip(cfg.skip_rows) {
        let Some(reading) = parse_row(row.as_ref()) else {
            skipped_rows += 1;
            continue;
        };
        let Some(taken_at) = serial_key_to_time(reading.serial_key) else {
            skipped_rows += 1;
            continue;
        };
        if !seen.insert(reading.serial_key) {
            duplicate_rows += 1;
            continue;
        }
        entries.push(LogEntry {
            taken_at,
            temp: reading.temp.clamp(cfg.min_temp_c, cfg.max_temp_c),
        });
    }

    entries.sort_by_key(|e| e.taken_at);
    entries.truncate(cfg.max_logs);

    tracing::debug!(
        kept = entries.len(),
        skipped = skipped_rows,
        duplicates = duplicate_rows,
        "thermal log ingested"
    );

    if entries.len() < cfg.min_logs {
        return Err(StcError::InsufficientData {
            found: entries.len(),
            required: cfg.min_logs,
        });
    }

    Ok(CleanedLog {
        entries,
        skipped_rows,
        duplicate_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_epoch_maps_to_unix_epoch() {
        let t = serial_key_to_time(EXCEL_UNIX_EPOCH_DAYS * 10_000).unwrap();
        assert_eq!(t.timestamp_millis(), 0);
        // half a day later
        let t = serial_key_to_time(EXCEL_UNIX_EPOCH_DAYS * 10_000 + 5_000).unwrap();
        assert_eq!(t.timestamp(), 43_200);
    }

    #[test]
    fn row_needs_label_serial_and_temp() {
        assert!(parse_row(&["P1", "45000.5", "", "70.1"]).is_some());
        assert!(parse_row(&["", "45000.5", "", "70.1"]).is_none());
        assert!(parse_row(&["P1", "x", "", "70.1"]).is_none());
        assert!(parse_row(&["P1", "45000.5", ""]).is_none());
        assert!(parse_row(&["P1", "45000.5", "", "NaN"]).is_none());
        assert!(parse_row(&["P1", "-3", "", "70"]).is_none());
    }
}
