use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use rusqlite::types::Value;

use crate::error::{EtlError, Result};
use crate::schema::{ColumnKind, staging_column_kind};
use crate::staging::StagingBatch;

/// Maps a raw football-data header onto its staging column name
/// (`B365>2.5` becomes `B365_2_5O`, `Avg<2.5` becomes `Avg_2_5U`).
pub fn normalize_header(raw: &str) -> String {
    raw.replace(">2.5", "_2_5O")
        .replace("<2.5", "_2_5U")
        .replace('>', "_2_5O")
        .replace('<', "_2_5U")
        .replace('.', "_")
        .trim()
        .to_string()
}

pub fn read_staging_csv_path(path: &Path) -> Result<StagingBatch> {
    let file = std::fs::File::open(path)?;
    read_staging_csv(file)
}

/// Reads a Latin-1 encoded CSV, keeps only recognised staging columns and
/// converts cells to typed staging values.
pub fn read_staging_csv<R: Read>(reader: R) -> Result<StagingBatch> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.byte_headers()?.clone();
    let mut keep: Vec<(usize, String, ColumnKind)> = Vec::new();
    for (idx, raw) in headers.iter().enumerate() {
        let name = normalize_header(&decode_latin1(raw));
        if keep.iter().any(|(_, existing, _)| *existing == name) {
            continue;
        }
        if let Some(kind) = staging_column_kind(&name) {
            keep.push((idx, name, kind));
        }
    }

    let mut batch = StagingBatch::new(keep.iter().map(|(_, name, _)| name.clone()).collect());
    for record in rdr.byte_records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        if record.iter().all(|cell| cell.iter().all(u8::is_ascii_whitespace)) {
            continue;
        }
        let mut row = Vec::with_capacity(keep.len());
        for (idx, name, kind) in &keep {
            let cell = record.get(*idx).map(decode_latin1).unwrap_or_default();
            let value = convert_cell(cell.trim(), *kind).map_err(|message| EtlError::InvalidCsv {
                line,
                message: format!("column {name}: {message}"),
            })?;
            row.push(value);
        }
        batch.push_row(row);
    }
    Ok(batch)
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn convert_cell(cell: &str, kind: ColumnKind) -> std::result::Result<Value, String> {
    if cell.is_empty() {
        return Ok(Value::Null);
    }
    match kind {
        ColumnKind::Text => Ok(Value::Text(cell.to_string())),
        ColumnKind::Date => parse_match_date(cell)
            .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
            .ok_or_else(|| format!("unparseable date '{cell}'")),
        ColumnKind::Time => Ok(parse_kickoff_time(cell)
            .map(|t| Value::Text(t.format("%H:%M").to_string()))
            .unwrap_or(Value::Null)),
        ColumnKind::Integer => parse_integer(cell)
            .map(Value::Integer)
            .ok_or_else(|| format!("expected integer, got '{cell}'")),
        ColumnKind::Real => cell
            .parse::<f64>()
            .map(Value::Real)
            .map_err(|_| format!("expected number, got '{cell}'")),
    }
}

/// Day-first dates as published (`31/08/19`, `31/08/2019`), or ISO.
pub fn parse_match_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    let year_part = raw.rsplit('/').next()?;
    let fmt = if year_part.len() == 2 {
        "%d/%m/%y"
    } else {
        "%d/%m/%Y"
    };
    NaiveDate::parse_from_str(raw, fmt).ok()
}

pub fn parse_kickoff_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

fn parse_integer(raw: &str) -> Option<i64> {
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    let f = raw.parse::<f64>().ok()?;
    (f.fract() == 0.0).then_some(f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_renamed() {
        assert_eq!(normalize_header("B365>2.5"), "B365_2_5O");
        assert_eq!(normalize_header("P<2.5"), "P_2_5U");
        assert_eq!(normalize_header(" HomeTeam "), "HomeTeam");
    }

    #[test]
    fn dates_parse_day_first() {
        let expected = NaiveDate::from_ymd_opt(2019, 8, 9);
        assert_eq!(parse_match_date("09/08/2019"), expected);
        assert_eq!(parse_match_date("09/08/19"), expected);
        assert_eq!(parse_match_date("2019-08-09"), expected);
        assert_eq!(parse_match_date("Aug 9"), None);
    }

    #[test]
    fn bad_time_coerces_to_null() {
        assert_eq!(convert_cell("late", ColumnKind::Time), Ok(Value::Null));
        assert_eq!(
            convert_cell("20:00", ColumnKind::Time),
            Ok(Value::Text("20:00".to_string()))
        );
    }

    #[test]
    fn integer_cells_accept_float_notation() {
        assert_eq!(parse_integer("3"), Some(3));
        assert_eq!(parse_integer("3.0"), Some(3));
        assert_eq!(parse_integer("3.5"), None);
    }

    #[test]
    fn latin1_bytes_decode() {
        assert_eq!(decode_latin1(&[0x4d, 0xfc, 0x6e]), "M\u{fc}n");
    }
}
