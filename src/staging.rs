use std::collections::BTreeSet;

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use tracing::info;

use crate::error::{EtlError, Result, StorageContext};
use crate::schema::{STAGING_TABLE, quote_ident};

/// A cleaned tabular batch: named columns and one value vector per record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagingBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl StagingBatch {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn staging_columns(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(&format!("SELECT name FROM pragma_table_info('{STAGING_TABLE}')"))
        .context("prepare staging columns query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query staging columns")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode staging column")?);
    }
    Ok(out)
}

pub fn staging_row_count(conn: &Connection) -> Result<i64> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {STAGING_TABLE}"), [], |row| {
        row.get(0)
    })
    .context("count staging rows")
}

/// Appends every row of `batch` to staging. Extra (unknown) columns reject the
/// whole batch before anything is written; missing columns are stored as NULL.
pub fn load_csv_to_staging(conn: &mut Connection, batch: &StagingBatch) -> Result<usize> {
    let known = staging_columns(conn)?.into_iter().collect::<BTreeSet<_>>();
    let unknown = batch
        .columns
        .iter()
        .filter(|col| !known.contains(col.as_str()))
        .cloned()
        .collect::<BTreeSet<_>>();
    if !unknown.is_empty() {
        return Err(EtlError::SchemaMismatch {
            unknown: unknown.into_iter().collect(),
        });
    }
    for (idx, row) in batch.rows.iter().enumerate() {
        if row.len() != batch.columns.len() {
            return Err(EtlError::InvalidCsv {
                line: idx as u64 + 1,
                message: format!(
                    "row has {} values for {} columns",
                    row.len(),
                    batch.columns.len()
                ),
            });
        }
    }
    if batch.is_empty() || batch.columns.is_empty() {
        return Ok(0);
    }

    let cols = batch
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=batch.columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("INSERT INTO {STAGING_TABLE} ({cols}) VALUES ({placeholders})");

    let tx = conn.transaction().context("begin staging transaction")?;
    {
        let mut stmt = tx.prepare(&sql).context("prepare staging insert")?;
        for row in &batch.rows {
            stmt.execute(params_from_iter(row.iter()))
                .context("insert staging row")?;
        }
    }
    tx.commit().context("commit staging transaction")?;

    info!(rows = batch.len(), "staging batch appended");
    Ok(batch.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::open_in_memory;

    #[test]
    fn mismatched_row_width_is_rejected() {
        let mut conn = open_in_memory().unwrap();
        let mut batch = StagingBatch::new(vec!["Div".to_string(), "HomeTeam".to_string()]);
        batch.push_row(vec![Value::Text("E0".to_string())]);
        let err = load_csv_to_staging(&mut conn, &batch).unwrap_err();
        assert!(matches!(err, EtlError::InvalidCsv { line: 1, .. }));
        assert_eq!(staging_row_count(&conn).unwrap(), 0);
    }

    #[test]
    fn staging_columns_include_quoted_keyword() {
        let conn = open_in_memory().unwrap();
        let cols = staging_columns(&conn).unwrap();
        assert!(cols.iter().any(|c| c == "AS"));
        assert!(cols.iter().any(|c| c == "B365_2_5O"));
    }
}
