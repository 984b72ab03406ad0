use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Result, StorageContext};
use crate::models::{DeadLetter, EtlLogEntry, JobStatus};

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Inserts the `Running` row for a new run and returns its id.
pub fn start_job(conn: &Connection, process_name: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO ETLLog (ProcessName, StartTime, Status) VALUES (?1, ?2, ?3)",
        params![process_name, now(), JobStatus::Running.as_str()],
    )
    .context("insert etl log")?;
    Ok(conn.last_insert_rowid())
}

pub fn complete_job(conn: &Connection, log_id: i64, processed: usize, failed: usize) -> Result<()> {
    conn.execute(
        "UPDATE ETLLog
         SET EndTime = ?1, RecordsProcessed = ?2, RecordsFailed = ?3, Status = ?4, ErrorMessage = NULL
         WHERE LogID = ?5",
        params![
            now(),
            processed as i64,
            failed as i64,
            JobStatus::Completed.as_str(),
            log_id
        ],
    )
    .context("update etl log as completed")?;
    Ok(())
}

pub fn fail_job(conn: &Connection, log_id: i64, error_message: &str) -> Result<()> {
    conn.execute(
        "UPDATE ETLLog
         SET EndTime = ?1, RecordsProcessed = 0, RecordsFailed = 1, Status = ?2, ErrorMessage = ?3
         WHERE LogID = ?4",
        params![now(), JobStatus::Failed.as_str(), error_message, log_id],
    )
    .context("update etl log as failed")?;
    Ok(())
}

pub fn fetch_etl_log(conn: &Connection) -> Result<Vec<EtlLogEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT LogID, ProcessName, StartTime, EndTime, RecordsProcessed, RecordsFailed, Status, ErrorMessage
             FROM ETLLog
             ORDER BY StartTime DESC, LogID DESC",
        )
        .context("prepare etl log query")?;
    let rows = stmt
        .query_map([], |row| {
            let status: String = row.get(6)?;
            Ok(EtlLogEntry {
                log_id: row.get(0)?,
                process_name: row.get(1)?,
                start_time: row.get(2)?,
                end_time: row.get(3)?,
                records_processed: row.get(4)?,
                records_failed: row.get(5)?,
                // Unrecognised status text reads as failed.
                status: JobStatus::parse(&status).unwrap_or(JobStatus::Failed),
                error_message: row.get(7)?,
            })
        })
        .context("query etl log")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode etl log row")?);
    }
    Ok(out)
}

pub fn clear_etl_logs(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction().context("begin clear log transaction")?;
    tx.execute("DELETE FROM ETLLog", [])
        .context("clear etl log")?;
    tx.commit().context("commit clear log transaction")?;
    Ok(())
}

/// Appends a dead-letter row and returns its id. A row already recorded with
/// the same source and message is reused, so re-runs over unchanged staging
/// data do not grow the table.
pub fn record_dead_letter(
    conn: &Connection,
    source_table: &str,
    source_id: Option<i64>,
    error_message: &str,
) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT Id FROM ETLDeadLetter
             WHERE SourceTable = ?1 AND SourceId IS ?2 AND ErrorMessage = ?3
             ORDER BY Id LIMIT 1",
            params![source_table, source_id, error_message],
            |row| row.get(0),
        )
        .optional()
        .context("look up dead letter")?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO ETLDeadLetter (SourceTable, SourceId, ErrorMessage, ErrorTimestamp)
         VALUES (?1, ?2, ?3, ?4)",
        params![source_table, source_id, error_message, now()],
    )
    .context("insert dead letter")?;
    Ok(conn.last_insert_rowid())
}

pub fn fetch_dead_letter(conn: &Connection) -> Result<Vec<DeadLetter>> {
    let mut stmt = conn
        .prepare(
            "SELECT Id, SourceTable, SourceId, ErrorMessage, ErrorTimestamp
             FROM ETLDeadLetter
             ORDER BY ErrorTimestamp DESC, Id DESC",
        )
        .context("prepare dead letter query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(DeadLetter {
                id: row.get(0)?,
                source_table: row.get(1)?,
                source_id: row.get(2)?,
                error_message: row.get(3)?,
                error_timestamp: row.get(4)?,
            })
        })
        .context("query dead letters")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode dead letter row")?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::open_in_memory;

    #[test]
    fn job_moves_from_running_to_completed() {
        let conn = open_in_memory().unwrap();
        let id = start_job(&conn, "test").unwrap();
        assert_eq!(fetch_etl_log(&conn).unwrap()[0].status, JobStatus::Running);

        complete_job(&conn, id, 12, 1).unwrap();
        let entry = &fetch_etl_log(&conn).unwrap()[0];
        assert_eq!(entry.status, JobStatus::Completed);
        assert_eq!(entry.records_processed, Some(12));
        assert_eq!(entry.records_failed, Some(1));
        assert!(entry.end_time.is_some());
        assert_eq!(entry.error_message, None);
    }

    #[test]
    fn failed_job_keeps_message() {
        let conn = open_in_memory().unwrap();
        let id = start_job(&conn, "test").unwrap();
        fail_job(&conn, id, "boom").unwrap();
        let entry = &fetch_etl_log(&conn).unwrap()[0];
        assert_eq!(entry.status, JobStatus::Failed);
        assert_eq!(entry.records_processed, Some(0));
        assert_eq!(entry.records_failed, Some(1));
        assert_eq!(entry.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn logs_and_dead_letters_are_newest_first() {
        let mut conn = open_in_memory().unwrap();
        let first = start_job(&conn, "first").unwrap();
        let second = start_job(&conn, "second").unwrap();
        let ids = fetch_etl_log(&conn)
            .unwrap()
            .iter()
            .map(|e| e.log_id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![second, first]);

        let a = record_dead_letter(&conn, "stg", Some(1), "a").unwrap();
        let b = record_dead_letter(&conn, "stg", Some(2), "b").unwrap();
        let ids = fetch_dead_letter(&conn)
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![b, a]);

        clear_etl_logs(&mut conn).unwrap();
        assert!(fetch_etl_log(&conn).unwrap().is_empty());
        assert_eq!(fetch_dead_letter(&conn).unwrap().len(), 2);
    }

    #[test]
    fn repeated_dead_letter_is_recorded_once() {
        let conn = open_in_memory().unwrap();
        let first = record_dead_letter(&conn, "stg", Some(7), "unresolved home team 'X'").unwrap();
        let again = record_dead_letter(&conn, "stg", Some(7), "unresolved home team 'X'").unwrap();
        assert_eq!(first, again);

        record_dead_letter(&conn, "stg", Some(7), "missing match date").unwrap();
        record_dead_letter(&conn, "stg", None, "missing match date").unwrap();
        record_dead_letter(&conn, "stg", None, "missing match date").unwrap();
        assert_eq!(fetch_dead_letter(&conn).unwrap().len(), 3);
    }
}
