use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::{EtlError, Result, StorageContext};

pub const UNIQUE_BOOKMAKER_INDEX: &str = "unique_bookmaker_name";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintState {
    Created,
    AlreadyPresent,
    /// Duplicates remained; the index could not be built.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupReport {
    pub names_fixed: usize,
    pub odds_repointed: usize,
    /// Odds rows already present under the surviving id.
    pub odds_dropped: usize,
    pub bookmakers_removed: usize,
    pub constraint: ConstraintState,
}

impl DedupReport {
    pub fn message(&self) -> String {
        if self.names_fixed == 0 {
            "No duplicate bookmaker names found.".to_string()
        } else {
            format!("{} duplicate bookmaker name(s) fixed.", self.names_fixed)
        }
    }
}

/// Collapses bookmakers sharing a name onto the lowest id, repoints their odds
/// and adds a unique index on the name. Runs in a single transaction.
///
/// An odds row whose (match, market, outcome) the surviving bookmaker already
/// prices is dropped rather than repointed.
pub fn deduplicate_bookmakers(conn: &mut Connection) -> Result<DedupReport> {
    run_dedup(conn).map_err(|err| EtlError::Dedup(Box::new(err)))
}

fn run_dedup(conn: &mut Connection) -> Result<DedupReport> {
    let tx = conn.transaction().context("begin dedup transaction")?;

    let duplicates = {
        let mut stmt = tx
            .prepare(
                "SELECT BookmakerName FROM Bookmakers
                 GROUP BY BookmakerName HAVING COUNT(*) > 1
                 ORDER BY BookmakerName",
            )
            .context("prepare duplicate bookmaker query")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("query duplicate bookmakers")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode bookmaker name")?);
        }
        out
    };

    let mut report = DedupReport {
        names_fixed: duplicates.len(),
        odds_repointed: 0,
        odds_dropped: 0,
        bookmakers_removed: 0,
        constraint: ConstraintState::AlreadyPresent,
    };

    if !duplicates.is_empty() {
        report.odds_repointed = tx
            .execute(
                "UPDATE OR IGNORE BettingOdds
                 SET BookmakerID = (
                     SELECT MIN(keep.BookmakerID)
                     FROM Bookmakers cur
                     JOIN Bookmakers keep ON keep.BookmakerName = cur.BookmakerName
                     WHERE cur.BookmakerID = BettingOdds.BookmakerID
                 )
                 WHERE BookmakerID IN (SELECT BookmakerID FROM Bookmakers)
                   AND BookmakerID NOT IN (
                     SELECT MIN(BookmakerID) FROM Bookmakers GROUP BY BookmakerName
                 )",
                [],
            )
            .context("repoint odds to surviving bookmaker")?;
        report.odds_dropped = tx
            .execute(
                "DELETE FROM BettingOdds
                 WHERE BookmakerID IN (SELECT BookmakerID FROM Bookmakers)
                   AND BookmakerID NOT IN (
                     SELECT MIN(BookmakerID) FROM Bookmakers GROUP BY BookmakerName
                 )",
                [],
            )
            .context("drop odds already held by surviving bookmaker")?;
        report.bookmakers_removed = tx
            .execute(
                "DELETE FROM Bookmakers
                 WHERE BookmakerID NOT IN (
                     SELECT MIN(BookmakerID) FROM Bookmakers GROUP BY BookmakerName
                 )",
                [],
            )
            .context("delete duplicate bookmakers")?;
    }

    report.constraint = ensure_unique_index(&tx)?;
    tx.commit().context("commit dedup transaction")?;

    info!(
        names = report.names_fixed,
        odds = report.odds_repointed,
        dropped = report.odds_dropped,
        removed = report.bookmakers_removed,
        constraint = ?report.constraint,
        "bookmakers deduplicated"
    );
    Ok(report)
}

fn ensure_unique_index(conn: &Connection) -> Result<ConstraintState> {
    let sql = format!("CREATE UNIQUE INDEX {UNIQUE_BOOKMAKER_INDEX} ON Bookmakers(BookmakerName)");
    match conn.execute(&sql, []) {
        Ok(_) => Ok(ConstraintState::Created),
        Err(err) => {
            let text = err.to_string();
            if text.contains("already exists") {
                Ok(ConstraintState::AlreadyPresent)
            } else if text.contains("UNIQUE constraint failed") {
                warn!(error = %text, "bookmaker names still duplicated; unique index not created");
                Ok(ConstraintState::Skipped)
            } else {
                Err(err).context("create unique bookmaker index")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::open_in_memory;
    use crate::store::{seed_bookmaker, table_count};

    #[test]
    fn no_duplicates_still_adds_index() {
        let mut conn = open_in_memory().unwrap();
        seed_bookmaker(&conn, "Bet365").unwrap();
        let report = deduplicate_bookmakers(&mut conn).unwrap();
        assert_eq!(report.message(), "No duplicate bookmaker names found.");
        assert_eq!(report.constraint, ConstraintState::Created);

        let again = deduplicate_bookmakers(&mut conn).unwrap();
        assert_eq!(again.constraint, ConstraintState::AlreadyPresent);
        assert_eq!(table_count(&conn, "Bookmakers").unwrap(), 1);
    }

    #[test]
    fn duplicates_collapse_to_lowest_id() {
        let mut conn = open_in_memory().unwrap();
        seed_bookmaker(&conn, "Bet365").unwrap();
        seed_bookmaker(&conn, "Bet365").unwrap();
        seed_bookmaker(&conn, "Pinnacle Sports").unwrap();
        seed_bookmaker(&conn, "Pinnacle Sports").unwrap();
        seed_bookmaker(&conn, "Pinnacle Sports").unwrap();

        let report = deduplicate_bookmakers(&mut conn).unwrap();
        assert_eq!(report.message(), "2 duplicate bookmaker name(s) fixed.");
        assert_eq!(report.bookmakers_removed, 3);
        let ids = conn
            .prepare("SELECT BookmakerID FROM Bookmakers ORDER BY BookmakerID")
            .unwrap()
            .query_map([], |r| r.get::<_, i64>(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(ids, vec![1, 3]);

        // The index now rejects a second copy of an existing name.
        assert!(!seed_bookmaker(&conn, "Bet365").unwrap());
    }
}
