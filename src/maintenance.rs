use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::{EtlError, Result, StorageContext};
use crate::schema::STAGING_TABLE;

/// Tables emptied by [`clean_all_tables`], in deletion order. Bookmakers and
/// the job/dead-letter logs are kept.
pub const TRUNCATE_ORDER: [&str; 9] = [
    "MatchStatistics",
    "Matches",
    "BettingOdds",
    "Markets",
    "Referees",
    "Teams",
    "Divisions",
    "Seasons",
    STAGING_TABLE,
];

/// Empties the warehouse and staging tables and resets their id sequences.
///
/// Foreign-key enforcement is switched off for the duration and switched back
/// on whether or not the deletes succeed. Any failure rolls every delete back.
pub fn clean_all_tables(conn: &mut Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "OFF")
        .context("disable foreign keys")
        .map_err(|err| EtlError::Cleanup(Box::new(err)))?;

    let outcome = truncate_all(conn);
    let restored = conn
        .pragma_update(None, "foreign_keys", "ON")
        .context("re-enable foreign keys");

    match (outcome, restored) {
        (Ok(()), Ok(())) => {
            info!(tables = TRUNCATE_ORDER.len(), "all tables cleaned");
            Ok(())
        }
        (Err(err), restored) => {
            if let Err(restore_err) = restored {
                warn!(error = %restore_err, "foreign keys left disabled");
            }
            Err(EtlError::Cleanup(Box::new(err)))
        }
        (Ok(()), Err(err)) => Err(EtlError::Cleanup(Box::new(err))),
    }
}

fn truncate_all(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction().context("begin cleanup transaction")?;
    for table in TRUNCATE_ORDER {
        tx.execute(&format!("DELETE FROM {table}"), [])
            .context(&format!("delete from {table}"))?;
    }
    let names = TRUNCATE_ORDER
        .iter()
        .map(|t| format!("'{t}'"))
        .collect::<Vec<_>>()
        .join(", ");
    tx.execute(
        &format!("DELETE FROM sqlite_sequence WHERE name IN ({names})"),
        [],
    )
    .context("reset id sequences")?;
    tx.commit().context("commit cleanup transaction")?;
    Ok(())
}
