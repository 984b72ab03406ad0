use rusqlite::Connection;
use tracing::{error, info};

use crate::error::{EtlError, Result, StorageContext};
use crate::job_log;
use crate::matches::{self, MatchStageSummary};
use crate::odds;
use crate::resolver::{self, ReferenceSummary};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EtlRunReport {
    pub log_id: i64,
    pub references: ReferenceSummary,
    pub matches: MatchStageSummary,
    pub statistics: usize,
    pub odds_1x2: usize,
    pub odds_over_under: usize,
    pub lines: Vec<String>,
}

impl EtlRunReport {
    /// Multi-line text, one line per stage plus the final status.
    pub fn summary(&self) -> String {
        self.lines.join("\n")
    }
}

/// Runs every stage against the staging table and records the run in ETLLog.
///
/// Each stage commits on its own. When a stage fails its transaction is rolled
/// back, earlier stages stay committed, the log row is marked `Failed` and the
/// error is returned as `PipelineFailure`.
pub fn trigger_etl_job(conn: &mut Connection, process_name: &str) -> Result<EtlRunReport> {
    let log_id = job_log::start_job(conn, process_name)?;
    info!(log_id, process = process_name, "etl job started");

    let outcome = run_stages(conn, log_id).and_then(|report| {
        job_log::complete_job(conn, log_id, report.matches.inserted, report.matches.skipped)?;
        Ok(report)
    });

    match outcome {
        Ok(mut report) => {
            report.lines.push(format!("ETL job completed (log {log_id})."));
            info!(
                log_id,
                matches = report.matches.inserted,
                skipped = report.matches.skipped,
                "etl job completed"
            );
            Ok(report)
        }
        Err(err) => {
            let message = err.to_string();
            error!(log_id, error = %message, "etl job failed");
            if let Err(log_err) = job_log::fail_job(conn, log_id, &message) {
                error!(log_id, error = %log_err, "could not mark etl job as failed");
            }
            Err(EtlError::PipelineFailure(message))
        }
    }
}

fn run_stages(conn: &mut Connection, log_id: i64) -> Result<EtlRunReport> {
    let mut report = EtlRunReport {
        log_id,
        ..EtlRunReport::default()
    };

    let refs = in_stage(conn, "references", resolver::resolve_references)?;
    report.lines.push(format!("{} team records processed.", refs.teams));
    report
        .lines
        .push(format!("Season '{}' inserted or already present.", refs.season));
    report.lines.push(format!("{} referees processed.", refs.referees));
    report.lines.push(format!("{} divisions processed.", refs.divisions));
    report
        .lines
        .push(format!("{} market definitions inserted.", refs.markets));
    report.lines.push(format!("{} bookmakers processed.", refs.bookmakers));
    report.references = refs;

    let m = in_stage(conn, "matches", matches::normalize_matches)?;
    report.lines.push(format!("{} matches inserted.", m.inserted));
    if m.skipped > 0 {
        report
            .lines
            .push(format!("{} rows skipped (see dead-letter).", m.skipped));
    }
    report.matches = m;

    report.statistics = in_stage(conn, "statistics", matches::normalize_statistics)?;
    report
        .lines
        .push(format!("{} match statistics inserted.", report.statistics));

    report.odds_1x2 = in_stage(conn, "1x2 odds", odds::normalize_1x2_odds)?;
    report.lines.push(format!("{} 1X2 odds inserted.", report.odds_1x2));

    report.odds_over_under = in_stage(conn, "over/under odds", odds::normalize_over_under_odds)?;
    report
        .lines
        .push(format!("{} Over/Under 2.5 odds inserted.", report.odds_over_under));

    Ok(report)
}

/// Runs `work` inside its own transaction. An error drops the transaction,
/// which rolls the stage back.
fn in_stage<T>(
    conn: &mut Connection,
    stage: &str,
    work: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    let tx = conn
        .transaction()
        .context(&format!("begin {stage} transaction"))?;
    let out = work(&tx)?;
    tx.commit().context(&format!("commit {stage} transaction"))?;
    Ok(out)
}
