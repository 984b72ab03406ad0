use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{Result, StorageContext};
use crate::job_log;
use crate::models::{MatchKey, MatchStats, NewMatch};
use crate::schema::STAGING_TABLE;
use crate::store::{self, value_as_i64, value_as_text};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchStageSummary {
    pub inserted: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
struct StagedMatch {
    rowid: i64,
    date: Option<String>,
    time: Option<String>,
    division: Option<String>,
    home_team: Option<String>,
    away_team: Option<String>,
    fthg: Option<i64>,
    ftag: Option<i64>,
    ftr: Option<String>,
    hthg: Option<i64>,
    htag: Option<i64>,
    htr: Option<String>,
    referee: Option<String>,
}

/// Builds one Match per staging row. Rows whose division, teams or date cannot
/// be resolved are skipped and written to the dead-letter table.
///
/// `skipped` counts every unresolved row seen by this run, so a re-run over the
/// same staging data reports it again. The dead-letter row itself is written once.
pub fn normalize_matches(conn: &Connection) -> Result<MatchStageSummary> {
    let staged = load_staged_matches(conn)?;
    // Every match of the run is attributed to the most recently started season.
    let season_id = store::latest_season_id(conn)?;

    let mut summary = MatchStageSummary::default();
    for row in &staged {
        match build_match(conn, season_id, row)? {
            Ok(m) => {
                if store::insert_match_if_absent(conn, &m)? {
                    summary.inserted += 1;
                }
            }
            Err(reason) => {
                warn!(rowid = row.rowid, %reason, "staging row skipped");
                job_log::record_dead_letter(conn, STAGING_TABLE, Some(row.rowid), &reason)?;
                summary.skipped += 1;
            }
        }
    }

    info!(
        staged = staged.len(),
        inserted = summary.inserted,
        skipped = summary.skipped,
        "matches normalized"
    );
    Ok(summary)
}

/// Outer error is storage, inner error is the reason the row cannot resolve.
fn build_match(
    conn: &Connection,
    season_id: Option<i64>,
    row: &StagedMatch,
) -> Result<std::result::Result<NewMatch, String>> {
    let Some(season_id) = season_id else {
        return Ok(Err("no season available".to_string()));
    };
    let Some(date) = row.date.clone() else {
        return Ok(Err("missing match date".to_string()));
    };
    let Some(division_id) = lookup(conn, row.division.as_deref(), store::division_id)? else {
        return Ok(Err(format!(
            "unresolved division '{}'",
            row.division.as_deref().unwrap_or_default()
        )));
    };
    let Some(home_team_id) = lookup(conn, row.home_team.as_deref(), store::team_id)? else {
        return Ok(Err(format!(
            "unresolved home team '{}'",
            row.home_team.as_deref().unwrap_or_default()
        )));
    };
    let Some(away_team_id) = lookup(conn, row.away_team.as_deref(), store::team_id)? else {
        return Ok(Err(format!(
            "unresolved away team '{}'",
            row.away_team.as_deref().unwrap_or_default()
        )));
    };
    let referee_id = lookup(conn, row.referee.as_deref(), store::referee_id)?;

    Ok(Ok(NewMatch {
        season_id,
        division_id,
        date,
        time: row.time.clone(),
        home_team_id,
        away_team_id,
        fthg: row.fthg,
        ftag: row.ftag,
        ftr: row.ftr.clone(),
        hthg: row.hthg,
        htag: row.htag,
        htr: row.htr.clone(),
        referee_id,
    }))
}

fn lookup(
    conn: &Connection,
    key: Option<&str>,
    find: fn(&Connection, &str) -> Result<Option<i64>>,
) -> Result<Option<i64>> {
    match key {
        Some(key) => find(conn, key),
        None => Ok(None),
    }
}

fn load_staged_matches(conn: &Connection) -> Result<Vec<StagedMatch>> {
    let mut stmt = conn
        .prepare(&format!(
            r#"
            SELECT rowid, Date, Time, "Div", HomeTeam, AwayTeam,
                   FTHG, FTAG, FTR, HTHG, HTAG, HTR, Referee
            FROM {STAGING_TABLE}
            ORDER BY Date, Time, rowid
            "#
        ))
        .context("prepare staged matches query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StagedMatch {
                rowid: row.get(0)?,
                date: value_as_text(row.get_ref(1)?),
                time: value_as_text(row.get_ref(2)?),
                division: value_as_text(row.get_ref(3)?),
                home_team: value_as_text(row.get_ref(4)?),
                away_team: value_as_text(row.get_ref(5)?),
                fthg: value_as_i64(row.get_ref(6)?),
                ftag: value_as_i64(row.get_ref(7)?),
                ftr: value_as_text(row.get_ref(8)?),
                hthg: value_as_i64(row.get_ref(9)?),
                htag: value_as_i64(row.get_ref(10)?),
                htr: value_as_text(row.get_ref(11)?),
                referee: value_as_text(row.get_ref(12)?),
            })
        })
        .context("query staged matches")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode staged match")?);
    }
    Ok(out)
}

/// Attaches shot/corner/foul/card counts to matches already inserted. A staging
/// key with no Match row is dropped without a dead-letter entry.
pub fn normalize_statistics(conn: &Connection) -> Result<usize> {
    let mut stmt = conn
        .prepare(&format!(
            r#"
            SELECT Date, Time, HomeTeam, AwayTeam,
                   HS, "AS", HST, AST, HC, AC, HF, AF, HY, AY, HR, AR,
                   MIN(rowid)
            FROM {STAGING_TABLE}
            GROUP BY Date, Time, HomeTeam, AwayTeam
            ORDER BY Date, Time
            "#
        ))
        .context("prepare staged statistics query")?;
    let rows = stmt
        .query_map([], |row| {
            let key = match (
                value_as_text(row.get_ref(0)?),
                value_as_text(row.get_ref(2)?),
                value_as_text(row.get_ref(3)?),
            ) {
                (Some(date), Some(home_team), Some(away_team)) => Some(MatchKey {
                    date,
                    time: value_as_text(row.get_ref(1)?),
                    home_team,
                    away_team,
                }),
                _ => None,
            };
            let stat = |idx: usize| -> rusqlite::Result<Option<i64>> {
                Ok(value_as_i64(row.get_ref(idx)?))
            };
            let stats = MatchStats {
                home_shots: stat(4)?,
                away_shots: stat(5)?,
                home_shots_target: stat(6)?,
                away_shots_target: stat(7)?,
                home_corners: stat(8)?,
                away_corners: stat(9)?,
                home_fouls: stat(10)?,
                away_fouls: stat(11)?,
                home_yellow: stat(12)?,
                away_yellow: stat(13)?,
                home_red: stat(14)?,
                away_red: stat(15)?,
            };
            Ok((key, stats))
        })
        .context("query staged statistics")?;

    let mut staged = Vec::new();
    for row in rows {
        staged.push(row.context("decode staged statistics")?);
    }

    let mut inserted = 0usize;
    for (key, stats) in &staged {
        let Some(key) = key else {
            continue;
        };
        let match_id = store::match_id_by_key(
            conn,
            &key.date,
            key.time.as_deref(),
            &key.home_team,
            &key.away_team,
        )?;
        let Some(match_id) = match_id else {
            debug!(date = %key.date, home = %key.home_team, away = %key.away_team, "no match for statistics row");
            continue;
        };
        if store::insert_statistics_if_absent(conn, match_id, stats)? {
            inserted += 1;
        }
    }

    info!(inserted, "match statistics normalized");
    Ok(inserted)
}
