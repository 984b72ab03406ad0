//! Insert-if-absent primitives and natural-key lookups over the normalized
//! tables. Every function takes a plain `&Connection`, so callers pass a
//! `Transaction` to scope the writes of one stage.

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Result, StorageContext};
use crate::models::{
    LEAGUE_COUNTRY, LEAGUE_NAME, LEAGUE_TIER, MarketDef, MatchStats, NewMatch, NewOdds,
};

pub fn insert_team_if_absent(conn: &Connection, name: &str, short_name: &str) -> Result<bool> {
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO Teams (TeamName, ShortName) VALUES (?1, ?2)",
            params![name, short_name],
        )
        .context("insert team")?;
    Ok(changed > 0)
}

pub fn insert_season_if_absent(conn: &Connection, name: &str, start: &str, end: &str) -> Result<bool> {
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO Seasons (SeasonName, StartDate, EndDate) VALUES (?1, ?2, ?3)",
            params![name, start, end],
        )
        .context("insert season")?;
    Ok(changed > 0)
}

pub fn insert_referee_if_absent(conn: &Connection, name: &str) -> Result<bool> {
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO Referees (RefereeName, YearsExperience, Nationality)
             VALUES (?1, NULL, NULL)",
            params![name],
        )
        .context("insert referee")?;
    Ok(changed > 0)
}

pub fn insert_division_if_absent(conn: &Connection, code: &str) -> Result<bool> {
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO Divisions (DivisionCode, LeagueName, Country, Tier)
             VALUES (?1, ?2, ?3, ?4)",
            params![code, LEAGUE_NAME, LEAGUE_COUNTRY, LEAGUE_TIER],
        )
        .context("insert division")?;
    Ok(changed > 0)
}

pub fn insert_market_if_absent(conn: &Connection, market: &MarketDef) -> Result<bool> {
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO Markets (MarketType, MarketSubtype, Parameter, Description)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                market.market_type,
                market.subtype,
                market.parameter,
                market.description
            ],
        )
        .context("insert market")?;
    Ok(changed > 0)
}

/// Bookmakers have no natural key until `unique_bookmaker_name` exists, so
/// this appends a new row on every call until the deduplicator has run.
pub fn seed_bookmaker(conn: &Connection, name: &str) -> Result<bool> {
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO Bookmakers (BookmakerName) VALUES (?1)",
            params![name.trim()],
        )
        .context("insert bookmaker")?;
    Ok(changed > 0)
}

/// Keyed on (date, time, home, away); NULL kick-off times compare equal.
pub fn insert_match_if_absent(conn: &Connection, m: &NewMatch) -> Result<bool> {
    let changed = conn
        .execute(
            r#"
            INSERT INTO Matches (
                SeasonID, DivisionID, MatchDate, MatchTime,
                HomeTeamID, AwayTeamID,
                FTHG, FTAG, FTR,
                HTHG, HTAG, HTR,
                RefereeID
            )
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13
            WHERE NOT EXISTS (
                SELECT 1 FROM Matches
                WHERE MatchDate = ?3 AND MatchTime IS ?4
                  AND HomeTeamID = ?5 AND AwayTeamID = ?6
            )
            "#,
            params![
                m.season_id,
                m.division_id,
                m.date,
                m.time,
                m.home_team_id,
                m.away_team_id,
                m.fthg,
                m.ftag,
                m.ftr,
                m.hthg,
                m.htag,
                m.htr,
                m.referee_id,
            ],
        )
        .context("insert match")?;
    Ok(changed > 0)
}

pub fn insert_statistics_if_absent(conn: &Connection, match_id: i64, s: &MatchStats) -> Result<bool> {
    let changed = conn
        .execute(
            r#"
            INSERT OR IGNORE INTO MatchStatistics (
                MatchID,
                HomeShots, AwayShots,
                HomeShotsTarget, AwayShotsTarget,
                HomeCorners, AwayCorners,
                HomeFouls, AwayFouls,
                HomeYellowCards, AwayYellowCards,
                HomeRedCards, AwayRedCards
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                match_id,
                s.home_shots,
                s.away_shots,
                s.home_shots_target,
                s.away_shots_target,
                s.home_corners,
                s.away_corners,
                s.home_fouls,
                s.away_fouls,
                s.home_yellow,
                s.away_yellow,
                s.home_red,
                s.away_red,
            ],
        )
        .context("insert match statistics")?;
    Ok(changed > 0)
}

pub fn insert_odds_if_absent(conn: &Connection, odds: &NewOdds) -> Result<bool> {
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO BettingOdds (MatchID, BookmakerID, MarketID, OutcomeCode, OddsValue)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                odds.match_id,
                odds.bookmaker_id,
                odds.market_id,
                odds.outcome,
                odds.value
            ],
        )
        .context("insert betting odds")?;
    Ok(changed > 0)
}

pub fn team_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT TeamID FROM Teams WHERE TeamName = ?1",
        params![name],
        |row| row.get(0),
    )
    .optional()
    .context("lookup team")
}

pub fn division_id(conn: &Connection, code: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT DivisionID FROM Divisions WHERE DivisionCode = ?1",
        params![code],
        |row| row.get(0),
    )
    .optional()
    .context("lookup division")
}

pub fn referee_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT RefereeID FROM Referees WHERE RefereeName = ?1",
        params![name],
        |row| row.get(0),
    )
    .optional()
    .context("lookup referee")
}

/// The season with the latest start date, used for every match of a run.
pub fn latest_season_id(conn: &Connection) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT SeasonID FROM Seasons ORDER BY StartDate DESC, SeasonID DESC LIMIT 1",
        [],
        |row| row.get(0),
    )
    .optional()
    .context("lookup latest season")
}

pub fn market_id(conn: &Connection, market: &MarketDef) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT MarketID FROM Markets
         WHERE MarketType = ?1 AND MarketSubtype = ?2 AND Parameter = ?3",
        params![market.market_type, market.subtype, market.parameter],
        |row| row.get(0),
    )
    .optional()
    .context("lookup market")
}

/// Lowest identifier for the name, i.e. the row deduplication keeps.
pub fn bookmaker_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT MIN(BookmakerID) FROM Bookmakers WHERE BookmakerName = ?1",
        params![name],
        |row| row.get::<_, Option<i64>>(0),
    )
    .context("lookup bookmaker")
}

pub fn match_id_by_key(
    conn: &Connection,
    date: &str,
    time: Option<&str>,
    home_team: &str,
    away_team: &str,
) -> Result<Option<i64>> {
    conn.query_row(
        r#"
        SELECT MatchID
        FROM Matches
        WHERE MatchDate = ?1 AND MatchTime IS ?2
          AND HomeTeamID = (SELECT TeamID FROM Teams WHERE TeamName = ?3)
          AND AwayTeamID = (SELECT TeamID FROM Teams WHERE TeamName = ?4)
        "#,
        params![date, time, home_team, away_team],
        |row| row.get(0),
    )
    .optional()
    .context("lookup match id")
}

pub fn table_count(conn: &Connection, table: &str) -> Result<i64> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .context(&format!("count rows in {table}"))
}

/// Staging cells are stored verbatim, so numeric columns may hold text.
pub fn value_as_f64(value: ValueRef<'_>) -> Option<f64> {
    match value {
        ValueRef::Integer(n) => Some(n as f64),
        ValueRef::Real(f) => Some(f),
        ValueRef::Text(t) => std::str::from_utf8(t).ok()?.trim().parse().ok(),
        ValueRef::Null | ValueRef::Blob(_) => None,
    }
}

pub fn value_as_i64(value: ValueRef<'_>) -> Option<i64> {
    match value {
        ValueRef::Integer(n) => Some(n),
        ValueRef::Real(f) if f.fract() == 0.0 => Some(f as i64),
        ValueRef::Text(t) => std::str::from_utf8(t).ok()?.trim().parse().ok(),
        _ => None,
    }
}

/// Text cell with surrounding whitespace removed; empty text reads as None.
pub fn value_as_text(value: ValueRef<'_>) -> Option<String> {
    let s = match value {
        ValueRef::Text(t) => String::from_utf8_lossy(t).trim().to_string(),
        ValueRef::Integer(n) => n.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Null | ValueRef::Blob(_) => return None,
    };
    (!s.is_empty()).then_some(s)
}
