use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use rusqlite::Connection;

use crate::error::{EtlError, Result, StorageContext};

pub const STAGING_TABLE: &str = "stg_premier_league_raw";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Date,
    Time,
    Integer,
    Real,
}

impl ColumnKind {
    fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Text | ColumnKind::Date | ColumnKind::Time => "TEXT",
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Real => "REAL",
        }
    }
}

use ColumnKind::{Date, Integer, Real, Text, Time};

/// Staging layout of a football-data.co.uk Premier League CSV after header cleanup.
pub const STAGING_COLUMNS: &[(&str, ColumnKind)] = &[
    ("Div", Text),
    ("Date", Date),
    ("Time", Time),
    ("HomeTeam", Text),
    ("AwayTeam", Text),
    ("FTHG", Integer),
    ("FTAG", Integer),
    ("FTR", Text),
    ("HTHG", Integer),
    ("HTAG", Integer),
    ("HTR", Text),
    ("Referee", Text),
    ("HS", Integer),
    ("AS", Integer),
    ("HST", Integer),
    ("AST", Integer),
    ("HF", Integer),
    ("AF", Integer),
    ("HC", Integer),
    ("AC", Integer),
    ("HY", Integer),
    ("AY", Integer),
    ("HR", Integer),
    ("AR", Integer),
    ("B365H", Real),
    ("B365D", Real),
    ("B365A", Real),
    ("BWH", Real),
    ("BWD", Real),
    ("BWA", Real),
    ("IWH", Real),
    ("IWD", Real),
    ("IWA", Real),
    ("PSH", Real),
    ("PSD", Real),
    ("PSA", Real),
    ("WHH", Real),
    ("WHD", Real),
    ("WHA", Real),
    ("VCH", Real),
    ("VCD", Real),
    ("VCA", Real),
    ("MaxH", Real),
    ("MaxD", Real),
    ("MaxA", Real),
    ("AvgH", Real),
    ("AvgD", Real),
    ("AvgA", Real),
    ("B365_2_5O", Real),
    ("B365_2_5U", Real),
    ("P_2_5O", Real),
    ("P_2_5U", Real),
    ("Max_2_5O", Real),
    ("Max_2_5U", Real),
    ("Avg_2_5O", Real),
    ("Avg_2_5U", Real),
];

static COLUMN_KINDS: Lazy<HashMap<&'static str, ColumnKind>> =
    Lazy::new(|| STAGING_COLUMNS.iter().copied().collect());

pub fn staging_column_kind(name: &str) -> Option<ColumnKind> {
    COLUMN_KINDS.get(name).copied()
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn = Connection::open(path).map_err(|source| EtlError::Storage {
        context: format!("open sqlite db {}", path.display()),
        source,
    })?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        .context("enable wal journal")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("enable foreign keys")?;
    conn.execute_batch(&staging_ddl())
        .context("create staging table")?;
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS Teams (
            TeamID INTEGER PRIMARY KEY AUTOINCREMENT,
            TeamName TEXT NOT NULL UNIQUE,
            ShortName TEXT NULL
        );

        CREATE TABLE IF NOT EXISTS Seasons (
            SeasonID INTEGER PRIMARY KEY AUTOINCREMENT,
            SeasonName TEXT NOT NULL UNIQUE,
            StartDate TEXT NOT NULL,
            EndDate TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS Divisions (
            DivisionID INTEGER PRIMARY KEY AUTOINCREMENT,
            DivisionCode TEXT NOT NULL UNIQUE,
            LeagueName TEXT NOT NULL,
            Country TEXT NOT NULL,
            Tier INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS Referees (
            RefereeID INTEGER PRIMARY KEY AUTOINCREMENT,
            RefereeName TEXT NOT NULL UNIQUE,
            YearsExperience INTEGER NULL,
            Nationality TEXT NULL
        );

        CREATE TABLE IF NOT EXISTS Matches (
            MatchID INTEGER PRIMARY KEY AUTOINCREMENT,
            SeasonID INTEGER NOT NULL REFERENCES Seasons(SeasonID),
            DivisionID INTEGER NOT NULL REFERENCES Divisions(DivisionID),
            MatchDate TEXT NOT NULL,
            MatchTime TEXT NULL,
            HomeTeamID INTEGER NOT NULL REFERENCES Teams(TeamID),
            AwayTeamID INTEGER NOT NULL REFERENCES Teams(TeamID),
            FTHG INTEGER NULL,
            FTAG INTEGER NULL,
            FTR TEXT NULL,
            HTHG INTEGER NULL,
            HTAG INTEGER NULL,
            HTR TEXT NULL,
            RefereeID INTEGER NULL REFERENCES Referees(RefereeID)
        );
        CREATE INDEX IF NOT EXISTS idx_matches_key
            ON Matches(MatchDate, MatchTime, HomeTeamID, AwayTeamID);
        CREATE INDEX IF NOT EXISTS idx_matches_season ON Matches(SeasonID);

        CREATE TABLE IF NOT EXISTS MatchStatistics (
            MatchID INTEGER PRIMARY KEY REFERENCES Matches(MatchID),
            HomeShots INTEGER NULL,
            AwayShots INTEGER NULL,
            HomeShotsTarget INTEGER NULL,
            AwayShotsTarget INTEGER NULL,
            HomeCorners INTEGER NULL,
            AwayCorners INTEGER NULL,
            HomeFouls INTEGER NULL,
            AwayFouls INTEGER NULL,
            HomeYellowCards INTEGER NULL,
            AwayYellowCards INTEGER NULL,
            HomeRedCards INTEGER NULL,
            AwayRedCards INTEGER NULL
        );

        CREATE TABLE IF NOT EXISTS Markets (
            MarketID INTEGER PRIMARY KEY AUTOINCREMENT,
            MarketType TEXT NOT NULL,
            MarketSubtype TEXT NOT NULL,
            Parameter TEXT NOT NULL,
            Description TEXT NULL,
            UNIQUE (MarketType, MarketSubtype, Parameter)
        );

        CREATE TABLE IF NOT EXISTS Bookmakers (
            BookmakerID INTEGER PRIMARY KEY AUTOINCREMENT,
            BookmakerName TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS BettingOdds (
            OddsID INTEGER PRIMARY KEY AUTOINCREMENT,
            MatchID INTEGER NOT NULL REFERENCES Matches(MatchID),
            BookmakerID INTEGER NOT NULL REFERENCES Bookmakers(BookmakerID),
            MarketID INTEGER NOT NULL REFERENCES Markets(MarketID),
            OutcomeCode TEXT NOT NULL,
            OddsValue REAL NOT NULL CHECK (OddsValue > 1.0),
            UNIQUE (MatchID, BookmakerID, MarketID, OutcomeCode)
        );
        CREATE INDEX IF NOT EXISTS idx_odds_bookmaker ON BettingOdds(BookmakerID);

        CREATE TABLE IF NOT EXISTS ETLLog (
            LogID INTEGER PRIMARY KEY AUTOINCREMENT,
            ProcessName TEXT NOT NULL,
            StartTime TEXT NOT NULL,
            EndTime TEXT NULL,
            RecordsProcessed INTEGER NULL,
            RecordsFailed INTEGER NULL,
            Status TEXT NOT NULL,
            ErrorMessage TEXT NULL
        );

        CREATE TABLE IF NOT EXISTS ETLDeadLetter (
            Id INTEGER PRIMARY KEY AUTOINCREMENT,
            SourceTable TEXT NOT NULL,
            SourceId INTEGER NULL,
            ErrorMessage TEXT NOT NULL,
            ErrorTimestamp TEXT NOT NULL
        );

        CREATE VIEW IF NOT EXISTS vw_LeagueTable AS
        SELECT
            s.SeasonName AS SeasonName,
            t.TeamName AS TeamName,
            COUNT(*) AS Played,
            SUM(r.Won) AS Won,
            SUM(r.Drawn) AS Drawn,
            SUM(r.Lost) AS Lost,
            COALESCE(SUM(r.GF), 0) AS GF,
            COALESCE(SUM(r.GA), 0) AS GA,
            COALESCE(SUM(r.GF), 0) - COALESCE(SUM(r.GA), 0) AS GD,
            SUM(r.Points) AS Points
        FROM (
            SELECT m.SeasonID, m.HomeTeamID AS TeamID, m.FTHG AS GF, m.FTAG AS GA,
                   m.FTR = 'H' AS Won, m.FTR = 'D' AS Drawn, m.FTR = 'A' AS Lost,
                   CASE m.FTR WHEN 'H' THEN 3 WHEN 'D' THEN 1 ELSE 0 END AS Points
            FROM Matches m
            WHERE m.FTR IN ('H', 'D', 'A')
            UNION ALL
            SELECT m.SeasonID, m.AwayTeamID, m.FTAG, m.FTHG,
                   m.FTR = 'A', m.FTR = 'D', m.FTR = 'H',
                   CASE m.FTR WHEN 'A' THEN 3 WHEN 'D' THEN 1 ELSE 0 END
            FROM Matches m
            WHERE m.FTR IN ('H', 'D', 'A')
        ) r
        JOIN Seasons s ON s.SeasonID = r.SeasonID
        JOIN Teams t ON t.TeamID = r.TeamID
        GROUP BY s.SeasonName, t.TeamName;
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

fn staging_ddl() -> String {
    let cols = STAGING_COLUMNS
        .iter()
        .map(|(name, kind)| format!("    \"{name}\" {} NULL", kind.sql_type()))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("CREATE TABLE IF NOT EXISTS {STAGING_TABLE} (\n{cols}\n);")
}

/// Quotes an identifier for interpolation into SQL (`AS` is a staging column).
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
