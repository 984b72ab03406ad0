use std::path::PathBuf;

use rusqlite::Connection;

use pl_warehouse::csv_import::read_staging_csv_path;
use pl_warehouse::dedup::{ConstraintState, deduplicate_bookmakers};
use pl_warehouse::job_log::fetch_etl_log;
use pl_warehouse::maintenance::{TRUNCATE_ORDER, clean_all_tables};
use pl_warehouse::pipeline::trigger_etl_job;
use pl_warehouse::schema::open_in_memory;
use pl_warehouse::staging::load_csv_to_staging;
use pl_warehouse::store::table_count;

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn loaded_db() -> Connection {
    let mut conn = open_in_memory().expect("db");
    let batch = read_staging_csv_path(&fixture_path("E0_sample.csv")).expect("fixture");
    load_csv_to_staging(&mut conn, &batch).expect("stage");
    trigger_etl_job(&mut conn, "setup").expect("run");
    conn
}

fn count(conn: &Connection, table: &str) -> i64 {
    table_count(conn, table).expect("count")
}

fn odds_per_bookmaker(conn: &Connection) -> Vec<(String, i64)> {
    conn.prepare(
        "SELECT b.BookmakerName, COUNT(*) FROM BettingOdds bo
         JOIN Bookmakers b ON b.BookmakerID = bo.BookmakerID
         GROUP BY b.BookmakerName ORDER BY b.BookmakerName",
    )
    .expect("prepare")
    .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
    .expect("query")
    .collect::<rusqlite::Result<Vec<_>>>()
    .expect("rows")
}

#[test]
fn dedup_keeps_every_odds_row() {
    let mut conn = loaded_db();
    trigger_etl_job(&mut conn, "again").expect("second run");
    trigger_etl_job(&mut conn, "again").expect("third run");
    assert_eq!(count(&conn, "Bookmakers"), 12);

    let odds_before = count(&conn, "BettingOdds");
    let per_book_before = odds_per_bookmaker(&conn);

    let report = deduplicate_bookmakers(&mut conn).expect("dedup");
    assert_eq!(report.message(), "4 duplicate bookmaker name(s) fixed.");
    assert_eq!(report.bookmakers_removed, 8);
    assert_eq!(report.constraint, ConstraintState::Created);

    assert_eq!(count(&conn, "Bookmakers"), 4);
    assert_eq!(count(&conn, "BettingOdds"), odds_before);
    assert_eq!(odds_per_bookmaker(&conn), per_book_before);

    // With the unique index in place further runs stop duplicating.
    trigger_etl_job(&mut conn, "after dedup").expect("run");
    assert_eq!(count(&conn, "Bookmakers"), 4);

    let again = deduplicate_bookmakers(&mut conn).expect("dedup");
    assert_eq!(again.message(), "No duplicate bookmaker names found.");
    assert_eq!(again.constraint, ConstraintState::AlreadyPresent);
}

#[test]
fn duplicate_rows_holding_odds_are_repointed() {
    let mut conn = open_in_memory().expect("db");
    conn.execute_batch(
        "INSERT INTO Bookmakers (BookmakerName) VALUES ('Bet365'), ('Bet365');
         INSERT INTO Teams (TeamName) VALUES ('Arsenal'), ('Chelsea');
         INSERT INTO Seasons (SeasonName, StartDate, EndDate) VALUES ('20-20', '2020-01-01', '2020-01-01');
         INSERT INTO Divisions (DivisionCode, LeagueName, Country, Tier) VALUES ('E0', 'Premier League', 'England', 1);
         INSERT INTO Markets (MarketType, MarketSubtype, Parameter) VALUES ('1X2', 'FullTime', 'standard');
         INSERT INTO Matches (SeasonID, DivisionID, MatchDate, HomeTeamID, AwayTeamID) VALUES (1, 1, '2020-01-01', 1, 2);
         INSERT INTO BettingOdds (MatchID, BookmakerID, MarketID, OutcomeCode, OddsValue) VALUES (1, 2, 1, 'H', 2.5);",
    )
    .expect("seed");

    let report = deduplicate_bookmakers(&mut conn).expect("dedup");
    assert_eq!(report.odds_repointed, 1);
    let bookmaker: i64 = conn
        .query_row("SELECT BookmakerID FROM BettingOdds", [], |r| r.get(0))
        .expect("odds row");
    assert_eq!(bookmaker, 1);
}

#[test]
fn duplicate_pricing_the_same_outcome_is_merged() {
    let mut conn = open_in_memory().expect("db");
    conn.execute_batch(
        "INSERT INTO Bookmakers (BookmakerName) VALUES ('Bet365'), ('Bet365'), ('Bet365');
         INSERT INTO Teams (TeamName) VALUES ('Arsenal'), ('Chelsea');
         INSERT INTO Seasons (SeasonName, StartDate, EndDate) VALUES ('20-20', '2020-01-01', '2020-01-01');
         INSERT INTO Divisions (DivisionCode, LeagueName, Country, Tier) VALUES ('E0', 'Premier League', 'England', 1);
         INSERT INTO Markets (MarketType, MarketSubtype, Parameter) VALUES ('1X2', 'FullTime', 'standard');
         INSERT INTO Matches (SeasonID, DivisionID, MatchDate, HomeTeamID, AwayTeamID) VALUES (1, 1, '2020-01-01', 1, 2);
         INSERT INTO BettingOdds (MatchID, BookmakerID, MarketID, OutcomeCode, OddsValue) VALUES
             (1, 1, 1, 'H', 2.5),
             (1, 2, 1, 'H', 2.6),
             (1, 2, 1, 'D', 3.3),
             (1, 3, 1, 'A', 2.9),
             (1, 3, 1, 'D', 3.4);",
    )
    .expect("seed");

    let report = deduplicate_bookmakers(&mut conn).expect("dedup");
    assert_eq!(report.bookmakers_removed, 2);
    assert_eq!(report.odds_repointed, 2);
    assert_eq!(report.odds_dropped, 2);
    assert_eq!(report.constraint, ConstraintState::Created);
    assert_eq!(count(&conn, "Bookmakers"), 1);

    let odds = conn
        .prepare("SELECT BookmakerID, OutcomeCode, OddsValue FROM BettingOdds ORDER BY OutcomeCode")
        .expect("prepare")
        .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, f64>(2)?)))
        .expect("query")
        .collect::<rusqlite::Result<Vec<_>>>()
        .expect("rows");
    assert_eq!(
        odds,
        vec![
            (1, "A".to_string(), 2.9),
            (1, "D".to_string(), 3.3),
            (1, "H".to_string(), 2.5),
        ]
    );
}

#[test]
fn clean_empties_warehouse_and_staging() {
    let mut conn = loaded_db();
    clean_all_tables(&mut conn).expect("clean");

    for table in TRUNCATE_ORDER {
        assert_eq!(count(&conn, table), 0, "{table} not empty");
    }
    assert_eq!(count(&conn, "Bookmakers"), 4);
    assert_eq!(fetch_etl_log(&conn).expect("log").len(), 1);

    let fk: i64 = conn
        .query_row("PRAGMA foreign_keys", [], |r| r.get(0))
        .expect("pragma");
    assert_eq!(fk, 1);
}

#[test]
fn pipeline_runs_again_after_clean() {
    let mut conn = loaded_db();
    clean_all_tables(&mut conn).expect("clean");

    let batch = read_staging_csv_path(&fixture_path("E0_sample.csv")).expect("fixture");
    load_csv_to_staging(&mut conn, &batch).expect("stage");
    let report = trigger_etl_job(&mut conn, "reload").expect("run");
    assert_eq!(report.matches.inserted, 6);
    assert_eq!(report.odds_1x2, 69);

    let first_team: i64 = conn
        .query_row("SELECT MIN(TeamID) FROM Teams", [], |r| r.get(0))
        .expect("team id");
    assert_eq!(first_team, 1);
}
