use std::path::PathBuf;

use rusqlite::Connection;

use pl_warehouse::csv_import::read_staging_csv_path;
use pl_warehouse::pipeline::trigger_etl_job;
use pl_warehouse::report_export::export_season_workbook;
use pl_warehouse::reports::{self, Venue};
use pl_warehouse::schema::open_in_memory;
use pl_warehouse::staging::load_csv_to_staging;

const SEASON: &str = "19-20";

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
    trigger_etl_job(&mut conn, "reports").expect("run");
    conn
}

#[test]
fn name_lists() {
    let conn = loaded_db();
    assert!(reports::has_season_data(&conn).expect("seasons"));
    assert_eq!(reports::all_seasons(&conn).expect("seasons"), vec![SEASON]);
    assert_eq!(reports::all_teams(&conn).expect("teams").len(), 9);
    assert_eq!(reports::all_referees(&conn).expect("referees")[0], "A Taylor");
    assert_eq!(
        reports::all_bookmakers(&conn).expect("bookmakers"),
        vec!["Bet&Win", "Bet365", "Interwetten", "Pinnacle Sports"]
    );
}

#[test]
fn empty_store_has_no_season_data() {
    let conn = open_in_memory().expect("db");
    assert!(!reports::has_season_data(&conn).expect("seasons"));
    assert!(reports::league_table(&conn, SEASON).expect("table").is_empty());
}

#[test]
fn league_table_orders_by_points_then_goal_difference() {
    let conn = loaded_db();
    let table = reports::league_table(&conn, SEASON).expect("table");
    assert_eq!(table.len(), 9);

    let top = &table[0];
    assert_eq!(top.team, "Liverpool");
    assert_eq!((top.played, top.won, top.drawn, top.lost), (2, 1, 1, 0));
    assert_eq!((top.goals_for, top.goals_against, top.goal_difference), (5, 2, 3));
    assert_eq!(top.points, 4);

    assert_eq!(table[1].team, "Burnley");
    assert_eq!(table[1].points, 4);
    assert_eq!(table[2].team, "Man City");
    assert_eq!(table[8].team, "West Ham");
}

#[test]
fn referee_averages_and_trend() {
    let conn = loaded_db();
    let stats = reports::referee_stats(&conn, SEASON, "M Oliver")
        .expect("stats")
        .expect("referee has matches");
    assert_eq!(stats.matches, 2);
    assert_eq!(stats.avg_yellow, 1.5);
    assert_eq!(stats.avg_red, 0.0);
    assert_eq!(stats.avg_fouls, 19.5);

    let trend = reports::referee_trend(&conn, SEASON, "M Oliver").expect("trend");
    let dates = trend.iter().map(|t| t.date.as_str()).collect::<Vec<_>>();
    assert_eq!(dates, vec!["2019-08-09", "2020-01-11"]);
    assert_eq!(trend[1].away_fouls, Some(12));

    assert!(
        reports::referee_stats(&conn, SEASON, "Nobody")
            .expect("stats")
            .is_none()
    );
}

#[test]
fn team_trend_and_matchday_points() {
    let conn = loaded_db();
    let points = reports::team_points_by_matchday(&conn, SEASON, "Burnley").expect("points");
    let seq = points
        .iter()
        .map(|p| (p.matchday, p.points))
        .collect::<Vec<_>>();
    assert_eq!(seq, vec![(1, 3), (2, 0), (3, 1)]);

    let trend = reports::team_match_trend(&conn, SEASON, "Burnley").expect("trend");
    assert_eq!(trend[0].venue, Venue::Home);
    assert_eq!(trend[0].opponent, "Southampton");
    assert_eq!(trend[1].venue, Venue::Away);
    assert_eq!((trend[1].goals_for, trend[1].goals_against), (Some(0), Some(3)));
}

#[test]
fn implied_probabilities_are_normalised() {
    let conn = loaded_db();
    let rows = reports::implied_probability_data(&conn, SEASON, "Bet365").expect("rows");
    assert_eq!(rows.len(), 6);
    for row in &rows {
        let total = row.home_prob + row.draw_prob + row.away_prob;
        assert!((total - 1.0).abs() < 1e-9);
        assert!(row.overround() > 0.0);
    }
    assert_eq!(rows[0].result, "H");
    assert_eq!(rows[0].home_odds, 1.14);

    let interwetten = reports::implied_probability_data(&conn, SEASON, "Interwetten").expect("rows");
    assert_eq!(interwetten.len(), 5);
}

#[test]
fn margins_are_sorted_descending() {
    let conn = loaded_db();
    let margins = reports::avg_margins_per_bookmaker(&conn, SEASON).expect("margins");
    assert_eq!(margins.len(), 4);
    for pair in margins.windows(2) {
        assert!(pair[0].avg_margin_pct >= pair[1].avg_margin_pct);
    }
    for m in &margins {
        assert!(m.avg_margin_pct > 0.0, "{} margin {}", m.bookmaker, m.avg_margin_pct);
        assert!(m.std_margin_pct >= 0.0);
    }
    let iw = margins
        .iter()
        .find(|m| m.bookmaker == "Interwetten")
        .expect("interwetten");
    assert_eq!(iw.matches, 5);
}

#[test]
fn workbook_export_writes_file() {
    let conn = loaded_db();
    let path = std::env::temp_dir().join(format!("pl_warehouse_export_{}.xlsx", std::process::id()));
    let report = export_season_workbook(&conn, SEASON, &path).expect("export");
    assert_eq!(report.teams, 9);
    assert_eq!(report.bookmakers, 4);
    assert!(path.exists());
    let _ = std::fs::remove_file(&path);
}
