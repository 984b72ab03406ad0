use rusqlite::Connection;
use tracing::info;

use crate::error::{EtlError, Result, StorageContext};
use crate::models::{BOOKMAKER_1X2_COLUMNS, MARKETS, season_name, team_short_name};
use crate::schema::STAGING_TABLE;
use crate::store;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSummary {
    pub teams: usize,
    pub season: String,
    pub referees: usize,
    pub divisions: usize,
    pub markets: usize,
    pub bookmakers: usize,
}

pub fn resolve_references(conn: &Connection) -> Result<ReferenceSummary> {
    let summary = ReferenceSummary {
        teams: resolve_teams(conn)?,
        season: resolve_season(conn)?,
        referees: resolve_referees(conn)?,
        divisions: resolve_divisions(conn)?,
        markets: seed_markets(conn)?,
        bookmakers: seed_bookmakers(conn)?,
    };
    info!(
        teams = summary.teams,
        season = %summary.season,
        referees = summary.referees,
        divisions = summary.divisions,
        "reference entities resolved"
    );
    Ok(summary)
}

pub fn resolve_teams(conn: &Connection) -> Result<usize> {
    let teams = distinct_names(
        conn,
        &format!(
            "SELECT DISTINCT TRIM(HomeTeam) FROM {STAGING_TABLE}
             WHERE HomeTeam IS NOT NULL AND TRIM(HomeTeam) <> ''
             UNION
             SELECT DISTINCT TRIM(AwayTeam) FROM {STAGING_TABLE}
             WHERE AwayTeam IS NOT NULL AND TRIM(AwayTeam) <> ''"
        ),
        "query staging teams",
    )?;
    for team in &teams {
        store::insert_team_if_absent(conn, team, &team_short_name(team))?;
    }
    Ok(teams.len())
}

/// Names the season from the earliest and latest dates in the whole staging table.
pub fn resolve_season(conn: &Connection) -> Result<String> {
    let (min_date, max_date) = conn
        .query_row(
            &format!("SELECT MIN(Date), MAX(Date) FROM {STAGING_TABLE} WHERE Date IS NOT NULL AND Date <> ''"),
            [],
            |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?)),
        )
        .context("query staging date range")?;
    let (Some(min_date), Some(max_date)) = (min_date, max_date) else {
        return Err(EtlError::EmptyStaging);
    };
    let name = season_name(&min_date, &max_date).ok_or(EtlError::EmptyStaging)?;
    store::insert_season_if_absent(conn, &name, &min_date, &max_date)?;
    Ok(name)
}

pub fn resolve_referees(conn: &Connection) -> Result<usize> {
    let referees = distinct_names(
        conn,
        &format!(
            "SELECT DISTINCT TRIM(Referee) FROM {STAGING_TABLE}
             WHERE Referee IS NOT NULL AND TRIM(Referee) <> ''"
        ),
        "query staging referees",
    )?;
    for referee in &referees {
        store::insert_referee_if_absent(conn, referee)?;
    }
    Ok(referees.len())
}

pub fn resolve_divisions(conn: &Connection) -> Result<usize> {
    let divisions = distinct_names(
        conn,
        &format!(
            "SELECT DISTINCT TRIM(\"Div\") FROM {STAGING_TABLE}
             WHERE \"Div\" IS NOT NULL AND TRIM(\"Div\") <> ''"
        ),
        "query staging divisions",
    )?;
    for code in &divisions {
        store::insert_division_if_absent(conn, code)?;
    }
    Ok(divisions.len())
}

pub fn seed_markets(conn: &Connection) -> Result<usize> {
    for market in &MARKETS {
        store::insert_market_if_absent(conn, market)?;
    }
    Ok(MARKETS.len())
}

pub fn seed_bookmakers(conn: &Connection) -> Result<usize> {
    for (name, _) in &BOOKMAKER_1X2_COLUMNS {
        store::seed_bookmaker(conn, name)?;
    }
    Ok(BOOKMAKER_1X2_COLUMNS.len())
}

fn distinct_names(conn: &Connection, sql: &str, context: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql).context(context)?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context(context)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context(context)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use rusqlite::params;

    use super::*;
    use crate::schema::open_in_memory;
    use crate::store::table_count;

    fn stage(conn: &Connection, date: &str, home: &str, away: &str, referee: Option<&str>) {
        conn.execute(
            &format!(
                "INSERT INTO {STAGING_TABLE} (\"Div\", Date, HomeTeam, AwayTeam, Referee)
                 VALUES ('E0', ?1, ?2, ?3, ?4)"
            ),
            params![date, home, away, referee],
        )
        .unwrap();
    }

    #[test]
    fn teams_union_home_and_away() {
        let conn = open_in_memory().unwrap();
        stage(&conn, "2020-01-01", "Arsenal", "Chelsea", None);
        stage(&conn, "2020-01-08", "Chelsea", "Everton", None);
        assert_eq!(resolve_teams(&conn).unwrap(), 3);
        assert_eq!(resolve_teams(&conn).unwrap(), 3);
        assert_eq!(table_count(&conn, "Teams").unwrap(), 3);
    }

    #[test]
    fn season_spans_whole_staging_table() {
        let conn = open_in_memory().unwrap();
        stage(&conn, "2019-08-09", "Liverpool", "Norwich", None);
        stage(&conn, "2020-07-26", "Norwich", "Liverpool", None);
        assert_eq!(resolve_season(&conn).unwrap(), "19-20");
        let (start, end): (String, String) = conn
            .query_row("SELECT StartDate, EndDate FROM Seasons", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(start, "2019-08-09");
        assert_eq!(end, "2020-07-26");
    }

    #[test]
    fn empty_staging_has_no_season() {
        let conn = open_in_memory().unwrap();
        assert!(matches!(resolve_season(&conn), Err(EtlError::EmptyStaging)));
    }

    #[test]
    fn blank_referees_are_ignored() {
        let conn = open_in_memory().unwrap();
        stage(&conn, "2020-01-01", "Arsenal", "Chelsea", Some("M Oliver"));
        stage(&conn, "2020-01-02", "Everton", "Burnley", Some("  "));
        stage(&conn, "2020-01-03", "Watford", "Leeds", None);
        assert_eq!(resolve_referees(&conn).unwrap(), 1);
    }

    #[test]
    fn bookmakers_duplicate_per_call() {
        let conn = open_in_memory().unwrap();
        seed_bookmakers(&conn).unwrap();
        seed_bookmakers(&conn).unwrap();
        assert_eq!(table_count(&conn, "Bookmakers").unwrap(), 8);
        seed_markets(&conn).unwrap();
        seed_markets(&conn).unwrap();
        assert_eq!(table_count(&conn, "Markets").unwrap(), 2);
    }
}
