//! Read-only queries over the warehouse backing the league table, referee,
//! team trend and odds analysis screens.

use rusqlite::{Connection, Params, Row, params};
use serde::Serialize;

use crate::error::{Result, StorageContext};
use crate::models::MARKET_1X2;
use crate::store::table_count;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeagueTableRow {
    pub team: String,
    pub played: i64,
    pub won: i64,
    pub drawn: i64,
    pub lost: i64,
    pub goals_for: i64,
    pub goals_against: i64,
    pub goal_difference: i64,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefereeStats {
    pub matches: i64,
    pub avg_yellow: f64,
    pub avg_red: f64,
    pub avg_fouls: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefereeMatchCards {
    pub date: String,
    pub home_yellow: Option<i64>,
    pub away_yellow: Option<i64>,
    pub home_red: Option<i64>,
    pub away_red: Option<i64>,
    pub home_fouls: Option<i64>,
    pub away_fouls: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchdayPoints {
    pub matchday: usize,
    pub date: String,
    pub points: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Venue {
    Home,
    Away,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamMatchTrend {
    pub date: String,
    pub points: i64,
    pub goals_for: Option<i64>,
    pub goals_against: Option<i64>,
    pub venue: Venue,
    pub opponent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpliedOdds {
    pub home_odds: f64,
    pub draw_odds: f64,
    pub away_odds: f64,
    pub result: String,
    pub home_prob: f64,
    pub draw_prob: f64,
    pub away_prob: f64,
}

impl ImpliedOdds {
    fn from_prices(home_odds: f64, draw_odds: f64, away_odds: f64, result: String) -> Self {
        let (h, d, a) = (1.0 / home_odds, 1.0 / draw_odds, 1.0 / away_odds);
        let book = h + d + a;
        Self {
            home_odds,
            draw_odds,
            away_odds,
            result,
            home_prob: h / book,
            draw_prob: d / book,
            away_prob: a / book,
        }
    }

    /// Sum of raw implied probabilities minus one.
    pub fn overround(&self) -> f64 {
        1.0 / self.home_odds + 1.0 / self.draw_odds + 1.0 / self.away_odds - 1.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookmakerMargin {
    pub bookmaker: String,
    pub matches: usize,
    pub avg_margin_pct: f64,
    pub std_margin_pct: f64,
}

pub fn has_season_data(conn: &Connection) -> Result<bool> {
    Ok(table_count(conn, "Seasons")? > 0)
}

pub fn all_seasons(conn: &Connection) -> Result<Vec<String>> {
    names(
        conn,
        "SELECT SeasonName FROM Seasons ORDER BY StartDate DESC, SeasonName",
    )
}

pub fn all_teams(conn: &Connection) -> Result<Vec<String>> {
    names(conn, "SELECT TeamName FROM Teams ORDER BY TeamName")
}

pub fn all_referees(conn: &Connection) -> Result<Vec<String>> {
    names(conn, "SELECT RefereeName FROM Referees ORDER BY RefereeName")
}

/// Distinct names, so undeduplicated copies are listed once.
pub fn all_bookmakers(conn: &Connection) -> Result<Vec<String>> {
    names(
        conn,
        "SELECT DISTINCT BookmakerName FROM Bookmakers ORDER BY BookmakerName",
    )
}

pub fn league_table(conn: &Connection, season: &str) -> Result<Vec<LeagueTableRow>> {
    collect(
        conn,
        "SELECT TeamName, Played, Won, Drawn, Lost, GF, GA, GD, Points
         FROM vw_LeagueTable
         WHERE SeasonName = ?1
         ORDER BY Points DESC, GD DESC, GF DESC, TeamName",
        params![season],
        |row| {
            Ok(LeagueTableRow {
                team: row.get(0)?,
                played: row.get(1)?,
                won: row.get(2)?,
                drawn: row.get(3)?,
                lost: row.get(4)?,
                goals_for: row.get(5)?,
                goals_against: row.get(6)?,
                goal_difference: row.get(7)?,
                points: row.get(8)?,
            })
        },
        "league table",
    )
}

/// `None` when the referee has no matches with statistics in the season.
pub fn referee_stats(conn: &Connection, season: &str, referee: &str) -> Result<Option<RefereeStats>> {
    let stats = conn
        .query_row(
            "SELECT COUNT(ms.MatchID),
                    COALESCE(SUM(ms.HomeYellowCards + ms.AwayYellowCards), 0),
                    COALESCE(SUM(ms.HomeRedCards + ms.AwayRedCards), 0),
                    COALESCE(SUM(ms.HomeFouls + ms.AwayFouls), 0)
             FROM MatchStatistics ms
             JOIN Matches m ON ms.MatchID = m.MatchID
             JOIN Seasons s ON m.SeasonID = s.SeasonID
             JOIN Referees r ON m.RefereeID = r.RefereeID
             WHERE s.SeasonName = ?1 AND r.RefereeName = ?2",
            params![season, referee],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )
        .context("query referee stats")?;

    let (matches, yellow, red, fouls) = stats;
    if matches == 0 {
        return Ok(None);
    }
    let per_match = |total: i64| total as f64 / matches as f64;
    Ok(Some(RefereeStats {
        matches,
        avg_yellow: per_match(yellow),
        avg_red: per_match(red),
        avg_fouls: per_match(fouls),
    }))
}

pub fn referee_trend(conn: &Connection, season: &str, referee: &str) -> Result<Vec<RefereeMatchCards>> {
    collect(
        conn,
        "SELECT m.MatchDate,
                ms.HomeYellowCards, ms.AwayYellowCards,
                ms.HomeRedCards, ms.AwayRedCards,
                ms.HomeFouls, ms.AwayFouls
         FROM MatchStatistics ms
         JOIN Matches m ON ms.MatchID = m.MatchID
         JOIN Referees r ON m.RefereeID = r.RefereeID
         JOIN Seasons s ON m.SeasonID = s.SeasonID
         WHERE r.RefereeName = ?1 AND s.SeasonName = ?2
         ORDER BY m.MatchDate, m.MatchID",
        params![referee, season],
        |row| {
            Ok(RefereeMatchCards {
                date: row.get(0)?,
                home_yellow: row.get(1)?,
                away_yellow: row.get(2)?,
                home_red: row.get(3)?,
                away_red: row.get(4)?,
                home_fouls: row.get(5)?,
                away_fouls: row.get(6)?,
            })
        },
        "referee trend",
    )
}

const TEAM_MATCHES_SQL: &str = "
    SELECT m.MatchDate,
           CASE
               WHEN m.HomeTeamID = t.TeamID THEN
                   CASE m.FTR WHEN 'H' THEN 3 WHEN 'D' THEN 1 ELSE 0 END
               ELSE
                   CASE m.FTR WHEN 'A' THEN 3 WHEN 'D' THEN 1 ELSE 0 END
           END AS Points,
           CASE WHEN m.HomeTeamID = t.TeamID THEN m.FTHG ELSE m.FTAG END AS GF,
           CASE WHEN m.HomeTeamID = t.TeamID THEN m.FTAG ELSE m.FTHG END AS GA,
           m.HomeTeamID = t.TeamID AS AtHome,
           CASE WHEN m.HomeTeamID = t.TeamID THEN away.TeamName ELSE home.TeamName END AS Opponent
    FROM Matches m
    JOIN Teams t ON t.TeamName = ?1
    JOIN Teams home ON home.TeamID = m.HomeTeamID
    JOIN Teams away ON away.TeamID = m.AwayTeamID
    JOIN Seasons s ON m.SeasonID = s.SeasonID
    WHERE s.SeasonName = ?2
      AND (m.HomeTeamID = t.TeamID OR m.AwayTeamID = t.TeamID)
      AND m.FTR IN ('H', 'D', 'A')
    ORDER BY m.MatchDate, m.MatchTime, m.MatchID";

pub fn team_match_trend(conn: &Connection, season: &str, team: &str) -> Result<Vec<TeamMatchTrend>> {
    collect(
        conn,
        TEAM_MATCHES_SQL,
        params![team, season],
        |row| {
            let at_home: bool = row.get(4)?;
            Ok(TeamMatchTrend {
                date: row.get(0)?,
                points: row.get(1)?,
                goals_for: row.get(2)?,
                goals_against: row.get(3)?,
                venue: if at_home { Venue::Home } else { Venue::Away },
                opponent: row.get(5)?,
            })
        },
        "team match trend",
    )
}

/// Points per decided match, numbered from matchday 1 in date order.
pub fn team_points_by_matchday(conn: &Connection, season: &str, team: &str) -> Result<Vec<MatchdayPoints>> {
    Ok(team_match_trend(conn, season, team)?
        .into_iter()
        .enumerate()
        .map(|(idx, m)| MatchdayPoints {
            matchday: idx + 1,
            date: m.date,
            points: m.points,
        })
        .collect())
}

const ODDS_TRIPLES_SQL: &str = "
    SELECT b.BookmakerName, boh.OddsValue, bod.OddsValue, boa.OddsValue, m.FTR
    FROM BettingOdds boh
    JOIN BettingOdds bod ON bod.MatchID = boh.MatchID AND bod.BookmakerID = boh.BookmakerID
        AND bod.MarketID = boh.MarketID AND bod.OutcomeCode = 'D'
    JOIN BettingOdds boa ON boa.MatchID = boh.MatchID AND boa.BookmakerID = boh.BookmakerID
        AND boa.MarketID = boh.MarketID AND boa.OutcomeCode = 'A'
    JOIN Matches m ON m.MatchID = boh.MatchID
    JOIN Seasons s ON s.SeasonID = m.SeasonID
    JOIN Bookmakers b ON b.BookmakerID = boh.BookmakerID
    JOIN Markets mk ON mk.MarketID = boh.MarketID
    WHERE boh.OutcomeCode = 'H'
      AND mk.MarketType = ?1 AND mk.MarketSubtype = ?2
      AND s.SeasonName = ?3";

pub fn implied_probability_data(conn: &Connection, season: &str, bookmaker: &str) -> Result<Vec<ImpliedOdds>> {
    let sql = format!(
        "{ODDS_TRIPLES_SQL}
         AND b.BookmakerName = ?4
         AND m.FTR IN ('H', 'D', 'A')
         ORDER BY m.MatchDate, m.MatchID"
    );
    collect(
        conn,
        &sql,
        params![MARKET_1X2.market_type, MARKET_1X2.subtype, season, bookmaker],
        |row| {
            Ok(ImpliedOdds::from_prices(
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        },
        "implied probabilities",
    )
}

/// Mean and population standard deviation of the 1X2 overround, in percent.
/// Triples with any price at or below 1.01 are ignored.
pub fn avg_margins_per_bookmaker(conn: &Connection, season: &str) -> Result<Vec<BookmakerMargin>> {
    let sql = format!(
        "{ODDS_TRIPLES_SQL}
         AND boh.OddsValue > 1.01 AND bod.OddsValue > 1.01 AND boa.OddsValue > 1.01
         ORDER BY b.BookmakerName"
    );
    let triples = collect(
        conn,
        &sql,
        params![MARKET_1X2.market_type, MARKET_1X2.subtype, season],
        |row| {
            let (h, d, a): (f64, f64, f64) = (row.get(1)?, row.get(2)?, row.get(3)?);
            Ok((row.get::<_, String>(0)?, (1.0 / h + 1.0 / d + 1.0 / a - 1.0) * 100.0))
        },
        "bookmaker margins",
    )?;

    let mut out: Vec<BookmakerMargin> = Vec::new();
    let mut start = 0usize;
    while start < triples.len() {
        let name = &triples[start].0;
        let end = triples[start..]
            .iter()
            .position(|(n, _)| n != name)
            .map_or(triples.len(), |offset| start + offset);
        let margins = triples[start..end].iter().map(|(_, m)| *m).collect::<Vec<_>>();
        let (mean, std) = mean_and_population_std(&margins);
        out.push(BookmakerMargin {
            bookmaker: name.clone(),
            matches: margins.len(),
            avg_margin_pct: mean,
            std_margin_pct: std,
        });
        start = end;
    }
    out.sort_by(|a, b| b.avg_margin_pct.total_cmp(&a.avg_margin_pct));
    Ok(out)
}

fn mean_and_population_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn names(conn: &Connection, sql: &str) -> Result<Vec<String>> {
    collect(conn, sql, params![], |row| row.get(0), "name list")
}

fn collect<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    what: &str,
) -> Result<Vec<T>> {
    let mut stmt = conn
        .prepare(sql)
        .context(&format!("prepare {what} query"))?;
    let rows = stmt
        .query_map(params, map)
        .context(&format!("query {what}"))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context(&format!("decode {what} row"))?);
    }
    Ok(out)
}
