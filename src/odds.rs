use rusqlite::Connection;
use tracing::info;

use crate::error::{EtlError, Result, StorageContext};
use crate::models::{
    BOOKMAKER_1X2_COLUMNS, BOOKMAKER_OU_COLUMNS, MARKET_1X2, MARKET_OVER_UNDER_25, MarketDef,
    NewOdds, OUTCOMES_1X2, OUTCOMES_OU, valid_odds,
};
use crate::schema::{STAGING_TABLE, quote_ident};
use crate::store::{self, value_as_f64};

/// One bookmaker's staging columns, positionally aligned with the market's outcomes.
struct BookColumns<'a> {
    name: &'a str,
    columns: &'a [&'a str],
}

pub fn normalize_1x2_odds(conn: &Connection) -> Result<usize> {
    let books = BOOKMAKER_1X2_COLUMNS
        .iter()
        .map(|(name, cols)| BookColumns {
            name: *name,
            columns: cols.as_slice(),
        })
        .collect::<Vec<_>>();
    let inserted = normalize_market(conn, &MARKET_1X2, &books, &OUTCOMES_1X2)?;
    info!(inserted, "1X2 odds normalized");
    Ok(inserted)
}

pub fn normalize_over_under_odds(conn: &Connection) -> Result<usize> {
    let books = BOOKMAKER_OU_COLUMNS
        .iter()
        .map(|(name, cols)| BookColumns {
            name: *name,
            columns: cols.as_slice(),
        })
        .collect::<Vec<_>>();
    let inserted = normalize_market(conn, &MARKET_OVER_UNDER_25, &books, &OUTCOMES_OU)?;
    info!(inserted, "Over/Under 2.5 odds normalized");
    Ok(inserted)
}

/// Expands wide odds columns into one BettingOdds row per (match, bookmaker,
/// outcome). Prices that are missing or not above 1.0 are skipped.
fn normalize_market(
    conn: &Connection,
    market: &MarketDef,
    books: &[BookColumns<'_>],
    outcomes: &[&'static str],
) -> Result<usize> {
    let market_id =
        store::market_id(conn, market)?.ok_or_else(|| EtlError::MissingMarket(market.label()))?;

    let mut bookmaker_ids = Vec::with_capacity(books.len());
    for book in books {
        let id = store::bookmaker_id(conn, book.name)?
            .ok_or_else(|| EtlError::MissingBookmaker(book.name.to_string()))?;
        bookmaker_ids.push(id);
    }

    let select = books
        .iter()
        .flat_map(|b| b.columns.iter())
        .map(|c| format!("s.{}", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        r#"
        SELECT m.MatchID, {select}
        FROM Matches m
        JOIN {STAGING_TABLE} s
          ON m.MatchDate = TRIM(s.Date) AND m.MatchTime IS TRIM(s.Time)
         AND m.HomeTeamID = (SELECT TeamID FROM Teams WHERE TeamName = TRIM(s.HomeTeam))
         AND m.AwayTeamID = (SELECT TeamID FROM Teams WHERE TeamName = TRIM(s.AwayTeam))
        ORDER BY m.MatchID, s.rowid
        "#
    );

    let mut stmt = conn.prepare(&sql).context("prepare staged odds query")?;
    let rows = stmt
        .query_map([], |row| {
            let match_id: i64 = row.get(0)?;
            let mut prices = Vec::new();
            let mut idx = 1usize;
            for book in books {
                for _ in book.columns {
                    prices.push(value_as_f64(row.get_ref(idx)?));
                    idx += 1;
                }
            }
            Ok((match_id, prices))
        })
        .context("query staged odds")?;

    let mut staged = Vec::new();
    for row in rows {
        staged.push(row.context("decode staged odds")?);
    }

    let mut inserted = 0usize;
    for (match_id, prices) in &staged {
        let mut offset = 0usize;
        for (book, bookmaker_id) in books.iter().zip(&bookmaker_ids) {
            for (outcome, price) in outcomes.iter().zip(&prices[offset..offset + book.columns.len()]) {
                let Some(value) = valid_odds(*price) else {
                    continue;
                };
                let odds = NewOdds {
                    match_id: *match_id,
                    bookmaker_id: *bookmaker_id,
                    market_id,
                    outcome: *outcome,
                    value,
                };
                if store::insert_odds_if_absent(conn, &odds)? {
                    inserted += 1;
                }
            }
            offset += book.columns.len();
        }
    }
    Ok(inserted)
}
