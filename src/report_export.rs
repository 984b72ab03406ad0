use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::reports;

pub struct ExportReport {
    pub teams: usize,
    pub bookmakers: usize,
}

/// Writes the league table and bookmaker margins of one season to an xlsx file.
pub fn export_season_workbook(conn: &Connection, season: &str, path: &Path) -> Result<ExportReport> {
    let table = reports::league_table(conn, season).context("load league table")?;
    let margins = reports::avg_margins_per_bookmaker(conn, season).context("load margins")?;

    let mut table_rows = vec![vec![
        "Pos".to_string(),
        "Team".to_string(),
        "P".to_string(),
        "W".to_string(),
        "D".to_string(),
        "L".to_string(),
        "GF".to_string(),
        "GA".to_string(),
        "GD".to_string(),
        "Pts".to_string(),
    ]];
    for (idx, row) in table.iter().enumerate() {
        table_rows.push(vec![
            (idx + 1).to_string(),
            row.team.clone(),
            row.played.to_string(),
            row.won.to_string(),
            row.drawn.to_string(),
            row.lost.to_string(),
            row.goals_for.to_string(),
            row.goals_against.to_string(),
            row.goal_difference.to_string(),
            row.points.to_string(),
        ]);
    }

    let mut margin_rows = vec![vec![
        "Bookmaker".to_string(),
        "Matches".to_string(),
        "Avg Margin %".to_string(),
        "Std Margin %".to_string(),
    ]];
    for row in &margins {
        margin_rows.push(vec![
            row.bookmaker.clone(),
            row.matches.to_string(),
            format!("{:.2}", row.avg_margin_pct),
            format!("{:.2}", row.std_margin_pct),
        ]);
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("League Table")?;
    write_rows(sheet, &table_rows)?;

    let sheet = workbook.add_worksheet();
    sheet.set_name("Bookmaker Margins")?;
    write_rows(sheet, &margin_rows)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create export dir {}", parent.display()))?;
    }
    workbook
        .save(path)
        .with_context(|| format!("save workbook {}", path.display()))?;

    Ok(ExportReport {
        teams: table.len(),
        bookmakers: margins.len(),
    })
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
