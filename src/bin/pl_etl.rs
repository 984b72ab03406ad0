use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;

use pl_warehouse::config::Settings;
use pl_warehouse::{
    csv_import, dedup, job_log, logging, maintenance, pipeline, report_export, reports, schema,
    staging,
};

#[derive(Parser)]
#[command(name = "pl_etl")]
#[command(version, about = "Premier League CSV warehouse loader", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database path (overrides PL_ETL_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Process name recorded in ETLLog (overrides PL_ETL_PROCESS_NAME)
    #[arg(long, global = true)]
    process_name: Option<String>,

    /// Default tracing filter when RUST_LOG is unset (overrides PL_ETL_LOG)
    #[arg(long, global = true)]
    log: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Append a football-data CSV to the staging table
    Load { csv: PathBuf },
    /// Run the ETL job over the staging table
    Run,
    /// Merge duplicate bookmakers and add the unique name index
    Dedup,
    /// Empty the warehouse and staging tables
    Clean,
    /// Staging and season overview
    Status,
    /// Print the ETL job log, newest first
    Log,
    /// Print dead-letter rows, newest first
    DeadLetter,
    /// Delete every ETL job log entry
    ClearLog,
    /// Print a report as JSON
    Report {
        #[arg(value_enum)]
        kind: ReportKind,
        #[arg(long)]
        season: Option<String>,
        #[arg(long)]
        team: Option<String>,
        #[arg(long)]
        referee: Option<String>,
        #[arg(long)]
        bookmaker: Option<String>,
    },
    /// Write league table and bookmaker margins to an xlsx workbook
    Export {
        path: PathBuf,
        #[arg(long)]
        season: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportKind {
    Seasons,
    Teams,
    Referees,
    Bookmakers,
    LeagueTable,
    RefereeStats,
    RefereeTrend,
    TeamPoints,
    TeamTrend,
    ImpliedProbability,
    Margins,
}

#[derive(Serialize)]
struct Status {
    staging_rows: i64,
    staging_columns: Vec<String>,
    has_season_data: bool,
}

fn main() -> Result<()> {
    let mut settings = Settings::from_env();
    let cli = Cli::parse();
    if let Some(db) = cli.db {
        settings.db_path = Some(db);
    }
    if let Some(name) = cli.process_name {
        settings.process_name = name;
    }
    if let Some(filter) = cli.log {
        settings.log_filter = filter;
    }
    logging::init_tracing(&settings.log_filter)?;

    let db_path = settings
        .db_path
        .clone()
        .context("unable to resolve sqlite path")?;
    let mut conn = schema::open_db(&db_path)?;
    info!(db = %db_path.display(), "database opened");

    match cli.command {
        Command::Load { csv } => {
            let batch = csv_import::read_staging_csv_path(&csv)?;
            let rows = staging::load_csv_to_staging(&mut conn, &batch)?;
            println!("Loaded {rows} rows into {}.", schema::STAGING_TABLE);
        }
        Command::Run => {
            let report = pipeline::trigger_etl_job(&mut conn, &settings.process_name)?;
            println!("{}", report.summary());
        }
        Command::Dedup => {
            let report = dedup::deduplicate_bookmakers(&mut conn)?;
            println!("{}", report.message());
        }
        Command::Clean => {
            maintenance::clean_all_tables(&mut conn)?;
            println!("All tables cleaned.");
        }
        Command::Status => print_json(&Status {
            staging_rows: staging::staging_row_count(&conn)?,
            staging_columns: staging::staging_columns(&conn)?,
            has_season_data: reports::has_season_data(&conn)?,
        })?,
        Command::Log => print_json(&job_log::fetch_etl_log(&conn)?)?,
        Command::DeadLetter => print_json(&job_log::fetch_dead_letter(&conn)?)?,
        Command::ClearLog => {
            job_log::clear_etl_logs(&mut conn)?;
            println!("ETL log cleared.");
        }
        Command::Report {
            kind,
            season,
            team,
            referee,
            bookmaker,
        } => {
            let season = season.as_deref();
            match kind {
                ReportKind::Seasons => print_json(&reports::all_seasons(&conn)?)?,
                ReportKind::Teams => print_json(&reports::all_teams(&conn)?)?,
                ReportKind::Referees => print_json(&reports::all_referees(&conn)?)?,
                ReportKind::Bookmakers => print_json(&reports::all_bookmakers(&conn)?)?,
                ReportKind::LeagueTable => {
                    let season = required(season, "--season")?;
                    print_json(&reports::league_table(&conn, season)?)?
                }
                ReportKind::RefereeStats => {
                    let season = required(season, "--season")?;
                    let referee = required(referee.as_deref(), "--referee")?;
                    print_json(&reports::referee_stats(&conn, season, referee)?)?
                }
                ReportKind::RefereeTrend => {
                    let season = required(season, "--season")?;
                    let referee = required(referee.as_deref(), "--referee")?;
                    print_json(&reports::referee_trend(&conn, season, referee)?)?
                }
                ReportKind::TeamPoints => {
                    let season = required(season, "--season")?;
                    let team = required(team.as_deref(), "--team")?;
                    print_json(&reports::team_points_by_matchday(&conn, season, team)?)?
                }
                ReportKind::TeamTrend => {
                    let season = required(season, "--season")?;
                    let team = required(team.as_deref(), "--team")?;
                    print_json(&reports::team_match_trend(&conn, season, team)?)?
                }
                ReportKind::ImpliedProbability => {
                    let season = required(season, "--season")?;
                    let bookmaker = required(bookmaker.as_deref(), "--bookmaker")?;
                    print_json(&reports::implied_probability_data(&conn, season, bookmaker)?)?
                }
                ReportKind::Margins => {
                    let season = required(season, "--season")?;
                    print_json(&reports::avg_margins_per_bookmaker(&conn, season)?)?
                }
            }
        }
        Command::Export { path, season } => {
            let report = report_export::export_season_workbook(&conn, &season, &path)?;
            println!("Workbook saved to {}", path.display());
            println!("Teams: {}", report.teams);
            println!("Bookmakers: {}", report.bookmakers);
        }
    }

    Ok(())
}

fn required<'a>(value: Option<&'a str>, flag: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => bail!("this report needs {flag}"),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize report")?;
    println!("{text}");
    Ok(())
}
