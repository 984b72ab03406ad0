use serde::Serialize;

pub const LEAGUE_NAME: &str = "Premier League";
pub const LEAGUE_COUNTRY: &str = "England";
pub const LEAGUE_TIER: i64 = 1;
pub const TEAM_SHORT_NAME_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketDef {
    pub market_type: &'static str,
    pub subtype: &'static str,
    pub parameter: &'static str,
    pub description: &'static str,
}

impl MarketDef {
    pub fn label(&self) -> String {
        format!("{} / {}", self.market_type, self.subtype)
    }
}

pub const MARKET_1X2: MarketDef = MarketDef {
    market_type: "1X2",
    subtype: "FullTime",
    parameter: "standard",
    description: "Full-time result: Home/Draw/Away",
};

pub const MARKET_OVER_UNDER_25: MarketDef = MarketDef {
    market_type: "OverUnder",
    subtype: "FullTime",
    parameter: "2.5",
    description: "Over/Under 2.5 total goals",
};

pub const MARKETS: [MarketDef; 2] = [MARKET_1X2, MARKET_OVER_UNDER_25];

/// Staging odds columns per bookmaker for the 1X2 market (home, draw, away).
pub static BOOKMAKER_1X2_COLUMNS: [(&str, [&str; 3]); 4] = [
    ("Bet365", ["B365H", "B365D", "B365A"]),
    ("Bet&Win", ["BWH", "BWD", "BWA"]),
    ("Interwetten", ["IWH", "IWD", "IWA"]),
    ("Pinnacle Sports", ["PSH", "PSD", "PSA"]),
];

/// Staging odds columns per bookmaker for Over/Under 2.5 (over, under).
pub static BOOKMAKER_OU_COLUMNS: [(&str, [&str; 2]); 2] = [
    ("Bet365", ["B365_2_5O", "B365_2_5U"]),
    ("Pinnacle Sports", ["P_2_5O", "P_2_5U"]),
];

pub const OUTCOMES_1X2: [&str; 3] = ["H", "D", "A"];
pub const OUTCOMES_OU: [&str; 2] = ["Over", "Under"];

/// Natural key of a match inside one staging batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchKey {
    pub date: String,
    pub time: Option<String>,
    pub home_team: String,
    pub away_team: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMatch {
    pub season_id: i64,
    pub division_id: i64,
    pub date: String,
    pub time: Option<String>,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub fthg: Option<i64>,
    pub ftag: Option<i64>,
    pub ftr: Option<String>,
    pub hthg: Option<i64>,
    pub htag: Option<i64>,
    pub htr: Option<String>,
    pub referee_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchStats {
    pub home_shots: Option<i64>,
    pub away_shots: Option<i64>,
    pub home_shots_target: Option<i64>,
    pub away_shots_target: Option<i64>,
    pub home_corners: Option<i64>,
    pub away_corners: Option<i64>,
    pub home_fouls: Option<i64>,
    pub away_fouls: Option<i64>,
    pub home_yellow: Option<i64>,
    pub away_yellow: Option<i64>,
    pub home_red: Option<i64>,
    pub away_red: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOdds {
    pub match_id: i64,
    pub bookmaker_id: i64,
    pub market_id: i64,
    pub outcome: &'static str,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Running => "Running",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Running" => Some(JobStatus::Running),
            "Completed" => Some(JobStatus::Completed),
            "Failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EtlLogEntry {
    pub log_id: i64,
    pub process_name: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub records_processed: Option<i64>,
    pub records_failed: Option<i64>,
    pub status: JobStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    pub id: i64,
    pub source_table: String,
    pub source_id: Option<i64>,
    pub error_message: String,
    pub error_timestamp: String,
}

/// Short display name stored next to the full team name.
pub fn team_short_name(name: &str) -> String {
    name.chars().take(TEAM_SHORT_NAME_LEN).collect()
}

/// "YY-YY" from the first and last match dates (ISO text).
pub fn season_name(start: &str, end: &str) -> Option<String> {
    let sy = year_of(start)? % 100;
    let ey = year_of(end)? % 100;
    Some(format!("{sy:02}-{ey:02}"))
}

fn year_of(iso_date: &str) -> Option<i32> {
    iso_date.get(0..4)?.parse::<i32>().ok()
}

/// Prices of 1.0 or less carry no payout and are dropped.
pub fn valid_odds(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 1.0)
}
