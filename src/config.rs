use std::path::PathBuf;

const APP_DIR: &str = "pl_warehouse";
const DB_FILE: &str = "premier_league.sqlite";

pub const DEFAULT_PROCESS_NAME: &str = "GUI ETL Job";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: Option<PathBuf>,
    pub process_name: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            process_name: DEFAULT_PROCESS_NAME.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Settings {
    /// Reads `.env.local` and `.env` (first one wins per key), then the process env.
    pub fn from_env() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        if let Some(path) = non_empty(lookup("PL_ETL_DB")) {
            settings.db_path = Some(PathBuf::from(path));
        }
        if let Some(name) = non_empty(lookup("PL_ETL_PROCESS_NAME")) {
            settings.process_name = name;
        }
        if let Some(filter) = non_empty(lookup("PL_ETL_LOG")) {
            settings.log_filter = filter;
        }
        settings
    }
}

pub fn app_data_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join(DB_FILE))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
