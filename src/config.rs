use std::path::PathBuf;

pub const WORKSPACE_ENV: &str = "ACADENCE_WORKSPACE";
pub const LOG_ENV: &str = "ACADENCE_LOG";
pub const LOG_JSON_ENV: &str = "ACADENCE_LOG_JSON";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Workspace opened before the first request, if any.
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            workspace: None,
            log_filter: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Config {
            workspace: non_blank(WORKSPACE_ENV).map(PathBuf::from),
            log_filter: non_blank(LOG_ENV).unwrap_or(defaults.log_filter),
            log_json: non_blank(LOG_JSON_ENV)
                .map(|v| parse_bool(&v))
                .unwrap_or(defaults.log_json),
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
