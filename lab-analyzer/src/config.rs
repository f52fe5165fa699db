use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";
pub const TAVILY_API_KEY: &str = "TAVILY_API_KEY";

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TAVILY_BASE_URL: &str = "https://api.tavily.com";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API keys are missing: {} must be set", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

/// Service configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub google_api_key: String,
    pub tavily_api_key: String,
    pub port: u16,
    pub model: String,
    pub gemini_base_url: String,
    pub tavily_base_url: String,
    /// Width in pixels of upload previews
    pub preview_width: u32,
    /// Where uploads are staged for the analysis call; system temp dir when unset
    pub staging_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
    /// How many web-search round trips one model call may make
    pub max_tool_rounds: usize,
    pub search_results: usize,
    pub request_timeout: Duration,
    /// Sessions untouched for this long are dropped
    pub session_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Both credentials are
    /// checked before anything else so a missing key is always reported.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let google_api_key = non_empty(GOOGLE_API_KEY);
        let tavily_api_key = non_empty(TAVILY_API_KEY);
        let (google_api_key, tavily_api_key) = match (google_api_key, tavily_api_key) {
            (Some(google), Some(tavily)) => (google, tavily),
            (google, tavily) => {
                let mut missing = Vec::new();
                if tavily.is_none() {
                    missing.push(TAVILY_API_KEY);
                }
                if google.is_none() {
                    missing.push(GOOGLE_API_KEY);
                }
                return Err(ConfigError::MissingCredentials(missing));
            }
        };

        let max_upload_mb: usize = parse_or(&non_empty, "LAB_MAX_UPLOAD_MB", 200)?;
        let timeout_secs: u64 = parse_or(&non_empty, "LAB_REQUEST_TIMEOUT_SECS", 120)?;
        let preview_width: u32 = parse_or(&non_empty, "LAB_PREVIEW_WIDTH", 300)?;
        if preview_width == 0 {
            return Err(ConfigError::InvalidValue {
                key: "LAB_PREVIEW_WIDTH",
                value: "0".to_string(),
            });
        }
        let session_ttl_secs: u64 = parse_or(&non_empty, "LAB_SESSION_TTL_SECS", 3600)?;
        if session_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "LAB_SESSION_TTL_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            google_api_key,
            tavily_api_key,
            port: parse_or(&non_empty, "PORT", 3000)?,
            model: non_empty("LAB_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_base_url: non_empty("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            tavily_base_url: non_empty("TAVILY_BASE_URL")
                .unwrap_or_else(|| DEFAULT_TAVILY_BASE_URL.to_string()),
            preview_width,
            staging_dir: non_empty("LAB_STAGING_DIR").map(PathBuf::from),
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            max_tool_rounds: parse_or(&non_empty, "LAB_MAX_TOOL_ROUNDS", 4)?,
            search_results: parse_or(&non_empty, "LAB_SEARCH_RESULTS", 5)?,
            request_timeout: Duration::from_secs(timeout_secs),
            session_ttl: Duration::from_secs(session_ttl_secs),
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}
