/// Concierge configuration, read from the environment (and `.env` via dotenv in the binaries)

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

pub const DEFAULT_SERP_BASE_URL: &str = "https://serpapi.com";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_PORT: u16 = 8080;

/// Which classifier and extractor pick capabilities and fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterMode {
    Keyword,
    Llm,
}

impl FromStr for RouterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(RouterMode::Keyword),
            "llm" => Ok(RouterMode::Llm),
            other => Err(format!("expected `keyword` or `llm`, got `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarizerMode {
    Template,
    Llm,
    Off,
}

impl FromStr for SummarizerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "template" => Ok(SummarizerMode::Template),
            "llm" => Ok(SummarizerMode::Llm),
            "off" | "none" => Ok(SummarizerMode::Off),
            other => Err(format!("expected `template`, `llm` or `off`, got `{}`", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Everything the concierge binaries need at startup
#[derive(Debug, Clone)]
pub struct ConciergeConfig {
    pub serp_api_key: String,
    pub serp_base_url: String,
    /// `None` when no OpenAI key is set; voice transcription and trip planning are then unavailable
    pub openai: Option<OpenAiConfig>,
    pub router: RouterMode,
    pub summarizer: SummarizerMode,
    pub port: u16,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
}

impl ConciergeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let serp_api_key = get("SERP_API_KEY")
            .or_else(|| get("SERP_API"))
            .ok_or_else(|| ConfigError::Missing("SERP_API_KEY".to_string()))?;
        let serp_base_url = get("SERP_API_BASE_URL").unwrap_or_else(|| DEFAULT_SERP_BASE_URL.to_string());

        let router = parse(&get, "CONCIERGE_ROUTER", RouterMode::Keyword)?;
        let summarizer = parse(&get, "CONCIERGE_SUMMARIZER", SummarizerMode::Template)?;

        let openai = get("OPENAI_API_KEY").map(|api_key| OpenAiConfig {
            api_key,
            base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        });
        if openai.is_none() && (router == RouterMode::Llm || summarizer == SummarizerMode::Llm) {
            return Err(ConfigError::Missing("OPENAI_API_KEY".to_string()));
        }

        let port = parse(&get, "CONCIERGE_PORT", DEFAULT_PORT)?;
        let http_timeout = Duration::from_secs(parse(&get, "HTTP_TIMEOUT_SECS", 60u64)?);

        let defaults = RetryPolicy::default();
        let budget_ms: u64 = parse(&get, "RETRY_BUDGET_MS", 60_000)?;
        let retry = RetryPolicy {
            max_attempts: parse(&get, "RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            multiplier: parse(&get, "RETRY_MULTIPLIER", defaults.multiplier)?,
            min_wait: Duration::from_millis(parse(&get, "RETRY_MIN_WAIT_MS", 3_000)?),
            max_wait: Duration::from_millis(parse(&get, "RETRY_MAX_WAIT_MS", 10_000)?),
            budget: (budget_ms > 0).then(|| Duration::from_millis(budget_ms)),
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "RETRY_MAX_ATTEMPTS".to_string(),
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }
        if !retry.multiplier.is_finite() || retry.multiplier < 0.0 {
            return Err(ConfigError::Invalid {
                var: "RETRY_MULTIPLIER".to_string(),
                value: retry.multiplier.to_string(),
                reason: "must be a non-negative number".to_string(),
            });
        }

        Ok(Self {
            serp_api_key,
            serp_base_url,
            openai,
            router,
            summarizer,
            port,
            http_timeout,
            retry,
        })
    }
}

fn parse<T, G>(get: &G, var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.parse::<T>().map_err(|e| ConfigError::Invalid {
            var: var.to_string(),
            value: value.clone(),
            reason: e.to_string(),
        }),
    }
}
