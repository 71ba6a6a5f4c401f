use std::env;

const DEFAULT_MODEL: &str = "claude-opus-4-1-20250805";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct Config {
    pub model: String,
    pub base_url: String,
    pub max_output_tokens: u32,
    pub model_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    pub(crate) fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        Self {
            model: parse_non_empty(get_var("ANTHROPIC_MODEL").as_deref(), DEFAULT_MODEL),
            base_url: parse_non_empty(get_var("ANTHROPIC_BASE_URL").as_deref(), DEFAULT_BASE_URL),
            max_output_tokens: parse_max_output_tokens(get_var("MAX_OUTPUT_TOKENS").as_deref()),
            model_timeout_secs: parse_model_timeout_secs(
                get_var("MODEL_TIMEOUT_SECS").as_deref(),
            ),
        }
    }
}

fn parse_non_empty(raw: Option<&str>, default: &str) -> String {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn parse_max_output_tokens(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS)
}

fn parse_model_timeout_secs(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MODEL_TIMEOUT_SECS)
}
