use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Fichario";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default log filter when RUST_LOG is unset.
pub fn default_log_filter() -> &'static str {
    "info,fichario=debug"
}

/// Get the application data directory (~/Fichario/ on all platforms).
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Fichario")
}

/// Runtime configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Google Cloud Vision API key (OCR backend).
    pub vision_api_key: Option<String>,
    /// DeepSeek/OpenAI API key (extraction backend).
    pub llm_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible chat completions API.
    pub llm_base_url: String,
    /// Model used for structured extraction.
    pub llm_model: String,
}

impl Config {
    /// Read configuration from `FICHARIO_*` and provider environment variables.
    ///
    /// When `DEEPSEEK_API_KEY` is set the DeepSeek endpoint and model are
    /// used; otherwise `OPENAI_API_KEY` selects the OpenAI fallback.
    pub fn from_env() -> Self {
        let bind_addr = std::env::var("FICHARIO_BIND")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8741)));

        let db_path = std::env::var("FICHARIO_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| app_data_dir().join("fichario.db"));

        let deepseek_key = non_empty_env("DEEPSEEK_API_KEY");
        let openai_key = non_empty_env("OPENAI_API_KEY");

        let (default_base, default_model) = if deepseek_key.is_some() {
            ("https://api.deepseek.com", "deepseek-chat")
        } else {
            ("https://api.openai.com/v1", "gpt-4o-mini")
        };

        Self {
            bind_addr,
            db_path,
            vision_api_key: non_empty_env("GOOGLE_VISION_API_KEY"),
            llm_api_key: deepseek_key.or(openai_key),
            llm_base_url: std::env::var("FICHARIO_LLM_BASE_URL")
                .unwrap_or_else(|_| default_base.to_string()),
            llm_model: std::env::var("FICHARIO_LLM_MODEL")
                .unwrap_or_else(|_| default_model.to_string()),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("Fichario"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }

    #[test]
    fn default_filter_includes_crate() {
        assert!(default_log_filter().contains("fichario"));
    }
}
