use std::{collections::HashMap, fs};

use tracing::debug;

const SETTINGS_FILE: &str = "snapfeed.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub request_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".into(),
            request_timeout_seconds: 30,
        }
    }
}

/// Defaults, overridden by `snapfeed.toml` in the working directory,
/// overridden in turn by `SNAPFEED_*` environment variables.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        apply_file_overrides(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("SNAPFEED_SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("SNAPFEED_TIMEOUT_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_seconds = parsed;
        }
    }

    settings
}

fn apply_file_overrides(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        debug!("ignoring unparseable {SETTINGS_FILE}");
        return;
    };

    if let Some(v) = file_cfg.get("server_url").and_then(|v| v.as_str()) {
        settings.server_url = v.to_string();
    }
    if let Some(v) = file_cfg
        .get("request_timeout_seconds")
        .and_then(|v| v.as_integer())
    {
        if v > 0 {
            settings.request_timeout_seconds = v as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_server() {
        let settings = Settings::default();
        assert_eq!(settings.server_url, "http://localhost:3000");
        assert_eq!(settings.request_timeout_seconds, 30);
    }

    #[test]
    fn file_overrides_replace_defaults() {
        let mut settings = Settings::default();
        apply_file_overrides(
            &mut settings,
            "server_url = \"https://feed.example\"\nrequest_timeout_seconds = 5\n",
        );
        assert_eq!(settings.server_url, "https://feed.example");
        assert_eq!(settings.request_timeout_seconds, 5);
    }

    #[test]
    fn unparseable_file_keeps_defaults() {
        let mut settings = Settings::default();
        apply_file_overrides(&mut settings, "server_url = [not toml");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn non_positive_timeout_in_file_is_ignored() {
        let mut settings = Settings::default();
        apply_file_overrides(&mut settings, "request_timeout_seconds = 0\n");
        assert_eq!(settings.request_timeout_seconds, 30);
    }

    #[test]
    fn env_override_beats_file_value() {
        std::env::set_var("SNAPFEED_SERVER_URL", "https://env.example");
        let settings = load_settings();
        assert_eq!(settings.server_url, "https://env.example");
        std::env::remove_var("SNAPFEED_SERVER_URL");
    }

    #[test]
    fn garbage_timeout_env_is_ignored() {
        std::env::set_var("SNAPFEED_TIMEOUT_SECONDS", "soon");
        let settings = load_settings();
        assert_eq!(
            settings.request_timeout_seconds,
            Settings::default().request_timeout_seconds
        );
        std::env::remove_var("SNAPFEED_TIMEOUT_SECONDS");
    }
}
