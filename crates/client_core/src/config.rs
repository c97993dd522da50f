use std::{fs, path::PathBuf, time::Duration};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use url::Url;

pub const SETTINGS_FILE: &str = "photo_admin.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub build_hook_url: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000".into(),
            build_hook_url: None,
            state_dir: None,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_url: Option<String>,
    build_hook_url: Option<String>,
    state_dir: Option<PathBuf>,
    request_timeout_secs: Option<u64>,
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn api_base(&self) -> anyhow::Result<String> {
        let parsed = Url::parse(self.api_url.trim())
            .with_context(|| format!("invalid api url '{}'", self.api_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!(
                "api url must start with http:// or https://, got '{}'",
                self.api_url
            ));
        }
        Ok(parsed.as_str().trim_end_matches('/').to_string())
    }

    pub fn build_hook(&self) -> anyhow::Result<Option<Url>> {
        self.build_hook_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw.trim()).with_context(|| format!("invalid build hook url '{raw}'"))
            })
            .transpose()
    }

    pub fn from_sources(
        file_contents: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut settings = Self::default();

        if let Some(raw) = file_contents {
            let file_cfg: FileSettings =
                toml::from_str(raw).with_context(|| format!("failed to parse {SETTINGS_FILE}"))?;
            if let Some(v) = file_cfg.api_url {
                settings.api_url = v;
            }
            if let Some(v) = file_cfg.build_hook_url {
                settings.build_hook_url = Some(v);
            }
            if let Some(v) = file_cfg.state_dir {
                settings.state_dir = Some(v);
            }
            if let Some(v) = file_cfg.request_timeout_secs {
                settings.request_timeout_secs = v;
            }
        }

        if let Some(v) = env("API_URL") {
            settings.api_url = v;
        }
        if let Some(v) = env("APP__API_URL") {
            settings.api_url = v;
        }

        if let Some(v) = env("BUILD_HOOK_URL") {
            settings.build_hook_url = Some(v);
        }
        if let Some(v) = env("APP__BUILD_HOOK_URL") {
            settings.build_hook_url = Some(v);
        }

        if let Some(v) = env("STATE_DIR") {
            settings.state_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env("APP__STATE_DIR") {
            settings.state_dir = Some(PathBuf::from(v));
        }

        if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
            match v.parse::<u64>() {
                Ok(parsed) => settings.request_timeout_secs = parsed,
                Err(err) => {
                    tracing::warn!(value = %v, "config: ignoring invalid request timeout: {err}")
                }
            }
        }

        settings.api_base()?;
        settings.build_hook()?;
        Ok(settings)
    }
}

/// Reads `photo_admin.toml` from the working directory (if present) and the process environment.
pub fn load_settings() -> anyhow::Result<Settings> {
    let raw = fs::read_to_string(SETTINGS_FILE).ok();
    Settings::from_sources(raw.as_deref(), |key| std::env::var(key).ok())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
