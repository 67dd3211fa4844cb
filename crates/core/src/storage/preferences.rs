use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const THEME_KEY: &str = "theme";
const DEFAULT_FILE_NAME: &str = "nse_feed_preferences.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => anyhow::bail!("unknown theme: {other}"),
        }
    }
}

/// Flat string key-value file. The theme is the only key written today.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses `PREFERENCES_PATH` when set, otherwise a file in the working directory.
    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        let path = settings
            .preferences_path
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let map = self.read_all().await?;
        Ok(map.get(key).and_then(Value::as_str).map(str::to_string))
    }

    pub async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut map = self.read_all().await?;
        map.insert(key.to_string(), Value::String(value.to_string()));

        let body = serde_json::to_vec_pretty(&map).context("failed to encode preferences")?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Stored theme, or the default when unset or unrecognised.
    pub async fn theme(&self) -> anyhow::Result<Theme> {
        let Some(raw) = self.get(THEME_KEY).await? else {
            return Ok(Theme::default());
        };
        match raw.parse::<Theme>() {
            Ok(theme) => Ok(theme),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring stored theme");
                Ok(Theme::default())
            }
        }
    }

    pub async fn set_theme(&self, theme: Theme) -> anyhow::Result<()> {
        self.set(THEME_KEY, theme.as_str()).await
    }

    pub async fn toggle_theme(&self) -> anyhow::Result<Theme> {
        let next = self.theme().await?.toggled();
        self.set_theme(next).await?;
        Ok(next)
    }

    async fn read_all(&self) -> anyhow::Result<Map<String, Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => {
                tracing::warn!(path = %self.path.display(), "preferences file is not a JSON object; starting fresh");
                Ok(Map::new())
            }
        }
    }
}
