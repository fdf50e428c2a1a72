use anyhow::Context;
use clap::Args;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::extract::ExtractorMarkers;

pub const DEFAULT_PAGE_SOURCE: &str = "osiris-web";
pub const DEFAULT_EXTENSION_SOURCE: &str = "osiris-extension";
pub const DEFAULT_OUTPUT_FILE: &str = "osiris.xlsx";

/// Runtime settings for one sidecar session.
///
/// Loaded from an optional TOML file; every key is optional and falls back
/// to the defaults below. CLI flags are applied on top by `main`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Host the permission record is scoped to.
    pub origin: String,
    /// Directory holding `handles.sqlite3`.
    pub data_dir: PathBuf,
    /// Where produced spreadsheets are written.
    pub output_dir: PathBuf,
    pub output_file_name: String,
    /// Whether the runtime exposes directory access at all.
    pub directory_access: bool,
    pub probe_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub page_source: String,
    pub extension_source: String,
    pub require_session: bool,
    pub markers: ExtractorMarkers,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            origin: "localhost".to_string(),
            data_dir: PathBuf::from(".examinatord"),
            output_dir: PathBuf::from("."),
            output_file_name: DEFAULT_OUTPUT_FILE.to_string(),
            directory_access: true,
            probe_timeout_ms: 2000,
            settle_delay_ms: 1000,
            page_source: DEFAULT_PAGE_SOURCE.to_string(),
            extension_source: DEFAULT_EXTENSION_SOURCE.to_string(),
            require_session: false,
            markers: ExtractorMarkers::default(),
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings {}", path.to_string_lossy()))?;
        Self::from_toml(&text)
            .with_context(|| format!("invalid settings file {}", path.to_string_lossy()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let settings: Settings = toml::from_str(text)?;
        if settings.origin.trim().is_empty() {
            anyhow::bail!("origin must not be empty");
        }
        Ok(settings)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("handles.sqlite3")
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_file_name)
    }
}

/// Command-line overrides, applied on top of the settings file.
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    #[arg(long, env = "EXAMINATORD_ORIGIN", global = true)]
    pub origin: Option<String>,

    #[arg(long, env = "EXAMINATORD_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(long, env = "EXAMINATORD_OUTPUT_DIR", global = true)]
    pub output_dir: Option<PathBuf>,

    #[arg(long, env = "EXAMINATORD_OUTPUT_FILE_NAME", global = true)]
    pub output_file_name: Option<String>,

    /// `false` forces the manual selection flow.
    #[arg(long, env = "EXAMINATORD_DIRECTORY_ACCESS", global = true)]
    pub directory_access: Option<bool>,

    #[arg(long, env = "EXAMINATORD_PROBE_TIMEOUT_MS", global = true)]
    pub probe_timeout_ms: Option<u64>,

    #[arg(long, env = "EXAMINATORD_SETTLE_DELAY_MS", global = true)]
    pub settle_delay_ms: Option<u64>,

    #[arg(long, env = "EXAMINATORD_PAGE_SOURCE", global = true)]
    pub page_source: Option<String>,

    #[arg(long, env = "EXAMINATORD_EXTENSION_SOURCE", global = true)]
    pub extension_source: Option<String>,

    #[arg(long, env = "EXAMINATORD_REQUIRE_SESSION", global = true)]
    pub require_session: Option<bool>,
}

impl SettingsArgs {
    pub fn apply(self, settings: &mut Settings) -> anyhow::Result<()> {
        if let Some(v) = self.origin {
            if v.trim().is_empty() {
                anyhow::bail!("origin must not be empty");
            }
            settings.origin = v;
        }
        if let Some(v) = self.data_dir {
            settings.data_dir = v;
        }
        if let Some(v) = self.output_dir {
            settings.output_dir = v;
        }
        if let Some(v) = self.output_file_name {
            settings.output_file_name = v;
        }
        if let Some(v) = self.directory_access {
            settings.directory_access = v;
        }
        if let Some(v) = self.probe_timeout_ms {
            settings.probe_timeout_ms = v;
        }
        if let Some(v) = self.settle_delay_ms {
            settings.settle_delay_ms = v;
        }
        if let Some(v) = self.page_source {
            settings.page_source = v;
        }
        if let Some(v) = self.extension_source {
            settings.extension_source = v;
        }
        if let Some(v) = self.require_session {
            settings.require_session = v;
        }
        Ok(())
    }
}
