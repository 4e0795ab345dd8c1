//! Configuration types and validation for document protection

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::gate::{parse_timestamp, ExpirationGate, ValidityWindow};

/// Number of white cover layers stacked over each page by default.
pub const DEFAULT_MASK_LAYERS: usize = 5;

/// Upper bound on cover layers per page.
pub const MAX_MASK_LAYERS: usize = 99;

/// Options governing one protection run. PascalCase aliases keep files
/// written for the desktop front-end loadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectOptions {
    #[serde(alias = "Input")]
    pub input: Option<PathBuf>,

    #[serde(alias = "Output")]
    pub output: Option<PathBuf>,

    #[serde(alias = "Files", deserialize_with = "de::file_list")]
    pub files: Vec<PathBuf>,

    #[serde(alias = "OutputDir")]
    pub output_dir: Option<PathBuf>,

    /// Start of the validity window; absent means "open".
    #[serde(alias = "StartTime")]
    pub start_time: Option<String>,

    /// End of the validity window; absent means "open".
    #[serde(alias = "EndTime")]
    pub end_time: Option<String>,

    /// Alerted when the document is opened outside the window. Empty
    /// suppresses the alert.
    #[serde(alias = "ExpiredText", alias = "ExperiredText")]
    pub expired_text: String,

    /// Drawn over every page for viewers that cannot run the gate.
    #[serde(alias = "UnsupportedText")]
    pub unsupported_text: String,

    #[serde(alias = "CheckingNotice")]
    pub checking_notice: Option<String>,

    #[serde(alias = "MaskLayers")]
    pub mask_layers: usize,
}

impl Default for ProtectOptions {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            files: Vec::new(),
            output_dir: None,
            start_time: None,
            end_time: None,
            expired_text: String::new(),
            unsupported_text: String::new(),
            checking_notice: None,
            mask_layers: DEFAULT_MASK_LAYERS,
        }
    }
}

impl ProtectOptions {
    /// Loads options from a JSON file, falling back to YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config file {}: {}", path.display(), e)))?;
        Self::from_str_any(&content)
    }

    pub fn from_str_any(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .or_else(|_| serde_yaml::from_str(content))
            .map_err(|e| Error::ConfigError(format!("Config parsing error: {}", e)))
    }

    /// Resolves the validity window. Literals without an offset are read as
    /// UTC.
    pub fn window(&self) -> Result<ValidityWindow> {
        let utc = Utc.fix();
        let parse = |label: &str, value: &Option<String>| -> Result<_> {
            match non_blank(value) {
                Some(literal) => parse_timestamp(literal, &utc)
                    .map(Some)
                    .map_err(|e| Error::InvalidConfiguration(format!("{} time: {}", label, e.message()))),
                None => Ok(None),
            }
        };
        let start = parse("start", &self.start_time)?;
        let end = parse("end", &self.end_time)?;
        Ok(ValidityWindow::from_bounds(start, end))
    }

    /// The gate instance this configuration compiles to. Both bounds are
    /// emitted as RFC 3339 with an explicit offset, so the viewer reads the
    /// same instants that [`validate`](Self::validate) checked.
    pub fn gate(&self) -> Result<ExpirationGate> {
        let gate = ExpirationGate::from_window(&self.window()?, self.expired_text.clone());
        Ok(match &self.checking_notice {
            Some(notice) => gate.with_checking_notice(notice.clone()),
            None => gate,
        })
    }

    /// Pipeline-side checks: the window must parse and must not be
    /// inverted, and the layer count must stay bounded.
    pub fn validate(&self) -> Result<()> {
        let window = self.window()?;
        if window.is_empty() {
            return Err(Error::InvalidConfiguration(format!(
                "start time {} is after end time {}",
                window.start, window.end
            )));
        }
        if self.mask_layers > MAX_MASK_LAYERS {
            return Err(Error::InvalidConfiguration(format!(
                "mask layer count {} exceeds {}",
                self.mask_layers, MAX_MASK_LAYERS
            )));
        }
        Ok(())
    }

    /// Additional checks for batch runs.
    pub fn validate_batch(&self) -> Result<()> {
        self.validate()?;
        if self.files.is_empty() {
            return Err(Error::InvalidConfiguration("no files provided for batch run".into()));
        }
        if self.output_dir.is_none() {
            return Err(Error::InvalidConfiguration("batch run requires an output directory".into()));
        }
        Ok(())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Splits a `;`- or `,`-separated file list, dropping blanks.
pub fn split_file_list(raw: &str) -> Vec<PathBuf> {
    raw.split([';', ','])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}

mod de {
    use std::path::PathBuf;

    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FileList {
        Joined(String),
        List(Vec<PathBuf>),
    }

    /// Accepts either a list or the front-end's single joined string.
    pub fn file_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<PathBuf>, D::Error> {
        Ok(match FileList::deserialize(deserializer)? {
            FileList::Joined(raw) => super::split_file_list(&raw),
            FileList::List(paths) => paths,
        })
    }
}
