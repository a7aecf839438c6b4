//! Configuration file support.
//!
//! Every section is optional; missing values fall back to the defaults
//! below. Example:
//!
//! ```toml
//! [catalog]
//! size = 7635
//! include_offsets = true
//!
//! [policies.strict-seeing]
//! required_bands = ["U", "g", "r"]
//! limits = { seeing = 1.2, ellipticity = 0.2 }
//!
//! [planning]
//! ra_bins = [18, 19, 20, 21, 22, 23, 0, 1, 2]
//!
//! [quicklook]
//! workdir = "/tmp/uvex-scratch"
//! outdir = "/data/uvex-quicklook"
//! tools = { mosaic = "/opt/casutools/bin/mosaic" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::{ConfigError, ConfigResult};
use crate::planning::catalog::FieldCatalog;
use crate::planning::ra_bins::DEFAULT_RA_BINS;
use crate::qc::policy::{PolicySet, QualityPolicy};
use crate::quicklook::driver::{QuicklookSettings, RenderParams, ToolPaths};
use crate::quicklook::lookup::DEFAULT_IGNORED_MARKERS;

/// File name searched by [`QcConfig::from_default_location`].
pub const CONFIG_FILE_NAME: &str = "uvex-qc.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QcConfig {
    pub catalog: CatalogSettings,
    pub pipeline: PipelineSettings,
    /// Policies added to, or replacing, the built-in ones.
    pub policies: BTreeMap<String, QualityPolicy>,
    pub planning: PlanningSettings,
    pub quicklook: QuicklookSection,
    pub index: IndexSettings,
}

/// Field catalog settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogSettings {
    pub size: u32,
    pub include_offsets: bool,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            size: FieldCatalog::SURVEY_SIZE,
            include_offsets: true,
        }
    }
}

/// Exposure-to-field pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSettings {
    /// Object-name prefix of the survey's exposures; empty keeps all.
    pub name_prefix: String,
    pub validate: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            name_prefix: "uvex".to_string(),
            validate: true,
        }
    }
}

impl PipelineSettings {
    pub fn name_prefix(&self) -> Option<String> {
        (!self.name_prefix.is_empty()).then(|| self.name_prefix.clone())
    }
}

/// Todo file settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlanningSettings {
    /// RA hours that get a `fields.todo.HHh` file, in queue order.
    pub ra_bins: Vec<u32>,
    pub never_attempted_file: String,
    pub failed_file: String,
}

impl Default for PlanningSettings {
    fn default() -> Self {
        Self {
            ra_bins: DEFAULT_RA_BINS.to_vec(),
            never_attempted_file: "fields-never-attempted.txt".to_string(),
            failed_file: "fields-failed.txt".to_string(),
        }
    }
}

/// Quicklook tools, directories and index documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuicklookSection {
    pub tools: ToolPaths,
    pub render: RenderParams,
    pub workdir: PathBuf,
    pub outdir: PathBuf,
    pub run_index: PathBuf,
    pub conf_index: PathBuf,
}

impl Default for QuicklookSection {
    fn default() -> Self {
        let settings = QuicklookSettings::default();
        Self {
            tools: settings.tools,
            render: settings.render,
            workdir: settings.workdir,
            outdir: PathBuf::from("quicklook"),
            run_index: PathBuf::from("run2path.json"),
            conf_index: PathBuf::from("dir2conf.json"),
        }
    }
}

impl QuicklookSection {
    pub fn settings(&self) -> QuicklookSettings {
        QuicklookSettings {
            tools: self.tools.clone(),
            render: self.render.clone(),
            workdir: self.workdir.clone(),
        }
    }
}

/// Image index settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexSettings {
    /// Paths containing any of these are left out of the run index.
    pub ignored_markers: Vec<String>,
    /// Data directories known to be absent; skipped by the index check.
    pub missing_dirs: Vec<String>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            ignored_markers: DEFAULT_IGNORED_MARKERS.iter().map(|m| m.to_string()).collect(),
            missing_dirs: ["jul2013", "dec2011", "nov2012", "dec2012", "dec2012b"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

impl QcConfig {
    /// Parse configuration from TOML text. `origin` names the source in
    /// errors.
    pub fn from_toml_str(content: &str, origin: &Path) -> ConfigResult<Self> {
        let de = toml::Deserializer::new(content);
        let config: QcConfig =
            serde_path_to_error::deserialize(de).map_err(|e| ConfigError::Parse {
                path: origin.to_path_buf(),
                key: e.path().to_string(),
                message: e.inner().message().to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Load configuration from the default location.
    ///
    /// Searches for `uvex-qc.toml` in:
    /// 1. Current directory
    /// 2. `config/` directory
    /// 3. Parent directory
    pub fn from_default_location() -> ConfigResult<Self> {
        let search_paths = [
            PathBuf::from(CONFIG_FILE_NAME),
            Path::new("config").join(CONFIG_FILE_NAME),
            Path::new("..").join(CONFIG_FILE_NAME),
        ];

        for path in &search_paths {
            if path.exists() {
                log::info!("Loading configuration from {}", path.display());
                return Self::from_file(path);
            }
        }

        Err(ConfigError::NotFound(
            search_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        ))
    }

    /// Explicit file if given, else the default location, else the built-in
    /// defaults.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::from_default_location() {
                Err(ConfigError::NotFound(searched)) => {
                    log::debug!("No configuration file ({}), using defaults", searched);
                    Ok(Self::default())
                }
                other => other,
            },
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(hour) = self.planning.ra_bins.iter().find(|h| **h > 23) {
            return Err(ConfigError::InvalidValue {
                key: "planning.ra_bins".to_string(),
                reason: format!("{} is not an hour between 0 and 23", hour),
            });
        }
        if self.catalog.size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "catalog.size".to_string(),
                reason: "catalog must not be empty".to_string(),
            });
        }
        for (name, policy) in &self.policies {
            policy.validate(name)?;
        }
        Ok(())
    }

    pub fn catalog(&self) -> FieldCatalog {
        FieldCatalog::new(self.catalog.size, self.catalog.include_offsets)
    }

    /// Built-in policies with the configured ones merged in.
    pub fn policy_set(&self) -> ConfigResult<PolicySet> {
        let mut set = PolicySet::builtin();
        set.merge(self.policies.clone());
        set.validate()?;
        Ok(set)
    }
}
