//! Provisioning configuration.
//!
//! Defaults match what `build.rs` embeds, so a process that never touches
//! configuration finds its payloads. Hosts that ship a renamed library can
//! build a [`ProvisionConfig`] by hand or parse one from JSON.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::arch::PlatformTag;
use crate::error::{Result, ScoreError};

/// Namespace prefix baked into payload identifiers by `build.rs`.
pub const DEFAULT_NAMESPACE: &str = env!("CARGO_PKG_NAME");

/// Base name of the native library, before platform prefix/suffix.
pub const DEFAULT_LIBRARY_NAME: &str = "score_native";

/// Subfolder of the temp directory that receives extracted payloads.
pub const DEFAULT_APP_DIR: &str = "scorelink-native";

/// Names of the three C-ABI entry points exported by the native library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolNames {
    pub create: String,
    pub compute: String,
    pub release: String,
}

impl Default for SymbolNames {
    fn default() -> Self {
        Self {
            create: "score_create".into(),
            compute: "score_compute".into(),
            release: "score_release".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub namespace: String,
    pub library_name: String,
    pub app_dir: String,
    /// Overrides the system temp directory as extraction root.
    pub temp_root: Option<PathBuf>,
    pub symbols: SymbolNames,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.into(),
            library_name: DEFAULT_LIBRARY_NAME.into(),
            app_dir: DEFAULT_APP_DIR.into(),
            temp_root: None,
            symbols: SymbolNames::default(),
        }
    }
}

impl ProvisionConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ScoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("namespace", &self.namespace),
            ("library_name", &self.library_name),
            ("app_dir", &self.app_dir),
            ("symbols.create", &self.symbols.create),
            ("symbols.compute", &self.symbols.compute),
            ("symbols.release", &self.symbols.release),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ScoreError::InvalidConfig(format!("{name} must not be blank")));
            }
        }
        for (name, value) in [("app_dir", &self.app_dir), ("library_name", &self.library_name)] {
            if !is_single_component(value) {
                return Err(ScoreError::InvalidConfig(format!(
                    "{name} must be a single plain path component, got {value:?}"
                )));
            }
        }
        Ok(())
    }

    /// Platform file name of the library, e.g. `libscore_native.so`.
    pub fn library_file_name(&self) -> String {
        libloading::library_filename(&self.library_name)
            .to_string_lossy()
            .into_owned()
    }

    /// `<namespace>.NativeLibraries.<tag>.<libraryFileName>`
    pub fn payload_id(&self, tag: PlatformTag) -> String {
        format!(
            "{}.NativeLibraries.{}.{}",
            self.namespace,
            tag,
            self.library_file_name()
        )
    }

    /// `<temp root>/<app dir>`
    pub fn extraction_root(&self) -> PathBuf {
        self.temp_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
            .join(&self.app_dir)
    }
}

/// Exactly one `Normal` component: no separators, no `.`/`..`, no root.
fn is_single_component(value: &str) -> bool {
    let mut components = Path::new(value).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !value.contains(['/', '\\'])
}
