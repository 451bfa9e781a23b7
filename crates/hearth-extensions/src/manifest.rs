//! `extension.json` manifest parsing.
//!
//! Each extension directory carries a manifest declaring its identity and,
//! optionally, its version, entry key, legacy flag, and dependencies.
//! Missing optional fields get documented defaults: entry defaults to the
//! extension name, `legacy` to false, `requires` to empty. Unknown fields
//! are ignored.

use std::path::{Path, PathBuf};

use hearth_core::ExtensionName;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ExtensionDescriptor;

/// File name recognized as an extension manifest.
pub const MANIFEST_FILE: &str = "extension.json";

/// Errors reading or validating a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),
    /// The manifest is not well-formed JSON of the expected shape.
    #[error("malformed manifest: {0}")]
    Parse(#[from] serde_json::Error),
    /// The manifest is missing a usable name.
    #[error("manifest declares an empty name")]
    EmptyName,
}

/// Parsed `extension.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionManifest {
    /// Declared extension identity.
    pub name: String,
    /// Declared version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Registered module key; defaults to the extension name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    /// Whether the extension targets the legacy registration contract.
    #[serde(default)]
    pub legacy: bool,
    /// Names of required extensions.
    #[serde(default)]
    pub requires: Vec<String>,
}

impl ExtensionManifest {
    /// Read and parse the manifest inside `dir`.
    pub fn load(dir: &Path) -> Result<Self, ManifestError> {
        let raw = std::fs::read_to_string(dir.join(MANIFEST_FILE))?;
        let manifest: Self = serde_json::from_str(&raw)?;
        if manifest.name.trim().is_empty() {
            return Err(ManifestError::EmptyName);
        }
        Ok(manifest)
    }

    /// Convert into an immutable descriptor rooted at `dir`.
    pub fn into_descriptor(self, dir: PathBuf) -> ExtensionDescriptor {
        let entry = self.entry.unwrap_or_else(|| self.name.clone());
        ExtensionDescriptor {
            name: ExtensionName::new(self.name),
            root: dir,
            entry,
            legacy: self.legacy,
            requires: self.requires.into_iter().map(ExtensionName::new).collect(),
            version: self.version,
        }
    }
}
