//! Application manifest (trellis.app.toml)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

pub const MANIFEST_FILE: &str = "trellis.app.toml";

/// Application manifest
///
/// ```toml
/// [app]
/// name = "Hello"
/// version = "0.1.0"
///
/// [extensions."app/foo"]
/// greeting = "Howdy"
/// ```
#[derive(Debug, Deserialize, Clone)]
pub struct Manifest {
    pub app: App,
    /// Per-extension configuration tables, keyed by extension path
    #[serde(default)]
    pub extensions: HashMap<String, toml::Table>,
}

/// Application metadata
#[derive(Debug, Deserialize, Clone)]
pub struct App {
    /// Display name of the application
    pub name: String,
    /// Semantic version (e.g., "1.0.0")
    pub version: String,
    /// Copy extension data directories into the app tree (default: true)
    pub provision: Option<bool>,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing manifest")
    }

    /// Read `trellis.app.toml` from `app_dir`
    pub async fn load(app_dir: &Path) -> Result<Self> {
        let path = app_dir.join(MANIFEST_FILE);
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading manifest at {}", path.display()))?;
        Self::parse(&text)
    }

    pub fn provision(&self) -> bool {
        self.app.provision.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::parse(
            r#"
            [app]
            name = "Hello"
            version = "0.1.0"
            provision = false

            [extensions."app/foo"]
            greeting = "Howdy"

            [extensions.app]
            company = "Acme"
            "#,
        )
        .unwrap();

        assert_eq!(manifest.app.name, "Hello");
        assert!(!manifest.provision());
        assert_eq!(
            manifest.extensions["app/foo"].get("greeting"),
            Some(&toml::Value::String("Howdy".into()))
        );
        assert!(manifest.extensions.contains_key("app"));
    }

    #[test]
    fn test_defaults() {
        let manifest = Manifest::parse("[app]\nname = \"x\"\nversion = \"1\"\n").unwrap();
        assert!(manifest.provision());
        assert!(manifest.extensions.is_empty());
    }

    #[test]
    fn test_missing_app_section() {
        assert!(Manifest::parse("[extensions]\n").is_err());
    }

    #[tokio::test]
    async fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join(MANIFEST_FILE),
            "[app]\nname = \"Hello\"\nversion = \"0.2.0\"\n",
        )
        .await
        .unwrap();

        let manifest = Manifest::load(dir.path()).await.unwrap();
        assert_eq!(manifest.app.version, "0.2.0");
        assert!(Manifest::load(&dir.path().join("missing")).await.is_err());
    }
}
