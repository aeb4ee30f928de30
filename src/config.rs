use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub root: PathBuf,
    pub outdir: PathBuf,
    /// Modules to process, relative to `root`.
    pub entry_points: Vec<String>,
    /// File name of the combined stylesheet written into `outdir`.
    pub stylesheet_name: String,
    /// Specifier of the tagging module.
    pub tag_module: String,
}

impl Config {
    pub fn load(root: &str) -> Result<Self> {
        let root = PathBuf::from(root).canonicalize()?;
        let config_path = root.join("static-css-extract.config.json");

        let mut config: Config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            Self::default_for_root(&root)
        };
        config.root = root;

        Ok(config)
    }

    fn default_for_root(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            outdir: PathBuf::from("dist"),
            entry_points: vec!["index.js".to_string()],
            stylesheet_name: "stylesheet.css".to_string(),
            tag_module: "static-css-extract".to_string(),
        }
    }
}
