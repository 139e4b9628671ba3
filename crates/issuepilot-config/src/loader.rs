use crate::Config;
use anyhow::{Context, Result};
use jsonc_parser::{parse_to_serde_value, ParseOptions};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub struct ConfigLoader {
    config: Config,
    config_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            config_paths: Vec::new(),
        }
    }

    pub fn load_from_str(&mut self, content: &str) -> Result<()> {
        let config: Config =
            parse_jsonc(content).with_context(|| "Failed to parse config content")?;
        self.config.merge(config);
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = parse_jsonc(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        self.config.merge(config);
        self.config_paths.push(path.to_path_buf());
        Ok(())
    }

    pub fn load_global(&mut self) -> Result<()> {
        let global_config_path = get_global_config_path();

        for ext in &["jsonc", "json"] {
            let path = global_config_path.with_extension(ext);
            if path.exists() {
                self.load_from_file(&path)?;
                break;
            }
        }

        Ok(())
    }

    pub fn load_project<P: AsRef<Path>>(&mut self, project_dir: P) -> Result<()> {
        for target in ["issuepilot.jsonc", "issuepilot.json"] {
            let path = project_dir.as_ref().join(target);
            if path.exists() {
                self.load_from_file(&path)?;
                break;
            }
        }
        Ok(())
    }

    /// Environment overrides win over every file source.
    pub fn load_from_env(&mut self) -> Result<()> {
        if let Ok(config_path) = env::var("ISSUEPILOT_CONFIG") {
            self.load_from_file(&config_path)?;
        }

        if let Ok(key) = env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                self.config.openai.api_key = Some(key);
            }
        }
        if let Ok(model) = env::var("ISSUEPILOT_MODEL") {
            if !model.trim().is_empty() {
                self.config.openai.model = model;
            }
        }
        if let Ok(token) = env::var("GITHUB_TOKEN") {
            if !token.trim().is_empty() {
                self.config.github.token = Some(token);
            }
        }

        Ok(())
    }

    pub fn build(self) -> Config {
        self.config
    }

    pub fn config_paths(&self) -> &[PathBuf] {
        &self.config_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_jsonc(content: &str) -> Result<Config> {
    let value = parse_to_serde_value(content, &ParseOptions::default())
        .map_err(|e| anyhow::anyhow!("JSONC parse error: {}", e))?
        .unwrap_or(serde_json::Value::Null);
    let config = serde_json::from_value(value)?;
    Ok(config)
}

fn get_global_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("issuepilot")
        .join("issuepilot")
}

/// Load config for `project_dir`: global file, then project file, then env.
pub fn load_config<P: AsRef<Path>>(project_dir: P) -> Result<Config> {
    let mut loader = ConfigLoader::new();
    loader.load_global()?;
    loader.load_project(project_dir)?;
    loader.load_from_env()?;
    Ok(loader.build())
}
