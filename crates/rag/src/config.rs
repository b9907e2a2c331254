use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::query::DEFAULT_SYSTEM_PROMPT;
use crate::upload::PollSettings;

pub const DEFAULT_CONFIG_PATH: &str = "milky.toml";
pub const DEFAULT_MODEL: &str = milky_llm::DEFAULT_MODEL;
pub const DEFAULT_UPLOAD_DIR: &str = "uploaded_docs";
pub const DEFAULT_INDEX_FILE: &str = "data/file_index.json";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;
pub const DEFAULT_MAX_WAIT_SECS: u64 = 600;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 100;

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub api_key: String,
    pub store_name: String,
    pub model: String,
    pub base_url: String,
    pub upload_dir: PathBuf,
    pub index_file: PathBuf,
    pub poll_interval: Duration,
    pub max_wait: Duration,
    pub max_upload_bytes: usize,
    pub system_prompt: String,
}

/// Optional `milky.toml`. Environment variables take precedence.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub store_name: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub upload_dir: Option<PathBuf>,
    pub index_file: Option<PathBuf>,
    pub poll_interval_secs: Option<u64>,
    pub max_wait_secs: Option<u64>,
    pub max_upload_mb: Option<usize>,
    pub system_prompt_file: Option<PathBuf>,
}

impl RagConfig {
    /// Reads `MILKY_CONFIG` (default `milky.toml`, optional) and then the
    /// process environment.
    pub fn from_env() -> Result<Self> {
        let config_path =
            env::var("MILKY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let file = load_file_config(Path::new(&config_path))?;
        Self::resolve(file, |var| env::var(var).ok())
    }

    pub fn resolve<F>(file: FileConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let api_key = var("GOOGLE_API_KEY").ok_or_else(|| anyhow!("GOOGLE_API_KEY is not set"))?;
        let store_name = var("FILE_SEARCH_STORE_NAME")
            .or(file.store_name)
            .ok_or_else(|| anyhow!("FILE_SEARCH_STORE_NAME is not set"))?;
        let model = var("GEMINI_MODEL")
            .or(file.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = var("GEMINI_BASE_URL")
            .or(file.base_url)
            .unwrap_or_else(|| milky_llm::DEFAULT_BASE_URL.to_string());
        let upload_dir = var("MILKY_UPLOAD_DIR")
            .map(PathBuf::from)
            .or(file.upload_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR));
        let index_file = var("MILKY_INDEX_FILE")
            .map(PathBuf::from)
            .or(file.index_file)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_FILE));
        let poll_interval_secs = parse_var(&var, "MILKY_POLL_INTERVAL_SECS")?
            .or(file.poll_interval_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        let max_wait_secs = parse_var(&var, "MILKY_MAX_WAIT_SECS")?
            .or(file.max_wait_secs)
            .unwrap_or(DEFAULT_MAX_WAIT_SECS);
        let max_upload_mb = parse_var(&var, "MILKY_MAX_UPLOAD_MB")?
            .or(file.max_upload_mb)
            .unwrap_or(DEFAULT_MAX_UPLOAD_MB);
        let system_prompt = match var("MILKY_SYSTEM_PROMPT_FILE")
            .map(PathBuf::from)
            .or(file.system_prompt_file)
        {
            Some(path) => fs::read_to_string(&path)
                .with_context(|| format!("failed to read system prompt {}", path.display()))?,
            None => DEFAULT_SYSTEM_PROMPT.to_string(),
        };
        Ok(Self {
            api_key,
            store_name,
            model,
            base_url,
            upload_dir,
            index_file,
            poll_interval: Duration::from_secs(poll_interval_secs),
            max_wait: Duration::from_secs(max_wait_secs),
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            system_prompt,
        })
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: self.poll_interval,
            max_wait: self.max_wait,
        }
    }
}

pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&contents).map_err(|e| anyhow!("invalid config {}: {e}", path.display()))
}

fn parse_var<T, F>(var: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow!("{name} has invalid value {raw:?}: {e}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let cfg = RagConfig::resolve(
            FileConfig::default(),
            lookup(&[
                ("GOOGLE_API_KEY", "AIza-test"),
                ("FILE_SEARCH_STORE_NAME", "fileSearchStores/s1"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.model, "gemini-2.5-flash");
        assert_eq!(cfg.upload_dir, PathBuf::from("uploaded_docs"));
        assert_eq!(cfg.index_file, PathBuf::from("data/file_index.json"));
        assert_eq!(cfg.poll_interval, Duration::from_secs(3));
        assert_eq!(cfg.max_wait, Duration::from_secs(600));
        assert_eq!(cfg.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(cfg.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn missing_api_key_is_reported_by_name() {
        let err = RagConfig::resolve(
            FileConfig::default(),
            lookup(&[("FILE_SEARCH_STORE_NAME", "fileSearchStores/s1")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn missing_store_is_reported_by_name() {
        let err = RagConfig::resolve(FileConfig::default(), lookup(&[("GOOGLE_API_KEY", "k")]))
            .unwrap_err();
        assert!(err.to_string().contains("FILE_SEARCH_STORE_NAME"));
    }

    #[test]
    fn environment_overrides_file_values() {
        let file: FileConfig = toml::from_str(
            r#"
            store_name = "fileSearchStores/from-file"
            model = "gemini-2.5-pro"
            poll_interval_secs = 10
            max_wait_secs = 30
            "#,
        )
        .unwrap();
        let cfg = RagConfig::resolve(
            file,
            lookup(&[("GOOGLE_API_KEY", "k"), ("MILKY_POLL_INTERVAL_SECS", "1")]),
        )
        .unwrap();
        assert_eq!(cfg.store_name, "fileSearchStores/from-file");
        assert_eq!(cfg.model, "gemini-2.5-pro");
        assert_eq!(cfg.poll_interval, Duration::from_secs(1));
        assert_eq!(cfg.max_wait, Duration::from_secs(30));
    }

    #[test]
    fn invalid_number_is_an_error() {
        let err = RagConfig::resolve(
            FileConfig::default(),
            lookup(&[
                ("GOOGLE_API_KEY", "k"),
                ("FILE_SEARCH_STORE_NAME", "s"),
                ("MILKY_MAX_WAIT_SECS", "soon"),
            ]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("MILKY_MAX_WAIT_SECS"));
    }

    #[test]
    fn system_prompt_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        fs::write(&path, "Answer in one sentence.").unwrap();
        let cfg = RagConfig::resolve(
            FileConfig {
                system_prompt_file: Some(path),
                ..Default::default()
            },
            lookup(&[("GOOGLE_API_KEY", "k"), ("FILE_SEARCH_STORE_NAME", "s")]),
        )
        .unwrap();
        assert_eq!(cfg.system_prompt, "Answer in one sentence.");
    }

    #[test]
    fn absent_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = load_file_config(&dir.path().join("nope.toml")).unwrap();
        assert!(file.model.is_none());
    }
}
