use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};

use crate::{
    search::SearchMode,
    storage::{self, StorageManager},
};

const CONFIG_FILE: &str = "config.yaml";

const SYNC_TICK_INTERVAL_MS: u64 = 800;
/// Chance that a picked transfer candidate completes on a given tick.
const SYNC_COMPLETION_PROBABILITY: f64 = 0.6;
const INDEXING_DEBOUNCE_MS: u64 = 500;
const SEARCH_DEBOUNCE_MS: u64 = 600;
/// Matches must score strictly above this cosine similarity.
const SEARCH_SIMILARITY_THRESHOLD: f32 = 0.25;
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_completion_probability")]
    pub completion_probability: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: SYNC_TICK_INTERVAL_MS,
            completion_probability: SYNC_COMPLETION_PROBABILITY,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IndexingConfig {
    #[serde(default = "default_indexing_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: INDEXING_DEBOUNCE_MS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "default_search_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default)]
    pub default_mode: SearchMode,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: SEARCH_DEBOUNCE_MS,
            similarity_threshold: SEARCH_SIMILARITY_THRESHOLD,
            default_mode: SearchMode::default(),
        }
    }
}

/// Where photo embeddings are stored besides the in-process index.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VectorDbKind {
    #[default]
    InMemory,
    Qdrant,
    Chroma,
    Milvus,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AiBackend {
    /// No local model server, keywords come from a built-in synonym table.
    #[default]
    Offline,
    Ollama,
    LmStudio,
    ComfyUi,
    LocalAi,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisionModel {
    #[default]
    Llama3_2Vision,
    Qwen2_5Vl,
    Aria,
}

impl VisionModel {
    /// Model tag as understood by Ollama-compatible servers.
    pub fn model_tag(&self) -> &'static str {
        match self {
            VisionModel::Llama3_2Vision => "llama3.2-vision",
            VisionModel::Qwen2_5Vl => "qwen2.5vl",
            VisionModel::Aria => "aria",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AiConfig {
    #[serde(default)]
    pub vector_db: VectorDbKind,

    #[serde(default = "default_vector_db_url")]
    pub vector_db_url: String,

    #[serde(default = "default_vector_db_collection")]
    pub vector_db_collection: String,

    #[serde(default)]
    pub vision_backend: AiBackend,

    #[serde(default)]
    pub vision_model: VisionModel,

    #[serde(default = "default_vision_url")]
    pub vision_url: String,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Falls back to the `GEMINI_API_KEY` environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            vector_db: VectorDbKind::default(),
            vector_db_url: default_vector_db_url(),
            vector_db_collection: default_vector_db_collection(),
            vision_backend: AiBackend::default(),
            vision_model: VisionModel::default(),
            vision_url: default_vision_url(),
            gemini_model: default_gemini_model(),
            gemini_api_key: None,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
        }
    }
}

impl AiConfig {
    pub fn gemini_api_key(&self) -> Option<String> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .or_else(|| self.gemini_api_key.clone())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WebConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    SYNC_TICK_INTERVAL_MS
}

fn default_completion_probability() -> f64 {
    SYNC_COMPLETION_PROBABILITY
}

fn default_indexing_debounce_ms() -> u64 {
    INDEXING_DEBOUNCE_MS
}

fn default_search_debounce_ms() -> u64 {
    SEARCH_DEBOUNCE_MS
}

fn default_similarity_threshold() -> f32 {
    SEARCH_SIMILARITY_THRESHOLD
}

fn default_vector_db_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_vector_db_collection() -> String {
    "photos".to_string()
}

fn default_vision_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_request_timeout_secs() -> u64 {
    REQUEST_TIMEOUT_SECS
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub web: WebConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        let probability = self.sync.completion_probability;
        if !(0.0..=1.0).contains(&probability) {
            bail!("sync.completion_probability must be between 0.0 and 1.0, got {probability}");
        }

        if self.sync.tick_interval_ms == 0 {
            bail!("sync.tick_interval_ms must be greater than 0");
        }

        if self.indexing.debounce_ms == 0 {
            bail!("indexing.debounce_ms must be greater than 0");
        }

        if self.search.debounce_ms == 0 {
            bail!("search.debounce_ms must be greater than 0");
        }

        let threshold = self.search.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            bail!("search.similarity_threshold must be between 0.0 and 1.0, got {threshold}");
        }

        if self.ai.request_timeout_secs == 0 {
            bail!("ai.request_timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// Default base directory: `$PSYNC_BASE_PATH` or `~/.local/share/psync`.
    pub fn default_base_path() -> anyhow::Result<PathBuf> {
        if let Ok(path) = std::env::var("PSYNC_BASE_PATH") {
            return Ok(PathBuf::from(path));
        }

        let home = homedir::my_home()
            .map_err(|err| anyhow!("failed to resolve home directory: {err}"))?
            .context("home directory is not set")?;

        Ok(home.join(".local/share/psync"))
    }

    pub fn load_with(base_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let store = storage::BackendLocal::new(base_path.as_ref())
            .context("failed to open config directory")?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store.write(
                CONFIG_FILE,
                serde_yml::to_string(&Self::default())?.as_bytes(),
            )?;
        }

        let config_str =
            String::from_utf8(store.read(CONFIG_FILE)?).context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.as_ref().to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = storage::BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default_config() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with(tmp.path()).unwrap();

        assert!(tmp.path().join(CONFIG_FILE).exists());
        assert_eq!(config.sync.tick_interval_ms, 800);
        assert!((config.sync.completion_probability - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.indexing.debounce_ms, 500);
        assert_eq!(config.search.debounce_ms, 600);
        assert!((config.search.similarity_threshold - 0.25).abs() < f32::EPSILON);
        assert_eq!(config.search.default_mode, SearchMode::LocalVector);
        assert_eq!(config.ai.vector_db, VectorDbKind::InMemory);
        assert_eq!(config.base_path(), tmp.path());
    }

    #[test]
    fn test_partial_config_is_upgraded() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "sync:\n  tick_interval_ms: 100\nai:\n  vector_db: qdrant\n",
        )
        .unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.sync.tick_interval_ms, 100);
        assert_eq!(config.ai.vector_db, VectorDbKind::Qdrant);

        let saved = std::fs::read_to_string(tmp.path().join(CONFIG_FILE)).unwrap();
        assert!(saved.contains("similarity_threshold"));
    }

    #[test]
    fn test_invalid_probability_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "sync:\n  completion_probability: 1.5\n",
        )
        .unwrap();

        let err = Config::load_with(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("completion_probability"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "ai:\n  vector_db: pinecone\n").unwrap();

        assert!(Config::load_with(tmp.path()).is_err());
    }

    #[test]
    fn test_vision_model_tags() {
        assert_eq!(VisionModel::Llama3_2Vision.model_tag(), "llama3.2-vision");
        assert_eq!(VisionModel::Qwen2_5Vl.model_tag(), "qwen2.5vl");
    }
}
