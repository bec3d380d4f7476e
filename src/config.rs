use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub library: LibraryConfig,

    #[serde(default)]
    pub indexer: IndexerConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LibraryConfig {
    /// Root directory of the watched asset library.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mediadex")
        .join("catalog.db")
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "jpg".to_string(),
        "jpeg".to_string(),
        "png".to_string(),
        "gif".to_string(),
        "webp".to_string(),
        "bmp".to_string(),
        "tif".to_string(),
        "tiff".to_string(),
    ]
}

fn default_video_extensions() -> Vec<String> {
    vec![
        "mp4".to_string(),
        "mov".to_string(),
        "webm".to_string(),
        "mkv".to_string(),
        "avi".to_string(),
        "m4v".to_string(),
    ]
}

fn default_embedding_endpoint() -> String {
    "http://127.0.0.1:1234/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-nomic-embed-text-v1.5".to_string()
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
            video_extensions: default_video_extensions(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            api_key: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            library: LibraryConfig::default(),
            indexer: IndexerConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    pub fn load_from(path: PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Create default config
            let config = Config::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("MEDIADEX_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mediadex")
            .join("config.toml")
    }
}
