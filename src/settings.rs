use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::pipeline::DEFAULT_CHECKPOINT_INTERVAL;

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:5001";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_DETECTION_THRESHOLD: f64 = 15.0;

/// 持久化配置（凭证不在这里，每次运行时单独提供）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub enrichment_base_url: String,
    pub segmentation_base_url: String,
    pub request_timeout_secs: u64,
    pub checkpoint_interval: usize,
    pub detection_threshold: f64,
    pub export_dir: PathBuf,
    pub history_db_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enrichment_base_url: DEFAULT_SERVICE_URL.to_string(),
            segmentation_base_url: DEFAULT_SERVICE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            export_dir: PathBuf::from("exports"),
            history_db_path: PathBuf::from("data/history.db"),
        }
    }
}

impl AppConfig {
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

/// 配置的部分更新
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub enrichment_base_url: Option<String>,
    pub segmentation_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub checkpoint_interval: Option<usize>,
    pub detection_threshold: Option<f64>,
    pub export_dir: Option<PathBuf>,
    pub history_db_path: Option<PathBuf>,
}

pub struct SettingsManager {
    path: PathBuf,
    data: RwLock<AppConfig>,
}

impl SettingsManager {
    pub async fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let initial = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice::<AppConfig>(&bytes)
                .unwrap_or_else(|e| {
                    tracing::warn!("配置文件解析失败，使用默认配置: {}", e);
                    AppConfig::default()
                }),
            _ => {
                let default = AppConfig::default();
                let json = serde_json::to_string_pretty(&default)?;
                tokio::fs::write(&path, json).await?;
                default
            }
        };

        Ok(Self {
            path,
            data: RwLock::new(initial),
        })
    }

    pub async fn get(&self) -> AppConfig {
        self.data.read().await.clone()
    }

    pub async fn update(&self, update: ConfigUpdate) -> Result<AppConfig> {
        let mut config = self.data.write().await;

        if let Some(url) = update.enrichment_base_url {
            config.enrichment_base_url = url;
        }
        if let Some(url) = update.segmentation_base_url {
            config.segmentation_base_url = url;
        }
        if let Some(secs) = update.request_timeout_secs {
            config.request_timeout_secs = secs;
        }
        if let Some(interval) = update.checkpoint_interval {
            config.checkpoint_interval = interval;
        }
        if let Some(threshold) = update.detection_threshold {
            config.detection_threshold = threshold;
        }
        if let Some(dir) = update.export_dir {
            config.export_dir = dir;
        }
        if let Some(path) = update.history_db_path {
            config.history_db_path = path;
        }

        self.save(&config).await?;
        Ok(config.clone())
    }

    async fn save(&self, config: &AppConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
