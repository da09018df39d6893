// 历史记录模块 - 持久化的历史条目及其存储接口

pub mod sqlite;

pub use sqlite::SqliteHistoryRepository;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{local_now, Enrichment, VideoArtifact};

/// 历史条目（独立于单次运行的 ArtifactId 创建）
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistoryEntry {
    pub id: Option<i64>,
    pub display_name: String,
    pub media_path: Option<String>,
    pub scene_count: i64,
    pub vibe_description: Option<String>,
    pub image_prompts: Option<String>, // JSON序列化的图像提示词
    pub video_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    /// 由视频素材生成历史条目（带上已有的增强结果）
    pub fn from_artifact(artifact: &VideoArtifact) -> Self {
        let mut entry = Self {
            id: None,
            display_name: artifact.display_name.clone(),
            media_path: Some(artifact.media_path.to_string_lossy().to_string()),
            scene_count: artifact.scene_count() as i64,
            vibe_description: None,
            image_prompts: None,
            video_prompt: None,
            created_at: local_now(),
            updated_at: None,
        };
        if let Some(enrichment) = &artifact.enrichment {
            entry.apply_enrichment(enrichment);
        }
        entry
    }

    /// 整体覆盖增强字段
    pub fn apply_enrichment(&mut self, enrichment: &Enrichment) {
        self.vibe_description = Some(enrichment.vibe_description.clone());
        self.image_prompts =
            Some(serde_json::to_string(&enrichment.image_prompts).unwrap_or_else(|_| "[]".to_string()));
        self.video_prompt = Some(enrichment.video_prompt.clone());
    }

    /// 只有三个字段都存在时才认为有增强结果
    pub fn enrichment(&self) -> Option<Enrichment> {
        let image_prompts: Vec<String> =
            serde_json::from_str(self.image_prompts.as_deref()?).ok()?;
        Some(Enrichment {
            vibe_description: self.vibe_description.clone()?,
            image_prompts,
            video_prompt: self.video_prompt.clone()?,
        })
    }
}

/// 历史记录存储接口
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// 初始化表结构
    async fn initialize_tables(&self) -> Result<()>;

    /// 插入历史条目
    async fn insert_entry(&self, entry: &HistoryEntry) -> Result<i64>;

    /// 获取单个条目
    async fn get_entry(&self, id: i64) -> Result<Option<HistoryEntry>>;

    /// 按显示名称查找（同名时返回最新的一条）
    async fn find_by_display_name(&self, display_name: &str) -> Result<Option<HistoryEntry>>;

    /// 覆盖条目的增强字段
    async fn update_enrichment(&self, id: i64, enrichment: &Enrichment) -> Result<()>;

    /// 列出所有条目（新的在前）
    async fn list_entries(&self) -> Result<Vec<HistoryEntry>>;

    /// 删除条目
    async fn delete_entry(&self, id: i64) -> Result<()>;

    /// 获取存储类型标识
    fn db_type(&self) -> &str;
}
