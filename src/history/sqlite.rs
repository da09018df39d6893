// SQLite 历史记录实现

use super::{HistoryEntry, HistoryRepository};
use crate::models::{local_now, Enrichment};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

/// SQLite 历史记录存储
pub struct SqliteHistoryRepository {
    pool: SqlitePool,
}

impl SqliteHistoryRepository {
    /// 创建新的 SQLite 数据库连接
    pub async fn new(db_path: &str) -> Result<Self> {
        info!("初始化历史记录数据库: {}", db_path);

        // 确保数据库文件的目录存在
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .idle_timeout(std::time::Duration::from_secs(300))
            .max_lifetime(std::time::Duration::from_secs(1800))
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await?;

        let repo = Self { pool };
        repo.initialize_tables().await?;
        Ok(repo)
    }

    /// 内存数据库（单连接，连接不回收）
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize_tables().await?;
        Ok(repo)
    }
}

#[async_trait]
impl HistoryRepository for SqliteHistoryRepository {
    async fn initialize_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                display_name TEXT NOT NULL,
                media_path TEXT,
                scene_count INTEGER NOT NULL DEFAULT 0,
                vibe_description TEXT,
                image_prompts TEXT,
                video_prompt TEXT,
                created_at DATETIME NOT NULL,
                updated_at DATETIME
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_display_name ON history(display_name)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_entry(&self, entry: &HistoryEntry) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO history (display_name, media_path, scene_count, vibe_description,
                                 image_prompts, video_prompt, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        )
        .bind(&entry.display_name)
        .bind(&entry.media_path)
        .bind(entry.scene_count)
        .bind(&entry.vibe_description)
        .bind(&entry.image_prompts)
        .bind(&entry.video_prompt)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_entry(&self, id: i64) -> Result<Option<HistoryEntry>> {
        let entry = sqlx::query_as::<_, HistoryEntry>(
            r#"
            SELECT id, display_name, media_path, scene_count, vibe_description,
                   image_prompts, video_prompt, created_at, updated_at
            FROM history
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn find_by_display_name(&self, display_name: &str) -> Result<Option<HistoryEntry>> {
        let entry = sqlx::query_as::<_, HistoryEntry>(
            r#"
            SELECT id, display_name, media_path, scene_count, vibe_description,
                   image_prompts, video_prompt, created_at, updated_at
            FROM history
            WHERE display_name = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(display_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn update_enrichment(&self, id: i64, enrichment: &Enrichment) -> Result<()> {
        let image_prompts = serde_json::to_string(&enrichment.image_prompts)?;
        let result = sqlx::query(
            r#"
            UPDATE history
            SET vibe_description = ?1, image_prompts = ?2, video_prompt = ?3, updated_at = ?4
            WHERE id = ?5
        "#,
        )
        .bind(&enrichment.vibe_description)
        .bind(&image_prompts)
        .bind(&enrichment.video_prompt)
        .bind(local_now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("历史条目不存在: {}", id));
        }
        Ok(())
    }

    async fn list_entries(&self) -> Result<Vec<HistoryEntry>> {
        let entries = sqlx::query_as::<_, HistoryEntry>(
            r#"
            SELECT id, display_name, media_path, scene_count, vibe_description,
                   image_prompts, video_prompt, created_at, updated_at
            FROM history
            ORDER BY id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn delete_entry(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM history WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Scene, VideoArtifact};

    fn entry(name: &str) -> HistoryEntry {
        let artifact = VideoArtifact::new(
            name,
            format!("/videos/{}.mp4", name),
            vec![Scene {
                scene_index: 1,
                frame_preview: "AAAA".to_string(),
                frame_path: None,
            }],
        );
        HistoryEntry::from_artifact(&artifact)
    }

    fn enrichment(tag: &str) -> Enrichment {
        Enrichment {
            vibe_description: format!("vibe {}", tag),
            image_prompts: vec![format!("prompt {}", tag)],
            video_prompt: format!("video {}", tag),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_by_name() {
        let repo = SqliteHistoryRepository::in_memory().await.unwrap();
        let id = repo.insert_entry(&entry("promo")).await.unwrap();

        let found = repo.find_by_display_name("promo").await.unwrap().unwrap();
        assert_eq!(found.id, Some(id));
        assert_eq!(found.scene_count, 1);
        assert!(found.enrichment().is_none());

        assert!(repo.find_by_display_name("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_enrichment_overwrites() {
        let repo = SqliteHistoryRepository::in_memory().await.unwrap();
        let id = repo.insert_entry(&entry("promo")).await.unwrap();

        repo.update_enrichment(id, &enrichment("1")).await.unwrap();
        repo.update_enrichment(id, &enrichment("2")).await.unwrap();

        let stored = repo.get_entry(id).await.unwrap().unwrap();
        assert_eq!(stored.enrichment(), Some(enrichment("2")));
        assert!(stored.updated_at.is_some());
        assert_eq!(repo.list_entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_entry_fails() {
        let repo = SqliteHistoryRepository::in_memory().await.unwrap();
        assert!(repo.update_enrichment(42, &enrichment("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_names_resolve_to_latest() {
        let repo = SqliteHistoryRepository::in_memory().await.unwrap();
        let _older = repo.insert_entry(&entry("dup")).await.unwrap();
        let newer = repo.insert_entry(&entry("dup")).await.unwrap();

        let found = repo.find_by_display_name("dup").await.unwrap().unwrap();
        assert_eq!(found.id, Some(newer));

        repo.delete_entry(newer).await.unwrap();
        let found = repo.find_by_display_name("dup").await.unwrap().unwrap();
        assert_ne!(found.id, Some(newer));
    }
}
