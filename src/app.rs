//! 应用上下文初始化和批处理入口
//!
//! 负责把配置、历史记录、Actor 和事件总线组装在一起，
//! 并提供 CLI 各子命令使用的操作

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::actors::{BatchStatusActor, BatchStatusHandle, ResultSetActor, ResultSetHandle};
use crate::enrichment::{Credential, EnrichmentService, HttpStageClient};
use crate::event_bus::EventBus;
use crate::export::{CheckpointExporter, ZipCheckpointExporter};
use crate::history::{HistoryEntry, HistoryRepository, SqliteHistoryRepository};
use crate::merge::{merge_results, MergeReport};
use crate::models::VideoArtifact;
use crate::pipeline::{BatchCoordinator, BatchReport, BatchRun, CheckpointPolicy};
use crate::segmentation::SceneDetectionClient;
use crate::settings::SettingsManager;

/// 一次批处理的完整结果
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: BatchReport,
    pub merge: MergeReport,
}

/// 场景检测的结果（成功的视频 + 失败原因）
#[derive(Debug, Default)]
pub struct AnalyzeOutcome {
    pub artifacts: Vec<VideoArtifact>,
    pub failures: Vec<(PathBuf, String)>,
}

/// 应用上下文
#[derive(Clone)]
pub struct AppContext {
    pub settings: Arc<SettingsManager>,
    pub history: Arc<dyn HistoryRepository>,
    pub event_bus: Arc<EventBus>,
    pub result_set: ResultSetHandle,
    pub batch_status: BatchStatusHandle,
}

impl AppContext {
    /// 从配置文件初始化（历史记录使用配置中的 SQLite 文件）
    pub async fn initialize(config_path: PathBuf) -> Result<Self> {
        info!("初始化场景增强器...");

        let settings = Arc::new(SettingsManager::new(config_path).await?);
        let config = settings.get().await;

        let db_path = config.history_db_path.to_string_lossy().to_string();
        let history: Arc<dyn HistoryRepository> = Arc::new(
            SqliteHistoryRepository::new(&db_path)
                .await
                .with_context(|| format!("打开历史记录数据库失败: {}", db_path))?,
        );

        Ok(Self::with_components(settings, history))
    }

    /// 使用给定的组件构建上下文并启动 Actor
    pub fn with_components(
        settings: Arc<SettingsManager>,
        history: Arc<dyn HistoryRepository>,
    ) -> Self {
        let event_bus = Arc::new(EventBus::default());

        let (result_actor, result_set) = ResultSetActor::new(Vec::new());
        tokio::spawn(result_actor.run());

        let (status_actor, batch_status) = BatchStatusActor::new();
        tokio::spawn(status_actor.run());
        let _ = batch_status.follow(&event_bus);

        info!("Actor 系统已启动, 历史记录存储: {}", history.db_type());

        Self {
            settings,
            history,
            event_bus,
            result_set,
            batch_status,
        }
    }

    /// 检查场景检测服务是否可用
    pub async fn check_services(&self) -> Result<bool> {
        let config = self.settings.get().await;
        let client =
            SceneDetectionClient::new(&config.segmentation_base_url, config.request_timeout())?;

        match client.health_check().await {
            Ok(true) => {
                info!("场景检测服务正常: {}", config.segmentation_base_url);
                Ok(true)
            }
            Ok(false) => {
                warn!("场景检测服务状态异常: {}", config.segmentation_base_url);
                Ok(false)
            }
            Err(e) => {
                error!("无法连接场景检测服务 {}: {}", config.segmentation_base_url, e);
                Ok(false)
            }
        }
    }

    /// 对视频逐个进行场景检测，并为每个成功的视频创建历史条目
    pub async fn analyze_videos(&self, videos: &[PathBuf], threshold: Option<f64>) -> Result<AnalyzeOutcome> {
        let config = self.settings.get().await;
        let threshold = threshold.unwrap_or(config.detection_threshold);
        let client =
            SceneDetectionClient::new(&config.segmentation_base_url, config.request_timeout())?;

        let mut outcome = AnalyzeOutcome::default();
        for video in videos {
            match client.detect_scenes(video, threshold).await {
                Ok(analysis) => {
                    let artifact = analysis.into_artifact(video);
                    self.history
                        .insert_entry(&HistoryEntry::from_artifact(&artifact))
                        .await?;
                    outcome.artifacts.push(artifact);
                }
                Err(e) => {
                    warn!("场景检测失败 {:?}: {}", video, e);
                    outcome.failures.push((video.clone(), e.to_string()));
                }
            }
        }

        Ok(outcome)
    }

    /// 使用配置中的 HTTP 增强服务执行批处理
    pub async fn run_batch(
        &self,
        artifacts: Vec<VideoArtifact>,
        credential: &Credential,
    ) -> Result<RunOutcome> {
        let config = self.settings.get().await;
        let service: Arc<dyn EnrichmentService> = Arc::new(HttpStageClient::new(
            config.enrichment_base_url.clone(),
            config.request_timeout(),
        )?);
        let exporter: Arc<dyn CheckpointExporter> =
            Arc::new(ZipCheckpointExporter::new(config.export_dir.clone())?);

        self.run_batch_with(service, exporter, artifacts, credential).await
    }

    /// 执行批处理：载入结果集 → 协调器 → 结果合并
    pub async fn run_batch_with(
        &self,
        service: Arc<dyn EnrichmentService>,
        exporter: Arc<dyn CheckpointExporter>,
        artifacts: Vec<VideoArtifact>,
        credential: &Credential,
    ) -> Result<RunOutcome> {
        if credential.is_empty() {
            warn!("未提供凭据，增强服务可能拒绝请求");
        }

        let config = self.settings.get().await;
        self.result_set.load(artifacts.clone()).await;

        let coordinator = BatchCoordinator::new(service, exporter, self.event_bus.clone())
            .with_policy(CheckpointPolicy::new(config.checkpoint_interval));

        let mut run = BatchRun::new(artifacts);
        let report = coordinator.run(&mut run, credential).await;

        // 批处理异常终止时也合并已经完成的结果
        let merge = merge_results(&self.result_set, self.history.as_ref(), &report.enrichments).await;

        Ok(RunOutcome { report, merge })
    }

    /// 历史记录列表
    pub async fn list_history(&self) -> Result<Vec<HistoryEntry>> {
        self.history.list_entries().await
    }
}

/// 读取清单文件
pub async fn load_manifest(path: &Path) -> Result<crate::models::Manifest> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("读取清单失败: {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("解析清单失败: {}", path.display()))
}

/// 写入清单文件
pub async fn save_manifest(path: &Path, manifest: &crate::models::Manifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let json = serde_json::to_string_pretty(manifest)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}
