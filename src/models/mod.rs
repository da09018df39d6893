// 数据模型模块 - 定义所有的数据结构

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

// 重新导出导出记录相关类型
pub use crate::export::record::{ClipRecord, ExportRecord, TransitionRecord};

/// 获取当前本地时间（以 DateTime<Utc> 类型表示，但值为本地时间）
pub fn local_now() -> DateTime<Utc> {
    Local::now().naive_local().and_utc()
}

/// 视频素材的稳定标识，导入时分配，运行期间不会复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub Uuid);

impl ArtifactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 检测出的场景
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// 场景序号（从1开始）
    pub scene_index: u32,
    /// 首帧预览（base64，可带 data URL 前缀）
    #[serde(default)]
    pub frame_preview: String,
    /// 首帧在磁盘上的路径（可选）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_path: Option<String>,
}

/// AI 增强结果：要么完整存在，要么完全没有
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    /// 品牌氛围描述
    pub vibe_description: String,
    /// 每个场景一条图像提示词，顺序与场景一致
    pub image_prompts: Vec<String>,
    /// 由全部图像提示词合成的视频提示词
    pub video_prompt: String,
}

/// 视频素材：一个上传的视频及其场景集合
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoArtifact {
    #[serde(default)]
    pub id: ArtifactId,
    pub display_name: String,
    /// 源视频文件路径
    pub media_path: PathBuf,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    /// 场景分割服务给出的导出模板
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<ExportRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
    #[serde(default = "local_now")]
    pub created_at: DateTime<Utc>,
}

impl VideoArtifact {
    pub fn new(display_name: impl Into<String>, media_path: impl Into<PathBuf>, scenes: Vec<Scene>) -> Self {
        Self {
            id: ArtifactId::new(),
            display_name: display_name.into(),
            media_path: media_path.into(),
            scenes,
            template: None,
            enrichment: None,
            created_at: local_now(),
        }
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    /// 不满足增强前置条件的原因（None 表示可以参与批处理）
    pub fn ineligibility_reason(&self) -> Option<&'static str> {
        if self.media_path.as_os_str().is_empty() {
            return Some("缺少源视频");
        }
        if self.scenes.is_empty() {
            return Some("没有检测到场景");
        }
        None
    }

    pub fn is_eligible(&self) -> bool {
        self.ineligibility_reason().is_none()
    }

    /// 导出记录：优先使用分割服务给出的模板，否则按场景数生成默认记录
    pub fn export_record(&self) -> ExportRecord {
        match &self.template {
            Some(template) => {
                let mut record = template.clone();
                record.name = self.display_name.clone();
                record
            }
            None => ExportRecord::with_scene_count(&self.display_name, self.scene_count()),
        }
    }
}

/// 流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Pending,
    VibeExtraction,
    ImagePrompts,
    VideoPrompt,
    Complete,
    Failed,
}

impl PipelineStage {
    pub fn label(&self) -> &str {
        match self {
            Self::Pending => "等待中",
            Self::VibeExtraction => "氛围提取",
            Self::ImagePrompts => "图像提示词生成",
            Self::VideoPrompt => "视频提示词合成",
            Self::Complete => "已完成",
            Self::Failed => "已失败",
        }
    }
}

/// 失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// 服务明确表示没有可用结果
    Soft,
    /// 网络、HTTP 状态或响应格式错误
    Hard,
}

/// 单个视频的失败记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub video_name: String,
    pub reason: String,
    /// 失败发生时所处的阶段
    pub stage: PipelineStage,
    pub kind: FailureKind,
}

/// 批处理中成功完成的视频
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedArtifact {
    pub artifact_id: ArtifactId,
    pub display_name: String,
    pub export: ExportRecord,
    pub scene_count: usize,
    pub enrichment: Enrichment,
}

impl EnrichedArtifact {
    pub fn new(artifact: &VideoArtifact, enrichment: Enrichment) -> Self {
        Self {
            artifact_id: artifact.id,
            display_name: artifact.display_name.clone(),
            export: artifact.export_record(),
            scene_count: artifact.scene_count(),
            enrichment,
        }
    }
}

/// 批处理结束状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed { error: String },
}

/// 批处理汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// 参与处理的视频数
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 因缺少场景或源视频而被排除的视频数
    pub excluded: usize,
    pub status: RunStatus,
}

impl BatchSummary {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "总计: {} 个视频, 成功: {} 个, 失败: {} 个",
            self.total, self.succeeded, self.failed
        )?;
        if self.excluded > 0 {
            write!(f, ", 排除: {} 个", self.excluded)?;
        }
        if let RunStatus::Failed { error } = &self.status {
            write!(f, " (批处理异常终止: {})", error)?;
        }
        Ok(())
    }
}

/// 批处理清单文件（CLI 输入）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub artifacts: Vec<VideoArtifact>,
}
