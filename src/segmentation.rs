// 场景分割客户端 - 调用外部场景检测服务，把结果转换为待增强的视频素材

use anyhow::{anyhow, Context, Result};
use reqwest::{multipart, Client};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::enrichment::client::extract_error_reason;
use crate::export::ExportRecord;
use crate::models::{Scene, VideoArtifact};

const HEALTH_PATH: &str = "/api/health";
const ANALYZE_PATH: &str = "/api/analyze";

/// 服务端接受的视频扩展名
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mov", "mkv", "webm", "flv", "wmv", "mpeg", "mpg",
];

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// 场景检测结果：导出模板 + 场景列表
#[derive(Debug, Clone, Deserialize)]
pub struct SceneAnalysis {
    #[serde(flatten)]
    pub record: ExportRecord,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub temp_dir: Option<String>,
}

impl SceneAnalysis {
    /// 生成新的视频素材（每次都分配新的 id）
    pub fn into_artifact(self, media_path: &Path) -> VideoArtifact {
        VideoArtifact::from_analysis(self, media_path)
    }
}

impl VideoArtifact {
    pub fn from_analysis(analysis: SceneAnalysis, media_path: &Path) -> Self {
        let mut artifact = VideoArtifact::new(
            analysis.record.name.clone(),
            media_path,
            analysis.scenes,
        );
        artifact.template = Some(analysis.record);
        artifact
    }
}

/// 检查文件扩展名是否被服务端接受
pub fn is_allowed_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// 场景检测客户端
#[derive(Clone)]
pub struct SceneDetectionClient {
    client: Client,
    base_url: String,
}

impl SceneDetectionClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// 服务健康检查
    pub async fn health_check(&self) -> Result<bool> {
        let response = self.client.get(self.endpoint(HEALTH_PATH)).send().await?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let health: HealthResponse = response.json().await?;
        Ok(health.status == "healthy")
    }

    /// 上传视频并检测场景
    pub async fn detect_scenes(&self, video_path: &Path, threshold: f64) -> Result<SceneAnalysis> {
        if !is_allowed_video(video_path) {
            return Err(anyhow!(
                "不支持的视频格式: {}，支持: {}",
                video_path.display(),
                ALLOWED_EXTENSIONS.join(", ")
            ));
        }

        let file_content = tokio::fs::read(video_path)
            .await
            .with_context(|| format!("读取视频失败: {}", video_path.display()))?;
        let file_name = video_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video.mp4")
            .to_string();

        info!(
            "上传视频进行场景检测: {} ({} 字节, 阈值 {})",
            file_name,
            file_content.len(),
            threshold
        );

        let form = multipart::Form::new()
            .part("video", multipart::Part::bytes(file_content).file_name(file_name))
            .text("threshold", threshold.to_string());

        let response = self
            .client
            .post(self.endpoint(ANALYZE_PATH))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let reason = extract_error_reason(&body).unwrap_or_else(|| body.clone());
            return Err(anyhow!("场景检测失败 (HTTP {}): {}", status.as_u16(), reason));
        }

        let analysis: SceneAnalysis =
            serde_json::from_str(&body).context("解析场景检测结果失败")?;
        info!(
            "场景检测完成: {} 个场景, {} 个片段",
            analysis.scenes.len(),
            analysis.record.clips.len()
        );
        Ok(analysis)
    }
}
