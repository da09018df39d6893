// HTTP 阶段客户端 - 调用外部增强服务的三个接口

use super::{Credential, EnrichmentService, StageError, VibeOutcome};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{multipart, Client, Response};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::Scene;

const VIBE_EXTRACTION_PATH: &str = "/api/gemini/vibe-extraction";
const IMAGE_PROMPTS_PATH: &str = "/api/gemini/image-prompts";
const VIDEO_PROMPT_PATH: &str = "/api/gemini/video-prompt";

/// 氛围提取响应
#[derive(Debug, Deserialize)]
struct VibeResponse {
    #[serde(default)]
    vibe_extraction: Option<String>,
    #[serde(default)]
    failed: bool,
    #[serde(default)]
    error: Option<String>,
}

/// 图像提示词请求中的单个场景
#[derive(Debug, Serialize)]
struct ScenePayload {
    scene_index: u32,
    frame_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    frame_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct ImagePromptsRequest<'a> {
    api_key: &'a str,
    scenes: Vec<ScenePayload>,
}

#[derive(Debug, Deserialize)]
struct ImagePromptsResponse {
    image_prompts: Vec<String>,
}

#[derive(Debug, Serialize)]
struct VideoPromptRequest<'a> {
    api_key: &'a str,
    image_prompts: &'a [String],
}

#[derive(Debug, Deserialize)]
struct VideoPromptResponse {
    video_prompt: String,
    #[serde(default)]
    warning: Option<String>,
}

/// 基于 reqwest 的阶段客户端
#[derive(Clone)]
pub struct HttpStageClient {
    client: Client,
    base_url: String,
}

impl HttpStageClient {
    /// 创建客户端，每次调用都受 `timeout` 限制
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// 使用共享的HTTP客户端（复用连接池）
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// 读取成功响应的正文，非 2xx 转换为硬失败
    async fn read_body(response: Response) -> Result<String, StageError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let reason = extract_error_reason(&body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("未知错误")
                    .to_string()
            });
            return Err(StageError::Status {
                status: status.as_u16(),
                reason,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl EnrichmentService for HttpStageClient {
    async fn extract_vibe(
        &self,
        credential: &Credential,
        media_path: &Path,
    ) -> Result<VibeOutcome, StageError> {
        let file_content = tokio::fs::read(media_path)
            .await
            .map_err(|e| StageError::Media(format!("{}: {}", media_path.display(), e)))?;
        let file_name = media_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video.mp4")
            .to_string();

        info!("上传视频进行氛围提取: {} ({} 字节)", file_name, file_content.len());

        // 构建multipart form
        let form = multipart::Form::new()
            .text("api_key", credential.expose().to_string())
            .part(
                "video",
                multipart::Part::bytes(file_content).file_name(file_name),
            );

        let response = self
            .client
            .post(self.endpoint(VIBE_EXTRACTION_PATH))
            .multipart(form)
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        parse_vibe_response(&body)
    }

    async fn generate_image_prompts(
        &self,
        credential: &Credential,
        scenes: &[Scene],
    ) -> Result<Vec<String>, StageError> {
        let mut payload = Vec::with_capacity(scenes.len());
        for scene in scenes {
            payload.push(ScenePayload {
                scene_index: scene.scene_index,
                frame_preview: resolve_frame_preview(scene).await?,
                frame_path: scene.frame_path.clone(),
            });
        }

        debug!("请求图像提示词: {} 个场景", payload.len());

        let request = ImagePromptsRequest {
            api_key: credential.expose(),
            scenes: payload,
        };

        let response = self
            .client
            .post(self.endpoint(IMAGE_PROMPTS_PATH))
            .json(&request)
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        let parsed: ImagePromptsResponse =
            serde_json::from_str(&body).map_err(|e| StageError::Malformed(e.to_string()))?;
        Ok(parsed.image_prompts)
    }

    async fn synthesize_video_prompt(
        &self,
        credential: &Credential,
        image_prompts: &[String],
    ) -> Result<String, StageError> {
        let request = VideoPromptRequest {
            api_key: credential.expose(),
            image_prompts,
        };

        let response = self
            .client
            .post(self.endpoint(VIDEO_PROMPT_PATH))
            .json(&request)
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        let parsed: VideoPromptResponse =
            serde_json::from_str(&body).map_err(|e| StageError::Malformed(e.to_string()))?;

        if let Some(warning) = parsed.warning {
            warn!("视频提示词由服务端降级生成: {}", warning);
        }

        if parsed.video_prompt.trim().is_empty() {
            return Err(StageError::Malformed("video_prompt 为空".to_string()));
        }

        Ok(parsed.video_prompt)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// 解析氛围提取响应
///
/// 只有 `failed: true` 视为软失败；其余情况缺少或为空的 `vibe_extraction`
/// 以及无法解析的正文都是硬失败
pub(crate) fn parse_vibe_response(body: &str) -> Result<VibeOutcome, StageError> {
    let parsed: VibeResponse =
        serde_json::from_str(body).map_err(|e| StageError::Malformed(e.to_string()))?;

    if parsed.failed {
        let reason = parsed
            .error
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| "服务未返回可用内容".to_string());
        return Ok(VibeOutcome::Declined(reason));
    }

    match parsed.vibe_extraction {
        Some(text) if !text.trim().is_empty() => Ok(VibeOutcome::Extracted(text)),
        Some(_) => Err(StageError::Malformed("vibe_extraction 为空".to_string())),
        None => Err(StageError::Malformed(
            "响应中缺少 vibe_extraction".to_string(),
        )),
    }
}

/// 从错误响应中提取 `error` 字段
pub(crate) fn extract_error_reason(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.as_str())
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
}

/// 去掉 `data:image/png;base64,` 这类前缀
pub(crate) fn strip_data_url_prefix(preview: &str) -> &str {
    if preview.starts_with("data:") {
        if let Some((_, data)) = preview.split_once(',') {
            return data;
        }
    }
    preview
}

/// 场景预览：优先使用内联 base64，否则读取磁盘上的帧文件
async fn resolve_frame_preview(scene: &Scene) -> Result<String, StageError> {
    let inline = strip_data_url_prefix(&scene.frame_preview);
    if !inline.trim().is_empty() {
        return Ok(inline.to_string());
    }

    match &scene.frame_path {
        Some(path) => {
            let image_data = tokio::fs::read(path)
                .await
                .map_err(|e| StageError::Media(format!("场景 {} 的帧文件 {}: {}", scene.scene_index, path, e)))?;
            Ok(general_purpose::STANDARD.encode(&image_data))
        }
        None => Err(StageError::Media(format!(
            "场景 {} 没有可用的帧预览",
            scene.scene_index
        ))),
    }
}
