// 增强服务模块 - 定义阶段客户端接口和数据结构
//
// 每次调用只做一次网络交互，客户端内部不重试

pub mod client;

pub use client::HttpStageClient;

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::models::Scene;

/// 调用方提供的凭据，只做转发，日志中不输出明文
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// 氛围提取结果
#[derive(Debug, Clone, PartialEq)]
pub enum VibeOutcome {
    /// 成功，描述非空
    Extracted(String),
    /// 软失败：服务正常响应，但表示没有可用内容
    Declined(String),
}

/// 硬失败：网络、HTTP 状态或响应格式错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StageError {
    #[error("网络请求失败: {0}")]
    Transport(String),

    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("响应格式错误: {0}")]
    Malformed(String),

    #[error("读取素材失败: {0}")]
    Media(String),
}

impl From<reqwest::Error> for StageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StageError::Transport(format!("请求超时: {}", err))
        } else if err.is_decode() {
            StageError::Malformed(err.to_string())
        } else {
            StageError::Transport(err.to_string())
        }
    }
}

/// 增强服务接口（三个阶段各一个调用）
#[async_trait]
pub trait EnrichmentService: Send + Sync {
    /// 提取品牌氛围
    ///
    /// # 参数
    /// * `credential` - 调用方凭据
    /// * `media_path` - 源视频路径
    async fn extract_vibe(
        &self,
        credential: &Credential,
        media_path: &Path,
    ) -> Result<VibeOutcome, StageError>;

    /// 为每个场景生成图像提示词
    ///
    /// # 返回
    /// * 服务返回的提示词列表（长度由调用方校验）
    async fn generate_image_prompts(
        &self,
        credential: &Credential,
        scenes: &[Scene],
    ) -> Result<Vec<String>, StageError>;

    /// 由图像提示词合成视频提示词
    async fn synthesize_video_prompt(
        &self,
        credential: &Credential,
        image_prompts: &[String],
    ) -> Result<String, StageError>;

    /// 获取服务名称
    fn name(&self) -> &str;
}
