// 导出模块 - 规范导出记录、CSV/ZIP 检查点导出

pub mod archive;
pub mod canonical;
pub mod record;

pub use archive::ZipCheckpointExporter;
pub use canonical::{canonical_number, parse_canonical, seconds_to_frame_notation};
pub use record::{ClipRecord, ExportRecord, TransitionRecord};

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;

use crate::models::EnrichedArtifact;

/// 检查点导出接口
///
/// 批处理协调器只保证在约定的检查点以当前累计结果调用它，
/// 不关心数据最终写到哪里
#[async_trait]
pub trait CheckpointExporter: Send + Sync {
    /// 导出累计的增强结果
    ///
    /// # 参数
    /// * `enriched` - 到目前为止成功的所有视频
    /// * `label_suffix` - 标签后缀（如 `5_of_12`、`emergency_3`）
    ///
    /// # 返回
    /// * 导出结果的位置
    async fn export(&self, enriched: &[EnrichedArtifact], label_suffix: &str) -> Result<PathBuf>;
}
