// 阶段编排器 - 驱动单个视频依次经过三个阶段
//
// Pending -> VibeExtraction -> ImagePrompts -> VideoPrompt -> Complete
// 任一非终止状态都可以进入 Failed，阶段失败不自动重试

use tracing::{debug, info, warn};

use crate::enrichment::{Credential, EnrichmentService, StageError, VibeOutcome};
use crate::models::{Enrichment, FailureKind, FailureRecord, PipelineStage, VideoArtifact};

/// 单个视频的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Complete(Enrichment),
    Failed(FailureRecord),
}

impl ItemOutcome {
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::Complete(_) => PipelineStage::Complete,
            Self::Failed(_) => PipelineStage::Failed,
        }
    }
}

/// 阶段编排器
pub struct StageSequencer<'a> {
    service: &'a dyn EnrichmentService,
    credential: &'a Credential,
}

impl<'a> StageSequencer<'a> {
    pub fn new(service: &'a dyn EnrichmentService, credential: &'a Credential) -> Self {
        Self {
            service,
            credential,
        }
    }

    /// 处理一个视频，结果要么是完整的增强，要么是失败记录
    pub async fn run(&self, artifact: &VideoArtifact) -> ItemOutcome {
        let name = artifact.display_name.as_str();
        let mut stage = PipelineStage::Pending;

        // 阶段1: 氛围提取
        stage = transition(name, stage, PipelineStage::VibeExtraction);
        let vibe = match self
            .service
            .extract_vibe(self.credential, &artifact.media_path)
            .await
        {
            Ok(VibeOutcome::Extracted(text)) => text,
            Ok(VibeOutcome::Declined(reason)) => {
                warn!("{}: 服务未给出氛围描述，跳过该视频: {}", name, reason);
                return fail(name, stage, FailureKind::Soft, reason);
            }
            Err(err) => return fail_hard(name, stage, err),
        };

        // 阶段2: 图像提示词
        stage = transition(name, stage, PipelineStage::ImagePrompts);
        let image_prompts = match self
            .service
            .generate_image_prompts(self.credential, &artifact.scenes)
            .await
        {
            Ok(prompts) if prompts.len() == artifact.scene_count() => prompts,
            Ok(prompts) => {
                let err = StageError::Malformed(format!(
                    "返回 {} 条图像提示词，但有 {} 个场景",
                    prompts.len(),
                    artifact.scene_count()
                ));
                return fail_hard(name, stage, err);
            }
            Err(err) => return fail_hard(name, stage, err),
        };

        // 阶段3: 视频提示词
        stage = transition(name, stage, PipelineStage::VideoPrompt);
        let video_prompt = match self
            .service
            .synthesize_video_prompt(self.credential, &image_prompts)
            .await
        {
            Ok(prompt) => prompt,
            Err(err) => return fail_hard(name, stage, err),
        };

        transition(name, stage, PipelineStage::Complete);
        info!("{}: 三个阶段全部完成 ({} 条图像提示词)", name, image_prompts.len());

        ItemOutcome::Complete(Enrichment {
            vibe_description: vibe,
            image_prompts,
            video_prompt,
        })
    }
}

fn transition(name: &str, from: PipelineStage, to: PipelineStage) -> PipelineStage {
    debug!("{}: {} -> {}", name, from.label(), to.label());
    to
}

fn fail_hard(name: &str, stage: PipelineStage, err: StageError) -> ItemOutcome {
    fail(name, stage, FailureKind::Hard, format!("{}失败: {}", stage.label(), err))
}

fn fail(name: &str, stage: PipelineStage, kind: FailureKind, reason: String) -> ItemOutcome {
    warn!("{}: {} -> {} ({})", name, stage.label(), PipelineStage::Failed.label(), reason);
    ItemOutcome::Failed(FailureRecord {
        video_name: name.to_string(),
        reason,
        stage,
        kind,
    })
}
