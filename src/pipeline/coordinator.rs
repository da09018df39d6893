// 批处理协调器 - 逐个驱动视频经过阶段编排器
//
// 严格串行：同一时刻只有一个网络调用在进行，外部增强服务对并发和负载敏感
// 单个视频失败只记录，不会中断批处理

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::sequencer::{ItemOutcome, StageSequencer};
use crate::enrichment::{Credential, EnrichmentService};
use crate::event_bus::{BatchEvent, EventBus};
use crate::export::CheckpointExporter;
use crate::models::{BatchSummary, EnrichedArtifact, FailureRecord, RunStatus, VideoArtifact};

/// 默认检查点间隔（每处理5个视频导出一次）
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 5;

/// 单次批处理的运行状态，不跨运行持久化
#[derive(Debug, Default)]
pub struct BatchRun {
    artifacts: Vec<VideoArtifact>,
    excluded: Vec<String>,
    current_index: usize,
    processed: usize,
    successes: Vec<EnrichedArtifact>,
    failures: Vec<FailureRecord>,
    progress: u8,
    finished: bool,
}

impl BatchRun {
    /// 创建批处理，不满足前置条件的视频在开始前就被排除（不计为失败）
    pub fn new(candidates: Vec<VideoArtifact>) -> Self {
        let mut artifacts = Vec::with_capacity(candidates.len());
        let mut excluded = Vec::new();

        for artifact in candidates {
            match artifact.ineligibility_reason() {
                None => artifacts.push(artifact),
                Some(reason) => {
                    info!("排除视频 {}: {}", artifact.display_name, reason);
                    excluded.push(artifact.display_name);
                }
            }
        }

        Self {
            artifacts,
            excluded,
            ..Default::default()
        }
    }

    pub fn artifacts(&self) -> &[VideoArtifact] {
        &self.artifacts
    }

    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    pub fn total(&self) -> usize {
        self.artifacts.len()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn successes(&self) -> &[EnrichedArtifact] {
        &self.successes
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 重置为初始状态，所有视频重新从 Pending 开始
    pub fn reset(&mut self) {
        self.current_index = 0;
        self.processed = 0;
        self.successes.clear();
        self.failures.clear();
        self.progress = 0;
        self.finished = false;
    }

    /// 记录一个视频的结果，返回新的进度百分比
    fn record(&mut self, outcome: ItemOutcome) -> u8 {
        let artifact = &self.artifacts[self.current_index];
        match outcome {
            ItemOutcome::Complete(enrichment) => {
                self.successes.push(EnrichedArtifact::new(artifact, enrichment));
            }
            ItemOutcome::Failed(record) => self.failures.push(record),
        }

        self.processed += 1;
        self.current_index += 1;

        // 向下取整，且保证不回退
        let percent = (self.processed * 100 / self.total().max(1)) as u8;
        self.progress = self.progress.max(percent);
        self.progress
    }

    fn finish(&mut self) {
        self.progress = 100;
        self.finished = true;
    }

    fn summary(&self, status: RunStatus) -> BatchSummary {
        BatchSummary {
            total: self.total(),
            succeeded: self.successes.len(),
            failed: self.failures.len(),
            excluded: self.excluded.len(),
            status,
        }
    }
}

/// 检查点策略：每处理 `interval` 个视频导出一次，最后一个视频之后必定导出
#[derive(Debug, Clone, Copy)]
pub struct CheckpointPolicy {
    interval: usize,
}

impl CheckpointPolicy {
    pub fn new(interval: usize) -> Self {
        Self { interval }
    }

    pub fn should_checkpoint(&self, processed: usize, total: usize) -> bool {
        if processed == 0 {
            return false;
        }
        processed == total || (self.interval > 0 && processed % self.interval == 0)
    }
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CHECKPOINT_INTERVAL)
    }
}

/// 批处理报告（交给结果合并和调用方）
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub enrichments: Vec<EnrichedArtifact>,
    pub failures: Vec<FailureRecord>,
    pub checkpoints: Vec<PathBuf>,
}

/// 批处理协调器
pub struct BatchCoordinator {
    service: Arc<dyn EnrichmentService>,
    exporter: Arc<dyn CheckpointExporter>,
    event_bus: Arc<EventBus>,
    policy: CheckpointPolicy,
}

impl BatchCoordinator {
    pub fn new(
        service: Arc<dyn EnrichmentService>,
        exporter: Arc<dyn CheckpointExporter>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            service,
            exporter,
            event_bus,
            policy: CheckpointPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CheckpointPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 执行批处理
    ///
    /// 每次都从头处理所有视频；逐项错误在内部消化，
    /// 只有检查点导出失败这类批处理级错误会提前结束，并先尝试一次紧急导出
    pub async fn run(&self, run: &mut BatchRun, credential: &Credential) -> BatchReport {
        run.reset();
        let mut checkpoints = Vec::new();

        info!(
            "开始批处理: {} 个视频 (排除 {} 个), 服务: {}",
            run.total(),
            run.excluded().len(),
            self.service.name()
        );
        self.event_bus.publish(BatchEvent::BatchStarted {
            total: run.total(),
            excluded: run.excluded().len(),
        });

        let summary = match self.process_all(run, credential, &mut checkpoints).await {
            Ok(()) => {
                // 只有空批处理在这里才会推进进度，其余情况最后一项已经发布过 100
                let before = run.progress();
                run.finish();
                if run.progress() != before {
                    self.event_bus.publish(BatchEvent::Progress {
                        processed: run.processed(),
                        total: run.total(),
                        percent: run.progress(),
                    });
                }

                let summary = run.summary(RunStatus::Completed);
                info!("批处理完成: {}", summary);
                self.event_bus.publish(BatchEvent::BatchCompleted {
                    summary: summary.clone(),
                });
                summary
            }
            Err(err) => {
                error!("批处理异常终止: {}", err);

                // 尽力导出已经累计的结果
                let label = format!("emergency_{}", run.processed());
                match self.exporter.export(run.successes(), &label).await {
                    Ok(location) => {
                        warn!("紧急导出完成: {:?}", location);
                        checkpoints.push(location);
                    }
                    Err(export_err) => error!("紧急导出失败: {}", export_err),
                }

                let summary = run.summary(RunStatus::Failed {
                    error: err.to_string(),
                });
                self.event_bus.publish(BatchEvent::BatchFailed {
                    error: err.to_string(),
                    summary: summary.clone(),
                });
                summary
            }
        };

        BatchReport {
            summary,
            enrichments: run.successes().to_vec(),
            failures: run.failures().to_vec(),
            checkpoints,
        }
    }

    async fn process_all(
        &self,
        run: &mut BatchRun,
        credential: &Credential,
        checkpoints: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let total = run.total();

        while run.current_index() < total {
            let position = run.current_index() + 1;
            let artifact = &run.artifacts()[run.current_index()];
            let artifact_id = artifact.id;
            let name = artifact.display_name.clone();

            info!("处理视频 {}/{}: {}", position, total, name);
            self.event_bus.publish(BatchEvent::ItemStarted {
                artifact_id,
                name: name.clone(),
                position,
                total,
                percent: run.progress(),
            });

            // 独立任务中处理并立即等待，任务 panic 转为批处理级错误
            let service = self.service.clone();
            let item_credential = credential.clone();
            let item = artifact.clone();
            let outcome = tokio::spawn(async move {
                StageSequencer::new(service.as_ref(), &item_credential)
                    .run(&item)
                    .await
            })
            .await
            .map_err(|e| anyhow!("处理视频 {} 时任务异常退出: {}", name, e))?;
            match &outcome {
                ItemOutcome::Complete(_) => {
                    self.event_bus.publish(BatchEvent::ItemCompleted {
                        artifact_id,
                        name,
                        position,
                    });
                }
                ItemOutcome::Failed(failure) => {
                    self.event_bus.publish(BatchEvent::ItemFailed {
                        artifact_id,
                        position,
                        failure: failure.clone(),
                    });
                }
            }

            let percent = run.record(outcome);
            self.event_bus.publish(BatchEvent::Progress {
                processed: run.processed(),
                total,
                percent,
            });

            if self.policy.should_checkpoint(run.processed(), total) {
                let label = format!("{}_of_{}", run.processed(), total);
                let location = self.exporter.export(run.successes(), &label).await?;
                self.event_bus.publish(BatchEvent::CheckpointExported {
                    processed: run.processed(),
                    label,
                    location: location.clone(),
                });
                checkpoints.push(location);
            }
        }

        Ok(())
    }
}
