// Batch Status Actor - 使用Actor模式管理批处理状态
//
// 状态只由事件总线上的批处理事件驱动，界面通过 Handle 读取快照

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::event_bus::{BatchEvent, EventBus};
use crate::models::{local_now, BatchSummary};

/// 批处理状态快照
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStatus {
    pub is_running: bool,
    pub total: usize,
    pub processed: usize,
    pub percent: u8,
    pub current_item: Option<String>,
    pub last_checkpoint: Option<PathBuf>,
    pub last_error: Option<String>,
    pub last_summary: Option<BatchSummary>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BatchStatus {
    fn apply(&mut self, event: BatchEvent) {
        match event {
            BatchEvent::BatchStarted { total, .. } => {
                *self = BatchStatus {
                    is_running: true,
                    total,
                    ..Default::default()
                };
            }
            BatchEvent::ItemStarted { name, percent, .. } => {
                self.current_item = Some(name);
                self.percent = self.percent.max(percent);
            }
            BatchEvent::ItemCompleted { .. } => {}
            BatchEvent::ItemFailed { failure, .. } => {
                self.last_error = Some(format!("{}: {}", failure.video_name, failure.reason));
            }
            BatchEvent::Progress {
                processed, percent, ..
            } => {
                self.processed = processed;
                self.percent = self.percent.max(percent);
            }
            BatchEvent::CheckpointExported { location, .. } => {
                self.last_checkpoint = Some(location);
            }
            BatchEvent::BatchCompleted { summary } => {
                self.is_running = false;
                self.current_item = None;
                self.percent = 100;
                self.last_summary = Some(summary);
            }
            BatchEvent::BatchFailed { error, summary } => {
                self.is_running = false;
                self.current_item = None;
                self.last_error = Some(error);
                self.last_summary = Some(summary);
            }
        }
        self.updated_at = Some(local_now());
    }
}

/// 批处理状态命令
pub enum BatchStatusCommand {
    /// 应用一个批处理事件
    Apply { event: BatchEvent },

    /// 获取状态
    Get { reply: oneshot::Sender<BatchStatus> },

    /// 健康检查
    HealthCheck { reply: oneshot::Sender<()> },
}

/// 批处理状态Actor
pub struct BatchStatusActor {
    receiver: mpsc::Receiver<BatchStatusCommand>,
    status: BatchStatus, // 无需RwLock
}

impl BatchStatusActor {
    /// 创建新的Actor
    pub fn new() -> (Self, BatchStatusHandle) {
        let (sender, receiver) = mpsc::channel(50);
        let actor = Self {
            receiver,
            status: BatchStatus::default(),
        };
        let handle = BatchStatusHandle { sender };
        (actor, handle)
    }

    /// 运行Actor
    pub async fn run(mut self) {
        tracing::info!("Batch Status Actor 已启动");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                BatchStatusCommand::Apply { event } => self.status.apply(event),

                BatchStatusCommand::Get { reply } => {
                    let _ = reply.send(self.status.clone());
                }

                BatchStatusCommand::HealthCheck { reply } => {
                    let _ = reply.send(());
                }
            }
        }

        tracing::info!("Batch Status Actor 已停止");
    }
}

/// 批处理状态Handle
#[derive(Clone)]
pub struct BatchStatusHandle {
    sender: mpsc::Sender<BatchStatusCommand>,
}

impl BatchStatusHandle {
    /// 应用事件
    pub async fn apply(&self, event: BatchEvent) {
        let _ = self.sender.send(BatchStatusCommand::Apply { event }).await;
    }

    /// 获取批处理状态
    pub async fn get(&self) -> BatchStatus {
        let (reply, rx) = oneshot::channel();
        self.sender.send(BatchStatusCommand::Get { reply }).await.ok();
        rx.await.unwrap_or_default()
    }

    /// 订阅事件总线，把批处理事件转发给 Actor
    pub fn follow(&self, event_bus: &EventBus) -> tokio::task::JoinHandle<()> {
        let mut receiver = event_bus.subscribe();
        let handle = self.clone();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => handle.apply(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("批处理状态落后，丢弃 {} 个事件", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// 健康检查
    pub async fn health_check(&self) -> bool {
        let (reply, rx) = oneshot::channel();

        if self
            .sender
            .send(BatchStatusCommand::HealthCheck { reply })
            .await
            .is_err()
        {
            tracing::warn!("Batch Status Actor 健康检查失败: 通道已关闭");
            return false;
        }

        match tokio::time::timeout(std::time::Duration::from_secs(5), rx).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                tracing::warn!("Batch Status Actor 健康检查失败: 响应通道已关闭");
                false
            }
            Err(_) => {
                tracing::warn!("Batch Status Actor 健康检查超时");
                false
            }
        }
    }
}
