// 事件总线 - 批处理进度、检查点和结束事件的发布/订阅
//
// 使用 tokio::sync::broadcast 实现高效的事件分发
// 协调器只负责发布，界面、状态 Actor 等按需订阅

use std::path::PathBuf;
use tokio::sync::broadcast;

use crate::models::{ArtifactId, BatchSummary, FailureRecord};

/// 批处理事件
#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// 批处理开始
    BatchStarted {
        total: usize,
        excluded: usize,
    },

    /// 开始处理某个视频（position 从1开始）
    ItemStarted {
        artifact_id: ArtifactId,
        name: String,
        position: usize,
        total: usize,
        percent: u8,
    },

    /// 视频三个阶段全部完成
    ItemCompleted {
        artifact_id: ArtifactId,
        name: String,
        position: usize,
    },

    /// 视频处理失败（批处理继续）
    ItemFailed {
        artifact_id: ArtifactId,
        position: usize,
        failure: FailureRecord,
    },

    /// 进度更新
    Progress {
        processed: usize,
        total: usize,
        percent: u8,
    },

    /// 检查点已导出
    CheckpointExported {
        processed: usize,
        label: String,
        location: PathBuf,
    },

    /// 批处理正常结束
    BatchCompleted {
        summary: BatchSummary,
    },

    /// 批处理异常终止（已尝试紧急导出）
    BatchFailed {
        error: String,
        summary: BatchSummary,
    },
}

/// 事件总线
///
/// 使用 broadcast channel 实现发布/订阅模式
/// 支持多个订阅者同时接收事件
pub struct EventBus {
    sender: broadcast::Sender<BatchEvent>,
}

impl EventBus {
    /// 创建新的事件总线
    ///
    /// # 参数
    /// - `capacity`: 事件缓冲区大小,建议 100-1000
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 发布事件
    ///
    /// 如果没有订阅者,事件会被丢弃(这是正常的)
    pub fn publish(&self, event: BatchEvent) {
        match self.sender.send(event) {
            Ok(receiver_count) => {
                tracing::trace!("事件已发布，订阅者数量: {}", receiver_count);
            }
            Err(_) => {
                tracing::trace!("事件已发布但无订阅者");
            }
        }
    }

    /// 订阅事件
    ///
    /// 返回一个接收器,可以用 `.recv().await` 接收事件
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.sender.subscribe()
    }

    /// 获取当前订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_basic() {
        let bus = EventBus::new(100);

        // 订阅事件
        let mut receiver = bus.subscribe();

        // 发布事件
        bus.publish(BatchEvent::BatchStarted {
            total: 3,
            excluded: 1,
        });

        // 接收事件
        match receiver.recv().await {
            Ok(BatchEvent::BatchStarted { total, excluded }) => {
                assert_eq!(total, 3);
                assert_eq!(excluded, 1);
            }
            _ => panic!("未收到预期事件"),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(100);

        // 创建多个订阅者
        let mut receiver1 = bus.subscribe();
        let mut receiver2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(BatchEvent::Progress {
            processed: 1,
            total: 2,
            percent: 50,
        });

        // 两个订阅者都应该收到事件
        assert!(receiver1.try_recv().is_ok());
        assert!(receiver2.try_recv().is_ok());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(BatchEvent::Progress {
            processed: 0,
            total: 0,
            percent: 100,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
