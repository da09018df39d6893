// Result Set Actor - 持有当前会话的视频结果集
//
// 用消息传递替代Arc<Mutex<Vec<VideoArtifact>>>，批处理结束后的合并也通过这里写入

use tokio::sync::{mpsc, oneshot};

use crate::merge::merge_into_live;
use crate::models::{ArtifactId, Enrichment, VideoArtifact};

/// 结果集命令
pub enum ResultSetCommand {
    /// 载入（替换）当前结果集
    Load { artifacts: Vec<VideoArtifact> },

    /// 把增强结果写到指定视频上，返回是否找到目标
    MergeEnrichment {
        artifact_id: ArtifactId,
        enrichment: Enrichment,
        reply: oneshot::Sender<bool>,
    },

    /// 获取当前结果集的拷贝
    Snapshot {
        reply: oneshot::Sender<Vec<VideoArtifact>>,
    },

    /// 健康检查
    HealthCheck { reply: oneshot::Sender<()> },
}

/// 结果集Actor
pub struct ResultSetActor {
    receiver: mpsc::Receiver<ResultSetCommand>,
    artifacts: Vec<VideoArtifact>,
}

impl ResultSetActor {
    /// 创建新的Actor
    pub fn new(artifacts: Vec<VideoArtifact>) -> (Self, ResultSetHandle) {
        let (sender, receiver) = mpsc::channel(50);
        let actor = Self {
            receiver,
            artifacts,
        };
        let handle = ResultSetHandle { sender };
        (actor, handle)
    }

    /// 运行Actor
    pub async fn run(mut self) {
        tracing::info!("Result Set Actor 已启动");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                ResultSetCommand::Load { artifacts } => {
                    tracing::debug!("载入结果集: {} 个视频", artifacts.len());
                    self.artifacts = artifacts;
                }

                ResultSetCommand::MergeEnrichment {
                    artifact_id,
                    enrichment,
                    reply,
                } => {
                    let merged = merge_into_live(&mut self.artifacts, artifact_id, &enrichment);
                    let _ = reply.send(merged);
                }

                ResultSetCommand::Snapshot { reply } => {
                    let _ = reply.send(self.artifacts.clone());
                }

                ResultSetCommand::HealthCheck { reply } => {
                    let _ = reply.send(());
                }
            }
        }

        tracing::info!("Result Set Actor 已停止");
    }
}

/// 结果集Handle
#[derive(Clone)]
pub struct ResultSetHandle {
    sender: mpsc::Sender<ResultSetCommand>,
}

impl ResultSetHandle {
    /// 载入结果集
    pub async fn load(&self, artifacts: Vec<VideoArtifact>) {
        let _ = self.sender.send(ResultSetCommand::Load { artifacts }).await;
    }

    /// 合并增强结果，Actor 不可用时视为未找到
    pub async fn merge_enrichment(&self, artifact_id: ArtifactId, enrichment: Enrichment) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .sender
            .send(ResultSetCommand::MergeEnrichment {
                artifact_id,
                enrichment,
                reply,
            })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// 获取结果集快照
    pub async fn snapshot(&self) -> Vec<VideoArtifact> {
        let (reply, rx) = oneshot::channel();
        self.sender.send(ResultSetCommand::Snapshot { reply }).await.ok();
        rx.await.unwrap_or_default()
    }

    /// 健康检查
    pub async fn health_check(&self) -> bool {
        let (reply, rx) = oneshot::channel();

        if self
            .sender
            .send(ResultSetCommand::HealthCheck { reply })
            .await
            .is_err()
        {
            tracing::warn!("Result Set Actor 健康检查失败: 通道已关闭");
            return false;
        }

        match tokio::time::timeout(std::time::Duration::from_secs(5), rx).await {
            Ok(Ok(())) => {
                tracing::debug!("Result Set Actor 健康检查成功");
                true
            }
            Ok(Err(_)) => {
                tracing::warn!("Result Set Actor 健康检查失败: 响应通道已关闭");
                false
            }
            Err(_) => {
                tracing::warn!("Result Set Actor 健康检查超时");
                false
            }
        }
    }
}
