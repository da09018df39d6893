// 结果合并 - 把完成的增强结果写回当前结果集和历史记录
//
// 当前结果集按 ArtifactId 匹配，历史记录按显示名称匹配（同名取最新一条）
// 合并是对增强字段的整体覆盖，不会新建条目，找不到目标时跳过

use tracing::{debug, info, warn};

use crate::actors::ResultSetHandle;
use crate::history::HistoryRepository;
use crate::models::{ArtifactId, EnrichedArtifact, Enrichment, VideoArtifact};

/// 合并结果统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub live_merged: usize,
    pub history_merged: usize,
    pub live_missing: Vec<String>,
    pub history_missing: Vec<String>,
    pub history_errors: Vec<String>,
}

/// 按 id 覆盖当前结果集中视频的增强字段，返回是否找到目标
pub fn merge_into_live(
    artifacts: &mut [VideoArtifact],
    artifact_id: ArtifactId,
    enrichment: &Enrichment,
) -> bool {
    match artifacts.iter_mut().find(|a| a.id == artifact_id) {
        Some(artifact) => {
            artifact.enrichment = Some(enrichment.clone());
            true
        }
        None => false,
    }
}

/// 合并一次批处理的全部成功结果
pub async fn merge_results(
    live: &ResultSetHandle,
    history: &dyn HistoryRepository,
    completed: &[EnrichedArtifact],
) -> MergeReport {
    let mut report = MergeReport::default();

    for item in completed {
        if live
            .merge_enrichment(item.artifact_id, item.enrichment.clone())
            .await
        {
            report.live_merged += 1;
        } else {
            debug!("当前结果集中没有视频 {}，跳过", item.display_name);
            report.live_missing.push(item.display_name.clone());
        }

        match history.find_by_display_name(&item.display_name).await {
            Ok(Some(entry)) => {
                let Some(id) = entry.id else {
                    report.history_missing.push(item.display_name.clone());
                    continue;
                };
                match history.update_enrichment(id, &item.enrichment).await {
                    Ok(()) => report.history_merged += 1,
                    Err(e) => {
                        warn!("更新历史记录失败 {}: {}", item.display_name, e);
                        report.history_errors.push(item.display_name.clone());
                    }
                }
            }
            Ok(None) => {
                debug!("历史记录中没有 {}，跳过", item.display_name);
                report.history_missing.push(item.display_name.clone());
            }
            Err(e) => {
                warn!("查询历史记录失败 {}: {}", item.display_name, e);
                report.history_errors.push(item.display_name.clone());
            }
        }
    }

    info!(
        "结果合并完成: 结果集 {} 个, 历史记录 {} 个",
        report.live_merged, report.history_merged
    );
    report
}
