// 批处理集成测试：用 axum 在本地起一个假的增强服务

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use scene_enricher_lib::app::AppContext;
use scene_enricher_lib::enrichment::{Credential, EnrichmentService, HttpStageClient};
use scene_enricher_lib::event_bus::{BatchEvent, EventBus};
use scene_enricher_lib::export::CheckpointExporter;
use scene_enricher_lib::history::{HistoryEntry, HistoryRepository, SqliteHistoryRepository};
use scene_enricher_lib::models::{
    EnrichedArtifact, FailureKind, PipelineStage, RunStatus, Scene, VideoArtifact,
};
use scene_enricher_lib::pipeline::{BatchCoordinator, BatchRun, CheckpointPolicy};
use scene_enricher_lib::settings::{ConfigUpdate, SettingsManager};

const API_KEY: &str = "test-key";

/// 假的增强服务，按调用序号（从1开始）注入故障
#[derive(Default)]
struct FakeService {
    decline_vibe_calls: Vec<usize>,
    empty_vibe_calls: Vec<usize>,
    fail_image_calls: Vec<usize>,
    short_image_calls: Vec<usize>,
    vibe_calls: AtomicUsize,
    image_calls: AtomicUsize,
    video_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a FakeService);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeService {
    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(self)
    }
}

type Reply = (StatusCode, Json<Value>);

async fn vibe_extraction(State(fake): State<Arc<FakeService>>, body: Bytes) -> Reply {
    let _guard = fake.enter();
    let call = fake.vibe_calls.fetch_add(1, Ordering::SeqCst) + 1;
    tokio::time::sleep(Duration::from_millis(5)).await;

    if !String::from_utf8_lossy(&body).contains(API_KEY) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "API key is required"})),
        );
    }
    if fake.empty_vibe_calls.contains(&call) {
        return (StatusCode::OK, Json(json!({})));
    }
    if fake.decline_vibe_calls.contains(&call) {
        return (
            StatusCode::OK,
            Json(json!({"vibe_extraction": null, "error": "no usable content", "failed": true})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"vibe_extraction": format!("vibe {}", call), "failed": false})),
    )
}

async fn image_prompts(State(fake): State<Arc<FakeService>>, Json(body): Json<Value>) -> Reply {
    let _guard = fake.enter();
    let call = fake.image_calls.fetch_add(1, Ordering::SeqCst) + 1;
    tokio::time::sleep(Duration::from_millis(5)).await;

    if body["api_key"] != API_KEY {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing required fields"})),
        );
    }
    if fake.fail_image_calls.contains(&call) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "upstream overloaded"})),
        );
    }

    let scenes = body["scenes"].as_array().map(|s| s.len()).unwrap_or(0);
    let count = if fake.short_image_calls.contains(&call) {
        scenes.saturating_sub(1)
    } else {
        scenes
    };
    let prompts: Vec<String> = (1..=count).map(|i| format!("prompt {}-{}", call, i)).collect();
    (StatusCode::OK, Json(json!({ "image_prompts": prompts })))
}

async fn video_prompt(State(fake): State<Arc<FakeService>>, Json(body): Json<Value>) -> Reply {
    let _guard = fake.enter();
    let call = fake.video_calls.fetch_add(1, Ordering::SeqCst) + 1;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let prompts = body["image_prompts"].as_array().map(|p| p.len()).unwrap_or(0);
    let mut reply = json!({ "video_prompt": format!("video {} from {} prompts", call, prompts) });
    if call == 1 {
        reply["warning"] = json!("fallback prompt used");
    }
    (StatusCode::OK, Json(reply))
}

async fn spawn_fake(fake: Arc<FakeService>) -> String {
    let app = Router::new()
        .route("/api/gemini/vibe-extraction", post(vibe_extraction))
        .route("/api/gemini/image-prompts", post(image_prompts))
        .route("/api/gemini/video-prompt", post(video_prompt))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// 只记录导出调用的导出器，可以让常规检查点失败
#[derive(Default)]
struct RecordingExporter {
    calls: Mutex<Vec<(String, usize)>>,
    fail_regular: bool,
}

impl RecordingExporter {
    fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckpointExporter for RecordingExporter {
    async fn export(&self, enriched: &[EnrichedArtifact], label_suffix: &str) -> anyhow::Result<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .push((label_suffix.to_string(), enriched.len()));
        if self.fail_regular && !label_suffix.starts_with("emergency") {
            anyhow::bail!("disk full");
        }
        Ok(PathBuf::from(format!("/virtual/enrichment_{}.zip", label_suffix)))
    }
}

fn make_artifacts(dir: &Path, scene_counts: &[u32]) -> Vec<VideoArtifact> {
    scene_counts
        .iter()
        .enumerate()
        .map(|(i, &count)| {
            let media = dir.join(format!("video_{}.mp4", i + 1));
            std::fs::write(&media, b"fake-video-bytes").unwrap();
            let scenes = (1..=count)
                .map(|index| Scene {
                    scene_index: index,
                    frame_preview: "data:image/png;base64,AAAA".to_string(),
                    frame_path: None,
                })
                .collect();
            VideoArtifact::new(format!("video_{}", i + 1), media, scenes)
        })
        .collect()
}

fn drain(receiver: &mut tokio::sync::broadcast::Receiver<BatchEvent>) -> Vec<BatchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

fn coordinator(
    base_url: &str,
    exporter: Arc<dyn CheckpointExporter>,
    bus: Arc<EventBus>,
) -> BatchCoordinator {
    let service: Arc<dyn EnrichmentService> =
        Arc::new(HttpStageClient::new(base_url, Duration::from_secs(10)).unwrap());
    BatchCoordinator::new(service, exporter, bus)
}

#[tokio::test]
async fn test_service_unavailable_on_second_artifact() {
    let fake = Arc::new(FakeService {
        fail_image_calls: vec![2],
        ..Default::default()
    });
    let base_url = spawn_fake(fake.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let bus = Arc::new(EventBus::new(256));
    let mut events = bus.subscribe();
    let exporter = Arc::new(RecordingExporter::default());
    let coordinator = coordinator(&base_url, exporter.clone(), bus.clone());

    let mut run = BatchRun::new(make_artifacts(dir.path(), &[2, 3, 1]));
    let report = coordinator.run(&mut run, &Credential::new(API_KEY)).await;

    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.status, RunStatus::Completed);
    assert_eq!(run.progress(), 100);

    let failure = &report.failures[0];
    assert_eq!(failure.video_name, "video_2");
    assert_eq!(failure.stage, PipelineStage::ImagePrompts);
    assert_eq!(failure.kind, FailureKind::Hard);
    assert!(failure.reason.contains("503"), "{}", failure.reason);

    let names: Vec<&str> = report.enrichments.iter().map(|e| e.display_name.as_str()).collect();
    assert_eq!(names, vec!["video_1", "video_3"]);
    assert_eq!(report.enrichments[0].enrichment.image_prompts.len(), 2);
    assert_eq!(report.enrichments[1].enrichment.image_prompts.len(), 1);

    // 失败的视频不会进入视频提示词阶段
    assert_eq!(fake.vibe_calls.load(Ordering::SeqCst), 3);
    assert_eq!(fake.image_calls.load(Ordering::SeqCst), 3);
    assert_eq!(fake.video_calls.load(Ordering::SeqCst), 2);

    // 三个视频只在最后导出一次
    assert_eq!(exporter.calls(), vec![("3_of_3".to_string(), 2)]);

    let events = drain(&mut events);
    assert!(matches!(events.first(), Some(BatchEvent::BatchStarted { total: 3, .. })));
    assert!(matches!(events.last(), Some(BatchEvent::BatchCompleted { .. })));
    let percents: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
    assert_eq!(percents.last(), Some(&100));
}

#[tokio::test]
async fn test_soft_failure_does_not_stop_batch() {
    let fake = Arc::new(FakeService {
        decline_vibe_calls: vec![1],
        ..Default::default()
    });
    let base_url = spawn_fake(fake.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let exporter = Arc::new(RecordingExporter::default());
    let coordinator = coordinator(&base_url, exporter.clone(), Arc::new(EventBus::default()));

    let mut run = BatchRun::new(make_artifacts(dir.path(), &[1, 2]));
    let report = coordinator.run(&mut run, &Credential::new(API_KEY)).await;

    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(report.summary.failed, 1);

    let failure = &report.failures[0];
    assert_eq!(failure.video_name, "video_1");
    assert_eq!(failure.stage, PipelineStage::VibeExtraction);
    assert_eq!(failure.kind, FailureKind::Soft);
    assert_eq!(failure.reason, "no usable content");

    // 软失败的视频不再发起后续调用
    assert_eq!(fake.image_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fake.video_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_vibe_body_without_result_is_hard_failure() {
    let fake = Arc::new(FakeService {
        empty_vibe_calls: vec![1],
        ..Default::default()
    });
    let base_url = spawn_fake(fake.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let exporter = Arc::new(RecordingExporter::default());
    let coordinator = coordinator(&base_url, exporter, Arc::new(EventBus::default()));

    let mut run = BatchRun::new(make_artifacts(dir.path(), &[1, 1]));
    let report = coordinator.run(&mut run, &Credential::new(API_KEY)).await;

    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(report.failures[0].video_name, "video_1");
    assert_eq!(report.failures[0].stage, PipelineStage::VibeExtraction);
    assert_eq!(report.failures[0].kind, FailureKind::Hard);
    assert_eq!(fake.image_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_single_artifact_reaches_full_progress() {
    let fake = Arc::new(FakeService::default());
    let base_url = spawn_fake(fake.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let bus = Arc::new(EventBus::new(64));
    let mut events = bus.subscribe();
    let exporter = Arc::new(RecordingExporter::default());
    let coordinator = coordinator(&base_url, exporter.clone(), bus.clone());

    let mut run = BatchRun::new(make_artifacts(dir.path(), &[2]));
    let report = coordinator.run(&mut run, &Credential::new(API_KEY)).await;

    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(run.progress(), 100);
    assert_eq!(exporter.calls(), vec![("1_of_1".to_string(), 1)]);

    let percents: Vec<u8> = drain(&mut events)
        .iter()
        .filter_map(|e| match e {
            BatchEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![100]);
}

#[tokio::test]
async fn test_prompt_count_mismatch_is_hard_failure() {
    let fake = Arc::new(FakeService {
        short_image_calls: vec![1],
        ..Default::default()
    });
    let base_url = spawn_fake(fake.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let exporter = Arc::new(RecordingExporter::default());
    let coordinator = coordinator(&base_url, exporter, Arc::new(EventBus::default()));

    let mut run = BatchRun::new(make_artifacts(dir.path(), &[3]));
    let report = coordinator.run(&mut run, &Credential::new(API_KEY)).await;

    assert_eq!(report.summary.failed, 1);
    assert_eq!(run.progress(), 100);
    assert_eq!(report.failures[0].stage, PipelineStage::ImagePrompts);
    assert_eq!(report.failures[0].kind, FailureKind::Hard);
    assert_eq!(fake.video_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_checkpoints_every_five_and_at_end() {
    let fake = Arc::new(FakeService::default());
    let base_url = spawn_fake(fake.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let exporter = Arc::new(RecordingExporter::default());
    let coordinator = coordinator(&base_url, exporter.clone(), Arc::new(EventBus::default()))
        .with_policy(CheckpointPolicy::default());

    let mut run = BatchRun::new(make_artifacts(dir.path(), &[1; 12]));
    let report = coordinator.run(&mut run, &Credential::new(API_KEY)).await;

    assert_eq!(report.summary.succeeded, 12);
    assert_eq!(
        exporter.calls(),
        vec![
            ("5_of_12".to_string(), 5),
            ("10_of_12".to_string(), 10),
            ("12_of_12".to_string(), 12),
        ]
    );
    assert_eq!(report.checkpoints.len(), 3);

    // 同一时刻最多一个网络调用
    assert_eq!(fake.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_checkpoint_triggers_emergency_export() {
    let fake = Arc::new(FakeService::default());
    let base_url = spawn_fake(fake.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let bus = Arc::new(EventBus::new(256));
    let mut events = bus.subscribe();
    let exporter = Arc::new(RecordingExporter {
        fail_regular: true,
        ..Default::default()
    });
    let coordinator = coordinator(&base_url, exporter.clone(), bus.clone());

    let mut run = BatchRun::new(make_artifacts(dir.path(), &[1; 7]));
    let report = coordinator.run(&mut run, &Credential::new(API_KEY)).await;

    assert!(matches!(report.summary.status, RunStatus::Failed { .. }));
    assert_eq!(report.summary.succeeded, 5);
    assert_eq!(report.enrichments.len(), 5);
    assert_eq!(
        exporter.calls(),
        vec![("5_of_7".to_string(), 5), ("emergency_5".to_string(), 5)]
    );
    assert_eq!(
        report.checkpoints,
        vec![PathBuf::from("/virtual/enrichment_emergency_5.zip")]
    );
    // 第6、7个视频没有被处理
    assert_eq!(fake.vibe_calls.load(Ordering::SeqCst), 5);

    let events = drain(&mut events);
    assert!(matches!(events.last(), Some(BatchEvent::BatchFailed { .. })));
}

#[tokio::test]
async fn test_empty_batch_completes_without_export() {
    let exporter = Arc::new(RecordingExporter::default());
    let coordinator = coordinator("http://127.0.0.1:9", exporter.clone(), Arc::new(EventBus::default()));

    let dir = tempfile::tempdir().unwrap();
    let mut no_scenes = make_artifacts(dir.path(), &[0]);
    no_scenes[0].scenes.clear();

    let mut run = BatchRun::new(no_scenes);
    let report = coordinator.run(&mut run, &Credential::new(API_KEY)).await;

    assert_eq!(report.summary.total, 0);
    assert_eq!(report.summary.excluded, 1);
    assert!(report.summary.is_completed());
    assert_eq!(run.progress(), 100);
    assert!(exporter.calls().is_empty());
}

#[tokio::test]
async fn test_run_batch_merges_into_history_and_exports_zip() {
    let fake = Arc::new(FakeService {
        fail_image_calls: vec![2],
        ..Default::default()
    });
    let base_url = spawn_fake(fake.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let export_dir = dir.path().join("exports");

    let settings = Arc::new(
        SettingsManager::new(dir.path().join("config.json"))
            .await
            .unwrap(),
    );
    settings
        .update(ConfigUpdate {
            enrichment_base_url: Some(base_url),
            request_timeout_secs: Some(10),
            export_dir: Some(export_dir.clone()),
            ..Default::default()
        })
        .await
        .unwrap();

    let history = Arc::new(SqliteHistoryRepository::in_memory().await.unwrap());
    let artifacts = make_artifacts(dir.path(), &[2, 3, 1]);
    for artifact in &artifacts {
        history
            .insert_entry(&HistoryEntry::from_artifact(artifact))
            .await
            .unwrap();
    }

    let ctx = AppContext::with_components(settings, history.clone());
    let outcome = ctx
        .run_batch(artifacts.clone(), &Credential::new(API_KEY))
        .await
        .unwrap();

    assert_eq!(outcome.report.summary.succeeded, 2);
    assert_eq!(outcome.merge.live_merged, 2);
    assert_eq!(outcome.merge.history_merged, 2);

    // 结果集：成功的视频带上增强结果，失败的保持原样
    let live = ctx.result_set.snapshot().await;
    assert_eq!(live.len(), 3);
    assert!(live[0].enrichment.is_some());
    assert!(live[1].enrichment.is_none());
    assert!(live[2].enrichment.is_some());

    // 历史记录：按名称覆盖，不新增条目
    let entries = history.list_entries().await.unwrap();
    assert_eq!(entries.len(), 3);
    let enriched = |name: &str| {
        entries
            .iter()
            .find(|e| e.display_name == name)
            .and_then(|e| e.enrichment())
    };
    assert!(enriched("video_1").is_some());
    assert!(enriched("video_2").is_none());
    assert_eq!(enriched("video_3").unwrap().image_prompts.len(), 1);

    // 检查点压缩包
    let archive_path = export_dir.join("enrichment_3_of_3.zip");
    assert_eq!(outcome.report.checkpoints, vec![archive_path.clone()]);
    let mut archive = zip::ZipArchive::new(std::fs::File::open(&archive_path).unwrap()).unwrap();
    assert_eq!(archive.len(), 3);

    let mut csv = String::new();
    archive
        .by_name("results.csv")
        .unwrap()
        .read_to_string(&mut csv)
        .unwrap();
    assert_eq!(csv.lines().count(), 3);

    let mut json = String::new();
    archive
        .by_name("json/002_video_3.json")
        .unwrap()
        .read_to_string(&mut json)
        .unwrap();
    let doc: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(doc["name"], "video_3");
    assert_eq!(doc["fade_out_duration"], 1.27);
    assert_eq!(doc["enrichment"]["image_prompts"].as_array().unwrap().len(), 1);

    // 批处理状态 Actor 跟随事件总线
    tokio::time::sleep(Duration::from_millis(50)).await;
    let status = ctx.batch_status.get().await;
    assert!(!status.is_running);
    assert_eq!(status.percent, 100);
    assert_eq!(status.last_checkpoint, Some(archive_path));
}
