// ZIP 检查点导出 - 每个检查点写一个包含 results.csv 和逐个视频 JSON 的压缩包

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::canonical::canonical_number;
use super::record::ExportRecord;
use super::CheckpointExporter;
use crate::models::{EnrichedArtifact, Enrichment};

/// CSV 表头
pub const CSV_HEADER: [&str; 8] = [
    "name",
    "scene_count",
    "total_duration",
    "fade_in_duration",
    "fade_out_duration",
    "vibe_extraction",
    "image_prompts",
    "video_prompt",
];

/// 把检查点写成 ZIP 文件的导出器
pub struct ZipCheckpointExporter {
    /// 输出目录
    pub output_dir: PathBuf,
    /// 文件名前缀
    pub prefix: String,
}

impl ZipCheckpointExporter {
    /// 创建导出器（确保目录存在）
    pub fn new(output_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self {
            output_dir,
            prefix: "enrichment".to_string(),
        })
    }

    /// 检查点文件路径
    pub fn archive_path(&self, label_suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.zip", self.prefix, sanitize_file_name(label_suffix)))
    }
}

#[async_trait]
impl CheckpointExporter for ZipCheckpointExporter {
    async fn export(&self, enriched: &[EnrichedArtifact], label_suffix: &str) -> Result<PathBuf> {
        let target = self.archive_path(label_suffix);
        let items = enriched.to_vec();
        let path = target.clone();

        tokio::task::spawn_blocking(move || write_archive(&path, &items))
            .await
            .map_err(|e| anyhow!("导出任务异常退出: {}", e))??;

        info!("检查点已导出: {:?} ({} 条记录)", target, enriched.len());
        Ok(target)
    }
}

/// 生成 CSV 内容
pub fn render_csv(enriched: &[EnrichedArtifact]) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(CSV_HEADER)?;

    for item in enriched {
        let prompts = serde_json::to_string(&item.enrichment.image_prompts)?;
        wtr.write_record([
            item.display_name.as_str(),
            item.scene_count.to_string().as_str(),
            canonical_number(item.export.total_clip_duration()).as_str(),
            canonical_number(item.export.fade_in_duration).as_str(),
            canonical_number(item.export.fade_out_duration).as_str(),
            item.enrichment.vibe_description.as_str(),
            prompts.as_str(),
            item.enrichment.video_prompt.as_str(),
        ])?;
    }

    wtr.into_inner()
        .map_err(|e| anyhow!("CSV 写入失败: {}", e.error()))
}

/// 单个视频的 JSON 文档：规范导出记录 + 增强结果
pub fn render_json(item: &EnrichedArtifact) -> Result<String> {
    let document = ArtifactDocument {
        export: &item.export,
        enrichment: &item.enrichment,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

#[derive(Serialize)]
struct ArtifactDocument<'a> {
    #[serde(flatten)]
    export: &'a ExportRecord,
    enrichment: &'a Enrichment,
}

fn write_archive(path: &Path, enriched: &[EnrichedArtifact]) -> Result<()> {
    // 先写临时文件再改名，避免留下半个压缩包
    let tmp_path = path.with_extension("zip.tmp");
    let result = write_zip(&tmp_path, enriched).and_then(|()| {
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    });

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}

fn write_zip(tmp_path: &Path, enriched: &[EnrichedArtifact]) -> Result<()> {
    let file = std::fs::File::create(tmp_path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("results.csv", options)?;
    zip.write_all(&render_csv(enriched)?)?;

    for (i, item) in enriched.iter().enumerate() {
        let name = format!("json/{:03}_{}.json", i + 1, sanitize_file_name(&item.display_name));
        debug!("写入 {}", name);
        zip.start_file(name, options)?;
        zip.write_all(render_json(item)?.as_bytes())?;
    }

    zip.finish()?;
    Ok(())
}

/// 文件名中不允许的字符替换为下划线
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.trim().is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}
