// 场景增强器命令行入口

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use scene_enricher_lib::app::{load_manifest, save_manifest, AppContext};
use scene_enricher_lib::enrichment::Credential;
use scene_enricher_lib::logger::{self, LogBroadcaster};
use scene_enricher_lib::models::Manifest;

#[derive(Parser)]
#[command(
    name = "scene-enricher",
    version,
    about = "批量视频场景增强：氛围提取 → 图像提示词 → 视频提示词",
    after_help = "示例:\n  \
                  scene-enricher health\n  \
                  scene-enricher analyze --output manifest.json a.mp4 b.mov\n  \
                  SCENE_ENRICHER_API_KEY=... scene-enricher run --manifest manifest.json\n  \
                  scene-enricher history"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件路径
    #[arg(long, global = true, default_value = "scene-enricher.json")]
    config: PathBuf,

    /// 日志目录
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// 检查场景检测服务
    Health,

    /// 对视频做场景检测并生成清单
    Analyze {
        /// 视频文件
        #[arg(required = true)]
        videos: Vec<PathBuf>,

        /// 清单输出路径
        #[arg(short, long, default_value = "manifest.json")]
        output: PathBuf,

        /// 场景检测阈值（默认使用配置）
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// 对清单中的视频执行批量增强
    Run {
        /// 清单文件
        #[arg(long)]
        manifest: PathBuf,

        /// 增强服务凭据，原样转发
        #[arg(long, env = "SCENE_ENRICHER_API_KEY", hide_env_values = true)]
        api_key: String,
    },

    /// 列出历史记录
    History,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let broadcaster = Arc::new(LogBroadcaster::default());
    logger::init(&cli.log_dir, broadcaster).context("初始化日志系统失败")?;

    let ctx = AppContext::initialize(cli.config.clone()).await?;

    match cli.command {
        Commands::Health => {
            if ctx.check_services().await? {
                println!("服务正常");
            } else {
                bail!("服务不可用");
            }
        }

        Commands::Analyze {
            videos,
            output,
            threshold,
        } => {
            let outcome = ctx.analyze_videos(&videos, threshold).await?;
            for (video, reason) in &outcome.failures {
                eprintln!("失败 {}: {}", video.display(), reason);
            }

            let count = outcome.artifacts.len();
            save_manifest(
                &output,
                &Manifest {
                    artifacts: outcome.artifacts,
                },
            )
            .await?;
            println!("已写入清单 {} ({} 个视频)", output.display(), count);
        }

        Commands::Run { manifest, api_key } => {
            let manifest = load_manifest(&manifest).await?;
            let credential = Credential::new(api_key);
            let outcome = ctx.run_batch(manifest.artifacts, &credential).await?;

            println!("{}", outcome.report.summary);
            for failure in &outcome.report.failures {
                println!(
                    "  - {} [{}]: {}",
                    failure.video_name,
                    failure.stage.label(),
                    failure.reason
                );
            }
            for location in &outcome.report.checkpoints {
                println!("检查点: {}", location.display());
            }
            println!(
                "已合并: 结果集 {} 个, 历史记录 {} 个",
                outcome.merge.live_merged, outcome.merge.history_merged
            );

            if !outcome.report.summary.is_completed() {
                bail!("批处理异常终止");
            }
        }

        Commands::History => {
            for entry in ctx.list_history().await? {
                let status = if entry.enrichment().is_some() {
                    "已增强"
                } else {
                    "未增强"
                };
                println!(
                    "{:>5}  {}  {} 个场景  {}  {}",
                    entry.id.unwrap_or_default(),
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.scene_count,
                    status,
                    entry.display_name
                );
            }
        }
    }

    Ok(())
}
