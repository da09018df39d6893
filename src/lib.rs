// 场景增强器 - 批量视频场景增强编排库

// 声明模块
pub mod actors;
pub mod app;
pub mod enrichment;
pub mod event_bus;
pub mod export;
pub mod history;
pub mod logger;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod segmentation;
pub mod settings;

pub use app::{AppContext, RunOutcome};
