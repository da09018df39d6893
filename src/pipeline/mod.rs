// 批处理流水线 - 阶段编排器 + 批处理协调器

pub mod coordinator;
pub mod sequencer;

pub use coordinator::{
    BatchCoordinator, BatchReport, BatchRun, CheckpointPolicy, DEFAULT_CHECKPOINT_INTERVAL,
};
pub use sequencer::{ItemOutcome, StageSequencer};
