// 导出记录 - 字段顺序固定，下游按此顺序读取

use serde::{Deserialize, Serialize};

use super::canonical::{self, seconds_to_frame_notation};

/// 默认背景音乐
pub const DEFAULT_MUSIC_FILE: &str = "audio/fade_story.mp3";
/// 默认帧率（秒.帧 记法使用）
pub const DEFAULT_FPS: u32 = 30;
/// 默认淡出时长（秒）
const DEFAULT_FADE_OUT_SECONDS: f64 = 1.9;

/// 片段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRecord {
    pub index: u32,
    #[serde(with = "canonical::serde_f64")]
    pub duration: f64,
    pub required: bool,
}

/// 片段之间的转场
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    #[serde(rename = "type")]
    pub transition_type: String,
    #[serde(with = "canonical::serde_f64")]
    pub duration: f64,
    pub between_clips: [u32; 2],
}

impl TransitionRecord {
    /// 相邻片段之间的硬切
    pub fn cut(from: u32) -> Self {
        Self {
            transition_type: "cut".to_string(),
            duration: 0.0,
            between_clips: [from, from + 1],
        }
    }
}

/// 规范导出记录
///
/// 字段顺序: name, clips, transitions, logo_outro, music_file,
/// fade_in_duration, fade_out_duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub name: String,
    pub clips: Vec<ClipRecord>,
    pub transitions: Vec<TransitionRecord>,
    #[serde(default)]
    pub logo_outro: bool,
    #[serde(default = "default_music_file")]
    pub music_file: String,
    #[serde(with = "canonical::serde_f64")]
    pub fade_in_duration: f64,
    #[serde(with = "canonical::serde_f64")]
    pub fade_out_duration: f64,
}

fn default_music_file() -> String {
    DEFAULT_MUSIC_FILE.to_string()
}

impl ExportRecord {
    /// 按场景数生成默认记录（片段时长未知时为 0.0）
    pub fn with_scene_count(name: &str, scene_count: usize) -> Self {
        let clips = (1..=scene_count as u32)
            .map(|index| ClipRecord {
                index,
                duration: 0.0,
                required: true,
            })
            .collect();
        let transitions = (1..scene_count as u32).map(TransitionRecord::cut).collect();

        Self {
            name: name.to_string(),
            clips,
            transitions,
            logo_outro: false,
            music_file: default_music_file(),
            fade_in_duration: seconds_to_frame_notation(0.0, DEFAULT_FPS),
            fade_out_duration: seconds_to_frame_notation(DEFAULT_FADE_OUT_SECONDS, DEFAULT_FPS),
        }
    }

    /// 所有片段时长之和（秒.帧 记法直接相加，仅用于概览）
    pub fn total_clip_duration(&self) -> f64 {
        let sum: f64 = self.clips.iter().map(|c| c.duration).sum();
        (sum * 100.0).round() / 100.0
    }
}
