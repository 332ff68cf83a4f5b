//! 入力データ型
//!
//! ヒット・トラック・イベントの読み取り専用コレクション。

mod hit;
mod track;

pub use hit::{is_axial, CandidateHit, LeftRight, Priority, NUM_SUPERLAYERS};
pub use track::{TrackEstimate, B_FIELD_TESLA};

use serde::{Deserialize, Serialize};

/// 外部ハードウェアから供給されるイベント時間
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HardwareEventTime {
    /// 時間値（トリガークロック単位）
    pub value: i32,
    /// 有効フラグ
    pub valid: bool,
}

impl HardwareEventTime {
    /// 有効な時間
    pub const fn valid(value: i32) -> Self {
        Self { value, valid: true }
    }

    /// 無効（未供給）
    pub const INVALID: Self = Self {
        value: 0,
        valid: false,
    };
}

/// 1イベント分の入力
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventData {
    /// 候補ヒット
    #[serde(default)]
    pub hits: Vec<CandidateHit>,
    /// 2D トラック推定値
    #[serde(default)]
    pub tracks: Vec<TrackEstimate>,
    /// ハードウェアイベント時間
    #[serde(default)]
    pub hardware_time: HardwareEventTime,
}
