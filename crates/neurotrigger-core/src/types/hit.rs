//! トラックセグメントヒット（CandidateHit）

use serde::{Deserialize, Serialize};

/// スーパーレイヤー数（軸方向 5 + ステレオ 4）
pub const NUM_SUPERLAYERS: usize = 9;

/// スーパーレイヤー番号が軸方向（偶数）かどうか
#[inline]
pub const fn is_axial(super_layer: usize) -> bool {
    super_layer % 2 == 0
}

/// 左右曖昧性フラグ（2ビット）
///
/// 上位ビット = 左、下位ビット = 右。
/// どちらか一方だけが立っているときに「既知」とみなす。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum LeftRight {
    /// 情報なし
    #[default]
    Unknown = 0,
    /// 右
    Right = 1,
    /// 左
    Left = 2,
    /// 未決定（LUT が両方を返した）
    Undecided = 3,
}

impl LeftRight {
    /// u8 から変換（下位2ビットのみ有効）
    #[inline]
    pub const fn from_u8(n: u8) -> Option<LeftRight> {
        match n {
            0 => Some(LeftRight::Unknown),
            1 => Some(LeftRight::Right),
            2 => Some(LeftRight::Left),
            3 => Some(LeftRight::Undecided),
            _ => None,
        }
    }

    /// 上位ビット（左）
    #[inline]
    pub const fn hi(self) -> i32 {
        ((self as u8 >> 1) & 1) as i32
    }

    /// 下位ビット（右）
    #[inline]
    pub const fn lo(self) -> i32 {
        (self as u8 & 1) as i32
    }

    /// 左右が確定しているか
    #[inline]
    pub const fn is_known(self) -> bool {
        matches!(self, LeftRight::Left | LeftRight::Right)
    }

    /// ドリフト時間特徴量の符号（左 = +1, 右 = -1, それ以外 = 0）
    #[inline]
    pub const fn sign(self) -> i32 {
        self.hi() - self.lo()
    }
}

impl TryFrom<u8> for LeftRight {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        LeftRight::from_u8(n).ok_or_else(|| format!("invalid left/right flag: {n}"))
    }
}

impl From<LeftRight> for u8 {
    fn from(lr: LeftRight) -> u8 {
        lr as u8
    }
}

/// プライオリティ位置コード
///
/// セグメント中心ワイヤ（第1プライオリティ）か、
/// 隣接層の半セルずれたワイヤ（第2プライオリティ）か。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Priority {
    /// ヒットなし
    None = 0,
    /// 第2プライオリティ（右側）
    SecondRight = 1,
    /// 第2プライオリティ（左側）
    SecondLeft = 2,
    /// 第1プライオリティ
    #[default]
    First = 3,
}

impl Priority {
    /// u8 から変換
    #[inline]
    pub const fn from_u8(n: u8) -> Option<Priority> {
        match n {
            0 => Some(Priority::None),
            1 => Some(Priority::SecondRight),
            2 => Some(Priority::SecondLeft),
            3 => Some(Priority::First),
            _ => None,
        }
    }

    /// センスワイヤ半径のクラス（0 = 第1プライオリティ層、1 = 第2プライオリティ層）
    #[inline]
    pub const fn class(self) -> usize {
        match self {
            Priority::First => 0,
            _ => 1,
        }
    }

    /// ワイヤ番号の補正量（半ワイヤピッチ単位）
    #[inline]
    pub const fn wire_shift(self) -> f64 {
        match self {
            Priority::SecondRight => 0.5,
            Priority::SecondLeft => -0.5,
            _ => 0.0,
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Priority::from_u8(n).ok_or_else(|| format!("invalid priority position: {n}"))
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p as u8
    }
}

/// 候補ヒット（トラックセグメントヒット）
///
/// 上流のイベントコレクションが所有する。このクレートでは読むだけ。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateHit {
    /// スーパーレイヤー番号（0..9）
    pub super_layer: usize,
    /// セグメント ID（全スーパーレイヤー通し番号）
    pub segment_id: u32,
    /// 左右曖昧性フラグ
    #[serde(default)]
    pub left_right: LeftRight,
    /// プライオリティ位置
    #[serde(default)]
    pub priority: Priority,
    /// プライオリティ時間（トリガークロック単位）
    pub priority_time: i32,
}

impl CandidateHit {
    /// 新規作成
    pub const fn new(
        super_layer: usize,
        segment_id: u32,
        left_right: LeftRight,
        priority: Priority,
        priority_time: i32,
    ) -> Self {
        Self {
            super_layer,
            segment_id,
            left_right,
            priority,
            priority_time,
        }
    }

    /// 軸方向スーパーレイヤーのヒットか
    #[inline]
    pub const fn is_axial(&self) -> bool {
        is_axial(self.super_layer)
    }

    /// 選択・イベント時間の対象になりうるか
    ///
    /// スーパーレイヤー番号が範囲外、またはプライオリティ位置が `None` のヒットは使わない。
    #[inline]
    pub const fn is_usable(&self) -> bool {
        self.super_layer < NUM_SUPERLAYERS && !matches!(self.priority, Priority::None)
    }
}
