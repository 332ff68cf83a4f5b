//! レジストリ構築用の設定
//!
//! 角度はすべて度で受け取り、レジストリ構築時にラジアンへ変換する。
//! serde で任意のフォーマットから読み込める（CLI は TOML）。

use crate::error::ConfigError;
use crate::event_time::EventTimeStrategy;
use crate::geometry::TableGeometry;
use serde::{Deserialize, Serialize};

/// 固定小数点ビット精度
///
/// FPGA 実装と一致させるため、各値は 2 進小数ビット数で指定する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Precision {
    /// φ / alpha の精度
    pub alpha: u32,
    /// ワイヤ数 / 2π スケールの精度
    pub scale: u32,
    /// idRef の精度
    pub id: u32,
    /// ネットワーク入力の精度（tanh 出力の精度も兼ねる）
    pub input: u32,
    /// 重みの精度
    pub weight: u32,
    /// tanh LUT 入力の精度
    pub lut: u32,
}

/// 各精度の上限（i64 積和演算で桁あふれしない範囲）
const MAX_PRECISION_BITS: u32 = 24;

/// tanh LUT の大きさを決める精度（`lut` と tanh = `input`）の上限
///
/// 16 ビットで約 80 万エントリ。
const MAX_TABLE_BITS: u32 = 16;

impl Precision {
    /// tanh 出力の精度
    ///
    /// 活性化出力は次の層の入力になるため、入力精度と同じ。
    #[inline]
    pub const fn tanh(&self) -> u32 {
        self.input
    }

    /// idRef 計算時の右シフト量（alpha + scale - id）
    #[inline]
    pub const fn id_shift(&self) -> u32 {
        self.alpha + self.scale - self.id
    }

    /// 積和結果から LUT 入力への右シフト量（input + weight - lut）
    #[inline]
    pub const fn lut_shift(&self) -> u32 {
        self.input + self.weight - self.lut
    }

    /// 精度の整合性を検証
    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("alpha", self.alpha),
            ("scale", self.scale),
            ("id", self.id),
            ("input", self.input),
            ("weight", self.weight),
            ("lut", self.lut),
        ];
        for (name, bits) in named {
            if bits == 0 || bits > MAX_PRECISION_BITS {
                return Err(ConfigError::InvalidPrecision(format!(
                    "{name} = {bits}, expected 1..={MAX_PRECISION_BITS}"
                )));
            }
        }
        for (name, bits) in [("input", self.input), ("lut", self.lut)] {
            if bits > MAX_TABLE_BITS {
                return Err(ConfigError::InvalidPrecision(format!(
                    "{name} = {bits}, expected 1..={MAX_TABLE_BITS}"
                )));
            }
        }
        if self.alpha + self.scale < self.id {
            return Err(ConfigError::InvalidPrecision(format!(
                "alpha + scale ({}) must be >= id ({})",
                self.alpha + self.scale,
                self.id
            )));
        }
        if self.input + self.weight < self.lut {
            return Err(ConfigError::InvalidPrecision(format!(
                "input + weight ({}) must be >= lut ({})",
                self.input + self.weight,
                self.lut
            )));
        }
        Ok(())
    }
}

impl Default for Precision {
    fn default() -> Self {
        Self {
            alpha: 12,
            scale: 8,
            id: 8,
            input: 12,
            weight: 10,
            lut: 10,
        }
    }
}

/// セクターエキスパート群の設定
///
/// リスト型フィールドは「全セクター共通の1要素」か「セクター数と同じ要素数」。
/// φ / q/pT / θ / SL パターンの4軸の要素数の積がセクター数に一致する場合は
/// 独立軸の直積としてセクターを割り当てる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuroConfig {
    /// セクター（エキスパート MLP）数
    pub n_sectors: usize,
    /// 隠れ層のノード数（層毎）。`multiply_hidden` が真なら入力数に対する倍率
    pub n_hidden: Vec<Vec<f32>>,
    /// 隠れ層ノード数を入力数で乗算するか
    pub multiply_hidden: bool,
    /// z を出力するか
    pub target_z: bool,
    /// θ を出力するか
    pub target_theta: bool,
    /// 出力スケール: 出力 i を [-1, 1] から [scale[2i], scale[2i+1]] へ（z: cm, θ: 度）
    pub output_scale: Vec<Vec<f32>>,
    /// 使用 φ 範囲 [度]
    pub phi_range: Vec<[f32; 2]>,
    /// 使用 q/pT 範囲 [c/GeV]
    pub invpt_range: Vec<[f32; 2]>,
    /// 使用 θ 範囲 [度]
    pub theta_range: Vec<[f32; 2]>,
    /// 学習 φ 範囲 [度]（空なら使用範囲と同じ）
    pub phi_range_train: Vec<[f32; 2]>,
    /// 学習 q/pT 範囲 [c/GeV]（空なら使用範囲と同じ）
    pub invpt_range_train: Vec<[f32; 2]>,
    /// 学習 θ 範囲 [度]（空なら使用範囲と同じ）
    pub theta_range_train: Vec<[f32; 2]>,
    /// スーパーレイヤー毎の最大ヒット数（1要素 or `sl_pattern` と同数）
    pub max_hits_per_sl: Vec<usize>,
    /// 要求するスーパーレイヤーヒットパターン（ビット i = SL i）
    pub sl_pattern: Vec<u16>,
    /// パターン比較に使うマスク（1要素 or `sl_pattern` と同数）
    pub sl_pattern_mask: Vec<u16>,
    /// 最大ドリフト時間（トリガークロック単位）
    pub t_max: i32,
    /// 関連 ID 窓（18値 = 9 SL × [下限, 上限]、空ならデフォルト）
    pub relevant_id: Vec<Vec<f32>>,
    /// イベント時間戦略
    pub event_time: EventTimeStrategy,
    /// 固定小数点精度
    pub precision: Precision,
    /// ジオメトリテーブル（CLI 用、ライブラリは `GeometryService` 経由で受け取る）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<TableGeometry>,
}

/// デフォルトの関連 ID 窓（軸方向 ±1.5、ステレオ ±7.5 ワイヤ）
pub const DEFAULT_RELEVANT_ID: [f32; 18] = [
    -1.5, 1.5, -7.5, 7.5, -1.5, 1.5, -7.5, 7.5, -1.5, 1.5, -7.5, 7.5, -1.5, 1.5, -7.5, 7.5, -1.5,
    1.5,
];

impl Default for NeuroConfig {
    fn default() -> Self {
        Self {
            n_sectors: 1,
            n_hidden: vec![vec![81.0]],
            multiply_hidden: false,
            target_z: true,
            target_theta: true,
            output_scale: vec![vec![-100.0, 100.0, 10.0, 170.0]],
            phi_range: vec![[0.0, 360.0]],
            invpt_range: vec![[-5.0, 5.0]],
            theta_range: vec![[10.0, 170.0]],
            phi_range_train: Vec::new(),
            invpt_range_train: Vec::new(),
            theta_range_train: Vec::new(),
            max_hits_per_sl: vec![1],
            sl_pattern: vec![0],
            sl_pattern_mask: vec![0],
            t_max: 256,
            relevant_id: Vec::new(),
            event_time: EventTimeStrategy::EtfOrFastestPriority,
            precision: Precision::default(),
            geometry: None,
        }
    }
}

impl NeuroConfig {
    /// 有効な出力数（z / θ）
    #[inline]
    pub fn n_targets(&self) -> usize {
        usize::from(self.target_z) + usize::from(self.target_theta)
    }

    /// 4軸の要素数の積がセクター数に一致するか（独立軸の直積モード）
    pub fn is_sector_product(&self) -> bool {
        self.phi_range.len() * self.invpt_range.len() * self.theta_range.len() * self.sl_pattern.len()
            == self.n_sectors
    }

    /// セクターの軸インデックス [φ, q/pT, θ, パターン]
    ///
    /// 直積モードでは混合基数分解（φ が最下位桁）、
    /// それ以外はセクター番号を各軸の要素数で割った余り。
    pub fn range_indices(&self, sector: usize) -> [usize; 4] {
        let n_phi = self.phi_range.len().max(1);
        let n_pt = self.invpt_range.len().max(1);
        let n_theta = self.theta_range.len().max(1);
        let n_pattern = self.sl_pattern.len().max(1);

        if self.is_sector_product() {
            [
                sector % n_phi,
                (sector / n_phi) % n_pt,
                (sector / (n_phi * n_pt)) % n_theta,
                sector / (n_phi * n_pt * n_theta),
            ]
        } else {
            [
                sector % n_phi,
                sector % n_pt,
                sector % n_theta,
                sector % n_pattern,
            ]
        }
    }
}
