//! セクターエキスパート
//!
//! 1セクター = 1つの小さな全結合 MLP。
//! トラックの運動学的範囲（φ, q/pT, θ）と SL ヒットパターンで選択される。
//!
//! # 重みの並び
//!
//! ```text
//! layer 0 → 1: out 0: [in 0, in 1, ..., in N0-1, bias]
//!              out 1: [in 0, ...,              bias]
//!              ...
//! layer 1 → 2: ...
//! ```
//!
//! 1層あたり `(入力数 + 1) × 出力数` 個。

mod io;
mod registry;


pub use io::{read_weight_table, write_weight_table, WeightTableHeader, NTWT_MAGIC, NTWT_VERSION};
pub use registry::SectorRegistry;

use crate::error::ConfigError;
use crate::event_time::EventTimeStrategy;
use crate::types::NUM_SUPERLAYERS;
use std::f64::consts::TAU;

/// 1ヒットあたりの入力特徴量数（relId, 時間, alpha）
pub const FEATURES_PER_HIT: usize = 3;

/// 1ヒットスロット層あたりの入力数（3特徴量 × 9 SL）
pub const INPUTS_PER_HIT_LAYER: usize = FEATURES_PER_HIT * NUM_SUPERLAYERS;

/// 重みバッファ上のオフセット
///
/// `layer` 番目の層（`layer` → `layer + 1`）の出力 `out`、入力 `input` の重み位置。
/// `input == layer_sizes[layer]` はバイアス。
///
/// # Panics
///
/// `layer + 1 >= layer_sizes.len()` のとき（スライス範囲外）。
#[inline]
pub fn weight_offset(layer_sizes: &[usize], layer: usize, out: usize, input: usize) -> usize {
    debug_assert!(out < layer_sizes[layer + 1]);
    debug_assert!(input <= layer_sizes[layer]);

    let preceding: usize = layer_sizes[..=layer]
        .windows(2)
        .map(|w| (w[0] + 1) * w[1])
        .sum();
    preceding + out * (layer_sizes[layer] + 1) + input
}

/// トポロジーの重み総数（バイアス込み）
#[inline]
pub fn n_weights(layer_sizes: &[usize]) -> usize {
    layer_sizes.windows(2).map(|w| (w[0] + 1) * w[1]).sum()
}

/// 半開区間 [lo, hi)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub lo: f64,
    pub hi: f64,
}

impl Range {
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// lo <= x < hi
    #[inline]
    pub fn contains(&self, x: f64) -> bool {
        self.lo <= x && x < self.hi
    }

    /// 2π で周回する角度として判定
    #[inline]
    pub fn contains_wrapped(&self, phi: f64) -> bool {
        (phi - self.lo).rem_euclid(TAU) < self.hi - self.lo
    }

    /// 度 → ラジアン
    pub(crate) fn from_degrees(r: [f32; 2]) -> Self {
        Self::new(f64::from(r[0]).to_radians(), f64::from(r[1]).to_radians())
    }

    pub(crate) fn from_raw(r: [f32; 2]) -> Self {
        Self::new(f64::from(r[0]), f64::from(r[1]))
    }
}

/// 運動学的範囲（φ, q/pT, θ）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicRanges {
    /// φ [rad]
    pub phi: Range,
    /// q/pT [c/GeV]
    pub invpt: Range,
    /// θ [rad]
    pub theta: Range,
}

impl KinematicRanges {
    #[inline]
    pub fn contains(&self, phi: f64, invpt: f64, theta: f64) -> bool {
        self.phi.contains_wrapped(phi) && self.invpt.contains(invpt) && self.theta.contains(theta)
    }
}

/// セクターエキスパート
///
/// レジストリ構築時に作られ、以降は重みの読み込みを除いて変更されない。
#[derive(Debug, Clone, PartialEq)]
pub struct SectorExpert {
    layer_sizes: Vec<usize>,
    weights: Vec<f32>,
    target_z: bool,
    target_theta: bool,
    /// 出力毎の [lo, hi]（θ はラジアン）
    output_scale: Vec<[f32; 2]>,
    ranges: KinematicRanges,
    train_ranges: KinematicRanges,
    max_hits_per_sl: usize,
    sl_pattern: u16,
    sl_pattern_mask: u16,
    t_max: i32,
    /// SL 毎の関連 ID 窓 [lo, hi]（両端含む）
    relevant_id: [[f32; 2]; NUM_SUPERLAYERS],
    /// SL 毎の relId スケール（2 のべき）
    id_scale: [f32; NUM_SUPERLAYERS],
    /// 時間スケール（2 のべき）
    time_scale: f32,
    event_time: EventTimeStrategy,
}

/// 1 / max_abs 以下の最大の 2 のべき
#[inline]
fn pow2_floor_inverse(max_abs: f32) -> f32 {
    2f32.powi((1.0 / max_abs).log2().floor() as i32)
}

impl SectorExpert {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        layer_sizes: Vec<usize>,
        target_z: bool,
        target_theta: bool,
        output_scale: Vec<[f32; 2]>,
        ranges: KinematicRanges,
        train_ranges: KinematicRanges,
        max_hits_per_sl: usize,
        sl_pattern: u16,
        sl_pattern_mask: u16,
        t_max: i32,
        relevant_id: [[f32; 2]; NUM_SUPERLAYERS],
        event_time: EventTimeStrategy,
    ) -> Self {
        let id_scale = relevant_id.map(|[lo, hi]| pow2_floor_inverse(hi.max(-lo)));
        let time_scale = pow2_floor_inverse(t_max as f32);

        Self {
            layer_sizes,
            weights: Vec::new(),
            target_z,
            target_theta,
            output_scale,
            ranges,
            train_ranges,
            max_hits_per_sl,
            sl_pattern,
            sl_pattern_mask,
            t_max,
            relevant_id,
            id_scale,
            time_scale,
            event_time,
        }
    }

    // =========================================================================
    // トポロジー
    // =========================================================================

    /// 層サイズ列（入力, 隠れ層..., 出力）
    #[inline]
    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    #[inline]
    pub fn n_layers(&self) -> usize {
        self.layer_sizes.len()
    }

    #[inline]
    pub fn n_input(&self) -> usize {
        self.layer_sizes[0]
    }

    #[inline]
    pub fn n_output(&self) -> usize {
        self.layer_sizes[self.layer_sizes.len() - 1]
    }

    /// 期待される重み数
    #[inline]
    pub fn n_weights(&self) -> usize {
        n_weights(&self.layer_sizes)
    }

    /// 重み（未読み込みなら空）
    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        !self.weights.is_empty()
    }

    /// 重みを設定（要素数がトポロジーと一致しなければエラー）
    pub(crate) fn set_weights(&mut self, sector: usize, weights: Vec<f32>) -> Result<(), ConfigError> {
        let expected = self.n_weights();
        if weights.len() != expected {
            return Err(ConfigError::WeightCount {
                sector,
                expected,
                actual: weights.len(),
            });
        }
        self.weights = weights;
        Ok(())
    }

    // =========================================================================
    // 出力スケール
    // =========================================================================

    #[inline]
    pub fn target_z(&self) -> bool {
        self.target_z
    }

    #[inline]
    pub fn target_theta(&self) -> bool {
        self.target_theta
    }

    /// 出力ベクトル中の z の位置
    #[inline]
    pub fn z_index(&self) -> Option<usize> {
        self.target_z.then_some(0)
    }

    /// 出力ベクトル中の θ の位置
    #[inline]
    pub fn theta_index(&self) -> Option<usize> {
        self.target_theta.then_some(usize::from(self.target_z))
    }

    /// 出力毎の [lo, hi]
    #[inline]
    pub fn output_scale(&self) -> &[[f32; 2]] {
        &self.output_scale
    }

    /// [-1, 1] → 物理単位
    pub fn unscale_target(&self, raw: &[f32]) -> Vec<f32> {
        raw.iter()
            .zip(&self.output_scale)
            .map(|(&y, &[lo, hi])| (y + 1.0) * (hi - lo) / 2.0 + lo)
            .collect()
    }

    /// 物理単位 → [-1, 1]（`unscale_target` の逆変換）
    pub fn scale_target(&self, target: &[f32]) -> Vec<f32> {
        target
            .iter()
            .zip(&self.output_scale)
            .map(|(&t, &[lo, hi])| 2.0 * (t - lo) / (hi - lo) - 1.0)
            .collect()
    }

    // =========================================================================
    // 範囲判定
    // =========================================================================

    #[inline]
    pub fn ranges(&self) -> &KinematicRanges {
        &self.ranges
    }

    #[inline]
    pub fn train_ranges(&self) -> &KinematicRanges {
        &self.train_ranges
    }

    /// 使用範囲内か（φ は周回、q/pT と θ は半開区間）
    #[inline]
    pub fn in_ranges(&self, phi: f64, invpt: f64, theta: f64) -> bool {
        self.ranges.contains(phi, invpt, theta)
    }

    /// 学習範囲内か
    #[inline]
    pub fn in_train_ranges(&self, phi: f64, invpt: f64, theta: f64) -> bool {
        self.train_ranges.contains(phi, invpt, theta)
    }

    // =========================================================================
    // ヒット選択パラメータ
    // =========================================================================

    #[inline]
    pub fn max_hits_per_sl(&self) -> usize {
        self.max_hits_per_sl
    }

    #[inline]
    pub fn sl_pattern(&self) -> u16 {
        self.sl_pattern
    }

    /// 実効マスク（マスク 0 かつパターン非 0 ならパターン自身）
    #[inline]
    pub fn sl_pattern_mask(&self) -> u16 {
        if self.sl_pattern_mask == 0 {
            self.sl_pattern
        } else {
            self.sl_pattern_mask
        }
    }

    /// 観測されたヒットパターンが要求パターンと一致するか
    #[inline]
    pub fn matches_pattern(&self, hit_pattern: u16) -> bool {
        let mask = self.sl_pattern_mask();
        (hit_pattern & mask) == (self.sl_pattern & mask)
    }

    #[inline]
    pub fn t_max(&self) -> i32 {
        self.t_max
    }

    /// 関連 ID 窓 [lo, hi]
    #[inline]
    pub fn relevant_id(&self, super_layer: usize) -> [f32; 2] {
        self.relevant_id[super_layer]
    }

    /// relId が関連 ID 窓に入るか（両端含む）
    #[inline]
    pub fn is_relevant(&self, super_layer: usize, rel_id: f64) -> bool {
        let [lo, hi] = self.relevant_id[super_layer];
        f64::from(lo) <= rel_id && rel_id <= f64::from(hi)
    }

    /// relId → [-1, 1] の位置特徴量
    #[inline]
    pub fn scale_id(&self, super_layer: usize, rel_id: f64) -> f32 {
        rel_id as f32 * self.id_scale[super_layer]
    }

    /// 時間特徴量のスケール
    #[inline]
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    #[inline]
    pub fn event_time(&self) -> EventTimeStrategy {
        self.event_time
    }
}
