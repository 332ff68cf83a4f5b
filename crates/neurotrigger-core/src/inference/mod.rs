//! 推論エンジン
//!
//! セクターの MLP を浮動小数点（参照）または固定小数点（FPGA 互換）で評価し、
//! 出力を物理単位へ戻す。
//!
//! 2つのモードは固定小数点の精度の範囲で一致する。

mod fixed;
mod forward;

pub use fixed::{forward_fixed, quantize_round, quantize_trunc, quantize_weights, TanhLut};
pub use forward::{activation, forward_float};

use crate::config::Precision;
use crate::expert::SectorExpert;
use serde::{Deserialize, Serialize};

/// 評価モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMode {
    /// 浮動小数点の参照実装
    #[default]
    Float,
    /// 固定小数点（FPGA bit-exact）
    Fixed,
}

impl InferenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Fixed => "fixed",
        }
    }
}

impl std::fmt::Display for InferenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 推論結果
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    /// ネットワーク出力 [-1, 1]
    pub raw: Vec<f32>,
    /// 物理単位（z [cm], θ [rad]）
    pub targets: Vec<f32>,
}

/// 推論エンジン
///
/// LUT を一度だけ作り、以降は読み取り専用で共有する。
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceEngine {
    precision: Precision,
    lut: TanhLut,
}

impl InferenceEngine {
    pub fn new(precision: Precision) -> Self {
        let lut = TanhLut::new(&precision);
        Self { precision, lut }
    }

    #[inline]
    pub fn precision(&self) -> &Precision {
        &self.precision
    }

    #[inline]
    pub fn lut(&self) -> &TanhLut {
        &self.lut
    }

    /// ネットワーク出力（[-1, 1]）
    ///
    /// # Panics
    ///
    /// 重みが未読み込み、または入力幅が一致しないとき。
    pub fn run_raw(&self, expert: &SectorExpert, input: &[f32], mode: InferenceMode) -> Vec<f32> {
        assert!(expert.is_loaded(), "sector weights not loaded");

        match mode {
            InferenceMode::Float => forward_float(expert.layer_sizes(), expert.weights(), input),
            InferenceMode::Fixed => {
                let weights = self.quantize(expert);
                forward_fixed(expert.layer_sizes(), &weights, input, &self.precision, &self.lut)
            }
        }
    }

    /// 評価して物理単位へ戻す
    pub fn run(&self, expert: &SectorExpert, input: &[f32], mode: InferenceMode) -> Inference {
        let raw = self.run_raw(expert, input, mode);
        let targets = expert.unscale_target(&raw);
        Inference { raw, targets }
    }

    /// セクターの重みを固定小数点へ量子化
    pub fn quantize(&self, expert: &SectorExpert) -> Vec<i64> {
        quantize_weights(expert.weights(), self.precision.weight)
    }

    /// 量子化済みの重みで固定小数点評価
    ///
    /// `weights` は [`quantize`](Self::quantize) の結果。
    pub fn run_quantized(&self, expert: &SectorExpert, weights: &[i64], input: &[f32]) -> Inference {
        let raw = forward_fixed(expert.layer_sizes(), weights, input, &self.precision, &self.lut);
        let targets = expert.unscale_target(&raw);
        Inference { raw, targets }
    }
}
