//! 固定小数点 forward（FPGA bit-exact）
//!
//! # 量子化
//!
//! ```text
//! 入力:   x_fix = trunc(x · 2^pin)
//! 重み:   w_fix = round(w · 2^pw)
//! バイアス入力: 1 << pin
//! 積和:   acc = Σ w_fix · x_fix         (スケール 2^(pin + pw)、i64 飽和演算)
//! ```
//!
//! # 活性化（LUT）
//!
//! ```text
//! bin = |acc| >> (pin + pw − plut)
//! y   = LUT[bin]           (bin < xMax)
//!     = 2^pt               (それ以外、飽和)
//! out = sign(acc) · y      (スケール 2^pt、pt = pin)
//! ```
//!
//! 浮動小数点はテーブル生成時のみ使う。

use crate::config::Precision;
use crate::expert::weight_offset;

/// 切り捨て量子化（0 方向）
#[inline]
pub fn quantize_trunc(x: f32, bits: u32) -> i64 {
    (f64::from(x) * f64::from(1u32 << bits)) as i64
}

/// 最近接丸め量子化
#[inline]
pub fn quantize_round(x: f32, bits: u32) -> i64 {
    (f64::from(x) * f64::from(1u32 << bits)).round() as i64
}

/// 重み列をまとめて量子化
pub fn quantize_weights(weights: &[f32], bits: u32) -> Vec<i64> {
    weights.iter().map(|&w| quantize_round(w, bits)).collect()
}

/// tanh(x/2) のルックアップテーブル
///
/// `table[bin]` は bin が表す積和区間の中点での値（2^pt スケールで丸め）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TanhLut {
    table: Vec<i64>,
    /// 積和 → bin の右シフト量
    shift: u32,
    /// 飽和値（1.0 の表現）
    one: i64,
}

impl TanhLut {
    pub fn new(precision: &Precision) -> Self {
        let pt = precision.tanh();
        let plut = precision.lut;
        let shift = precision.lut_shift();

        let one = 1i64 << pt;
        let lut_unit = f64::from(1u32 << plut);
        // tanh(x/2) が 2^pt スケールで 1 に丸まる境界
        let x_max = ((1.0 - 1.0 / f64::from(1u32 << (pt + 1))).atanh() * 2.0 * lut_unit).ceil() as usize;
        let half_bin = 0.5 - 1.0 / 2f64.powi(shift as i32 + 1);

        let table = (0..x_max)
            .map(|bin| {
                let x = (bin as f64 + half_bin) / lut_unit;
                ((x / 2.0).tanh() * one as f64).round() as i64
            })
            .collect();

        Self { table, shift, one }
    }

    /// 飽和しない最大の bin + 1
    #[inline]
    pub fn x_max(&self) -> usize {
        self.table.len()
    }

    /// 飽和値（tanh 精度での 1.0）
    #[inline]
    pub fn one(&self) -> i64 {
        self.one
    }

    /// 積和値の活性化（符号付き、2^pt スケール）
    #[inline]
    pub fn eval(&self, acc: i64) -> i64 {
        let bin = acc.unsigned_abs() >> self.shift;
        let magnitude = usize::try_from(bin)
            .ok()
            .and_then(|b| self.table.get(b).copied())
            .unwrap_or(self.one);
        if acc < 0 { -magnitude } else { magnitude }
    }
}

/// 全層の固定小数点順伝播
///
/// 出力は tanh 精度の整数値を 2^pt で割った浮動小数点。
///
/// # Panics
///
/// `input.len() != layer_sizes[0]` のとき、または重み数がトポロジーと一致しないとき。
pub fn forward_fixed(
    layer_sizes: &[usize],
    weights: &[i64],
    input: &[f32],
    precision: &Precision,
    lut: &TanhLut,
) -> Vec<f32> {
    assert_eq!(input.len(), layer_sizes[0], "input width mismatch");

    let bias_input = 1i64 << precision.input;
    let mut x: Vec<i64> = input.iter().map(|&v| quantize_trunc(v, precision.input)).collect();

    for layer in 0..layer_sizes.len() - 1 {
        let n_in = layer_sizes[layer];
        let n_out = layer_sizes[layer + 1];

        let y: Vec<i64> = (0..n_out)
            .map(|out| {
                let row = &weights[weight_offset(layer_sizes, layer, out, 0)..][..=n_in];
                let (w, bias) = row.split_at(n_in);
                let acc = w
                    .iter()
                    .zip(&x)
                    .fold(bias[0].saturating_mul(bias_input), |acc, (&w, &x)| {
                        acc.saturating_add(w.saturating_mul(x))
                    });
                lut.eval(acc)
            })
            .collect();
        x = y;
    }

    let unit = lut.one() as f32;
    x.into_iter().map(|v| v as f32 / unit).collect()
}
