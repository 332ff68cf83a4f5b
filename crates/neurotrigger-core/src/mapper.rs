//! トラック → ワイヤ参照位置
//!
//! トラックの曲率と方位角から、各スーパーレイヤー・各プライオリティ層での
//! 角度オフセット `alpha` と参照ワイヤ位置 `idRef` を求める。
//!
//! ```text
//! alpha = asin(r·ω/2)                   (|r·ω| < 2)
//!       = ±π/2                          (それ以外、ω の符号)
//! idRef = remainder((φ0 − alpha) · N/2π, N)
//! ```
//!
//! 固定小数点版は FPGA と同じく各量を切り捨てで量子化してから整数演算する。

use crate::config::Precision;
use crate::geometry::GeometryConstants;
use crate::types::{CandidateHit, NUM_SUPERLAYERS};
use std::f64::consts::{FRAC_PI_2, TAU};

/// IEEE 754 remainder（商を偶数丸め）
///
/// 結果は [-|y|/2, |y|/2]。
#[inline]
pub fn remainder(x: f64, y: f64) -> f64 {
    x - y * (x / y).round_ties_even()
}

/// 区間 (-n/2, n/2] へ折り返す
#[inline]
fn wrap_half_open(x: f64, n: f64) -> f64 {
    let r = remainder(x, n);
    if r <= -n / 2.0 { r + n } else { r }
}

/// 曲率によるワイヤ位置のずれ角 [rad]
#[inline]
fn crossing_angle(radius: f64, omega: f64) -> f64 {
    let x = radius * omega;
    if x.abs() < 2.0 {
        (x / 2.0).asin()
    } else {
        FRAC_PI_2.copysign(omega)
    }
}

/// 1トラック分の参照位置
///
/// `[super_layer][priority_class]` で引く。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackMapping {
    alpha: [[f64; 2]; NUM_SUPERLAYERS],
    id_ref: [[f64; 2]; NUM_SUPERLAYERS],
}

impl TrackMapping {
    /// 浮動小数点で計算
    pub fn new(geometry: &GeometryConstants, omega: f64, phi0: f64) -> Self {
        let mut alpha = [[0.0; 2]; NUM_SUPERLAYERS];
        let mut id_ref = [[0.0; 2]; NUM_SUPERLAYERS];

        for sl in 0..NUM_SUPERLAYERS {
            let n = f64::from(geometry.n_wires(sl));
            for class in 0..2 {
                let a = crossing_angle(geometry.radius(sl, class), omega);
                alpha[sl][class] = a;
                id_ref[sl][class] = remainder((phi0 - a) * n / TAU, n);
            }
        }

        Self { alpha, id_ref }
    }

    /// 固定小数点で計算（FPGA と bit 一致）
    ///
    /// ```text
    /// alpha_fix = trunc(alpha · 2^pa)
    /// phi0_fix  = trunc(φ0 · 2^pa)
    /// scale_fix = trunc(N/2π · 2^ps)
    /// id_fix    = ((phi0_fix − alpha_fix) · scale_fix) >> (pa + ps − pid)
    /// ```
    ///
    /// `id_fix` は N·2^pid を周期として (-N/2, N/2] に折り返す。
    pub fn new_fixed(geometry: &GeometryConstants, omega: f64, phi0: f64, precision: &Precision) -> Self {
        let pa = precision.alpha;
        let ps = precision.scale;
        let pid = precision.id;
        let alpha_unit = f64::from(1u32 << pa);
        let scale_unit = f64::from(1u32 << ps);
        let id_unit = f64::from(1u32 << pid);
        let shift = precision.id_shift();

        let phi0_fix = (phi0 * alpha_unit) as i64;

        let mut alpha = [[0.0; 2]; NUM_SUPERLAYERS];
        let mut id_ref = [[0.0; 2]; NUM_SUPERLAYERS];

        for sl in 0..NUM_SUPERLAYERS {
            let n_wires = geometry.n_wires(sl);
            let scale_fix = (f64::from(n_wires) / TAU * scale_unit) as i64;
            let period = i64::from(n_wires) << pid;

            for class in 0..2 {
                let alpha_fix = (crossing_angle(geometry.radius(sl, class), omega) * alpha_unit) as i64;
                let dphi = phi0_fix - alpha_fix;
                let id_fix = dphi.saturating_mul(scale_fix) >> shift;

                let wrapped = id_fix.rem_euclid(period);
                let wrapped = if wrapped > period / 2 {
                    wrapped - period
                } else {
                    wrapped
                };

                alpha[sl][class] = alpha_fix as f64 / alpha_unit;
                id_ref[sl][class] = wrapped as f64 / id_unit;
            }
        }

        Self { alpha, id_ref }
    }

    /// ずれ角 [rad]
    #[inline]
    pub fn alpha(&self, super_layer: usize, priority_class: usize) -> f64 {
        self.alpha[super_layer][priority_class]
    }

    /// 参照ワイヤ位置（スーパーレイヤー内ローカル番号）
    #[inline]
    pub fn id_ref(&self, super_layer: usize, priority_class: usize) -> f64 {
        self.id_ref[super_layer][priority_class]
    }

    /// ヒットの相対ワイヤ位置（(-N/2, N/2] に折り返し）
    ///
    /// 第2プライオリティのヒットは半ワイヤずらしてから参照位置を引く。
    pub fn rel_id(&self, geometry: &GeometryConstants, hit: &CandidateHit) -> f64 {
        let sl = hit.super_layer;
        let n = f64::from(geometry.n_wires(sl));
        let local = f64::from(hit.segment_id) - f64::from(geometry.ts_offset(sl))
            + hit.priority.wire_shift();
        wrap_half_open(local - self.id_ref[sl][hit.priority.class()], n)
    }
}
