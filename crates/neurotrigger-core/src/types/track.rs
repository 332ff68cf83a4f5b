//! 2D トラック推定値（TrackEstimate）

use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// 光速係数 [GeV / (T·cm)]
const C_GEV_PER_T_CM: f64 = 0.299_792_458e-2;

/// ソレノイド磁場 [T]
pub const B_FIELD_TESLA: f64 = 1.5;

/// 上流のトラックファインダーが出力する粗いトラック推定値
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackEstimate {
    /// 符号付き曲率 ω [1/cm]
    pub omega: f64,
    /// 方位角 φ0 [rad]
    pub phi0: f64,
    /// cot θ（2D トラックでは 0 = θ 90°）
    #[serde(default)]
    pub cot_theta: f64,
    /// 縦方向オフセット z0 [cm]
    #[serde(default)]
    pub z0: f64,
    /// このトラックに関連付けられたヒット（イベントのヒット配列へのインデックス）
    #[serde(default)]
    pub related_hits: Vec<usize>,
}

impl TrackEstimate {
    /// 新規作成（関連ヒットなし）
    pub fn new(omega: f64, phi0: f64) -> Self {
        Self {
            omega,
            phi0,
            ..Self::default()
        }
    }

    /// 関連ヒットを設定
    pub fn with_related_hits(mut self, related_hits: Vec<usize>) -> Self {
        self.related_hits = related_hits;
        self
    }

    /// 電荷 / 横運動量 [c/GeV]
    #[inline]
    pub fn inv_pt(&self) -> f64 {
        self.omega / (C_GEV_PER_T_CM * B_FIELD_TESLA)
    }

    /// 極角 θ [rad]
    #[inline]
    pub fn theta(&self) -> f64 {
        if self.cot_theta == 0.0 {
            FRAC_PI_2
        } else {
            1.0_f64.atan2(self.cot_theta)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theta_from_cot() {
        let track = TrackEstimate::new(0.0, 0.0);
        assert_eq!(track.theta(), FRAC_PI_2);

        let forward = TrackEstimate {
            cot_theta: 1.0,
            ..TrackEstimate::default()
        };
        assert!((forward.theta() - std::f64::consts::FRAC_PI_4).abs() < 1e-12);

        let backward = TrackEstimate {
            cot_theta: -1.0,
            ..TrackEstimate::default()
        };
        assert!((backward.theta() - 3.0 * std::f64::consts::FRAC_PI_4).abs() < 1e-12);
    }

    #[test]
    fn test_inv_pt_sign_follows_omega() {
        let pos = TrackEstimate::new(0.01, 0.0);
        let neg = TrackEstimate::new(-0.01, 0.0);
        assert!(pos.inv_pt() > 0.0);
        assert_eq!(pos.inv_pt(), -neg.inv_pt());
        // ω = 0.01 /cm, B = 1.5 T → pT ≈ 0.45 GeV
        assert!((1.0 / pos.inv_pt() - 0.4497).abs() < 1e-3);
    }
}
