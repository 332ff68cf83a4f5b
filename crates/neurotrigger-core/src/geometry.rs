//! ジオメトリ定数キャッシュ
//!
//! 外部のジオメトリサービスから一度だけ読み出し、以降は読み取り専用で共有する。

use crate::error::ConfigError;
use crate::types::NUM_SUPERLAYERS;
use serde::{Deserialize, Serialize};

/// 外部ジオメトリサービス
///
/// セットアップ時に一度だけ問い合わせる。
pub trait GeometryService {
    /// スーパーレイヤーのトラックセグメント（ワイヤ）数
    fn wires_in_superlayer(&self, super_layer: usize) -> u32;

    /// センスワイヤ半径 [cm]
    ///
    /// `priority_class`: 0 = 第1プライオリティ層、1 = 第2プライオリティ層
    fn sense_wire_radius(&self, super_layer: usize, priority_class: usize) -> f64;
}

/// テーブルで与えるジオメトリ（設定ファイル・テスト用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableGeometry {
    /// スーパーレイヤー毎のワイヤ数
    pub wires: [u32; NUM_SUPERLAYERS],
    /// スーパーレイヤー毎のセンスワイヤ半径 [第1, 第2] [cm]
    pub radii: [[f64; 2]; NUM_SUPERLAYERS],
}

impl GeometryService for TableGeometry {
    fn wires_in_superlayer(&self, super_layer: usize) -> u32 {
        self.wires[super_layer]
    }

    fn sense_wire_radius(&self, super_layer: usize, priority_class: usize) -> f64 {
        self.radii[super_layer][priority_class]
    }
}

/// ジオメトリ定数
///
/// - `ts_offset[sl]`: スーパーレイヤー `sl` の先頭セグメント ID（通し番号）
/// - `ts_offset[9]`: 全セグメント数
/// - `radius[sl][class]`: センスワイヤ半径
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryConstants {
    ts_offset: [u32; NUM_SUPERLAYERS + 1],
    radius: [[f64; 2]; NUM_SUPERLAYERS],
}

impl GeometryConstants {
    /// ジオメトリサービスから構築
    ///
    /// ワイヤ数 0、有限でない・正でない半径、通し番号の桁あふれはエラー。
    pub fn from_service<G: GeometryService + ?Sized>(service: &G) -> Result<Self, ConfigError> {
        let mut ts_offset = [0u32; NUM_SUPERLAYERS + 1];
        let mut radius = [[0.0f64; 2]; NUM_SUPERLAYERS];

        for sl in 0..NUM_SUPERLAYERS {
            let n_wires = service.wires_in_superlayer(sl);
            let next = if n_wires == 0 {
                None
            } else {
                ts_offset[sl].checked_add(n_wires)
            };
            let Some(next) = next else {
                let err = ConfigError::InvalidGeometry {
                    super_layer: sl,
                    reason: format!("{n_wires} wires"),
                };
                log::error!("{err}");
                return Err(err);
            };
            ts_offset[sl + 1] = next;

            for (class, r) in radius[sl].iter_mut().enumerate() {
                let value = service.sense_wire_radius(sl, class);
                if !value.is_finite() || value <= 0.0 {
                    let err = ConfigError::InvalidGeometry {
                        super_layer: sl,
                        reason: format!("radius {value} for priority class {class}"),
                    };
                    log::error!("{err}");
                    return Err(err);
                }
                *r = value;
            }
        }

        Ok(Self { ts_offset, radius })
    }

    /// スーパーレイヤーのワイヤ数
    #[inline]
    pub fn n_wires(&self, super_layer: usize) -> u32 {
        self.ts_offset[super_layer + 1] - self.ts_offset[super_layer]
    }

    /// スーパーレイヤーの先頭セグメント ID
    #[inline]
    pub fn ts_offset(&self, super_layer: usize) -> u32 {
        self.ts_offset[super_layer]
    }

    /// 全セグメント数
    #[inline]
    pub fn total_segments(&self) -> u32 {
        self.ts_offset[NUM_SUPERLAYERS]
    }

    /// センスワイヤ半径 [cm]
    #[inline]
    pub fn radius(&self, super_layer: usize, priority_class: usize) -> f64 {
        self.radius[super_layer][priority_class]
    }
}
