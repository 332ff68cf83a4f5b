//! セクターエキスパートレジストリ
//!
//! 設定を検証してセクター数ぶんの `SectorExpert` を構築する。
//! 1つでも不整合があればエラーで、部分的なレジストリは作らない。

use super::{KinematicRanges, Range, SectorExpert, INPUTS_PER_HIT_LAYER};
use crate::config::{NeuroConfig, Precision, DEFAULT_RELEVANT_ID};
use crate::error::ConfigError;
use crate::geometry::GeometryConstants;
use crate::types::NUM_SUPERLAYERS;
use std::ops::Index;

/// φ 範囲の許容値 [度]
const PHI_BOUNDS: (f32, f32) = (-360.0, 360.0);

/// θ 範囲の許容値 [度]
const THETA_BOUNDS: (f32, f32) = (0.0, 180.0);

/// セクターエキスパートの集合
///
/// 構築後は読み取り専用（重み読み込みのみ可変、処理開始前に行う）。
#[derive(Debug, Clone, PartialEq)]
pub struct SectorRegistry {
    experts: Vec<SectorExpert>,
    precision: Precision,
}

impl SectorRegistry {
    /// 設定からレジストリを構築
    pub fn build(config: &NeuroConfig, geometry: &GeometryConstants) -> Result<Self, ConfigError> {
        if let Err(err) = validate(config, geometry) {
            log::error!("invalid neuro trigger configuration: {err}");
            return Err(err);
        }

        let experts: Vec<SectorExpert> =
            (0..config.n_sectors).map(|sector| build_expert(config, sector)).collect();

        if let Some(first) = experts.first() {
            log::info!(
                "sector registry: {} sectors, topology {:?}, event time {}",
                experts.len(),
                first.layer_sizes(),
                first.event_time()
            );
        }

        Ok(Self {
            experts,
            precision: config.precision,
        })
    }

    /// セクター数
    #[inline]
    pub fn len(&self) -> usize {
        self.experts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.experts.is_empty()
    }

    #[inline]
    pub fn get(&self, sector: usize) -> Option<&SectorExpert> {
        self.experts.get(sector)
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, SectorExpert> {
        self.experts.iter()
    }

    /// 固定小数点精度
    #[inline]
    pub fn precision(&self) -> &Precision {
        &self.precision
    }

    /// 使用範囲にトラックが入るセクター（昇順）
    pub fn select_sectors(&self, phi: f64, invpt: f64, theta: f64) -> Vec<usize> {
        self.experts
            .iter()
            .enumerate()
            .filter(|(_, e)| e.in_ranges(phi, invpt, theta))
            .map(|(i, _)| i)
            .collect()
    }

    /// 学習範囲にトラックが入るセクター（昇順）
    pub fn select_sectors_train(&self, phi: f64, invpt: f64, theta: f64) -> Vec<usize> {
        self.experts
            .iter()
            .enumerate()
            .filter(|(_, e)| e.in_train_ranges(phi, invpt, theta))
            .map(|(i, _)| i)
            .collect()
    }

    /// 候補の中からヒットパターンが一致する最初のセクター
    pub fn select_by_pattern(&self, candidates: &[usize], hit_pattern: u16) -> Option<usize> {
        candidates
            .iter()
            .copied()
            .find(|&sector| self.experts[sector].matches_pattern(hit_pattern))
    }

    /// 重みテーブルを読み込む（セクター毎に1リスト）
    ///
    /// 要素数がトポロジーと一致しなければエラーで、その場合どのセクターも更新しない。
    pub fn load_weights(&mut self, table: Vec<Vec<f32>>) -> Result<(), ConfigError> {
        if table.len() != self.experts.len() {
            let err = ConfigError::SectorCount {
                expected: self.experts.len(),
                actual: table.len(),
            };
            log::error!("{err}");
            return Err(err);
        }

        for (sector, (expert, weights)) in self.experts.iter().zip(&table).enumerate() {
            if weights.len() != expert.n_weights() {
                let err = ConfigError::WeightCount {
                    sector,
                    expected: expert.n_weights(),
                    actual: weights.len(),
                };
                log::error!("{err}");
                return Err(err);
            }
        }

        for (sector, (expert, weights)) in self.experts.iter_mut().zip(table).enumerate() {
            expert.set_weights(sector, weights)?;
        }

        log::info!("loaded weights for {} sectors", self.experts.len());
        Ok(())
    }

    /// 書き出し用の重みテーブル
    pub fn weight_table(&self) -> Vec<&[f32]> {
        self.experts.iter().map(|e| e.weights()).collect()
    }
}

impl Index<usize> for SectorRegistry {
    type Output = SectorExpert;

    /// # Panics
    ///
    /// セクター番号が範囲外のとき。
    #[inline]
    fn index(&self, sector: usize) -> &SectorExpert {
        &self.experts[sector]
    }
}

impl<'a> IntoIterator for &'a SectorRegistry {
    type Item = &'a SectorExpert;
    type IntoIter = std::slice::Iter<'a, SectorExpert>;

    fn into_iter(self) -> Self::IntoIter {
        self.experts.iter()
    }
}

// =============================================================================
// 構築
// =============================================================================

/// 1 要素なら共有、そうでなければセクター毎
#[inline]
fn shared_or(len: usize, index: usize) -> usize {
    if len == 1 { 0 } else { index }
}

fn build_expert(config: &NeuroConfig, sector: usize) -> SectorExpert {
    let [i_phi, i_pt, i_theta, i_pattern] = config.range_indices(sector);

    let max_hits = config.max_hits_per_sl[shared_or(config.max_hits_per_sl.len(), i_pattern)];
    let n_input = INPUTS_PER_HIT_LAYER * max_hits;

    let hidden = &config.n_hidden[shared_or(config.n_hidden.len(), sector)];
    let mut layer_sizes = Vec::with_capacity(hidden.len() + 2);
    layer_sizes.push(n_input);
    layer_sizes.extend(hidden.iter().map(|&h| hidden_nodes(h, n_input, config.multiply_hidden)));
    layer_sizes.push(config.n_targets());

    // θ 出力のスケールはラジアンへ
    let scale = &config.output_scale[shared_or(config.output_scale.len(), sector)];
    let mut output_scale: Vec<[f32; 2]> = scale.chunks_exact(2).map(|c| [c[0], c[1]]).collect();
    if config.target_theta {
        let theta = usize::from(config.target_z);
        output_scale[theta] = output_scale[theta].map(f32::to_radians);
    }

    let ranges = KinematicRanges {
        phi: Range::from_degrees(config.phi_range[i_phi]),
        invpt: Range::from_raw(config.invpt_range[i_pt]),
        theta: Range::from_degrees(config.theta_range[i_theta]),
    };
    let train_ranges = KinematicRanges {
        phi: train_or(&config.phi_range_train, i_phi).map_or(ranges.phi, Range::from_degrees),
        invpt: train_or(&config.invpt_range_train, i_pt).map_or(ranges.invpt, Range::from_raw),
        theta: train_or(&config.theta_range_train, i_theta)
            .map_or(ranges.theta, Range::from_degrees),
    };

    let relevant_id = relevant_windows(config, sector);

    SectorExpert::new(
        layer_sizes,
        config.target_z,
        config.target_theta,
        output_scale,
        ranges,
        train_ranges,
        max_hits,
        config.sl_pattern[i_pattern],
        config.sl_pattern_mask[shared_or(config.sl_pattern_mask.len(), i_pattern)],
        config.t_max,
        relevant_id,
        config.event_time,
    )
}

/// 隠れ層ノード数（倍率指定なら入力数を掛けて切り捨て）
#[inline]
fn hidden_nodes(value: f32, n_input: usize, multiply: bool) -> usize {
    if multiply {
        (value * n_input as f32) as usize
    } else {
        value as usize
    }
}

/// 学習範囲（空なら None = 使用範囲と同じ）
#[inline]
fn train_or(list: &[[f32; 2]], index: usize) -> Option<[f32; 2]> {
    if list.is_empty() {
        None
    } else {
        Some(list[shared_or(list.len(), index)])
    }
}

fn relevant_windows(config: &NeuroConfig, sector: usize) -> [[f32; 2]; NUM_SUPERLAYERS] {
    let values: &[f32] = if config.relevant_id.is_empty() {
        &DEFAULT_RELEVANT_ID
    } else {
        &config.relevant_id[shared_or(config.relevant_id.len(), sector)]
    };

    let mut windows = [[0.0f32; 2]; NUM_SUPERLAYERS];
    for (w, pair) in windows.iter_mut().zip(values.chunks_exact(2)) {
        *w = [pair[0], pair[1]];
    }
    windows
}

// =============================================================================
// 検証
// =============================================================================

/// 要素数が 1 かセクター数か
fn check_shared_or_per_sector(
    field: &'static str,
    len: usize,
    n_sectors: usize,
) -> Result<(), ConfigError> {
    if len == 1 || len == n_sectors {
        Ok(())
    } else {
        Err(ConfigError::ListLength {
            field,
            len,
            expected: format!("1 or {n_sectors}"),
        })
    }
}

fn check_range(
    field: &'static str,
    index: usize,
    [lo, hi]: [f32; 2],
    bounds: Option<(f32, f32)>,
) -> Result<(), ConfigError> {
    if lo.is_nan() || hi.is_nan() || lo >= hi {
        return Err(ConfigError::InvalidRange { field, index, lo, hi });
    }
    if let Some((min, max)) = bounds {
        if lo < min || hi > max {
            return Err(ConfigError::RangeOutOfBounds {
                field,
                index,
                lo,
                hi,
                min,
                max,
            });
        }
    }
    Ok(())
}

fn check_axis(
    axis: &'static str,
    train_field: &'static str,
    usage: &[[f32; 2]],
    train: &[[f32; 2]],
    bounds: Option<(f32, f32)>,
) -> Result<(), ConfigError> {
    for (i, &r) in usage.iter().enumerate() {
        check_range(axis, i, r, bounds)?;
    }
    for (i, &r) in train.iter().enumerate() {
        check_range(train_field, i, r, bounds)?;
    }

    if train.is_empty() {
        return Ok(());
    }
    if train.len() != 1 && train.len() != usage.len() {
        return Err(ConfigError::ListLength {
            field: train_field,
            len: train.len(),
            expected: format!("0, 1 or {}", usage.len()),
        });
    }

    for (i, &[lo, hi]) in usage.iter().enumerate() {
        let [train_lo, train_hi] = train[shared_or(train.len(), i)];
        if train_lo > lo || train_hi < hi {
            return Err(ConfigError::TrainRangeNotEnclosing {
                axis,
                index: i,
                lo,
                hi,
                train_lo,
                train_hi,
            });
        }
    }
    Ok(())
}

fn check_phi_width(field: &'static str, ranges: &[[f32; 2]]) -> Result<(), ConfigError> {
    for (index, &[lo, hi]) in ranges.iter().enumerate() {
        let width = hi - lo;
        if width > 360.0 {
            return Err(ConfigError::PhiRangeTooWide { field, index, width });
        }
    }
    Ok(())
}

fn validate(config: &NeuroConfig, geometry: &GeometryConstants) -> Result<(), ConfigError> {
    let n_sectors = config.n_sectors;
    if n_sectors == 0 {
        return Err(ConfigError::NoSectors);
    }
    let n_targets = config.n_targets();
    if n_targets == 0 {
        return Err(ConfigError::NoTargets);
    }
    config.precision.validate()?;
    if config.t_max <= 0 {
        return Err(ConfigError::InvalidTMax(config.t_max));
    }

    // ---- リスト長 ----
    check_shared_or_per_sector("n_hidden", config.n_hidden.len(), n_sectors)?;
    check_shared_or_per_sector("output_scale", config.output_scale.len(), n_sectors)?;

    let axes: [(&'static str, usize); 4] = [
        ("phi_range", config.phi_range.len()),
        ("invpt_range", config.invpt_range.len()),
        ("theta_range", config.theta_range.len()),
        ("sl_pattern", config.sl_pattern.len()),
    ];
    if !config.is_sector_product() {
        for (field, len) in axes {
            check_shared_or_per_sector(field, len, n_sectors)?;
        }
    }

    let n_patterns = config.sl_pattern.len();
    for (field, len) in [
        ("max_hits_per_sl", config.max_hits_per_sl.len()),
        ("sl_pattern_mask", config.sl_pattern_mask.len()),
    ] {
        if len != 1 && len != n_patterns {
            return Err(ConfigError::ListLength {
                field,
                len,
                expected: format!("1 or {n_patterns}"),
            });
        }
    }

    if !config.relevant_id.is_empty() {
        check_shared_or_per_sector("relevant_id", config.relevant_id.len(), n_sectors)?;
    }

    // ---- 範囲 ----
    check_axis(
        "phi",
        "phi_range_train",
        &config.phi_range,
        &config.phi_range_train,
        Some(PHI_BOUNDS),
    )?;
    check_phi_width("phi_range", &config.phi_range)?;
    check_phi_width("phi_range_train", &config.phi_range_train)?;
    check_axis(
        "invpt",
        "invpt_range_train",
        &config.invpt_range,
        &config.invpt_range_train,
        None,
    )?;
    check_axis(
        "theta",
        "theta_range_train",
        &config.theta_range,
        &config.theta_range_train,
        Some(THETA_BOUNDS),
    )?;

    // ---- トポロジー / 出力 ----
    for (index, scale) in config.output_scale.iter().enumerate() {
        if scale.len() != 2 * n_targets {
            return Err(ConfigError::OutputScaleLength {
                index,
                len: scale.len(),
                expected: 2 * n_targets,
            });
        }
    }

    for (index, &max_hits) in config.max_hits_per_sl.iter().enumerate() {
        if max_hits == 0 {
            return Err(ConfigError::InvalidMaxHits { index });
        }
    }

    // 倍率指定は最小の入力数で判定
    let min_input = INPUTS_PER_HIT_LAYER * config.max_hits_per_sl.iter().copied().min().unwrap_or(1);
    for (index, hidden) in config.n_hidden.iter().enumerate() {
        for (layer, &value) in hidden.iter().enumerate() {
            if value.is_nan() || value <= 0.0 || hidden_nodes(value, min_input, config.multiply_hidden) == 0 {
                return Err(ConfigError::InvalidHiddenLayer { index, layer, value });
            }
        }
    }

    // ---- 関連 ID 窓 ----
    for (index, values) in config.relevant_id.iter().enumerate() {
        if values.len() != 2 * NUM_SUPERLAYERS {
            return Err(ConfigError::RelevantIdLength {
                index,
                len: values.len(),
            });
        }
        for (super_layer, pair) in values.chunks_exact(2).enumerate() {
            let (lo, hi) = (pair[0], pair[1]);
            let n_wires = geometry.n_wires(super_layer);
            let half = n_wires as f32 / 2.0;
            if lo.is_nan() || hi.is_nan() || lo >= hi || lo < -half || hi > half {
                return Err(ConfigError::InvalidRelevantId {
                    index,
                    super_layer,
                    lo,
                    hi,
                    n_wires,
                });
            }
        }
    }

    Ok(())
}
