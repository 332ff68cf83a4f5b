//! トラック毎の推論パイプライン
//!
//! ```text
//! select_sectors(φ0, q/pT, θ) ─┬─ 空 → NoSector
//!                               ▼
//! TrackMapping（float / fixed）
//! EventTime（先頭候補セクターで決定）
//! ヒットパターン → select_by_pattern ─ 不一致 → NoPatternMatch
//! HitSelector::select → build_input → InferenceEngine::run
//! ```
//!
//! ジオメトリ・レジストリ・LUT は構築後は読み取り専用なので、
//! 複数スレッドから同時に `process_track` を呼んでよい。

use crate::error::ConfigError;
use crate::event_time::{self, EventTime, EventTimeStrategy};
use crate::expert::SectorRegistry;
use crate::geometry::GeometryConstants;
use crate::inference::{Inference, InferenceEngine, InferenceMode};
use crate::input::build_input;
use crate::mapper::TrackMapping;
use crate::selector::HitSelector;
use crate::stats::count_stat;
use crate::types::{CandidateHit, EventData, HardwareEventTime, TrackEstimate};
use serde::{Deserialize, Serialize};

/// 呼び出し側の設定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerOptions {
    /// イベント時間の戦略
    pub event_time: EventTimeStrategy,
    /// 評価モード
    pub mode: InferenceMode,
    /// neuro-track 入力（関連ヒットのみ使い、ステレオの全走査をしない）
    pub neuro_track_input: bool,
}

/// 推論まで到達しなかった理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMiss {
    /// 運動学的範囲に合うセクターがない
    NoSector,
    /// ヒットパターンに合うセクターがない
    NoPatternMatch,
}

impl SelectionMiss {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSector => "no_sector",
            Self::NoPatternMatch => "no_pattern_match",
        }
    }
}

impl std::fmt::Display for SelectionMiss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 1トラック分の推論結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeuroPrediction {
    /// 使用したセクター
    pub sector: usize,
    /// z [cm]
    pub z: Option<f32>,
    /// θ [rad]
    pub theta: Option<f32>,
    /// 物理単位の出力（z, θ の順、有効なもののみ）
    pub targets: Vec<f32>,
    /// ネットワーク出力 [-1, 1]
    pub raw: Vec<f32>,
    /// 関連ヒットがあった SL のビットパターン（セクター選択に使ったもの）
    pub hit_pattern: u16,
    /// 使用したイベント時間
    pub event_time: EventTime,
    /// 入力ベクトル
    pub input: Vec<f32>,
    /// 選ばれたヒット（イベントのヒット配列へのインデックス、スロット順）
    pub selected_hits: Vec<usize>,
}

/// ニューラルトラックトリガー
#[derive(Debug, Clone)]
pub struct NeuroTrigger {
    geometry: GeometryConstants,
    registry: SectorRegistry,
    engine: InferenceEngine,
    /// 固定小数点モード用の量子化済み重み（セクター順、float モードでは空）
    quantized: Vec<Vec<i64>>,
    options: TriggerOptions,
}

impl NeuroTrigger {
    /// 構築（全セクターの重みが読み込み済みであること）
    pub fn new(
        geometry: GeometryConstants,
        registry: SectorRegistry,
        options: TriggerOptions,
    ) -> Result<Self, ConfigError> {
        if let Some((sector, expert)) = registry.iter().enumerate().find(|(_, e)| !e.is_loaded()) {
            let err = ConfigError::WeightCount {
                sector,
                expected: expert.n_weights(),
                actual: 0,
            };
            log::error!("{err}");
            return Err(err);
        }

        let engine = InferenceEngine::new(*registry.precision());
        let quantized = match options.mode {
            InferenceMode::Float => Vec::new(),
            InferenceMode::Fixed => registry.iter().map(|e| engine.quantize(e)).collect(),
        };
        log::info!(
            "neuro trigger ready: {} sectors, mode {}, event time {}",
            registry.len(),
            options.mode,
            options.event_time
        );

        Ok(Self {
            geometry,
            registry,
            engine,
            quantized,
            options,
        })
    }

    #[inline]
    pub fn geometry(&self) -> &GeometryConstants {
        &self.geometry
    }

    #[inline]
    pub fn registry(&self) -> &SectorRegistry {
        &self.registry
    }

    #[inline]
    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    #[inline]
    pub fn options(&self) -> &TriggerOptions {
        &self.options
    }

    /// トラックの参照位置（評価モードに合わせて float / fixed）
    pub fn mapping(&self, track: &TrackEstimate) -> TrackMapping {
        match self.options.mode {
            InferenceMode::Float => TrackMapping::new(&self.geometry, track.omega, track.phi0),
            InferenceMode::Fixed => TrackMapping::new_fixed(
                &self.geometry,
                track.omega,
                track.phi0,
                self.registry.precision(),
            ),
        }
    }

    /// 1トラックを評価
    pub fn process_track(
        &self,
        track: &TrackEstimate,
        hits: &[CandidateHit],
        hardware_time: HardwareEventTime,
    ) -> Result<NeuroPrediction, SelectionMiss> {
        count_stat!(tracks);

        let sectors = self
            .registry
            .select_sectors(track.phi0, track.inv_pt(), track.theta());
        let Some(&first) = sectors.first() else {
            log::debug!(
                "no sector for phi0={:.4} invpt={:.4} theta={:.4}",
                track.phi0,
                track.inv_pt(),
                track.theta()
            );
            count_stat!(no_sector);
            return Err(SelectionMiss::NoSector);
        };

        let mapping = self.mapping(track);
        let neuro_track = self.options.neuro_track_input;

        let preselect = HitSelector::new(&self.geometry, &self.registry[first], &mapping, neuro_track);
        let event_time = event_time::resolve(
            self.options.event_time,
            &preselect,
            track,
            hits,
            hardware_time,
        );
        if !event_time.known {
            log::debug!("event time unknown, drift times set to 0");
            count_stat!(no_event_time);
        }

        let hit_pattern = preselect.hit_pattern(track, hits);
        let Some(sector) = self.registry.select_by_pattern(&sectors, hit_pattern) else {
            log::debug!("no sector among {sectors:?} matches hit pattern {hit_pattern:#011b}");
            count_stat!(no_pattern_match);
            return Err(SelectionMiss::NoPatternMatch);
        };

        let expert = &self.registry[sector];
        let selector = HitSelector::new(&self.geometry, expert, &mapping, neuro_track);
        let selection = selector.select(track, hits, event_time);
        if selection.is_empty() {
            count_stat!(empty_selection);
        }

        let input = build_input(expert, &mapping, &selection);
        let Inference { raw, targets } = match self.options.mode {
            InferenceMode::Float => self.engine.run(expert, &input, InferenceMode::Float),
            InferenceMode::Fixed => self.engine.run_quantized(expert, &self.quantized[sector], &input),
        };
        count_stat!(predictions);

        Ok(NeuroPrediction {
            sector,
            z: expert.z_index().map(|i| targets[i]),
            theta: expert.theta_index().map(|i| targets[i]),
            targets,
            raw,
            hit_pattern,
            event_time,
            input,
            selected_hits: selection.iter().map(|(_, s)| s.hit_index).collect(),
        })
    }

    /// 1イベントの全トラックを評価（トラック順）
    pub fn process_event(&self, event: &EventData) -> Vec<Result<NeuroPrediction, SelectionMiss>> {
        event
            .tracks
            .iter()
            .map(|track| self.process_track(track, &event.hits, event.hardware_time))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NeuroConfig;
    use crate::geometry::tests::test_geometry;
    use crate::types::{LeftRight, Priority};

    fn trigger(config: &NeuroConfig, options: TriggerOptions) -> NeuroTrigger {
        let geo = GeometryConstants::from_service(&test_geometry()).unwrap();
        let mut registry = SectorRegistry::build(config, &geo).unwrap();
        let table = registry
            .iter()
            .enumerate()
            .map(|(s, e)| (0..e.n_weights()).map(|i| ((i + s) % 7) as f32 * 0.01 - 0.03).collect())
            .collect();
        registry.load_weights(table).unwrap();
        NeuroTrigger::new(geo, registry, options).unwrap()
    }

    #[test]
    fn test_trigger_is_send_sync() {
        fn check<T: Send + Sync>() {}
        check::<NeuroTrigger>();
    }

    #[test]
    fn test_unloaded_registry_rejected() {
        let geo = GeometryConstants::from_service(&test_geometry()).unwrap();
        let registry = SectorRegistry::build(&NeuroConfig::default(), &geo).unwrap();
        let err = NeuroTrigger::new(geo, registry, TriggerOptions::default()).unwrap_err();
        assert!(matches!(err, ConfigError::WeightCount { sector: 0, actual: 0, .. }));
    }

    #[test]
    fn test_no_sector() {
        let config = NeuroConfig {
            invpt_range: vec![[-1.0, 1.0]],
            ..NeuroConfig::default()
        };
        let t = trigger(&config, TriggerOptions::default());
        // ω = 0.02 → q/pT ≈ 4.4
        let track = TrackEstimate::new(0.02, 0.5);
        assert_eq!(
            t.process_track(&track, &[], HardwareEventTime::INVALID),
            Err(SelectionMiss::NoSector)
        );
    }

    #[test]
    fn test_pattern_selection() {
        // セクター 0: SL0 必須、セクター 1: 制約なし
        let config = NeuroConfig {
            n_sectors: 2,
            sl_pattern: vec![0b1, 0],
            sl_pattern_mask: vec![0b1, 0],
            ..NeuroConfig::default()
        };
        let t = trigger(&config, TriggerOptions::default());
        let geo = t.geometry().clone();

        let hits = vec![CandidateHit::new(0, geo.ts_offset(0), LeftRight::Left, Priority::First, 5)];
        let with_hit = TrackEstimate::new(0.0, 0.0).with_related_hits(vec![0]);
        let without = TrackEstimate::new(0.0, 0.0);

        let p = t.process_track(&with_hit, &hits, HardwareEventTime::INVALID).unwrap();
        assert_eq!(p.sector, 0);
        assert_eq!(p.hit_pattern, 0b1);
        assert_eq!(p.event_time, EventTime::known(5));
        assert_eq!(p.selected_hits, vec![0]);

        let p = t.process_track(&without, &hits, HardwareEventTime::INVALID).unwrap();
        assert_eq!(p.sector, 1);
        assert_eq!(p.hit_pattern, 0);
    }

    #[test]
    fn test_no_pattern_match() {
        let config = NeuroConfig {
            sl_pattern: vec![0b111111111],
            sl_pattern_mask: vec![0b111111111],
            ..NeuroConfig::default()
        };
        let t = trigger(&config, TriggerOptions::default());
        let track = TrackEstimate::new(0.0, 1.0);
        assert_eq!(
            t.process_track(&track, &[], HardwareEventTime::INVALID),
            Err(SelectionMiss::NoPatternMatch)
        );
    }

    #[test]
    fn test_process_event_keeps_track_order() {
        let config = NeuroConfig {
            invpt_range: vec![[-1.0, 1.0]],
            ..NeuroConfig::default()
        };
        let t = trigger(&config, TriggerOptions::default());
        let event = EventData {
            hits: Vec::new(),
            tracks: vec![
                TrackEstimate::new(0.0, 0.1),
                TrackEstimate::new(0.02, 0.1),
                TrackEstimate::new(0.001, 0.1),
            ],
            hardware_time: HardwareEventTime::valid(3),
        };

        let results = t.process_event(&event);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert_eq!(results[1], Err(SelectionMiss::NoSector));
        assert_eq!(results[2].as_ref().unwrap().event_time, EventTime::known(3));
    }

    #[test]
    fn test_fixed_mode_close_to_float() {
        let config = NeuroConfig::default();
        let float = trigger(&config, TriggerOptions::default());
        let fixed = trigger(
            &config,
            TriggerOptions {
                mode: InferenceMode::Fixed,
                ..TriggerOptions::default()
            },
        );
        let geo = float.geometry().clone();

        let hits: Vec<CandidateHit> = (0..9)
            .map(|sl| CandidateHit::new(sl, geo.ts_offset(sl), LeftRight::Left, Priority::First, 20 + sl as i32))
            .collect();
        let track = TrackEstimate::new(0.0, 0.0).with_related_hits((0..9).collect());

        let a = float.process_track(&track, &hits, HardwareEventTime::valid(0)).unwrap();
        let b = fixed.process_track(&track, &hits, HardwareEventTime::valid(0)).unwrap();
        assert_eq!(a.sector, b.sector);
        assert_eq!(a.hit_pattern, 0x1ff);
        for (x, y) in a.raw.iter().zip(&b.raw) {
            assert!((x - y).abs() < 0.05);
        }
    }

    #[test]
    fn test_fixed_mode_uses_prepared_weights() {
        let config = NeuroConfig {
            n_sectors: 2,
            phi_range: vec![[0.0, 180.0], [180.0, 360.0]],
            ..NeuroConfig::default()
        };
        let options = TriggerOptions {
            mode: InferenceMode::Fixed,
            ..TriggerOptions::default()
        };
        let t = trigger(&config, options);
        assert_eq!(t.quantized.len(), 2);
        for (expert, weights) in t.registry().iter().zip(&t.quantized) {
            assert_eq!(weights, &t.engine().quantize(expert));
        }

        let geo = t.geometry().clone();
        let hits = vec![CandidateHit::new(0, geo.ts_offset(0) + 1, LeftRight::Right, Priority::First, 17)];
        for phi0 in [0.3, 4.0] {
            let track = TrackEstimate::new(0.0, phi0).with_related_hits(vec![0]);
            let p = t.process_track(&track, &hits, HardwareEventTime::valid(0)).unwrap();
            let expected = t.engine().run(&t.registry()[p.sector], &p.input, InferenceMode::Fixed);
            assert_eq!(p.raw, expected.raw);
            assert_eq!(p.targets, expected.targets);
        }

        let float = trigger(&config, TriggerOptions::default());
        assert!(float.quantized.is_empty());
    }
}
