//! イベント時間（T0）の決定
//!
//! ヒットのドリフト時間の基準となる時刻を、戦略に応じて求める。
//! ハードウェア由来の時間（ETF）が無効なときはソフトウェア推定へ落とす。

use crate::error::ConfigError;
use crate::selector::HitSelector;
use crate::types::{CandidateHit, HardwareEventTime, TrackEstimate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// イベント時間の戦略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventTimeStrategy {
    /// 常に 0
    #[serde(rename = "zero")]
    Zero,
    /// 関連ヒットの最速プライオリティ時間
    #[serde(rename = "fastestpriority")]
    FastestPriority,
    /// トラック自身の軸方向ヒットの最速プライオリティ時間（関連判定なし）
    #[serde(rename = "fastest2d")]
    Fastest2d,
    /// ハードウェア時間のみ
    #[serde(rename = "etf_only")]
    EtfOnly,
    /// ハードウェア時間、無効なら fastestpriority
    #[default]
    #[serde(rename = "etf_or_fastestpriority")]
    EtfOrFastestPriority,
    /// ハードウェア時間、無効なら fastest2d
    #[serde(rename = "etf_or_fastest2d")]
    EtfOrFastest2d,
    /// ハードウェア時間、無効なら 0
    #[serde(rename = "etf_or_zero")]
    EtfOrZero,
    /// ハードウェア時間と fastestpriority の小さい方
    #[serde(rename = "min_etf_fastestpriority")]
    MinEtfFastestPriority,
}

impl EventTimeStrategy {
    /// 全戦略
    pub const ALL: [EventTimeStrategy; 8] = [
        Self::Zero,
        Self::FastestPriority,
        Self::Fastest2d,
        Self::EtfOnly,
        Self::EtfOrFastestPriority,
        Self::EtfOrFastest2d,
        Self::EtfOrZero,
        Self::MinEtfFastestPriority,
    ];

    /// 文字列表現（設定ファイルのタグ）
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zero => "zero",
            Self::FastestPriority => "fastestpriority",
            Self::Fastest2d => "fastest2d",
            Self::EtfOnly => "etf_only",
            Self::EtfOrFastestPriority => "etf_or_fastestpriority",
            Self::EtfOrFastest2d => "etf_or_fastest2d",
            Self::EtfOrZero => "etf_or_zero",
            Self::MinEtfFastestPriority => "min_etf_fastestpriority",
        }
    }

    /// ハードウェア時間を参照するか
    pub fn uses_hardware(&self) -> bool {
        !matches!(self, Self::Zero | Self::FastestPriority | Self::Fastest2d)
    }
}

impl std::fmt::Display for EventTimeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventTimeStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownEventTimeStrategy(s.to_string()))
    }
}

/// イベント時間
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventTime {
    /// 時間値（トリガークロック単位、不明なら 0）
    pub value: i32,
    /// 決定できたか
    pub known: bool,
}

impl EventTime {
    /// 不明
    pub const UNKNOWN: Self = Self {
        value: 0,
        known: false,
    };

    /// 既知の時間
    pub const fn known(value: i32) -> Self {
        Self { value, known: true }
    }

    fn from_hardware(hw: HardwareEventTime) -> Self {
        if hw.valid {
            Self::known(hw.value)
        } else {
            Self::UNKNOWN
        }
    }

    fn from_min(min: Option<i32>) -> Self {
        min.map_or(Self::UNKNOWN, Self::known)
    }

    /// 既知ならそれ、不明なら `fallback` を評価
    fn or_else(self, fallback: impl FnOnce() -> Self) -> Self {
        if self.known { self } else { fallback() }
    }
}

/// 関連ヒット（2パス走査）の最速プライオリティ時間
pub fn fastest_priority(selector: &HitSelector<'_>, track: &TrackEstimate, hits: &[CandidateHit]) -> EventTime {
    let min = selector
        .candidates(track, hits)
        .filter(|&i| selector.relevant_rel_id(&hits[i]).is_some())
        .map(|i| hits[i].priority_time)
        .min();
    EventTime::from_min(min)
}

/// トラック自身の軸方向ヒットの最速プライオリティ時間
pub fn fastest_2d(track: &TrackEstimate, hits: &[CandidateHit]) -> EventTime {
    let min = track
        .related_hits
        .iter()
        .filter_map(|&i| hits.get(i))
        .filter(|h| h.is_usable() && h.is_axial())
        .map(|h| h.priority_time)
        .min();
    EventTime::from_min(min)
}

/// 戦略に従ってイベント時間を決める
///
/// セクターに設定された戦略と異なる戦略を要求された場合は警告を出し、要求側を使う。
pub fn resolve(
    strategy: EventTimeStrategy,
    selector: &HitSelector<'_>,
    track: &TrackEstimate,
    hits: &[CandidateHit],
    hardware: HardwareEventTime,
) -> EventTime {
    let configured = selector.expert().event_time();
    if configured != strategy {
        log::warn!("event time strategy {strategy} requested, sector was trained with {configured}");
    }

    let etf = EventTime::from_hardware(hardware);

    match strategy {
        EventTimeStrategy::Zero => EventTime::known(0),
        EventTimeStrategy::FastestPriority => fastest_priority(selector, track, hits),
        EventTimeStrategy::Fastest2d => fastest_2d(track, hits),
        EventTimeStrategy::EtfOnly => etf,
        EventTimeStrategy::EtfOrFastestPriority => {
            etf.or_else(|| fastest_priority(selector, track, hits))
        }
        EventTimeStrategy::EtfOrFastest2d => etf.or_else(|| fastest_2d(track, hits)),
        EventTimeStrategy::EtfOrZero => etf.or_else(|| EventTime::known(0)),
        EventTimeStrategy::MinEtfFastestPriority => {
            let fastest = fastest_priority(selector, track, hits);
            match (etf.known, fastest.known) {
                (true, true) => EventTime::known(etf.value.min(fastest.value)),
                (true, false) => etf,
                _ => fastest,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NeuroConfig;
    use crate::expert::SectorRegistry;
    use crate::geometry::tests::test_geometry;
    use crate::geometry::GeometryConstants;
    use crate::mapper::TrackMapping;
    use crate::types::{LeftRight, Priority};

    fn setup(strategy: EventTimeStrategy) -> (GeometryConstants, SectorRegistry) {
        let geo = GeometryConstants::from_service(&test_geometry()).unwrap();
        let config = NeuroConfig {
            event_time: strategy,
            ..NeuroConfig::default()
        };
        let registry = SectorRegistry::build(&config, &geo).unwrap();
        (geo, registry)
    }

    fn axial_hits(geo: &GeometryConstants, times: &[i32]) -> Vec<CandidateHit> {
        times
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let sl = 2 * (i % 5);
                CandidateHit::new(sl, geo.ts_offset(sl), LeftRight::Left, Priority::First, t)
            })
            .collect()
    }

    #[test]
    fn test_strategy_tags() {
        for strategy in EventTimeStrategy::ALL {
            assert_eq!(strategy.as_str().parse::<EventTimeStrategy>().unwrap(), strategy);
            assert_eq!(strategy.to_string(), strategy.as_str());
        }
        assert!(matches!(
            "fastest".parse::<EventTimeStrategy>(),
            Err(ConfigError::UnknownEventTimeStrategy(_))
        ));
    }

    #[test]
    fn test_fastest_priority_axial() {
        let strategy = EventTimeStrategy::FastestPriority;
        let (geo, registry) = setup(strategy);
        let mapping = TrackMapping::new(&geo, 0.0, 0.0);
        let selector = HitSelector::new(&geo, &registry[0], &mapping, false);

        let hits = axial_hits(&geo, &[12, 7]);
        let track = TrackEstimate::new(0.0, 0.0).with_related_hits(vec![0, 1]);
        let t0 = resolve(strategy, &selector, &track, &hits, HardwareEventTime::INVALID);
        assert_eq!(t0, EventTime::known(7));

        let empty = TrackEstimate::new(0.0, 0.0);
        let t0 = resolve(strategy, &selector, &empty, &[], HardwareEventTime::INVALID);
        assert_eq!(t0, EventTime::UNKNOWN);
        assert!(!t0.known);
        assert_eq!(t0.value, 0);
    }

    #[test]
    fn test_fastest_priority_ignores_irrelevant_hits() {
        let strategy = EventTimeStrategy::FastestPriority;
        let (geo, registry) = setup(strategy);
        let mapping = TrackMapping::new(&geo, 0.0, 0.0);
        let selector = HitSelector::new(&geo, &registry[0], &mapping, false);

        let mut hits = axial_hits(&geo, &[12]);
        // 参照位置から 20 ワイヤ離れたヒット（窓外）
        hits.push(CandidateHit::new(4, geo.ts_offset(4) + 20, LeftRight::Left, Priority::First, 1));
        let track = TrackEstimate::new(0.0, 0.0).with_related_hits(vec![0, 1]);

        assert_eq!(fastest_priority(&selector, &track, &hits), EventTime::known(12));
        // fastest2d は関連判定をしない
        assert_eq!(fastest_2d(&track, &hits), EventTime::known(1));
    }

    #[test]
    fn test_unusable_hits_not_timed() {
        let (geo, registry) = setup(EventTimeStrategy::FastestPriority);
        let mapping = TrackMapping::new(&geo, 0.0, 0.0);
        let selector = HitSelector::new(&geo, &registry[0], &mapping, false);

        let mut hits = axial_hits(&geo, &[12]);
        hits.push(CandidateHit::new(10, 5, LeftRight::Left, Priority::First, 1));
        hits.push(CandidateHit::new(2, geo.ts_offset(2), LeftRight::Left, Priority::None, 2));
        let track = TrackEstimate::new(0.0, 0.0).with_related_hits(vec![0, 1, 2]);

        assert_eq!(fastest_priority(&selector, &track, &hits), EventTime::known(12));
        assert_eq!(fastest_2d(&track, &hits), EventTime::known(12));
    }

    #[test]
    fn test_hardware_composites() {
        let (geo, registry) = setup(EventTimeStrategy::EtfOrFastestPriority);
        let mapping = TrackMapping::new(&geo, 0.0, 0.0);
        let selector = HitSelector::new(&geo, &registry[0], &mapping, false);

        let hits = axial_hits(&geo, &[9, 15]);
        let track = TrackEstimate::new(0.0, 0.0).with_related_hits(vec![0, 1]);
        let hw = HardwareEventTime::valid(4);
        let none = HardwareEventTime::INVALID;

        let r = |s, hw| resolve(s, &selector, &track, &hits, hw);

        assert_eq!(r(EventTimeStrategy::Zero, hw), EventTime::known(0));
        assert_eq!(r(EventTimeStrategy::EtfOnly, hw), EventTime::known(4));
        assert_eq!(r(EventTimeStrategy::EtfOnly, none), EventTime::UNKNOWN);
        assert_eq!(r(EventTimeStrategy::EtfOrFastestPriority, hw), EventTime::known(4));
        assert_eq!(r(EventTimeStrategy::EtfOrFastestPriority, none), EventTime::known(9));
        assert_eq!(r(EventTimeStrategy::EtfOrFastest2d, none), EventTime::known(9));
        assert_eq!(r(EventTimeStrategy::EtfOrZero, none), EventTime::known(0));
        assert_eq!(
            r(EventTimeStrategy::MinEtfFastestPriority, HardwareEventTime::valid(20)),
            EventTime::known(9)
        );
        assert_eq!(r(EventTimeStrategy::MinEtfFastestPriority, hw), EventTime::known(4));
        assert_eq!(r(EventTimeStrategy::MinEtfFastestPriority, none), EventTime::known(9));
    }

    #[test]
    fn test_min_etf_without_hits() {
        let (geo, registry) = setup(EventTimeStrategy::MinEtfFastestPriority);
        let mapping = TrackMapping::new(&geo, 0.0, 0.0);
        let selector = HitSelector::new(&geo, &registry[0], &mapping, false);
        let track = TrackEstimate::new(0.0, 0.0);

        let r = |hw| resolve(EventTimeStrategy::MinEtfFastestPriority, &selector, &track, &[], hw);
        assert_eq!(r(HardwareEventTime::valid(-3)), EventTime::known(-3));
        assert_eq!(r(HardwareEventTime::INVALID), EventTime::UNKNOWN);
    }

    #[test]
    fn test_serde_tag() {
        let json = serde_json::to_string(&EventTimeStrategy::EtfOrZero).unwrap();
        assert_eq!(json, "\"etf_or_zero\"");
        let s: EventTimeStrategy = serde_json::from_str("\"fastest2d\"").unwrap();
        assert_eq!(s, EventTimeStrategy::Fastest2d);
    }
}
