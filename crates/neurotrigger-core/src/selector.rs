//! ヒット選択
//!
//! スーパーレイヤー毎に、関連 ID 窓に入るヒットから上位 `maxHitsPerSL` 個を選ぶ。
//!
//! # 順位
//!
//! 1. 左右が確定しているヒットを優先
//! 2. 確定状態が同じなら、ドリフト時間が短い方を優先
//!
//! 同順位のヒットは先着を残す（容量を超えた分は捨てる）。
//!
//! # 走査
//!
//! ```text
//! 通常:        pass 1 = トラック関連ヒットのうち軸方向 SL
//!              pass 2 = 全ヒットのうちステレオ SL
//! neuro-track: pass 1 = トラック関連ヒットすべて（pass 2 なし）
//! ```

use crate::event_time::EventTime;
use crate::expert::SectorExpert;
use crate::geometry::GeometryConstants;
use crate::mapper::TrackMapping;
use crate::types::{CandidateHit, LeftRight, Priority, TrackEstimate, NUM_SUPERLAYERS};

/// 選ばれた1ヒット
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitSlot {
    /// イベントのヒット配列へのインデックス
    pub hit_index: usize,
    /// ドリフト時間（[0, tMax] にクランプ済み）
    pub drift_time: i32,
    pub left_right: LeftRight,
    pub priority: Priority,
    /// 相対ワイヤ位置
    pub rel_id: f64,
}

impl HitSlot {
    /// 順位キー（小さいほど良い）
    #[inline]
    fn rank(&self) -> (bool, i32) {
        (!self.left_right.is_known(), self.drift_time)
    }
}

/// 1トラック分の選択結果
///
/// スロット番号は `k * 9 + super_layer`（k = SL 内の順位）。
/// 入力ベクトルの並びと同じ。
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionResult {
    max_hits: usize,
    slots: Vec<Option<HitSlot>>,
}

impl SelectionResult {
    /// 空の結果
    pub fn new(max_hits: usize) -> Self {
        Self {
            max_hits,
            slots: vec![None; max_hits * NUM_SUPERLAYERS],
        }
    }

    /// SL あたりのスロット数
    #[inline]
    pub fn max_hits(&self) -> usize {
        self.max_hits
    }

    /// 全スロット数
    #[inline]
    pub fn n_slots(&self) -> usize {
        self.slots.len()
    }

    /// SL 内 k 番目のスロット
    #[inline]
    pub fn slot(&self, super_layer: usize, k: usize) -> Option<&HitSlot> {
        self.slots[k * NUM_SUPERLAYERS + super_layer].as_ref()
    }

    /// 埋まっているスロット（スロット番号付き）
    pub fn iter(&self) -> impl Iterator<Item = (usize, &HitSlot)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i, s)))
    }

    /// 埋まっているスロット数
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// 1つ以上ヒットが選ばれた SL のビットパターン
    pub fn hit_pattern(&self) -> u16 {
        self.iter()
            .fold(0u16, |p, (i, _)| p | (1 << (i % NUM_SUPERLAYERS)))
    }

    /// 候補を1つ入れる
    ///
    /// 空きスロットがあれば入れ、なければ最下位より厳密に良い場合のみ置き換える。
    fn offer(&mut self, super_layer: usize, candidate: HitSlot) {
        let indices = (0..self.max_hits).map(|k| k * NUM_SUPERLAYERS + super_layer);

        let mut worst: Option<usize> = None;
        for i in indices {
            match &self.slots[i] {
                None => {
                    self.slots[i] = Some(candidate);
                    return;
                }
                Some(s) => {
                    let is_worse = worst
                        .and_then(|w| self.slots[w].as_ref())
                        .is_none_or(|w| s.rank() > w.rank());
                    if is_worse {
                        worst = Some(i);
                    }
                }
            }
        }

        if let Some(w) = worst {
            if self.slots[w].is_some_and(|s| candidate.rank() < s.rank()) {
                self.slots[w] = Some(candidate);
            }
        }
    }

    /// 各 SL 内を順位順に並べ替える
    fn sort(&mut self) {
        for sl in 0..NUM_SUPERLAYERS {
            let mut filled: Vec<HitSlot> = (0..self.max_hits)
                .filter_map(|k| self.slots[k * NUM_SUPERLAYERS + sl])
                .collect();
            filled.sort_by_key(HitSlot::rank);

            for k in 0..self.max_hits {
                self.slots[k * NUM_SUPERLAYERS + sl] = filled.get(k).copied();
            }
        }
    }
}

/// ヒット選択器
///
/// 1トラック × 1セクターで使い捨てる。
#[derive(Debug, Clone, Copy)]
pub struct HitSelector<'a> {
    geometry: &'a GeometryConstants,
    expert: &'a SectorExpert,
    mapping: &'a TrackMapping,
    neuro_track_input: bool,
}

impl<'a> HitSelector<'a> {
    pub fn new(
        geometry: &'a GeometryConstants,
        expert: &'a SectorExpert,
        mapping: &'a TrackMapping,
        neuro_track_input: bool,
    ) -> Self {
        Self {
            geometry,
            expert,
            mapping,
            neuro_track_input,
        }
    }

    #[inline]
    pub fn expert(&self) -> &'a SectorExpert {
        self.expert
    }

    #[inline]
    pub fn mapping(&self) -> &'a TrackMapping {
        self.mapping
    }

    /// 走査対象のヒット（2パス）
    ///
    /// 範囲外のヒットインデックスと、使えないヒット（[`CandidateHit::is_usable`]）は飛ばす。
    pub fn candidates<'e>(
        &self,
        track: &'e TrackEstimate,
        hits: &'e [CandidateHit],
    ) -> impl Iterator<Item = usize> + 'e {
        let neuro_track = self.neuro_track_input;

        let first = track
            .related_hits
            .iter()
            .copied()
            .filter(move |&i| {
                hits.get(i)
                    .is_some_and(|h| h.is_usable() && (neuro_track || h.is_axial()))
            });
        let second = (0..hits.len())
            .filter(move |&i| !neuro_track && hits[i].is_usable() && !hits[i].is_axial());

        first.chain(second)
    }

    /// 関連 ID 窓に入れば relId を返す
    #[inline]
    pub fn relevant_rel_id(&self, hit: &CandidateHit) -> Option<f64> {
        let rel_id = self.mapping.rel_id(self.geometry, hit);
        self.expert
            .is_relevant(hit.super_layer, rel_id)
            .then_some(rel_id)
    }

    /// 関連ヒットすべて（順位付けなし、走査順）
    pub fn relevant_hits(&self, track: &TrackEstimate, hits: &[CandidateHit]) -> Vec<usize> {
        self.candidates(track, hits)
            .filter(|&i| self.relevant_rel_id(&hits[i]).is_some())
            .collect()
    }

    /// 関連ヒットがある SL のビットパターン
    pub fn hit_pattern(&self, track: &TrackEstimate, hits: &[CandidateHit]) -> u16 {
        self.candidates(track, hits)
            .filter(|&i| self.relevant_rel_id(&hits[i]).is_some())
            .fold(0u16, |p, i| p | (1 << hits[i].super_layer))
    }

    /// クランプ済みドリフト時間
    ///
    /// T0 不明なら 0。
    #[inline]
    pub fn drift_time(&self, hit: &CandidateHit, t0: EventTime) -> i32 {
        let t = if t0.known {
            hit.priority_time.saturating_sub(t0.value)
        } else {
            0
        };
        t.clamp(0, self.expert.t_max())
    }

    /// SL 毎に上位ヒットを選ぶ
    pub fn select(&self, track: &TrackEstimate, hits: &[CandidateHit], t0: EventTime) -> SelectionResult {
        let mut result = SelectionResult::new(self.expert.max_hits_per_sl());

        for i in self.candidates(track, hits) {
            let hit = &hits[i];
            let Some(rel_id) = self.relevant_rel_id(hit) else {
                continue;
            };

            result.offer(
                hit.super_layer,
                HitSlot {
                    hit_index: i,
                    drift_time: self.drift_time(hit, t0),
                    left_right: hit.left_right,
                    priority: hit.priority,
                    rel_id,
                },
            );
        }

        result.sort();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NeuroConfig;
    use crate::expert::SectorRegistry;
    use crate::geometry::tests::test_geometry;

    fn setup(max_hits: usize) -> (GeometryConstants, SectorRegistry) {
        let geo = GeometryConstants::from_service(&test_geometry()).unwrap();
        let config = NeuroConfig {
            max_hits_per_sl: vec![max_hits],
            t_max: 64,
            ..NeuroConfig::default()
        };
        let registry = SectorRegistry::build(&config, &geo).unwrap();
        (geo, registry)
    }

    fn hit(geo: &GeometryConstants, sl: usize, local: u32, lr: LeftRight, t: i32) -> CandidateHit {
        CandidateHit::new(sl, geo.ts_offset(sl) + local, lr, Priority::First, t)
    }

    const T0: EventTime = EventTime::known(0);

    #[test]
    fn test_known_ambiguity_beats_shorter_time() {
        let (geo, registry) = setup(1);
        let mapping = TrackMapping::new(&geo, 0.0, 0.0);
        let selector = HitSelector::new(&geo, &registry[0], &mapping, false);

        let hits = vec![
            hit(&geo, 0, 0, LeftRight::Unknown, 3),
            hit(&geo, 0, 1, LeftRight::Left, 10),
        ];
        for related in [vec![0, 1], vec![1, 0]] {
            let track = TrackEstimate::new(0.0, 0.0).with_related_hits(related);
            let result = selector.select(&track, &hits, T0);
            let slot = result.slot(0, 0).unwrap();
            assert_eq!(slot.hit_index, 1);
            assert_eq!(slot.drift_time, 10);
            assert_eq!(result.len(), 1);
        }
    }

    #[test]
    fn test_shorter_time_wins_among_equal_ambiguity() {
        let (geo, registry) = setup(1);
        let mapping = TrackMapping::new(&geo, 0.0, 0.0);
        let selector = HitSelector::new(&geo, &registry[0], &mapping, false);

        let hits = vec![
            hit(&geo, 2, 0, LeftRight::Right, 20),
            hit(&geo, 2, 1, LeftRight::Left, 5),
            // 同時間は先着が残る
            hit(&geo, 2, 0, LeftRight::Left, 5),
        ];
        let track = TrackEstimate::new(0.0, 0.0).with_related_hits(vec![0, 1, 2]);
        let result = selector.select(&track, &hits, T0);
        assert_eq!(result.slot(2, 0).unwrap().hit_index, 1);
    }

    #[test]
    fn test_relevance_window_inclusive() {
        let (geo, registry) = setup(1);
        let mapping = TrackMapping::new(&geo, 0.0, 0.0);
        let selector = HitSelector::new(&geo, &registry[0], &mapping, false);

        // 軸方向 SL の窓は [-1.5, 1.5]、第2プライオリティで ±0.5 ずらして端を作る
        let at_edge = CandidateHit::new(0, 1, LeftRight::Left, Priority::SecondRight, 0);
        let outside = CandidateHit::new(0, 2, LeftRight::Left, Priority::SecondRight, 0);
        let at_low_edge = CandidateHit::new(0, 159, LeftRight::Left, Priority::SecondLeft, 0);
        let below = CandidateHit::new(0, 158, LeftRight::Left, Priority::SecondLeft, 0);

        assert_eq!(selector.relevant_rel_id(&at_edge), Some(1.5));
        assert_eq!(selector.relevant_rel_id(&outside), None);
        assert_eq!(selector.relevant_rel_id(&at_low_edge), Some(-1.5));
        assert_eq!(selector.relevant_rel_id(&below), None);
    }

    #[test]
    fn test_stereo_scanned_from_full_collection() {
        let (geo, registry) = setup(1);
        let mapping = TrackMapping::new(&geo, 0.0, 0.0);

        let hits = vec![
            hit(&geo, 0, 0, LeftRight::Left, 1), // 関連付けあり（軸方向）
            hit(&geo, 2, 0, LeftRight::Left, 1), // 関連付けなし（軸方向）
            hit(&geo, 1, 0, LeftRight::Left, 1), // 関連付けなし（ステレオ）
            hit(&geo, 3, 0, LeftRight::Left, 1), // 関連付けあり（ステレオ）
        ];
        let track = TrackEstimate::new(0.0, 0.0).with_related_hits(vec![0, 3]);

        let selector = HitSelector::new(&geo, &registry[0], &mapping, false);
        assert_eq!(selector.candidates(&track, &hits).collect::<Vec<_>>(), vec![0, 2, 3]);
        assert_eq!(selector.hit_pattern(&track, &hits), 0b1011);

        let neuro_track = HitSelector::new(&geo, &registry[0], &mapping, true);
        assert_eq!(neuro_track.candidates(&track, &hits).collect::<Vec<_>>(), vec![0, 3]);
        assert_eq!(neuro_track.hit_pattern(&track, &hits), 0b1001);
    }

    #[test]
    fn test_multiple_hits_per_superlayer() {
        let (geo, registry) = setup(2);
        let mapping = TrackMapping::new(&geo, 0.0, 0.0);
        let selector = HitSelector::new(&geo, &registry[0], &mapping, false);

        let hits = vec![
            hit(&geo, 4, 0, LeftRight::Unknown, 1),
            hit(&geo, 4, 1, LeftRight::Right, 30),
            hit(&geo, 4, 0, LeftRight::Left, 12),
            hit(&geo, 4, 1, LeftRight::Unknown, 0),
        ];
        let track = TrackEstimate::new(0.0, 0.0).with_related_hits(vec![0, 1, 2, 3]);
        let result = selector.select(&track, &hits, T0);

        assert_eq!(result.max_hits(), 2);
        assert_eq!(result.n_slots(), 18);
        assert_eq!(result.slot(4, 0).unwrap().hit_index, 2);
        assert_eq!(result.slot(4, 1).unwrap().hit_index, 1);
        assert_eq!(result.len(), 2);
        assert_eq!(result.hit_pattern(), 1 << 4);

        let indices: Vec<usize> = result.iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![4, 13]);

        assert_eq!(selector.relevant_hits(&track, &hits), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_drift_time_clamped() {
        let (geo, registry) = setup(1);
        let mapping = TrackMapping::new(&geo, 0.0, 0.0);
        let selector = HitSelector::new(&geo, &registry[0], &mapping, false);

        let early = hit(&geo, 0, 0, LeftRight::Left, 5);
        let late = hit(&geo, 0, 0, LeftRight::Left, 500);

        assert_eq!(selector.drift_time(&early, EventTime::known(10)), 0);
        assert_eq!(selector.drift_time(&late, EventTime::known(10)), 64);
        assert_eq!(selector.drift_time(&late, EventTime::UNKNOWN), 0);
        assert_eq!(selector.drift_time(&early, EventTime::known(2)), 3);
    }

    #[test]
    fn test_no_related_hits_gives_empty_result() {
        let (geo, registry) = setup(1);
        let mapping = TrackMapping::new(&geo, 0.0, 0.0);
        let selector = HitSelector::new(&geo, &registry[0], &mapping, false);

        let track = TrackEstimate::new(0.0, 0.0);
        let result = selector.select(&track, &[], T0);
        assert!(result.is_empty());
        assert_eq!(result.hit_pattern(), 0);
    }

    #[test]
    fn test_invalid_related_index_skipped() {
        let (geo, registry) = setup(1);
        let mapping = TrackMapping::new(&geo, 0.0, 0.0);
        let selector = HitSelector::new(&geo, &registry[0], &mapping, false);

        let hits = vec![hit(&geo, 0, 0, LeftRight::Left, 1)];
        let track = TrackEstimate::new(0.0, 0.0).with_related_hits(vec![7, 0]);
        assert_eq!(selector.candidates(&track, &hits).collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_unusable_hits_skipped() {
        let (geo, registry) = setup(1);
        let mapping = TrackMapping::new(&geo, 0.0, 0.0);

        let hits = vec![
            CandidateHit::new(9, 5, LeftRight::Left, Priority::First, 3),
            CandidateHit::new(0, 0, LeftRight::Left, Priority::None, 1),
            CandidateHit::new(1, geo.ts_offset(1), LeftRight::Left, Priority::None, 1),
            hit(&geo, 0, 0, LeftRight::Right, 8),
        ];
        let track = TrackEstimate::new(0.0, 0.0).with_related_hits(vec![0, 1, 2, 3]);

        for neuro_track in [false, true] {
            let selector = HitSelector::new(&geo, &registry[0], &mapping, neuro_track);
            assert_eq!(selector.candidates(&track, &hits).collect::<Vec<_>>(), vec![3]);
            assert_eq!(selector.hit_pattern(&track, &hits), 0b1);

            let result = selector.select(&track, &hits, T0);
            assert_eq!(result.len(), 1);
            assert_eq!(result.slot(0, 0).unwrap().hit_index, 3);
        }
    }
}
