//! 入力ベクトル構築
//!
//! スロット `s`（= k·9 + SL）毎に3特徴量を `3s..3s+3` へ書く。
//!
//! ```text
//! [3s]     relId × 2^floor(log2(1/max(hi, −lo)))
//! [3s + 1] (L − R) × ドリフト時間 × 2^floor(log2(1/tMax))
//! [3s + 2] alpha / 2
//! ```
//!
//! 空きスロットは 0 のまま。

use crate::expert::{SectorExpert, FEATURES_PER_HIT};
use crate::mapper::TrackMapping;
use crate::selector::SelectionResult;
use crate::types::NUM_SUPERLAYERS;

/// 選択結果から入力ベクトルを作る
///
/// 長さは `3 × selection.n_slots()`（= 27 × maxHitsPerSL）。
pub fn build_input(expert: &SectorExpert, mapping: &TrackMapping, selection: &SelectionResult) -> Vec<f32> {
    let mut input = vec![0.0f32; FEATURES_PER_HIT * selection.n_slots()];

    for (slot, hit) in selection.iter() {
        let sl = slot % NUM_SUPERLAYERS;
        let base = FEATURES_PER_HIT * slot;

        input[base] = expert.scale_id(sl, hit.rel_id);
        input[base + 1] = hit.left_right.sign() as f32 * hit.drift_time as f32 * expert.time_scale();
        input[base + 2] = (mapping.alpha(sl, hit.priority.class()) * 0.5) as f32;
    }

    input
}
