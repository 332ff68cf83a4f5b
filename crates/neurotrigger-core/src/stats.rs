//! 選択統計カウンタ（デバッグ・チューニング用）
//!
//! セクター未選択・パターン不一致などの発生率の測定に使用。
//! `neuro-stats` feature 有効時のみカウントを行う。
//!
//! # 使用方法
//!
//! ```bash
//! cargo build --release --features neuro-stats
//! ```

#[cfg(feature = "neuro-stats")]
use std::sync::atomic::{AtomicU64, Ordering};

/// トラック処理統計
#[cfg(feature = "neuro-stats")]
pub struct NeuroStats {
    /// process_track 呼び出し回数
    pub tracks: AtomicU64,
    /// 運動学的範囲に合うセクターがなかった回数
    pub no_sector: AtomicU64,
    /// ヒットパターンに合うセクターがなかった回数
    pub no_pattern_match: AtomicU64,
    /// イベント時間が決まらなかった回数
    pub no_event_time: AtomicU64,
    /// 関連ヒットが1つもなかった回数（推論は行う）
    pub empty_selection: AtomicU64,
    /// 推論まで到達した回数
    pub predictions: AtomicU64,
}

#[cfg(feature = "neuro-stats")]
impl NeuroStats {
    /// 新規作成
    pub const fn new() -> Self {
        Self {
            tracks: AtomicU64::new(0),
            no_sector: AtomicU64::new(0),
            no_pattern_match: AtomicU64::new(0),
            no_event_time: AtomicU64::new(0),
            empty_selection: AtomicU64::new(0),
            predictions: AtomicU64::new(0),
        }
    }

    /// カウンタをリセット
    pub fn reset(&self) {
        self.tracks.store(0, Ordering::Relaxed);
        self.no_sector.store(0, Ordering::Relaxed);
        self.no_pattern_match.store(0, Ordering::Relaxed);
        self.no_event_time.store(0, Ordering::Relaxed);
        self.empty_selection.store(0, Ordering::Relaxed);
        self.predictions.store(0, Ordering::Relaxed);
    }

    /// 統計情報を取得
    pub fn snapshot(&self) -> NeuroStatsSnapshot {
        NeuroStatsSnapshot {
            tracks: self.tracks.load(Ordering::Relaxed),
            no_sector: self.no_sector.load(Ordering::Relaxed),
            no_pattern_match: self.no_pattern_match.load(Ordering::Relaxed),
            no_event_time: self.no_event_time.load(Ordering::Relaxed),
            empty_selection: self.empty_selection.load(Ordering::Relaxed),
            predictions: self.predictions.load(Ordering::Relaxed),
        }
    }
}

/// 統計スナップショット
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeuroStatsSnapshot {
    pub tracks: u64,
    pub no_sector: u64,
    pub no_pattern_match: u64,
    pub no_event_time: u64,
    pub empty_selection: u64,
    pub predictions: u64,
}

impl NeuroStatsSnapshot {
    /// トラック数に対する割合（%）
    fn rate(&self, count: u64) -> f64 {
        if self.tracks == 0 {
            0.0
        } else {
            count as f64 / self.tracks as f64 * 100.0
        }
    }

    /// 推論到達率（%）
    pub fn prediction_rate(&self) -> f64 {
        self.rate(self.predictions)
    }

    /// レポートを出力
    pub fn print_report(&self) {
        eprintln!("=== Neuro Trigger Selection Stats ===");
        eprintln!("tracks:                {:>12}", self.tracks);
        eprintln!(
            "  no sector:           {:>12} ({:>5.1}%)",
            self.no_sector,
            self.rate(self.no_sector)
        );
        eprintln!(
            "  no pattern match:    {:>12} ({:>5.1}%)",
            self.no_pattern_match,
            self.rate(self.no_pattern_match)
        );
        eprintln!(
            "  event time unknown:  {:>12} ({:>5.1}%)",
            self.no_event_time,
            self.rate(self.no_event_time)
        );
        eprintln!(
            "  empty selection:     {:>12} ({:>5.1}%)",
            self.empty_selection,
            self.rate(self.empty_selection)
        );
        eprintln!("predictions:           {:>12}", self.predictions);
        eprintln!("prediction rate:       {:>11.1}%", self.prediction_rate());
        eprintln!("=====================================");
    }
}

// ============================================================================
// Feature有効時: 実際のカウンタ
// ============================================================================

#[cfg(feature = "neuro-stats")]
pub static NEURO_STATS: NeuroStats = NeuroStats::new();

/// 統計カウンタをリセット
#[cfg(feature = "neuro-stats")]
pub fn reset_neuro_stats() {
    NEURO_STATS.reset();
}

/// 統計スナップショットを取得
#[cfg(feature = "neuro-stats")]
pub fn get_neuro_stats() -> NeuroStatsSnapshot {
    NEURO_STATS.snapshot()
}

/// 統計レポートを出力
#[cfg(feature = "neuro-stats")]
pub fn print_neuro_stats() {
    NEURO_STATS.snapshot().print_report();
}

// ============================================================================
// Feature無効時: no-op スタブ
// ============================================================================

/// 統計カウンタをリセット（no-op）
#[cfg(not(feature = "neuro-stats"))]
#[inline]
pub fn reset_neuro_stats() {}

/// 統計スナップショットを取得（空のスナップショット）
#[cfg(not(feature = "neuro-stats"))]
#[inline]
pub fn get_neuro_stats() -> NeuroStatsSnapshot {
    NeuroStatsSnapshot::default()
}

/// 統計レポートを出力（no-op）
#[cfg(not(feature = "neuro-stats"))]
#[inline]
pub fn print_neuro_stats() {}

// ============================================================================
// インライン統計カウント用マクロ
// ============================================================================

/// カウンタを1つ進める（feature有効時のみ）
#[cfg(feature = "neuro-stats")]
macro_rules! count_stat {
    ($counter:ident) => {
        $crate::stats::NEURO_STATS
            .$counter
            .fetch_add(1, ::std::sync::atomic::Ordering::Relaxed)
    };
}

/// カウンタを1つ進める（no-op）
#[cfg(not(feature = "neuro-stats"))]
macro_rules! count_stat {
    ($counter:ident) => {};
}

pub(crate) use count_stat;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_rates() {
        let s = NeuroStatsSnapshot {
            tracks: 200,
            no_sector: 10,
            predictions: 150,
            ..NeuroStatsSnapshot::default()
        };
        assert_eq!(s.rate(s.no_sector), 5.0);
        assert_eq!(s.prediction_rate(), 75.0);
        assert_eq!(NeuroStatsSnapshot::default().prediction_rate(), 0.0);
    }
}
