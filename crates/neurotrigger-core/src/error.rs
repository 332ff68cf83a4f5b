//! 設定エラー
//!
//! レジストリ構築時の致命的エラー。部分的なレジストリは作らない。

use thiserror::Error;

/// 設定エラー
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("n_sectors must be at least 1")]
    NoSectors,

    #[error("no outputs: enable target_z and/or target_theta")]
    NoTargets,

    #[error("{field}: {len} entries, expected {expected}")]
    ListLength {
        field: &'static str,
        len: usize,
        expected: String,
    },

    #[error("{field}[{index}]: empty or inverted range [{lo}, {hi})")]
    InvalidRange {
        field: &'static str,
        index: usize,
        lo: f32,
        hi: f32,
    },

    #[error("{field}[{index}]: range [{lo}, {hi}) outside [{min}, {max}]")]
    RangeOutOfBounds {
        field: &'static str,
        index: usize,
        lo: f32,
        hi: f32,
        min: f32,
        max: f32,
    },

    #[error("{field}[{index}]: width {width} exceeds 360 degrees")]
    PhiRangeTooWide {
        field: &'static str,
        index: usize,
        width: f32,
    },

    #[error("{axis} training range [{train_lo}, {train_hi}) does not contain usage range [{lo}, {hi}) (index {index})")]
    TrainRangeNotEnclosing {
        axis: &'static str,
        index: usize,
        lo: f32,
        hi: f32,
        train_lo: f32,
        train_hi: f32,
    },

    #[error("output_scale[{index}]: {len} values, expected {expected}")]
    OutputScaleLength {
        index: usize,
        len: usize,
        expected: usize,
    },

    #[error("n_hidden[{index}]: hidden layer {layer} has no nodes ({value})")]
    InvalidHiddenLayer {
        index: usize,
        layer: usize,
        value: f32,
    },

    #[error("max_hits_per_sl[{index}] must be at least 1")]
    InvalidMaxHits { index: usize },

    #[error("t_max must be positive, got {0}")]
    InvalidTMax(i32),

    #[error("relevant_id[{index}]: {len} values, expected 18")]
    RelevantIdLength { index: usize, len: usize },

    #[error("relevant_id[{index}] superlayer {super_layer}: invalid window [{lo}, {hi}] for {n_wires} wires")]
    InvalidRelevantId {
        index: usize,
        super_layer: usize,
        lo: f32,
        hi: f32,
        n_wires: u32,
    },

    #[error("geometry superlayer {super_layer}: invalid {reason}")]
    InvalidGeometry { super_layer: usize, reason: String },

    #[error("precision: {0}")]
    InvalidPrecision(String),

    #[error("sector {sector}: {actual} weights, expected {expected}")]
    WeightCount {
        sector: usize,
        expected: usize,
        actual: usize,
    },

    #[error("weight table has {actual} sectors, registry has {expected}")]
    SectorCount { expected: usize, actual: usize },

    #[error("unknown event time strategy: {0}")]
    UnknownEventTimeStrategy(String),
}
