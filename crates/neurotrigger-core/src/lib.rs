//! ニューラルトラックトリガー コア
//!
//! ドリフトチェンバーのヒットパターンから、セクター別の小さな MLP で
//! z 位置・極角を推定する。固定小数点パスは FPGA 実装と bit-exact 互換。
//!
//! # 処理の流れ
//!
//! ```text
//! GeometryService ──▶ GeometryConstants ──▶ SectorRegistry（設定時に一度だけ構築）
//!
//! トラック毎:
//!   TrackEstimate
//!     ├─ select_sectors (φ, q/pT, θ)
//!     ├─ TrackMapping (alpha, idRef)          ← mapper
//!     ├─ EventTime (T0)                       ← event_time
//!     ├─ select_by_pattern (SL ヒットパターン)
//!     ├─ SelectionResult                      ← selector
//!     ├─ 入力ベクトル [27 × maxHitsPerSL]     ← input
//!     └─ InferenceEngine (float / fixed)      ← inference
//!           ↓
//!       NeuroPrediction (z [cm], θ [rad])
//! ```

pub mod config;
pub mod error;
pub mod event_time;
pub mod expert;
pub mod geometry;
pub mod inference;
pub mod input;
pub mod mapper;
pub mod selector;
pub mod stats;
pub mod trigger;
pub mod types;

pub use config::{NeuroConfig, Precision};
pub use error::ConfigError;
pub use event_time::{EventTime, EventTimeStrategy};
pub use expert::{SectorExpert, SectorRegistry};
pub use geometry::{GeometryConstants, GeometryService, TableGeometry};
pub use inference::{InferenceEngine, InferenceMode};
pub use mapper::TrackMapping;
pub use selector::{HitSelector, SelectionResult};
pub use trigger::{NeuroPrediction, NeuroTrigger, SelectionMiss, TriggerOptions};
pub use types::{CandidateHit, EventData, HardwareEventTime, LeftRight, Priority, TrackEstimate};
