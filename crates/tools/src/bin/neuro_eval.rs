/// ニューラルトリガー評価ツール
///
/// 設定（TOML）・重みテーブル・イベント（JSON Lines）を読み、
/// 全トラックを評価して1トラック1行の JSON Lines を出力する。
///
/// 使い方:
///   neuro_eval --config neuro.toml --weights sectors.ntwt --events events.jsonl.gz
///
///   # 固定小数点（FPGA 互換）で評価し、ファイルへ出力
///   neuro_eval --config neuro.toml --weights sectors.ntwt --events events.jsonl \
///       --fixed -o predictions.jsonl.gz
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;

use neurotrigger_core::expert::read_weight_table;
use neurotrigger_core::stats::print_neuro_stats;
use neurotrigger_core::{
    EventData, EventTimeStrategy, GeometryConstants, InferenceMode, NeuroConfig, NeuroPrediction,
    NeuroTrigger, SectorRegistry, SelectionMiss, TriggerOptions,
};
use tools::common::io::{open_reader, open_writer, read_json_lines, write_json_line};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "neuro_eval")]
#[command(about = "セクター MLP でトラックの z / θ を推定する")]
struct Cli {
    /// 設定ファイル（TOML、[geometry] テーブル必須）
    #[arg(long)]
    config: PathBuf,

    /// 重みテーブル（NTWT 形式、.gz 可）
    #[arg(long)]
    weights: PathBuf,

    /// イベントファイル（JSON Lines、.gz 可、"-" で標準入力）
    #[arg(long)]
    events: PathBuf,

    /// 出力ファイル（JSON Lines、.gz 可）
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    /// 固定小数点（FPGA 互換）で評価
    #[arg(long)]
    fixed: bool,

    /// neuro-track 入力（関連ヒットのみ使う）
    #[arg(long)]
    neuro_track: bool,

    /// イベント時間戦略（省略時は設定ファイルの値）
    #[arg(long)]
    event_time: Option<EventTimeStrategy>,

    /// 並列スレッド数（0 = 自動）
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// デバッグログを出す
    #[arg(short, long)]
    verbose: bool,
}

// ---------------------------------------------------------------------------
// 出力
// ---------------------------------------------------------------------------

/// 1トラック分の出力行
#[derive(Serialize)]
struct TrackRecord<'a> {
    event: usize,
    track: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    prediction: Option<&'a NeuroPrediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    miss: Option<SelectionMiss>,
}

impl<'a> TrackRecord<'a> {
    fn new(event: usize, track: usize, result: &'a Result<NeuroPrediction, SelectionMiss>) -> Self {
        let (prediction, miss) = match result {
            Ok(p) => (Some(p), None),
            Err(m) => (None, Some(*m)),
        };
        Self {
            event,
            track,
            prediction,
            miss,
        }
    }
}

/// 集計
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Summary {
    tracks: usize,
    predictions: usize,
    no_sector: usize,
    no_pattern_match: usize,
}

impl Summary {
    fn add(&mut self, result: &Result<NeuroPrediction, SelectionMiss>) {
        self.tracks += 1;
        match result {
            Ok(_) => self.predictions += 1,
            Err(SelectionMiss::NoSector) => self.no_sector += 1,
            Err(SelectionMiss::NoPatternMatch) => self.no_pattern_match += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// セットアップ
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<NeuroConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse config {}", path.display()))
}

fn build_trigger(cli: &Cli, config: &NeuroConfig) -> Result<NeuroTrigger> {
    let Some(table) = config.geometry.as_ref() else {
        bail!("config {} has no [geometry] table", cli.config.display());
    };
    let geometry = GeometryConstants::from_service(table).context("invalid geometry table")?;

    let mut registry =
        SectorRegistry::build(config, &geometry).context("invalid sector configuration")?;

    let mut reader = open_reader(&cli.weights)
        .with_context(|| format!("failed to open weights {}", cli.weights.display()))?;
    let weights = read_weight_table(&mut reader)
        .with_context(|| format!("failed to read weights {}", cli.weights.display()))?;
    registry.load_weights(weights).context("weight table does not match topology")?;

    let options = TriggerOptions {
        event_time: cli.event_time.unwrap_or(config.event_time),
        mode: if cli.fixed {
            InferenceMode::Fixed
        } else {
            InferenceMode::Float
        },
        neuro_track_input: cli.neuro_track,
    };
    Ok(NeuroTrigger::new(geometry, registry, options)?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("failed to configure thread pool")?;
    }

    let config = load_config(&cli.config)?;
    let trigger = build_trigger(&cli, &config)?;

    let reader = open_reader(&cli.events)
        .with_context(|| format!("failed to open events {}", cli.events.display()))?;
    let events: Vec<EventData> = read_json_lines(reader)
        .with_context(|| format!("failed to read events {}", cli.events.display()))?;
    log::info!("loaded {} events from {}", events.len(), cli.events.display());

    let start = Instant::now();
    let results: Vec<Vec<Result<NeuroPrediction, SelectionMiss>>> =
        events.par_iter().map(|event| trigger.process_event(event)).collect();
    let elapsed = start.elapsed();

    let mut out = open_writer(&cli.output)
        .with_context(|| format!("failed to create {}", cli.output.display()))?;
    let mut summary = Summary::default();
    for (event, tracks) in results.iter().enumerate() {
        for (track, result) in tracks.iter().enumerate() {
            summary.add(result);
            write_json_line(&mut out, &TrackRecord::new(event, track, result))?;
        }
    }
    out.close()?;

    eprintln!("=== neuro_eval ===");
    eprintln!("mode:             {}", trigger.options().mode);
    eprintln!("event time:       {}", trigger.options().event_time);
    eprintln!("events:           {:>10}", events.len());
    eprintln!("tracks:           {:>10}", summary.tracks);
    eprintln!("predictions:      {:>10}", summary.predictions);
    eprintln!("no sector:        {:>10}", summary.no_sector);
    eprintln!("no pattern match: {:>10}", summary.no_pattern_match);
    eprintln!("elapsed:          {:>10.3}s", elapsed.as_secs_f64());
    print_neuro_stats();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurotrigger_core::{EventTime, HardwareEventTime};

    fn prediction() -> NeuroPrediction {
        NeuroPrediction {
            sector: 1,
            z: Some(2.5),
            theta: None,
            targets: vec![2.5],
            raw: vec![0.025],
            hit_pattern: 0b101,
            event_time: EventTime::known(4),
            input: vec![0.0; 27],
            selected_hits: vec![0, 3],
        }
    }

    #[test]
    fn test_record_json() {
        let ok = Ok(prediction());
        let json = serde_json::to_value(TrackRecord::new(2, 0, &ok)).unwrap();
        assert_eq!(json["event"], 2);
        assert_eq!(json["prediction"]["sector"], 1);
        assert_eq!(json["prediction"]["event_time"]["value"], 4);
        assert!(json.get("miss").is_none());

        let miss = Err(SelectionMiss::NoPatternMatch);
        let json = serde_json::to_value(TrackRecord::new(0, 3, &miss)).unwrap();
        assert_eq!(json["miss"], "no_pattern_match");
        assert!(json.get("prediction").is_none());
    }

    #[test]
    fn test_summary() {
        let mut s = Summary::default();
        s.add(&Ok(prediction()));
        s.add(&Err(SelectionMiss::NoSector));
        s.add(&Err(SelectionMiss::NoSector));
        assert_eq!(
            s,
            Summary {
                tracks: 3,
                predictions: 1,
                no_sector: 2,
                no_pattern_match: 0,
            }
        );
    }

    #[test]
    fn test_event_line_format() {
        let line = r#"{"hits": [{"super_layer": 0, "segment_id": 12, "left_right": 2, "priority": 3, "priority_time": 17}],
                       "tracks": [{"omega": 0.001, "phi0": 0.5, "related_hits": [0]}],
                       "hardware_time": {"value": 5, "valid": true}}"#
            .replace('\n', " ");
        let events: Vec<EventData> = read_json_lines(line.as_bytes()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].hits[0].priority_time, 17);
        assert_eq!(events[0].tracks[0].related_hits, vec![0]);
        assert_eq!(events[0].hardware_time, HardwareEventTime::valid(5));
    }

    #[test]
    fn test_cli_parses_event_time() {
        let cli = Cli::try_parse_from([
            "neuro_eval",
            "--config",
            "c.toml",
            "--weights",
            "w.ntwt",
            "--events",
            "-",
            "--event-time",
            "etf_or_zero",
            "--fixed",
        ])
        .unwrap();
        assert_eq!(cli.event_time, Some(EventTimeStrategy::EtfOrZero));
        assert!(cli.fixed);
        assert_eq!(cli.output, PathBuf::from("-"));
    }
}
