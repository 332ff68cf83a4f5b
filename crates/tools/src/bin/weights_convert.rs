/// 重みテーブル変換ツール
///
/// 学習側が出力する JSON（セクター毎の重みリストの配列）と
/// バイナリの NTWT 形式を相互に変換する。入力の拡張子で向きを決める。
///
/// 使い方:
///   # JSON → NTWT（設定を渡すとトポロジーとの整合も確認する）
///   weights_convert weights.json sectors.ntwt --config neuro.toml
///
///   # NTWT → JSON
///   weights_convert sectors.ntwt weights.json.gz
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;

use neurotrigger_core::expert::{read_weight_table, write_weight_table};
use neurotrigger_core::{GeometryConstants, NeuroConfig, SectorRegistry};
use tools::common::io::{open_reader, open_writer};

#[derive(Parser, Debug)]
#[command(name = "weights_convert")]
#[command(about = "重みテーブルを JSON と NTWT の間で変換する")]
struct Cli {
    /// 入力ファイル（.json / .json.gz なら JSON、それ以外は NTWT）
    input: PathBuf,

    /// 出力ファイル
    output: PathBuf,

    /// 設定ファイル（TOML）。指定時はセクター数と重み数を検証する
    #[arg(long)]
    config: Option<PathBuf>,
}

/// JSON 形式か（`.gz` を除いた拡張子で判定）
fn is_json(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(name);
    name.to_ascii_lowercase().ends_with(".json")
}

fn read_table(path: &Path) -> Result<Vec<Vec<f32>>> {
    let mut reader =
        open_reader(path).with_context(|| format!("failed to open {}", path.display()))?;
    if is_json(path) {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
    } else {
        read_weight_table(&mut reader).with_context(|| format!("invalid table {}", path.display()))
    }
}

fn write_table(path: &Path, table: &[Vec<f32>]) -> Result<()> {
    let mut out =
        open_writer(path).with_context(|| format!("failed to create {}", path.display()))?;
    if is_json(path) {
        serde_json::to_writer(&mut out, table)?;
        out.write_all(b"\n")?;
    } else {
        write_weight_table(&mut out, table)?;
    }
    out.close()?;
    Ok(())
}

/// 設定のトポロジーと照合する
fn check_against_config(path: &Path, table: &[Vec<f32>]) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: NeuroConfig = toml::from_str(&text)?;
    let Some(geometry) = config.geometry.as_ref() else {
        bail!("config {} has no [geometry] table", path.display());
    };

    let geometry = GeometryConstants::from_service(geometry)?;
    let mut registry = SectorRegistry::build(&config, &geometry)?;
    registry.load_weights(table.to_vec())?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    if is_json(&cli.input) == is_json(&cli.output) {
        bail!("input and output must differ in format (one JSON, one NTWT)");
    }

    let table = read_table(&cli.input)?;
    if let Some(config) = &cli.config {
        check_against_config(config, &table)?;
    }
    write_table(&cli.output, &table)?;

    let n_weights: usize = table.iter().map(Vec::len).sum();
    eprintln!(
        "{} -> {}: {} sectors, {} weights",
        cli.input.display(),
        cli.output.display(),
        table.len(),
        n_weights
    );
    Ok(())
}
