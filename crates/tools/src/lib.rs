//! ニューラルトリガー用コマンドラインツールの共通部

pub mod common;
