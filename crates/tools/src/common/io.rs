//! ファイル入出力（gzip 対応）
//!
//! 拡張子 `.gz` なら透過的に圧縮・展開し、パス `-` は標準入出力とみなす。

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

const READER_BUF_CAP: usize = 128 * 1024;

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

/// 読み込み用に開く
pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let p = path.as_ref();
    if is_stdio(p) {
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, io::stdin())));
    }

    let f = File::open(p)?;
    if is_gzip(p) {
        let dec = flate2::read::GzDecoder::new(f);
        Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, dec)))
    } else {
        Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, f)))
    }
}

/// 出力先
///
/// gzip の終端書き込みエラーを拾うため、最後に `close` を呼ぶ。
#[must_use = "call .close() to propagate compression/IO errors"]
pub enum Writer {
    File(BufWriter<File>),
    Stdout(io::Stdout),
    Gz(flate2::write::GzEncoder<BufWriter<File>>),
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Writer::File(f) => f.write(buf),
            Writer::Stdout(s) => s.write(buf),
            Writer::Gz(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Writer::File(f) => f.flush(),
            Writer::Stdout(s) => s.flush(),
            Writer::Gz(e) => e.flush(),
        }
    }
}

impl Writer {
    /// ストリームを閉じる（gzip はトレーラを書き込む）
    pub fn close(self) -> io::Result<()> {
        match self {
            Writer::File(mut f) => f.flush(),
            Writer::Stdout(mut s) => s.flush(),
            Writer::Gz(e) => e.finish()?.flush(),
        }
    }
}

/// 書き込み用に開く
pub fn open_writer<P: AsRef<Path>>(path: P) -> io::Result<Writer> {
    let p = path.as_ref();
    if is_stdio(p) {
        return Ok(Writer::Stdout(io::stdout()));
    }

    let f = BufWriter::new(File::create(p)?);
    if is_gzip(p) {
        Ok(Writer::Gz(flate2::write::GzEncoder::new(f, flate2::Compression::default())))
    } else {
        Ok(Writer::File(f))
    }
}

/// JSON Lines を読む（空行は飛ばす）
pub fn read_json_lines<T: DeserializeOwned, R: BufRead>(reader: R) -> Result<Vec<T>> {
    let mut items = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read error at line {}", i + 1))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let item = serde_json::from_str(line).with_context(|| format!("invalid JSON at line {}", i + 1))?;
        items.push(item);
    }
    Ok(items)
}

/// 1行分の JSON を書く
pub fn write_json_line<T: Serialize, W: Write>(writer: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *writer, value)?;
    writer.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_kinds() {
        assert!(is_stdio(Path::new("-")));
        assert!(!is_stdio(Path::new("./-x")));
        assert!(is_gzip(Path::new("events.jsonl.gz")));
        assert!(is_gzip(Path::new("EVENTS.GZ")));
        assert!(!is_gzip(Path::new("events.jsonl")));
    }

    #[test]
    fn test_json_lines() {
        let text = "[1, 2]\n\n  [3]  \n";
        let items: Vec<Vec<u32>> = read_json_lines(text.as_bytes()).unwrap();
        assert_eq!(items, vec![vec![1, 2], vec![3]]);

        let mut out = Vec::new();
        write_json_line(&mut out, &items[0]).unwrap();
        assert_eq!(out, b"[1,2]\n");

        let err = read_json_lines::<Vec<u32>, _>("[1]\n{oops\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
