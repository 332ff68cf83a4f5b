//! NTWT ファイル I/O
//!
//! セクター毎の float32 重みリストを順に並べただけの単純なテーブル。
//!
//! ```text
//! magic "NTWT" | version u32 | n_sectors u32
//! sector 0: len u32 | f32 × len
//! sector 1: ...
//! ```
//!
//! 数値はすべてリトルエンディアン。

use std::io::{self, Read, Write};

/// NTWT ファイルマジックナンバー
pub const NTWT_MAGIC: [u8; 4] = *b"NTWT";

/// NTWT ファイルバージョン
pub const NTWT_VERSION: u32 = 1;

/// 1セクターあたりの重み数の上限
const MAX_SECTOR_WEIGHTS: u32 = 1 << 24;

/// NTWT ヘッダ（12 bytes）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightTableHeader {
    /// マジックナンバー "NTWT"
    pub magic: [u8; 4],

    /// ファイルバージョン（1）
    pub version: u32,

    /// セクター数
    pub n_sectors: u32,
}

impl WeightTableHeader {
    /// ヘッダーサイズ（bytes）
    pub const SIZE: usize = 12;

    pub fn new(n_sectors: u32) -> Self {
        Self {
            magic: NTWT_MAGIC,
            version: NTWT_VERSION,
            n_sectors,
        }
    }

    /// バイト列から読み込み
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> io::Result<Self> {
        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != NTWT_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid NTWT magic: {magic:?}"),
            ));
        }

        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != NTWT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unsupported NTWT version: {version}"),
            ));
        }

        let n_sectors = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        if n_sectors == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "NTWT table has no sectors",
            ));
        }

        Ok(Self {
            magic,
            version,
            n_sectors,
        })
    }

    /// バイト列へ書き出し
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.n_sectors.to_le_bytes());
        bytes
    }
}

/// NTWT ファイルを読み込み
///
/// # 戻り値
///
/// セクター順の重みリスト。トポロジーとの照合は `SectorRegistry::load_weights` で行う。
pub fn read_weight_table<R: Read>(reader: &mut R) -> io::Result<Vec<Vec<f32>>> {
    let mut header_bytes = [0u8; WeightTableHeader::SIZE];
    reader.read_exact(&mut header_bytes)?;
    let header = WeightTableHeader::from_bytes(&header_bytes)?;

    let mut table = Vec::with_capacity(header.n_sectors as usize);
    for sector in 0..header.n_sectors {
        table.push(read_sector(reader, sector)?);
    }

    Ok(table)
}

/// 1セクター分（長さ + f32 列）を読み込み
fn read_sector<R: Read>(reader: &mut R, sector: u32) -> io::Result<Vec<f32>> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes);
    if len > MAX_SECTOR_WEIGHTS {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Sector {sector}: {len} weights exceeds limit {MAX_SECTOR_WEIGHTS}"),
        ));
    }

    let mut buf = vec![0u8; len as usize * 4];
    reader.read_exact(&mut buf)?;

    Ok(buf
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// NTWT ファイルを書き出し
pub fn write_weight_table<W: Write, S: AsRef<[f32]>>(writer: &mut W, table: &[S]) -> io::Result<()> {
    let n_sectors = u32::try_from(table.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many sectors"))?;
    writer.write_all(&WeightTableHeader::new(n_sectors).to_bytes())?;

    for weights in table {
        let weights = weights.as_ref();
        let len = u32::try_from(weights.len())
            .ok()
            .filter(|&n| n <= MAX_SECTOR_WEIGHTS)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "sector too large"))?;
        writer.write_all(&len.to_le_bytes())?;

        let mut buf = Vec::with_capacity(weights.len() * 4);
        for w in weights {
            buf.extend_from_slice(&w.to_le_bytes());
        }
        writer.write_all(&buf)?;
    }

    Ok(())
}
