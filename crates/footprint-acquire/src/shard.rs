//! Shard descriptors and per-shard pipeline state

use std::fmt;

use footprint_core::convert::SourceLayout;
use footprint_core::{Encoding, Provider};

/// Columns kept from Google's CSV tiles, besides geometry
const GOOGLE_COLUMNS: [&str; 2] = ["area_in_meters", "confidence"];

/// One remote shard and where its converted output lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardDescriptor {
    pub provider: Provider,
    pub source_url: String,
    /// Key below `{provider}-open-buildings/{encoding}/`, ends in `.parquet`
    pub target_key: String,
}

impl ShardDescriptor {
    pub fn key(&self, encoding: Encoding) -> String {
        encoding.object_key(self.provider, &self.target_key)
    }

    /// Key uploaded last; its presence means every encoding is in place
    pub fn completion_key(&self, encodings: &[Encoding]) -> String {
        self.key(encodings.last().copied().unwrap_or(Encoding::PRIMARY))
    }

    /// File name of the decompressed download; GDAL picks the driver from it
    pub fn raw_file_name(&self) -> &'static str {
        match self.provider {
            Provider::Google => "shard.csv",
            Provider::Microsoft => "shard.geojsonl",
        }
    }

    pub fn source_layout(&self) -> SourceLayout {
        match self.provider {
            Provider::Google => SourceLayout::DelimitedText {
                columns: GOOGLE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            },
            Provider::Microsoft => SourceLayout::Vector,
        }
    }
}

/// Where a shard is in its pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardStage {
    Pending,
    Downloading,
    Decompressing,
    Converting,
    Uploading,
    Done,
    Failed,
}

impl fmt::Display for ShardStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Decompressing => "decompressing",
            Self::Converting => "converting",
            Self::Uploading => "uploading",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}
