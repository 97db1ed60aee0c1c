//! Vector format conversion through the GDAL command-line tool
//!
//! Shards arrive as delimited text or GeoJSON sequences and leave as
//! GeoParquet; country deliverables go from GeoParquet to File Geodatabase.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::columnar::is_valid_parquet;
use crate::config::Encoding;

/// Trailing stderr kept in error messages
const STDERR_TAIL: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("failed to run {tool}: {source}")]
    Spawn { tool: String, source: io::Error },
    #[error("{tool} exited with {}: {stderr}", .status.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    Failed {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("conversion produced no usable output at {}", .path.display())]
    InvalidOutput { path: PathBuf },
}

/// How the input file is laid out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLayout {
    /// A format GDAL opens directly (GeoJSONSeq, GeoParquet)
    Vector,
    /// CSV with a WKT `geometry` column; only `columns` plus geometry are kept
    DelimitedText { columns: Vec<String> },
}

/// Parquet writer's handling of native geometry types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoTypes {
    Yes,
    Only,
}

impl GeoTypes {
    fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::Only => "ONLY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Parquet {
        /// `None` leaves the driver default (WKB with GeoParquet metadata)
        geo_types: Option<GeoTypes>,
        sort_by_bbox: bool,
    },
    /// OpenFileGDB directory holding one layer
    FileGeodatabase { layer: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    pub source: SourceLayout,
    pub target: Target,
}

impl ConvertOptions {
    /// Parquet writer options producing `encoding`
    pub fn for_encoding(encoding: Encoding, source: SourceLayout) -> Self {
        let target = match encoding {
            Encoding::GeoParquet2 => Target::Parquet {
                geo_types: Some(GeoTypes::Yes),
                sort_by_bbox: true,
            },
            Encoding::GeoParquet11 => Target::Parquet {
                geo_types: None,
                sort_by_bbox: false,
            },
            Encoding::Parquet => Target::Parquet {
                geo_types: Some(GeoTypes::Only),
                sort_by_bbox: false,
            },
        };
        Self { source, target }
    }

    pub fn file_geodatabase(layer: &str) -> Self {
        Self {
            source: SourceLayout::Vector,
            target: Target::FileGeodatabase {
                layer: layer.to_string(),
            },
        }
    }
}

/// Converts one vector file into another format
pub trait FormatConverter: Send + Sync {
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<(), ConversionError>;
}

/// [`FormatConverter`] shelling out to the `gdal` CLI (GDAL 3.11+)
#[derive(Debug, Clone)]
pub struct GdalConverter {
    binary: PathBuf,
}

impl GdalConverter {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments passed to `gdal` for one conversion
    pub fn command_args(input: &Path, output: &Path, options: &ConvertOptions) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        match &options.source {
            SourceLayout::Vector => {
                args.extend(["vector", "convert"].map(OsString::from));
                args.push(input.into());
                args.push(output.into());
                args.extend(["--overwrite", "--quiet"].map(OsString::from));
            }
            SourceLayout::DelimitedText { columns } => {
                args.extend(["vector", "pipeline", "read"].map(OsString::from));
                args.push(input.into());
                args.extend(
                    [
                        "--oo=AUTODETECT_TYPE=YES",
                        "--oo=GEOM_POSSIBLE_NAMES=geometry",
                        "--oo=KEEP_GEOM_COLUMNS=NO",
                        "!",
                        "reproject",
                        "--src-crs=EPSG:4326",
                        "--dst-crs=EPSG:4326",
                        "!",
                        "select",
                    ]
                    .map(OsString::from),
                );
                let mut fields = columns.clone();
                fields.push("geometry".to_string());
                args.push(fields.join(",").into());
                args.extend(["!", "write"].map(OsString::from));
                args.push(output.into());
                args.push("--overwrite".into());
            }
        }
        match &options.target {
            Target::Parquet {
                geo_types,
                sort_by_bbox,
            } => {
                args.push("--lco=COMPRESSION=ZSTD".into());
                args.push("--lco=GEOMETRY_NAME=geometry".into());
                if let Some(geo_types) = geo_types {
                    args.push(format!("--lco=USE_PARQUET_GEO_TYPES={}", geo_types.as_str()).into());
                }
                if *sort_by_bbox {
                    args.push("--lco=SORT_BY_BBOX=YES".into());
                }
            }
            Target::FileGeodatabase { layer } => {
                args.push("--output-format=OpenFileGDB".into());
                args.push(format!("--output-layer={layer}").into());
            }
        }
        args
    }
}

impl Default for GdalConverter {
    fn default() -> Self {
        Self::new("gdal")
    }
}

impl FormatConverter for GdalConverter {
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<(), ConversionError> {
        let tool = self.binary.display().to_string();
        let args = Self::command_args(input, output, options);
        log::debug!(
            "{tool} {}",
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let out = Command::new(&self.binary)
            .args(&args)
            .output()
            .map_err(|source| ConversionError::Spawn {
                tool: tool.clone(),
                source,
            })?;
        if !out.status.success() {
            return Err(ConversionError::Failed {
                tool,
                status: out.status.code(),
                stderr: stderr_tail(&out.stderr),
            });
        }

        let usable = match options.target {
            Target::Parquet { .. } => is_valid_parquet(output),
            Target::FileGeodatabase { .. } => output.is_dir(),
        };
        if !usable {
            return Err(ConversionError::InvalidOutput {
                path: output.to_path_buf(),
            });
        }
        Ok(())
    }
}

/// Last part of a tool's stderr, trimmed, on a char boundary
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
