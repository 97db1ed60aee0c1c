//! Columnar file → File Geodatabase → zip archive

use std::fs;
use std::path::{Path, PathBuf};

use footprint_core::{ArchivePackager, ConvertOptions, FormatConverter};

use crate::PartitionError;

/// A packaged archive ready for publication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverableArtifact {
    pub local_path: PathBuf,
    pub byte_size: u64,
    /// Archive stem, also the geodatabase layer name
    pub logical_name: String,
}

impl DeliverableArtifact {
    pub fn file_name(&self) -> String {
        format!("{}.gdb.zip", self.logical_name)
    }
}

pub struct Packager<'a> {
    converter: &'a dyn FormatConverter,
    archiver: &'a dyn ArchivePackager,
}

impl<'a> Packager<'a> {
    pub fn new(converter: &'a dyn FormatConverter, archiver: &'a dyn ArchivePackager) -> Self {
        Self {
            converter,
            archiver,
        }
    }

    /// Package `columnar` as `{out_dir}/{name}.gdb.zip`.
    ///
    /// The intermediate `.gdb` directory is removed whether or not
    /// archiving succeeds.
    pub fn package(
        &self,
        columnar: &Path,
        name: &str,
        out_dir: &Path,
    ) -> Result<DeliverableArtifact, PartitionError> {
        let gdb = out_dir.join(format!("{name}.gdb"));
        if gdb.exists() {
            fs::remove_dir_all(&gdb)?;
        }

        let converted = self
            .converter
            .convert(columnar, &gdb, &ConvertOptions::file_geodatabase(name));
        let archive = out_dir.join(format!("{name}.gdb.zip"));
        let packed = converted
            .map_err(PartitionError::from)
            .and_then(|()| Ok(self.archiver.pack_dir(&gdb, &archive)?));

        if gdb.exists() {
            if let Err(e) = fs::remove_dir_all(&gdb) {
                log::warn!("Failed to remove {}: {e}", gdb.display());
            }
        }

        let byte_size = packed?;
        log::debug!("Packaged {name}: {byte_size} bytes");
        Ok(DeliverableArtifact {
            local_path: archive,
            byte_size,
            logical_name: name.to_string(),
        })
    }
}
