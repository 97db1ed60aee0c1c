//! [`SpatialEngine`] over an in-process DuckDB with the spatial extension

use std::fs;
use std::path::Path;

use duckdb::{Connection, params};
use footprint_core::RunConfig;
use footprint_core::config::ReferenceConfig;

use crate::boundary::{AdminSubregion, Boundary, CountryBoundary, Envelope};
use crate::engine::{EngineError, RowFilter, RowRange, SpatialEngine};
use crate::sql;

pub struct DuckDbEngine {
    conn: Connection,
    reference: ReferenceConfig,
    bbox_column: Option<String>,
}

fn is_remote(location: &str) -> bool {
    location.contains("://") && !location.starts_with("file://")
}

impl DuckDbEngine {
    /// Open an in-memory database configured from `config.engine`.
    ///
    /// httpfs is loaded when the corpus or reference data live behind a URL.
    pub fn open(config: &RunConfig) -> Result<Self, EngineError> {
        let engine = &config.engine;
        let conn = Connection::open_in_memory()
            .map_err(|e| EngineError::query("opening DuckDB", e))?;

        let temp_dir = config.scratch_dir().join("duckdb");
        fs::create_dir_all(&temp_dir)?;
        conn.execute_batch(&sql::configure(engine, &temp_dir))
            .map_err(|e| EngineError::query("configuring DuckDB", e))?;

        if engine.spatial {
            log::debug!("Loading DuckDB spatial extension");
            conn.execute_batch(sql::load_spatial())
                .map_err(|e| EngineError::query("loading spatial extension", e))?;
        }

        let remote = engine.s3_endpoint.is_some()
            || is_remote(&config.store.query_root())
            || is_remote(&config.reference.admin0)
            || is_remote(&config.reference.admin1);
        if remote {
            log::debug!("Loading DuckDB httpfs extension");
            conn.execute_batch(sql::load_httpfs())
                .map_err(|e| EngineError::query("loading httpfs extension", e))?;
        }
        if let Some(endpoint) = &engine.s3_endpoint {
            conn.execute_batch(&sql::s3_secret(endpoint, engine.s3_url_style.as_deref()))
                .map_err(|e| EngineError::query("creating S3 secret", e))?;
        }

        Ok(Self {
            conn,
            reference: config.reference.clone(),
            bbox_column: engine.bbox_column.clone(),
        })
    }

    fn execute(&self, context: &str, stmt: &str) -> Result<(), EngineError> {
        log::trace!("{context}: {stmt}");
        self.conn
            .execute_batch(stmt)
            .map_err(|e| EngineError::query(context, e))
    }
}

impl SpatialEngine for DuckDbEngine {
    fn countries(&self) -> Result<Vec<String>, EngineError> {
        let context = "listing countries";
        let query = sql::country_codes(&self.reference.admin0, &self.reference.iso3_column);
        let mut stmt = self
            .conn
            .prepare(&query)
            .map_err(|e| EngineError::query(context, e))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| EngineError::query(context, e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| EngineError::query(context, e))
    }

    fn country_boundary(&self, iso3: &str) -> Result<Option<CountryBoundary>, EngineError> {
        let context = format!("reading {iso3} boundary");
        let query = sql::country_boundary(&self.reference.admin0, &self.reference.iso3_column);
        let row = self
            .conn
            .query_row(&query, params![iso3.to_ascii_uppercase()], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                ))
            })
            .map_err(|e| EngineError::query(context, e))?;

        let (Some(wkt), Some(xmin), Some(ymin), Some(xmax), Some(ymax)) = row else {
            return Ok(None);
        };
        Ok(Some(CountryBoundary {
            iso3: iso3.to_ascii_uppercase(),
            boundary: Boundary {
                envelope: Envelope::new(xmin, ymin, xmax, ymax),
                wkt,
            },
        }))
    }

    fn subregions(&self, iso3: &str) -> Result<Vec<AdminSubregion>, EngineError> {
        let context = format!("reading {iso3} subregions");
        let query = sql::subregions(&self.reference.admin1, &self.reference.iso3_column);
        let mut stmt = self
            .conn
            .prepare(&query)
            .map_err(|e| EngineError::query(context.clone(), e))?;
        let rows = stmt
            .query_map(params![iso3.to_ascii_uppercase()], |row| {
                Ok(AdminSubregion {
                    region_id: row.get(0)?,
                    source_name: row.get(1)?,
                    display_name: row.get(2)?,
                    boundary: Boundary {
                        wkt: row.get(3)?,
                        envelope: Envelope::new(row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?),
                    },
                })
            })
            .map_err(|e| EngineError::query(context.clone(), e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| EngineError::query(context, e))
    }

    fn extract(
        &self,
        source: &str,
        filter: &RowFilter<'_>,
        output: &Path,
    ) -> Result<u64, EngineError> {
        let compiled = sql::row_filter(filter, self.bbox_column.as_deref());
        for stmt in &compiled.setup {
            self.execute("binding boundary", stmt)?;
        }
        self.execute(
            &format!("extracting into {}", output.display()),
            &sql::copy_filtered(source, &compiled.predicate, output),
        )?;
        self.count_rows(output)
    }

    fn count_rows(&self, path: &Path) -> Result<u64, EngineError> {
        let count: i64 = self
            .conn
            .query_row(&sql::count_rows(path), [], |row| row.get(0))
            .map_err(|e| EngineError::query(format!("counting rows of {}", path.display()), e))?;
        Ok(count.max(0) as u64)
    }

    fn copy_rows(&self, source: &Path, range: RowRange, output: &Path) -> Result<u64, EngineError> {
        self.execute(
            &format!("copying rows into {}", output.display()),
            &sql::copy_range(source, range, output),
        )?;
        self.count_rows(output)
    }
}
