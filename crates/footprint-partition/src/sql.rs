//! SQL generation for the DuckDB spatial engine.
//!
//! Boundary polygons are bound once per query with `SET VARIABLE` and
//! referenced through `getvariable`, so the WKT is parsed once rather than
//! per row. Every boundary test is two-stage: an inclusive bbox overlap on
//! the covering bbox column first, then `ST_Intersects` on the geometry.

use std::path::Path;

use footprint_core::config::EngineConfig;

use crate::boundary::{Boundary, Envelope};
use crate::engine::{RowFilter, RowRange};

/// Quote a string as a SQL literal
pub fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn path_literal(path: &Path) -> String {
    literal(&path.to_string_lossy())
}

/// Quote an identifier
pub fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Resource settings applied right after the connection opens
pub fn configure(engine: &EngineConfig, temp_dir: &Path) -> String {
    let mut stmts = vec![format!("SET temp_directory = {};", path_literal(temp_dir))];
    if let Some(limit) = &engine.memory_limit {
        stmts.push(format!("SET memory_limit = {};", literal(limit)));
    }
    if let Some(threads) = engine.threads {
        stmts.push(format!("SET threads = {threads};"));
    }
    // row-range splits rely on scans returning rows in file order
    stmts.push("SET preserve_insertion_order = true;".to_string());
    stmts.join("\n")
}

pub fn load_spatial() -> &'static str {
    "INSTALL spatial; LOAD spatial;"
}

pub fn load_httpfs() -> &'static str {
    "INSTALL httpfs; LOAD httpfs;"
}

/// Anonymous S3 secret for reading a public bucket through `endpoint`
pub fn s3_secret(endpoint: &str, url_style: Option<&str>) -> String {
    let mut opts = vec![
        "TYPE s3".to_string(),
        "KEY_ID ''".to_string(),
        "SECRET ''".to_string(),
        format!("ENDPOINT {}", literal(endpoint)),
    ];
    if let Some(style) = url_style {
        opts.push(format!("URL_STYLE {}", literal(style)));
    }
    format!("CREATE OR REPLACE SECRET corpus ({});", opts.join(", "))
}

/// Distinct ISO3 codes of the admin-0 dataset
pub fn country_codes(admin0: &str, iso3_column: &str) -> String {
    let col = ident(iso3_column);
    format!(
        "SELECT DISTINCT upper({col}) AS iso3 \
         FROM read_parquet({}) \
         WHERE {col} IS NOT NULL \
         ORDER BY iso3",
        literal(admin0)
    )
}

/// Union of a country's admin-0 polygons with its envelope; one parameter (ISO3).
///
/// Always yields one row; every column is NULL when the code matches nothing.
pub fn country_boundary(admin0: &str, iso3_column: &str) -> String {
    format!(
        "SELECT \
           ST_AsText(ST_Union_Agg(geometry)), \
           min(ST_XMin(geometry)), \
           min(ST_YMin(geometry)), \
           max(ST_XMax(geometry)), \
           max(ST_YMax(geometry)) \
         FROM read_parquet({}) \
         WHERE upper({}) = ?",
        literal(admin0),
        ident(iso3_column)
    )
}

/// A country's admin-1 regions; one parameter (ISO3).
pub fn subregions(admin1: &str, iso3_column: &str) -> String {
    format!(
        "SELECT \
           CAST(adm1_id AS VARCHAR), \
           CAST(adm1_src AS VARCHAR), \
           CAST(adm1_name AS VARCHAR), \
           ST_AsText(geometry), \
           ST_XMin(geometry), \
           ST_YMin(geometry), \
           ST_XMax(geometry), \
           ST_YMax(geometry) \
         FROM read_parquet({}) \
         WHERE upper({}) = ? AND geometry IS NOT NULL \
         ORDER BY adm1_id",
        literal(admin1),
        ident(iso3_column)
    )
}

/// A [`RowFilter`] compiled to SQL
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    /// Statements binding boundary variables; run before the query
    pub setup: Vec<String>,
    /// Boolean expression over a row
    pub predicate: String,
}

/// Inclusive bbox overlap of each row against `env`
pub fn bbox_overlap(env: &Envelope, bbox_column: Option<&str>) -> String {
    let (xmin, ymin, xmax, ymax) = match bbox_column {
        Some(col) => {
            let col = ident(col);
            (
                format!("{col}.xmin"),
                format!("{col}.ymin"),
                format!("{col}.xmax"),
                format!("{col}.ymax"),
            )
        }
        None => (
            "ST_XMin(geometry)".to_string(),
            "ST_YMin(geometry)".to_string(),
            "ST_XMax(geometry)".to_string(),
            "ST_YMax(geometry)".to_string(),
        ),
    };
    format!(
        "{xmax} >= {} AND {xmin} <= {} AND {ymax} >= {} AND {ymin} <= {}",
        env.xmin, env.xmax, env.ymin, env.ymax
    )
}

fn bind(var: &str, boundary: &Boundary) -> String {
    format!(
        "SET VARIABLE {var} = ST_GeomFromText({});",
        literal(&boundary.wkt)
    )
}

fn matches(var: &str, boundary: &Boundary, bbox_column: Option<&str>) -> String {
    format!(
        "({} AND ST_Intersects(geometry, getvariable('{var}')))",
        bbox_overlap(&boundary.envelope, bbox_column)
    )
}

pub fn row_filter(filter: &RowFilter<'_>, bbox_column: Option<&str>) -> CompiledFilter {
    let mut setup = Vec::new();
    let mut terms = Vec::new();
    if let Some(include) = filter.include {
        setup.push(bind("fp_include", include));
        terms.push(matches("fp_include", include, bbox_column));
    }
    for (i, exclude) in filter.exclude.iter().enumerate() {
        let var = format!("fp_exclude_{i}");
        setup.push(bind(&var, exclude));
        terms.push(format!("NOT {}", matches(&var, exclude, bbox_column)));
    }
    let predicate = if terms.is_empty() {
        "true".to_string()
    } else {
        terms.join(" AND ")
    };
    CompiledFilter { setup, predicate }
}

/// Copy rows of `source` matching `predicate` to a ZSTD parquet file
pub fn copy_filtered(source: &str, predicate: &str, output: &Path) -> String {
    format!(
        "COPY (\
           SELECT * FROM read_parquet({}, union_by_name = true) \
           WHERE {predicate}\
         ) TO {} (FORMAT PARQUET, COMPRESSION ZSTD)",
        literal(source),
        path_literal(output)
    )
}

pub fn count_rows(path: &Path) -> String {
    format!("SELECT count(*) FROM read_parquet({})", path_literal(path))
}

/// Copy a contiguous row range of `source` to a ZSTD parquet file
pub fn copy_range(source: &Path, range: RowRange, output: &Path) -> String {
    format!(
        "COPY (\
           SELECT * FROM read_parquet({}) \
           LIMIT {} OFFSET {}\
         ) TO {} (FORMAT PARQUET, COMPRESSION ZSTD)",
        path_literal(source),
        range.len,
        range.offset,
        path_literal(output)
    )
}
