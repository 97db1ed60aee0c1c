//! Deliverable names
//!
//! Names are lowercase ASCII with every run of other characters collapsed
//! to `_`; they double as file stems and geodatabase layer names.

use std::collections::HashSet;

use crate::boundary::AdminSubregion;

pub fn normalize_token(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// `{iso3}_buildings`
pub fn country_stem(iso3: &str) -> String {
    format!("{}_buildings", normalize_token(iso3))
}

/// Rows of a split country that fall in no subregion
pub fn unassigned_stem(iso3: &str) -> String {
    format!("{}_unassigned_buildings", normalize_token(iso3))
}

/// `{base}_part{n}`, `n` counting from 1
pub fn part_stem(base: &str, n: usize) -> String {
    format!("{base}_part{n}")
}

/// Hands out subregion names unique within one country
#[derive(Debug)]
pub struct StemRegistry {
    iso3: String,
    used: HashSet<String>,
}

impl StemRegistry {
    pub fn new(iso3: &str) -> Self {
        let used = [country_stem(iso3), unassigned_stem(iso3)].into_iter().collect();
        Self {
            iso3: iso3.to_string(),
            used,
        }
    }

    /// `{iso3}_{source}_{name}_buildings`, falling back to the region id
    /// when source or name is missing, and appending it on collision.
    pub fn subregion_stem(&mut self, region: &AdminSubregion) -> String {
        let labelled = match (region.source_name.as_deref(), region.display_name.as_deref()) {
            (Some(src), Some(name)) => {
                let label = normalize_token(&format!("{src}_{name}"));
                // a name with nothing ASCII in it normalizes to the bare source
                (!label.is_empty() && !normalize_token(name).is_empty()).then_some(label)
            }
            _ => None,
        };
        let id = normalize_token(&region.region_id);
        let label = labelled.unwrap_or_else(|| id.clone());

        let mut stem = self.compose(&label);
        if self.used.contains(&stem) {
            stem = self.compose(&format!("{label}_{id}"));
        }
        let mut n = 2;
        let base = stem.clone();
        while self.used.contains(&stem) {
            stem = format!("{}_{n}", base);
            n += 1;
        }
        self.used.insert(stem.clone());
        stem
    }

    fn compose(&self, label: &str) -> String {
        normalize_token(&format!("{}_{label}_buildings", self.iso3))
    }
}
