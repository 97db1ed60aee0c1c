//! Boundary polygons from the admin reference datasets

/// Axis-aligned bounding box in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Envelope {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Inclusive overlap: boxes sharing only an edge or corner overlap
    pub fn overlaps(&self, other: &Envelope) -> bool {
        self.xmax >= other.xmin
            && self.xmin <= other.xmax
            && self.ymax >= other.ymin
            && self.ymin <= other.ymax
    }
}

/// A polygon and its envelope
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub envelope: Envelope,
    pub wkt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountryBoundary {
    pub iso3: String,
    pub boundary: Boundary,
}

/// An admin-1 region of a country
#[derive(Debug, Clone, PartialEq)]
pub struct AdminSubregion {
    pub region_id: String,
    /// Boundary source the region comes from, e.g. `ocha`
    pub source_name: Option<String>,
    pub display_name: Option<String>,
    pub boundary: Boundary,
}
