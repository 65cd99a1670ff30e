use serde::{Deserialize, Serialize};

use super::CalcError;

pub const BUILTIN_COARSE: &str = "builtin:coarse";
pub const BUILTIN_FINE: &str = "builtin:fine";
pub const BUILTIN_REGISTRAR: &str = "builtin:registrar";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpaMode {
    /// Snap to the band value.
    Discrete,
    /// Interpolate linearly between band breakpoints.
    Precise,
}

impl GpaMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discrete" => Some(Self::Discrete),
            "precise" => Some(Self::Precise),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discrete => "discrete",
            Self::Precise => "precise",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaBand {
    pub min_percent: f64,
    pub value: f64,
}

/// A percentage → 1.00..5.00 conversion table. Bands are kept sorted by
/// `min_percent` descending.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaScale {
    pub id: String,
    pub name: String,
    pub bands: Vec<GpaBand>,
    /// Value for percentages below every band.
    pub fallback: f64,
    /// Percentage at which precise mode reaches `fallback`.
    pub precise_floor: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GpaValue {
    Available(f64),
    NotAvailable,
}

impl GpaValue {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Available(v) => Some(v),
            Self::NotAvailable => None,
        }
    }

    pub fn display(self, decimals: usize) -> String {
        match self {
            Self::Available(v) => format!("{:.*}", decimals, v),
            Self::NotAvailable => "N/A".to_string(),
        }
    }
}

impl GpaScale {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        mut bands: Vec<GpaBand>,
        fallback: f64,
        precise_floor: Option<f64>,
    ) -> Result<Self, CalcError> {
        if bands.is_empty() {
            return Err(CalcError::new("bad_params", "scale needs at least one band"));
        }
        if bands
            .iter()
            .any(|b| !b.min_percent.is_finite() || !b.value.is_finite())
        {
            return Err(CalcError::new("bad_params", "band values must be finite"));
        }
        if !fallback.is_finite() {
            return Err(CalcError::new("bad_params", "fallback must be finite"));
        }
        bands.sort_by(|a, b| b.min_percent.total_cmp(&a.min_percent));
        if bands.windows(2).any(|w| w[0].min_percent == w[1].min_percent) {
            return Err(CalcError::new(
                "bad_params",
                "band thresholds must be distinct",
            ));
        }
        if let Some(floor) = precise_floor {
            let lowest = bands[bands.len() - 1].min_percent;
            if !floor.is_finite() || floor >= lowest {
                return Err(CalcError::new(
                    "bad_params",
                    "preciseFloor must be below the lowest band",
                ));
            }
        }
        Ok(Self {
            id: id.into(),
            name: name.into(),
            bands,
            fallback,
            precise_floor,
        })
    }

    pub fn builtin(id: &str) -> Option<Self> {
        Self::builtins().into_iter().find(|s| s.id == id)
    }

    pub fn builtins() -> Vec<Self> {
        vec![coarse_scale(), fine_scale(), registrar_scale()]
    }

    pub fn is_builtin_id(id: &str) -> bool {
        id.starts_with("builtin:")
    }

    pub fn convert(&self, percentage: Option<f64>, mode: GpaMode) -> GpaValue {
        match mode {
            GpaMode::Discrete => convert_percentage_to_gpa(percentage, self),
            GpaMode::Precise => convert_percentage_to_precise_gpa(percentage, self),
        }
    }

    fn discrete(&self, p: f64) -> f64 {
        self.bands
            .iter()
            .find(|b| p >= b.min_percent)
            .map(|b| b.value)
            .unwrap_or(self.fallback)
    }

    fn precise(&self, p: f64) -> f64 {
        let top = self.bands[0];
        if p >= top.min_percent {
            return top.value;
        }
        for w in self.bands.windows(2) {
            let (upper, lower) = (w[0], w[1]);
            if p >= lower.min_percent {
                return interpolate(upper, lower, p);
            }
        }
        let lowest = self.bands[self.bands.len() - 1];
        match self.precise_floor {
            Some(floor) if p >= floor => interpolate(
                lowest,
                GpaBand {
                    min_percent: floor,
                    value: self.fallback,
                },
                p,
            ),
            _ => self.fallback,
        }
    }
}

fn interpolate(upper: GpaBand, lower: GpaBand, p: f64) -> f64 {
    let span = upper.min_percent - lower.min_percent;
    upper.value + ((upper.min_percent - p) / span) * (lower.value - upper.value)
}

/// Band value for `percentage`; N/A for missing or non-finite input.
pub fn convert_percentage_to_gpa(percentage: Option<f64>, scale: &GpaScale) -> GpaValue {
    match percentage.filter(|p| p.is_finite()) {
        Some(p) => GpaValue::Available(scale.discrete(p)),
        None => GpaValue::NotAvailable,
    }
}

pub fn convert_percentage_to_precise_gpa(percentage: Option<f64>, scale: &GpaScale) -> GpaValue {
    match percentage.filter(|p| p.is_finite()) {
        Some(p) => GpaValue::Available(scale.precise(p)),
        None => GpaValue::NotAvailable,
    }
}

fn bands(rows: &[(f64, f64)]) -> Vec<GpaBand> {
    rows.iter()
        .map(|&(min_percent, value)| GpaBand { min_percent, value })
        .collect()
}

fn coarse_scale() -> GpaScale {
    GpaScale {
        id: BUILTIN_COARSE.to_string(),
        name: "Coarse 5-band".to_string(),
        bands: bands(&[(90.0, 1.0), (80.0, 2.0), (70.0, 3.0), (60.0, 4.0)]),
        fallback: 5.0,
        precise_floor: None,
    }
}

fn fine_scale() -> GpaScale {
    GpaScale {
        id: BUILTIN_FINE.to_string(),
        name: "Fine quarter-step".to_string(),
        bands: bands(&[
            (97.5, 1.0),
            (94.5, 1.25),
            (91.5, 1.5),
            (88.5, 1.75),
            (85.5, 2.0),
            (82.5, 2.25),
            (79.5, 2.5),
            (76.5, 2.75),
            (74.5, 3.0),
            (69.5, 3.5),
            (64.5, 4.0),
            (59.5, 4.5),
        ]),
        fallback: 5.0,
        precise_floor: Some(50.0),
    }
}

fn registrar_scale() -> GpaScale {
    GpaScale {
        id: BUILTIN_REGISTRAR.to_string(),
        name: "Registrar reference".to_string(),
        bands: bands(&[
            (97.5, 1.0),
            (94.5, 1.25),
            (91.5, 1.5),
            (88.5, 1.75),
            (85.5, 2.0),
            (82.5, 2.25),
            (79.5, 2.5),
            (76.5, 2.75),
            (74.5, 3.0),
        ]),
        fallback: 5.0,
        precise_floor: None,
    }
}
