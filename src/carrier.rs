use std::collections::HashMap;

/// Membership flags of one carrier in one year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CarrierFlags {
    pub major: bool,
    pub legacy: bool,
    pub lcc: bool,
    pub fringe: bool,
}

/// Business-model group used as a nest key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CarrierType {
    Legacy,
    Lcc,
    Other,
}

impl CarrierType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarrierType::Legacy => "legacy",
            CarrierType::Lcc => "lcc",
            CarrierType::Other => "other",
        }
    }
}

impl CarrierFlags {
    pub fn carrier_type(&self) -> CarrierType {
        if self.legacy {
            CarrierType::Legacy
        } else if self.lcc {
            CarrierType::Lcc
        } else {
            CarrierType::Other
        }
    }
}

/// Years (inclusive) in which a carrier counts as a major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MajorSpan {
    pub carrier: &'static str,
    pub first_year: i64,
    pub last_year: i64,
}

const OPEN: i64 = i64::MAX;

/// Major carriers by year. Spans end at the year of the last quarter the
/// carrier ticketed under its own code before a merger.
pub const MAJOR_CARRIERS: &[MajorSpan] = &[
    MajorSpan { carrier: "AA", first_year: 1990, last_year: OPEN },
    MajorSpan { carrier: "AS", first_year: 1990, last_year: OPEN },
    MajorSpan { carrier: "B6", first_year: 2003, last_year: OPEN },
    MajorSpan { carrier: "CO", first_year: 1990, last_year: 2011 },
    MajorSpan { carrier: "DL", first_year: 1990, last_year: OPEN },
    MajorSpan { carrier: "F9", first_year: 2006, last_year: OPEN },
    MajorSpan { carrier: "FL", first_year: 2004, last_year: 2014 },
    MajorSpan { carrier: "G4", first_year: 2015, last_year: OPEN },
    MajorSpan { carrier: "HA", first_year: 2008, last_year: OPEN },
    MajorSpan { carrier: "NK", first_year: 2011, last_year: OPEN },
    MajorSpan { carrier: "NW", first_year: 1990, last_year: 2009 },
    MajorSpan { carrier: "UA", first_year: 1990, last_year: OPEN },
    MajorSpan { carrier: "US", first_year: 1990, last_year: 2015 },
    MajorSpan { carrier: "VX", first_year: 2011, last_year: 2017 },
    MajorSpan { carrier: "WN", first_year: 1990, last_year: OPEN },
];

pub const LEGACY_CARRIERS: &[&str] = &["AA", "CO", "DL", "NW", "UA", "US"];

pub const LCC_CARRIERS: &[&str] = &["B6", "F9", "FL", "G4", "NK", "SY", "VX", "WN"];

/// Declarative (year, carrier) -> flags lookup.
///
/// Unknown carriers, and known carriers outside their major span, are
/// simply not major; legacy and low-cost membership does not vary by year.
#[derive(Debug, Clone)]
pub struct CarrierClassifier {
    majors: HashMap<String, Vec<(i64, i64)>>,
    legacy: Vec<String>,
    lcc: Vec<String>,
}

impl Default for CarrierClassifier {
    fn default() -> Self {
        Self::from_tables(MAJOR_CARRIERS, LEGACY_CARRIERS, LCC_CARRIERS)
    }
}

impl CarrierClassifier {
    pub fn from_tables(majors: &[MajorSpan], legacy: &[&str], lcc: &[&str]) -> Self {
        let mut by_carrier: HashMap<String, Vec<(i64, i64)>> = HashMap::new();
        for span in majors {
            by_carrier
                .entry(span.carrier.to_string())
                .or_default()
                .push((span.first_year, span.last_year));
        }
        Self {
            majors: by_carrier,
            legacy: legacy.iter().map(|c| c.to_string()).collect(),
            lcc: lcc.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn is_major(&self, year: i64, carrier: &str) -> bool {
        self.majors
            .get(carrier)
            .map(|spans| spans.iter().any(|&(lo, hi)| lo <= year && year <= hi))
            .unwrap_or(false)
    }

    pub fn classify(&self, year: i64, carrier: &str) -> CarrierFlags {
        let major = self.is_major(year, carrier);
        CarrierFlags {
            major,
            legacy: self.legacy.iter().any(|c| c == carrier),
            lcc: self.lcc.iter().any(|c| c == carrier),
            fringe: !major,
        }
    }
}
