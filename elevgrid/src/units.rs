//! Linear units of measure.
//!
//! Coverage descriptors carry a `uom` code describing the unit the stored
//! heights are expressed in. Decoding multiplies by the unit's meter factor;
//! an unknown or missing code means meters.

use std::collections::HashMap;

/// A linear unit with a fixed conversion factor to meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LengthUnit {
    Meter,
    Kilometer,
    Centimeter,
    Millimeter,
    /// International foot (0.3048 m).
    Foot,
    /// US survey foot (1200/3937 m).
    UsSurveyFoot,
    Yard,
    StatuteMile,
    NauticalMile,
    Fathom,
}

impl LengthUnit {
    /// Every supported unit.
    pub const ALL: [LengthUnit; 10] = [
        LengthUnit::Meter,
        LengthUnit::Kilometer,
        LengthUnit::Centimeter,
        LengthUnit::Millimeter,
        LengthUnit::Foot,
        LengthUnit::UsSurveyFoot,
        LengthUnit::Yard,
        LengthUnit::StatuteMile,
        LengthUnit::NauticalMile,
        LengthUnit::Fathom,
    ];

    /// Multiplier converting a value in this unit to meters.
    pub fn to_meters(&self) -> f64 {
        match self {
            LengthUnit::Meter => 1.0,
            LengthUnit::Kilometer => 1000.0,
            LengthUnit::Centimeter => 0.01,
            LengthUnit::Millimeter => 0.001,
            LengthUnit::Foot => 0.3048,
            LengthUnit::UsSurveyFoot => 1200.0 / 3937.0,
            LengthUnit::Yard => 0.9144,
            LengthUnit::StatuteMile => 1609.344,
            LengthUnit::NauticalMile => 1852.0,
            LengthUnit::Fathom => 1.8288,
        }
    }

    /// The UCUM code written to `uom` columns.
    pub fn code(&self) -> &'static str {
        match self {
            LengthUnit::Meter => "m",
            LengthUnit::Kilometer => "km",
            LengthUnit::Centimeter => "cm",
            LengthUnit::Millimeter => "mm",
            LengthUnit::Foot => "[ft_i]",
            LengthUnit::UsSurveyFoot => "[ft_us]",
            LengthUnit::Yard => "[yd_i]",
            LengthUnit::StatuteMile => "[mi_i]",
            LengthUnit::NauticalMile => "[nmi_i]",
            LengthUnit::Fathom => "[fth_i]",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            LengthUnit::Meter => &["meter", "meters", "metre", "metres"],
            LengthUnit::Kilometer => &["kilometer", "kilometre"],
            LengthUnit::Centimeter => &["centimeter", "centimetre"],
            LengthUnit::Millimeter => &["millimeter", "millimetre"],
            LengthUnit::Foot => &["ft", "foot", "feet"],
            LengthUnit::UsSurveyFoot => &["ftus", "us survey foot", "us-ft"],
            LengthUnit::Yard => &["yd", "yard", "yards"],
            LengthUnit::StatuteMile => &["mi", "mile", "miles"],
            LengthUnit::NauticalMile => &["nmi", "nm", "nautical mile"],
            LengthUnit::Fathom => &["fathom", "fathoms"],
        }
    }

    /// Look up a unit from its UCUM code or a common alias (case-insensitive).
    ///
    /// # Examples
    ///
    /// ```
    /// use elevgrid::units::LengthUnit;
    ///
    /// assert_eq!(LengthUnit::from_code("m"), Some(LengthUnit::Meter));
    /// assert_eq!(LengthUnit::from_code("[ft_i]"), Some(LengthUnit::Foot));
    /// assert_eq!(LengthUnit::from_code("Feet"), Some(LengthUnit::Foot));
    /// assert_eq!(LengthUnit::from_code("furlong"), None);
    /// ```
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL.into_iter().find(|unit| {
            unit.code().eq_ignore_ascii_case(code)
                || unit.aliases().iter().any(|a| a.eq_ignore_ascii_case(code))
        })
    }
}

/// Lookup table from unit codes to meter factors.
///
/// Built once and handed to the code that needs it, so custom units can be
/// registered without touching global state.
#[derive(Debug, Clone)]
pub struct UnitsOfMeasure {
    factors: HashMap<String, f64>,
}

impl Default for UnitsOfMeasure {
    fn default() -> Self {
        let mut factors = HashMap::new();
        for unit in LengthUnit::ALL {
            factors.insert(unit.code().to_ascii_lowercase(), unit.to_meters());
            for alias in unit.aliases() {
                factors.insert(alias.to_ascii_lowercase(), unit.to_meters());
            }
        }
        Self { factors }
    }
}

impl UnitsOfMeasure {
    /// Register (or replace) a unit code.
    pub fn register(&mut self, code: &str, to_meters: f64) {
        self.factors
            .insert(code.trim().to_ascii_lowercase(), to_meters);
    }

    /// Meter factor for `code`, or `None` if the code is unknown.
    pub fn to_meters(&self, code: &str) -> Option<f64> {
        self.factors.get(&code.trim().to_ascii_lowercase()).copied()
    }

    /// Meter factor for an optional code; missing or unknown codes are meters.
    pub fn to_meters_or_default(&self, code: Option<&str>) -> f64 {
        code.and_then(|c| self.to_meters(c)).unwrap_or(1.0)
    }
}
