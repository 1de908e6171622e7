/// Column-name constants and reserved values for the population dataset.
/// Single source of truth - exported to Python via PyO3.

// ── Dataset columns ─────────────────────────────────────────────────────────
pub mod population {
    pub const COMBINATION: &str = "Combination";
    pub const YEAR: &str = "Year";
    pub const GENDER: &str = "Gender";
    pub const AGE_GROUP: &str = "AgeGroup";
    pub const COUNT: &str = "Count";

    pub const ALL: [&str; 5] = [COMBINATION, YEAR, GENDER, AGE_GROUP, COUNT];
}

// ── Gender values ───────────────────────────────────────────────────────────
pub mod gender {
    pub const MALE: &str = "M";
    pub const FEMALE: &str = "F";
}

// ── Scenario keys ───────────────────────────────────────────────────────────
pub mod scenario {
    /// Prefix shared by every slider-derived key.
    pub const SLIDER_PREFIX: &str = "asmr";
    pub const FERTILITY_INFIX: &str = "asfr";
    /// Dropdown value meaning "use the sliders".
    pub const NO_SELECTION: &str = "None";
}

// ── Derived view columns ────────────────────────────────────────────────────
pub mod projection {
    pub const YEAR: &str = "Year";
    pub const POPULATION: &str = "Population";
}

pub mod composition {
    pub const GENDER: &str = "Gender";
    pub const AGE_GROUP: &str = "AgeGroup";
    pub const COUNT: &str = "Count";
    pub const LABEL_POSITION: &str = "label_position";
}

pub mod sensitivity {
    pub const MORTALITY: &str = "mortality";
    pub const FERTILITY: &str = "fertility";
    pub const POPULATION: &str = "population";
    pub const IMPACT: &str = "impact";
    pub const VOLATILITY: &str = "volatility";
    pub const POLICY_STRENGTH: &str = "policy_strength";
    pub const ERROR: &str = "error";
}

pub mod comparison {
    pub const YEAR: &str = "Year";
    pub const FIRST: &str = "first";
    pub const SECOND: &str = "second";
}
