//! Absorption-feature bandpass definitions.
//!
//! Each feature carries a blue continuum pass, the feature pass and a red
//! continuum pass. The built-in sets cover the near-infrared indices fitted by
//! default and the three optical indices of the auxiliary dataset.

use crate::domain::{FitError, FitResult, ParameterKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bandpass {
    pub low: f64,
    pub high: f64,
}

impl Bandpass {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn center(&self) -> f64 {
        0.5 * (self.low + self.high)
    }

    /// Inclusive on both ends.
    pub fn contains(&self, wavelength: f64) -> bool {
        wavelength >= self.low && wavelength <= self.high
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDefinition {
    name: String,
    blue: Bandpass,
    feature: Bandpass,
    red: Bandpass,
    continuum_order: usize,
}

impl FeatureDefinition {
    pub fn new(
        name: impl Into<String>,
        blue: Bandpass,
        feature: Bandpass,
        red: Bandpass,
        continuum_order: usize,
    ) -> FitResult<Self> {
        let name = name.into();
        let ordered = blue.low < blue.high
            && blue.high <= feature.low
            && feature.low < feature.high
            && feature.high <= red.low
            && red.low < red.high;
        let finite = [
            blue.low,
            blue.high,
            feature.low,
            feature.high,
            red.low,
            red.high,
        ]
        .iter()
        .all(|value| value.is_finite());

        if !ordered || !finite {
            return Err(FitError::input_validation(
                "INPUT.FEATURE_BANDPASS",
                format!(
                    "feature '{}' bandpasses must satisfy blue_low < blue_high <= feature_low < feature_high <= red_low < red_high, got blue=({}, {}) feature=({}, {}) red=({}, {})",
                    name,
                    blue.low,
                    blue.high,
                    feature.low,
                    feature.high,
                    red.low,
                    red.high
                ),
            ));
        }
        if continuum_order == 0 {
            return Err(FitError::input_validation(
                "INPUT.FEATURE_BANDPASS",
                format!("feature '{}' continuum order must be at least 1", name),
            ));
        }

        Ok(Self {
            name,
            blue,
            feature,
            red,
            continuum_order,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn blue(&self) -> Bandpass {
        self.blue
    }

    pub fn feature(&self) -> Bandpass {
        self.feature
    }

    pub fn red(&self) -> Bandpass {
        self.red
    }

    pub fn continuum_order(&self) -> usize {
        self.continuum_order
    }

    /// Full extent of the feature, blue continuum through red continuum.
    pub fn window(&self) -> Bandpass {
        Bandpass::new(self.blue.low, self.red.high)
    }

    /// The abundance parameter a feature is mainly sensitive to, if any.
    pub fn constraining_parameter(&self) -> Option<ParameterKind> {
        match self.name.as_str() {
            "NaI" => Some(ParameterKind::Na),
            "CaI" => Some(ParameterKind::Ca),
            "FeH" => Some(ParameterKind::Fe),
            "KI_a" | "KI_b" | "KI_1.25" => Some(ParameterKind::K),
            _ => None,
        }
    }
}

type BandpassRow = (&'static str, [f64; 6]);

const NEAR_INFRARED_BANDPASSES: [BandpassRow; 10] = [
    ("FeH", [9855.0, 9880.0, 9905.0, 9935.0, 9940.0, 9970.0]),
    ("CaI", [10300.0, 10320.0, 10337.0, 10360.0, 10365.0, 10390.0]),
    ("NaI", [11340.0, 11370.0, 11372.0, 11415.0, 11417.0, 11447.0]),
    ("KI_a", [11667.0, 11680.0, 11680.0, 11705.0, 11710.0, 11750.0]),
    ("KI_b", [11710.0, 11750.0, 11765.0, 11793.0, 11793.0, 11810.0]),
    ("KI_1.25", [12460.0, 12495.0, 12505.0, 12545.0, 12555.0, 12590.0]),
    ("PaB", [12780.0, 12800.0, 12810.0, 12840.0, 12860.0, 12870.0]),
    ("NaI127", [12648.0, 12660.0, 12670.0, 12690.0, 12700.0, 12720.0]),
    ("NaI123", [12240.0, 12260.0, 12309.0, 12333.0, 12360.0, 12390.0]),
    ("CaII119", [11905.0, 11935.0, 11935.0, 11965.0, 12005.0, 12025.0]),
];

// The tabulated MgB feature limits (5160.125, 5192.625) overlap its continuum
// passes, so the feature pass is clipped to 5161.375..5191.375.
const AUXILIARY_BANDPASSES: [BandpassRow; 3] = [
    (
        "HBeta",
        [4827.875, 4847.875, 4847.875, 4876.625, 4876.625, 4891.625],
    ),
    (
        "Fe5015",
        [4946.500, 4977.750, 4977.750, 5054.000, 5054.000, 5065.250],
    ),
    (
        "MgB",
        [5142.625, 5161.375, 5161.375, 5191.375, 5191.375, 5206.375],
    ),
];

/// Built-in rows are checked by `built_in_rows_pass_validation`.
fn build_set(rows: &[BandpassRow]) -> Vec<FeatureDefinition> {
    rows.iter()
        .map(|(name, passes)| FeatureDefinition {
            name: name.to_string(),
            blue: Bandpass::new(passes[0], passes[1]),
            feature: Bandpass::new(passes[2], passes[3]),
            red: Bandpass::new(passes[4], passes[5]),
            continuum_order: 1,
        })
        .collect()
}

pub fn near_infrared_features() -> Vec<FeatureDefinition> {
    build_set(&NEAR_INFRARED_BANDPASSES)
}

pub fn auxiliary_features() -> Vec<FeatureDefinition> {
    build_set(&AUXILIARY_BANDPASSES)
}

pub fn default_near_infrared_include() -> Vec<String> {
    ["FeH", "NaI", "CaI", "KI_a", "KI_b", "KI_1.25", "NaI127", "PaB"]
        .iter()
        .map(|name| name.to_string())
        .collect()
}

pub fn default_auxiliary_include() -> Vec<String> {
    AUXILIARY_BANDPASSES
        .iter()
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Pick named features out of `available`, keeping the requested order.
pub fn select_features(
    available: &[FeatureDefinition],
    names: &[String],
) -> FitResult<Vec<FeatureDefinition>> {
    names
        .iter()
        .map(|name| {
            available
                .iter()
                .find(|feature| feature.name() == name)
                .cloned()
                .ok_or_else(|| {
                    FitError::input_validation(
                        "INPUT.FEATURE_NAME",
                        format!(
                            "unknown feature '{}'; available: {}",
                            name,
                            available
                                .iter()
                                .map(|feature| feature.name())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                    )
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        AUXILIARY_BANDPASSES, Bandpass, FeatureDefinition, NEAR_INFRARED_BANDPASSES,
        auxiliary_features, default_near_infrared_include, near_infrared_features,
        select_features,
    };
    use crate::domain::{FitErrorCategory, ParameterKind};

    #[test]
    fn built_in_rows_pass_validation() {
        for (name, passes) in NEAR_INFRARED_BANDPASSES.iter().chain(&AUXILIARY_BANDPASSES) {
            FeatureDefinition::new(
                *name,
                Bandpass::new(passes[0], passes[1]),
                Bandpass::new(passes[2], passes[3]),
                Bandpass::new(passes[4], passes[5]),
                1,
            )
            .unwrap_or_else(|error| panic!("{name}: {error}"));
        }
        assert_eq!(near_infrared_features().len(), NEAR_INFRARED_BANDPASSES.len());
        assert_eq!(auxiliary_features().len(), AUXILIARY_BANDPASSES.len());
    }

    #[test]
    fn mgb_keeps_its_continuum_passes_and_clips_the_feature() {
        let mgb = auxiliary_features()
            .into_iter()
            .find(|feature| feature.name() == "MgB")
            .expect("MgB");
        assert_eq!(mgb.blue(), Bandpass::new(5142.625, 5161.375));
        assert_eq!(mgb.feature(), Bandpass::new(5161.375, 5191.375));
        assert_eq!(mgb.red(), Bandpass::new(5191.375, 5206.375));
    }

    #[test]
    fn overlapping_bandpasses_are_rejected() {
        let error = FeatureDefinition::new(
            "MgB",
            Bandpass::new(5142.625, 5161.375),
            Bandpass::new(5160.125, 5192.625),
            Bandpass::new(5191.375, 5206.375),
            1,
        )
        .expect_err("blue pass overlaps the feature");
        assert_eq!(error.category(), FitErrorCategory::InputValidationError);
        assert_eq!(error.placeholder(), "INPUT.FEATURE_BANDPASS");
    }

    #[test]
    fn zero_continuum_order_is_rejected() {
        let error = FeatureDefinition::new(
            "flat",
            Bandpass::new(1.0, 2.0),
            Bandpass::new(2.0, 3.0),
            Bandpass::new(3.0, 4.0),
            0,
        )
        .expect_err("order 0");
        assert_eq!(error.placeholder(), "INPUT.FEATURE_BANDPASS");
    }

    #[test]
    fn selection_keeps_requested_order_and_rejects_unknown_names() {
        let available = near_infrared_features();
        let picked = select_features(&available, &["NaI".to_string(), "FeH".to_string()])
            .expect("known names");
        assert_eq!(picked[0].name(), "NaI");
        assert_eq!(picked[1].name(), "FeH");
        assert_eq!(picked[0].window(), Bandpass::new(11340.0, 11447.0));

        let error = select_features(&available, &["AlI".to_string()]).expect_err("unknown");
        assert_eq!(error.placeholder(), "INPUT.FEATURE_NAME");
    }

    #[test]
    fn default_include_list_is_a_subset_of_the_near_infrared_set() {
        let available = near_infrared_features();
        let picked =
            select_features(&available, &default_near_infrared_include()).expect("defaults");
        assert_eq!(picked.len(), 8);
    }

    #[test]
    fn constraining_parameters_cover_abundance_sensitive_features() {
        let available = near_infrared_features();
        let lookup = |name: &str| {
            available
                .iter()
                .find(|feature| feature.name() == name)
                .and_then(|feature| feature.constraining_parameter())
        };
        assert_eq!(lookup("NaI"), Some(ParameterKind::Na));
        assert_eq!(lookup("KI_1.25"), Some(ParameterKind::K));
        assert_eq!(lookup("FeH"), Some(ParameterKind::Fe));
        assert_eq!(lookup("PaB"), None);
    }

    #[test]
    fn bandpass_centre_and_membership_are_inclusive() {
        let pass = Bandpass::new(10.0, 20.0);
        assert_eq!(pass.center(), 15.0);
        assert!(pass.contains(10.0));
        assert!(pass.contains(20.0));
        assert!(!pass.contains(20.5));
    }
}
