use serde::Serialize;
use sspfit_core::common::FeatureDefinition;
use sspfit_core::domain::{ParameterKind, WavelengthRangePolicy};
use sspfit_core::sampling::ParameterSummary;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(super) struct SummaryRow {
    pub(super) name: String,
    pub(super) median: f64,
    pub(super) upper_error: f64,
    pub(super) lower_error: f64,
}

impl From<&ParameterSummary> for SummaryRow {
    fn from(summary: &ParameterSummary) -> Self {
        Self {
            name: summary.name.clone(),
            median: summary.p50,
            upper_error: summary.upper_error(),
            lower_error: summary.lower_error(),
        }
    }
}

/// `NAME=VALUE` for `--param`.
pub(super) fn parse_parameter_assignment(raw: &str) -> Result<(ParameterKind, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    let kind = ParameterKind::parse(name).map_err(|error| error.message().to_string())?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|error| format!("invalid value for '{}': {}", kind, error))?;
    Ok((kind, value))
}

pub(super) fn parse_policy(raw: &str) -> Result<WavelengthRangePolicy, String> {
    WavelengthRangePolicy::from_name(raw)
        .ok_or_else(|| format!("unknown policy '{}'; use full, blue_only or near_infrared", raw))
}

pub(super) fn mean_acceptance(acceptance: &[f64]) -> f64 {
    if acceptance.is_empty() {
        return 0.0;
    }
    acceptance.iter().sum::<f64>() / acceptance.len() as f64
}

pub(super) fn render_feature_table(features: &[FeatureDefinition]) -> String {
    let mut rendered = format!(
        "{:<10}{:>22}{:>22}{:>22}  {}\n",
        "name", "blue", "feature", "red", "constrains"
    );
    for feature in features {
        let pass = |low: f64, high: f64| format!("{:.3}-{:.3}", low, high);
        rendered.push_str(&format!(
            "{:<10}{:>22}{:>22}{:>22}  {}\n",
            feature.name(),
            pass(feature.blue().low, feature.blue().high),
            pass(feature.feature().low, feature.feature().high),
            pass(feature.red().low, feature.red().high),
            feature
                .constraining_parameter()
                .map_or_else(|| "-".to_string(), |kind| kind.to_string())
        ));
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::{mean_acceptance, parse_parameter_assignment, parse_policy, render_feature_table};
    use sspfit_core::common::near_infrared_features;
    use sspfit_core::domain::{ParameterKind, WavelengthRangePolicy};

    #[test]
    fn parameter_assignments_parse_names_and_values() {
        assert_eq!(
            parse_parameter_assignment("Age=5").expect("age"),
            (ParameterKind::Age, 5.0)
        );
        assert_eq!(
            parse_parameter_assignment("Z=-0.25").expect("metallicity"),
            (ParameterKind::Metallicity, -0.25)
        );
        assert!(parse_parameter_assignment("Age").is_err());
        assert!(parse_parameter_assignment("Mass=1").is_err());
        assert!(parse_parameter_assignment("Na=rich").is_err());
    }

    #[test]
    fn policies_accept_short_names() {
        assert_eq!(parse_policy("nir"), Ok(WavelengthRangePolicy::NearInfrared));
        assert_eq!(parse_policy("full"), Ok(WavelengthRangePolicy::Full));
        assert!(parse_policy("uv").is_err());
    }

    #[test]
    fn acceptance_mean_handles_empty_input() {
        assert_eq!(mean_acceptance(&[]), 0.0);
        assert_eq!(mean_acceptance(&[0.25, 0.75]), 0.5);
    }

    #[test]
    fn feature_table_lists_constraining_parameters() {
        let rendered = render_feature_table(&near_infrared_features());
        let sodium = rendered
            .lines()
            .find(|line| line.starts_with("NaI "))
            .expect("NaI row");
        assert!(sodium.ends_with("Na"));
        let paschen = rendered
            .lines()
            .find(|line| line.starts_with("PaB"))
            .expect("PaB row");
        assert!(paschen.ends_with('-'));
    }
}
