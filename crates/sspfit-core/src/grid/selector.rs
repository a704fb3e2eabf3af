use super::store::{GridKey, GridStore};
use crate::common::constants::{
    COARSE_AGES, COARSE_METALLICITIES, FINE_AGES, FINE_METALLICITIES,
};
use crate::domain::{FitError, FitResult};
use crate::numerics::deterministic_argsort;

const ON_GRID_TOLERANCE: f64 = 1.0e-9;

/// Sorted age and metallicity axes the selector brackets against.
#[derive(Debug, Clone, PartialEq)]
pub struct GridAxes {
    ages: Vec<f64>,
    metallicities: Vec<f64>,
}

impl GridAxes {
    pub fn new(ages: Vec<f64>, metallicities: Vec<f64>) -> FitResult<Self> {
        if ages.is_empty() || metallicities.is_empty() {
            return Err(FitError::input_validation(
                "INPUT.GRID_AXES",
                "grid axes must not be empty",
            ));
        }
        let sort = |values: Vec<f64>| {
            deterministic_argsort(&values)
                .into_iter()
                .map(|index| values[index])
                .collect::<Vec<_>>()
        };
        Ok(Self {
            ages: sort(ages),
            metallicities: sort(metallicities),
        })
    }

    pub fn coarse() -> Self {
        Self {
            ages: COARSE_AGES.to_vec(),
            metallicities: COARSE_METALLICITIES.to_vec(),
        }
    }

    pub fn fine() -> Self {
        Self {
            ages: FINE_AGES.to_vec(),
            metallicities: FINE_METALLICITIES.to_vec(),
        }
    }

    /// Keep only the axis values the store holds at least one point for.
    pub fn within_store(&self, store: &GridStore) -> FitResult<Self> {
        let keep = |axis: &[f64], present: Vec<f64>| {
            axis.iter()
                .copied()
                .filter(|value| {
                    present
                        .iter()
                        .any(|candidate| (candidate - value).abs() <= ON_GRID_TOLERANCE)
                })
                .collect::<Vec<_>>()
        };
        Self::new(
            keep(&self.ages, store.ages()),
            keep(&self.metallicities, store.metallicities()),
        )
    }

    pub fn ages(&self) -> &[f64] {
        &self.ages
    }

    pub fn metallicities(&self) -> &[f64] {
        &self.metallicities
    }
}

/// The grid points to combine for one (age, metallicity) and the linear
/// weights toward the upper bracket on each mixed axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridSelection {
    Exact(GridKey),
    MixAge {
        lower: GridKey,
        upper: GridKey,
        weight: f64,
    },
    MixMetallicity {
        lower: GridKey,
        upper: GridKey,
        weight: f64,
    },
    /// Keys ordered (age−, Z−), (age+, Z−), (age−, Z+), (age+, Z+).
    Bilinear {
        keys: [GridKey; 4],
        age_weight: f64,
        metallicity_weight: f64,
    },
}

impl GridSelection {
    pub fn keys(&self) -> Vec<GridKey> {
        match self {
            Self::Exact(key) => vec![*key],
            Self::MixAge { lower, upper, .. } | Self::MixMetallicity { lower, upper, .. } => {
                vec![*lower, *upper]
            }
            Self::Bilinear { keys, .. } => keys.to_vec(),
        }
    }

    pub fn ensure_available(&self, store: &GridStore) -> FitResult<()> {
        for key in self.keys() {
            store.get(key)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Bracket {
    On(f64),
    Between { lower: f64, upper: f64, weight: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridSelector {
    axes: GridAxes,
}

impl Default for GridSelector {
    fn default() -> Self {
        Self::new(GridAxes::coarse())
    }
}

impl GridSelector {
    pub fn new(axes: GridAxes) -> Self {
        Self { axes }
    }

    /// Coarse axes restricted to the store; extra tabulated points off the
    /// coarse grid never become bracket ends.
    pub fn for_store(store: &GridStore) -> FitResult<Self> {
        Ok(Self::new(GridAxes::coarse().within_store(store)?))
    }

    pub fn axes(&self) -> &GridAxes {
        &self.axes
    }

    pub fn select(&self, age: f64, metallicity: f64) -> FitResult<GridSelection> {
        let age_bracket = bracket("age", self.axes.ages(), age)?;
        let metallicity_bracket = bracket("metallicity", self.axes.metallicities(), metallicity)?;

        let selection = match (age_bracket, metallicity_bracket) {
            (Bracket::On(age), Bracket::On(metallicity)) => {
                GridSelection::Exact(GridKey::new(age, metallicity))
            }
            (
                Bracket::Between {
                    lower,
                    upper,
                    weight,
                },
                Bracket::On(metallicity),
            ) => GridSelection::MixAge {
                lower: GridKey::new(lower, metallicity),
                upper: GridKey::new(upper, metallicity),
                weight,
            },
            (
                Bracket::On(age),
                Bracket::Between {
                    lower,
                    upper,
                    weight,
                },
            ) => GridSelection::MixMetallicity {
                lower: GridKey::new(age, lower),
                upper: GridKey::new(age, upper),
                weight,
            },
            (
                Bracket::Between {
                    lower: age_lower,
                    upper: age_upper,
                    weight: age_weight,
                },
                Bracket::Between {
                    lower: metallicity_lower,
                    upper: metallicity_upper,
                    weight: metallicity_weight,
                },
            ) => GridSelection::Bilinear {
                keys: [
                    GridKey::new(age_lower, metallicity_lower),
                    GridKey::new(age_upper, metallicity_lower),
                    GridKey::new(age_lower, metallicity_upper),
                    GridKey::new(age_upper, metallicity_upper),
                ],
                age_weight,
                metallicity_weight,
            },
        };

        Ok(selection)
    }
}

/// Nearest axis value at or below and nearest value at or above; an exact
/// match (or a degenerate bracket) is reported as on-grid.
fn bracket(label: &str, axis: &[f64], value: f64) -> FitResult<Bracket> {
    let out_of_range = || {
        FitError::grid_lookup(
            "GRID.LOOKUP",
            format!(
                "{} {} cannot be bracketed by the grid axis [{}, {}]",
                label,
                value,
                axis.first().copied().unwrap_or(f64::NAN),
                axis.last().copied().unwrap_or(f64::NAN)
            ),
        )
    };
    if !value.is_finite() {
        return Err(out_of_range());
    }

    if let Some(on_grid) = axis
        .iter()
        .find(|candidate| (**candidate - value).abs() <= ON_GRID_TOLERANCE)
    {
        return Ok(Bracket::On(*on_grid));
    }

    let upper_index = axis.partition_point(|candidate| *candidate < value);
    if upper_index == 0 || upper_index == axis.len() {
        return Err(out_of_range());
    }
    let lower = axis[upper_index - 1];
    let upper = axis[upper_index];
    if lower == upper {
        return Ok(Bracket::On(lower));
    }

    Ok(Bracket::Between {
        lower,
        upper,
        weight: (value - lower) / (upper - lower),
    })
}

#[cfg(test)]
mod tests {
    use super::{GridAxes, GridSelection, GridSelector};
    use crate::common::constants::IMF_COLUMN_COUNT;
    use crate::domain::FitErrorCategory;
    use crate::grid::store::{GridKey, GridPoint, GridStore};
    use crate::numerics::DenseMatrix;

    #[test]
    fn on_grid_values_select_a_single_point_without_weights() {
        let selector = GridSelector::default();
        let selection = selector.select(5.0, 0.0).expect("selection");
        assert_eq!(selection, GridSelection::Exact(GridKey::new(5.0, 0.0)));
        assert_eq!(selection.keys().len(), 1);
    }

    #[test]
    fn off_grid_age_brackets_by_neighbours() {
        let selector = GridSelector::default();
        let selection = selector.select(6.0, -0.5).expect("selection");
        assert_eq!(
            selection,
            GridSelection::MixAge {
                lower: GridKey::new(5.0, -0.5),
                upper: GridKey::new(7.0, -0.5),
                weight: 0.5,
            }
        );
    }

    #[test]
    fn off_grid_metallicity_brackets_by_neighbours() {
        let selector = GridSelector::default();
        let GridSelection::MixMetallicity {
            lower,
            upper,
            weight,
        } = selector.select(13.5, 0.1).expect("selection")
        else {
            panic!("expected metallicity mix");
        };
        assert_eq!(lower, GridKey::new(13.5, 0.0));
        assert_eq!(upper, GridKey::new(13.5, 0.2));
        assert!((weight - 0.5).abs() < 1.0e-12);
    }

    #[test]
    fn both_off_grid_select_four_points() {
        let selector = GridSelector::default();
        let GridSelection::Bilinear {
            keys,
            age_weight,
            metallicity_weight,
        } = selector.select(12.0, -0.25).expect("selection")
        else {
            panic!("expected bilinear selection");
        };
        assert_eq!(
            keys,
            [
                GridKey::new(11.0, -0.5),
                GridKey::new(13.5, -0.5),
                GridKey::new(11.0, 0.0),
                GridKey::new(13.5, 0.0),
            ]
        );
        assert!((age_weight - 0.4).abs() < 1.0e-12);
        assert!((metallicity_weight - 0.5).abs() < 1.0e-12);
    }

    #[test]
    fn values_outside_the_axis_are_grid_lookup_errors() {
        let selector = GridSelector::default();
        for (age, metallicity) in [(0.5, 0.0), (14.0, 0.0), (5.0, 0.3), (f64::NAN, 0.0)] {
            let error = selector
                .select(age, metallicity)
                .expect_err("out of range");
            assert_eq!(error.category(), FitErrorCategory::GridLookupError);
        }
    }

    #[test]
    fn fine_axes_bracket_quarter_steps() {
        let selector = GridSelector::new(GridAxes::fine());
        assert_eq!(
            selector.select(12.25, -1.25).expect("selection"),
            GridSelection::Exact(GridKey::new(12.25, -1.25))
        );
        let GridSelection::MixAge { lower, upper, .. } =
            selector.select(12.0, 0.1).expect("selection")
        else {
            panic!("expected age mix");
        };
        assert_eq!(lower, GridKey::new(11.0, 0.1));
        assert_eq!(upper, GridKey::new(12.25, 0.1));
    }

    #[test]
    fn store_selectors_bracket_on_the_coarse_axes_only() {
        let wavelength = vec![9000.0, 9001.0];
        let point = || GridPoint::new(DenseMatrix::zeros(2, IMF_COLUMN_COUNT), None);
        let mut points = Vec::new();
        for age in [3.0, 5.0, 7.0] {
            for metallicity in [-0.5, 0.0] {
                points.push((GridKey::new(age, metallicity), point()));
            }
        }
        points.push((GridKey::new(4.0, -0.5), point()));
        let store = GridStore::from_points(wavelength, points).expect("store");

        let selector = GridSelector::for_store(&store).expect("selector");
        assert_eq!(selector.axes().ages(), &[3.0, 5.0, 7.0]);
        assert_eq!(selector.axes().metallicities(), &[-0.5, 0.0]);

        let selection = selector.select(4.5, -0.25).expect("selection");
        assert_eq!(
            selection.keys(),
            vec![
                GridKey::new(3.0, -0.5),
                GridKey::new(5.0, -0.5),
                GridKey::new(3.0, 0.0),
                GridKey::new(5.0, 0.0),
            ]
        );
        selection.ensure_available(&store).expect("bracket keys exist");

        let empty = GridStore::from_points(
            vec![9000.0, 9001.0],
            [(GridKey::new(4.0, -0.25), point())],
        )
        .expect("store");
        assert!(GridSelector::for_store(&empty).is_err());
    }

    #[test]
    fn axes_are_sorted_on_construction() {
        let axes = GridAxes::new(vec![5.0, 1.0, 3.0], vec![0.2, -1.0]).expect("axes");
        assert_eq!(axes.ages(), &[1.0, 3.0, 5.0]);
        assert_eq!(axes.metallicities(), &[-1.0, 0.2]);
        assert!(GridAxes::new(Vec::new(), vec![0.0]).is_err());
    }
}
