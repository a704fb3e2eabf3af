//! SSP synthesis: IMF snapping, range restriction, grid interpolation and
//! elemental-abundance corrections.

pub mod abundance;

pub use abundance::{
    AbundanceColumns, AbundanceContributions, abundance_contributions, required_columns,
};

use crate::common::constants::{IMF_SLOPES, REFERENCE_IMF_COLUMN, imf_column};
use crate::domain::{
    FitError, FitResult, FixedParameters, ParameterVector, ResolvedParameters,
    WavelengthRangePolicy, merge_parameters,
};
use crate::grid::{GridSelection, GridSelector, GridStore};
use crate::numerics::{DenseMatrix, lerp};

/// Model spectrum at one parameter vector. `base` is the reference-IMF
/// (x1 = 1.3, x2 = 2.3) spectrum at the same age and metallicity.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSpectrum {
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
    pub base: Vec<f64>,
}

/// Index of the tabulated IMF slope nearest to `value`; ties go to the lower
/// slope.
pub fn snap_imf_slope(value: f64) -> usize {
    let mut best = 0;
    for (index, slope) in IMF_SLOPES.iter().enumerate() {
        if (slope - value).abs() < (IMF_SLOPES[best] - value).abs() {
            best = index;
        }
    }
    best
}

/// Bilinear interpolation of four corners ordered (age−, Z−), (age+, Z−),
/// (age−, Z+), (age+, Z+): age first at each metallicity, then metallicity.
pub fn interpolate_age_then_metallicity(
    corners: [f64; 4],
    age_weight: f64,
    metallicity_weight: f64,
) -> f64 {
    let lower_metallicity = lerp(corners[0], corners[1], age_weight);
    let upper_metallicity = lerp(corners[2], corners[3], age_weight);
    lerp(lower_metallicity, upper_metallicity, metallicity_weight)
}

/// One-shot synthesis against `store`, bracketing on the coarse axes it holds.
pub fn synthesize(
    parameters: &ParameterVector,
    fixed: &FixedParameters,
    store: &GridStore,
    policy: WavelengthRangePolicy,
) -> FitResult<SyntheticSpectrum> {
    SpectrumSynthesizer::new(store)?.synthesize(parameters, fixed, policy)
}

#[derive(Debug, Clone)]
pub struct SpectrumSynthesizer<'a> {
    store: &'a GridStore,
    selector: GridSelector,
}

impl<'a> SpectrumSynthesizer<'a> {
    pub fn new(store: &'a GridStore) -> FitResult<Self> {
        Ok(Self::with_selector(store, GridSelector::for_store(store)?))
    }

    pub fn with_selector(store: &'a GridStore, selector: GridSelector) -> Self {
        Self { store, selector }
    }

    pub fn store(&self) -> &'a GridStore {
        self.store
    }

    pub fn selector(&self) -> &GridSelector {
        &self.selector
    }

    pub fn synthesize(
        &self,
        parameters: &ParameterVector,
        fixed: &FixedParameters,
        policy: WavelengthRangePolicy,
    ) -> FitResult<SyntheticSpectrum> {
        let merged = merge_parameters(parameters, fixed)?;
        let resolved = ResolvedParameters::from_vector(&merged)?;
        self.synthesize_resolved(&resolved, policy)
    }

    pub fn synthesize_resolved(
        &self,
        parameters: &ResolvedParameters,
        policy: WavelengthRangePolicy,
    ) -> FitResult<SyntheticSpectrum> {
        let rows = self.policy_rows(policy)?;
        let wavelength: Vec<f64> = rows
            .iter()
            .map(|row| self.store.wavelength()[*row])
            .collect();

        let selection = self
            .selector
            .select(parameters.age, parameters.metallicity)?;
        let points = selection
            .keys()
            .into_iter()
            .map(|key| self.store.get(key))
            .collect::<FitResult<Vec<_>>>()?;
        let imf_blocks: Vec<&DenseMatrix> = points.iter().map(|point| point.imf()).collect();

        let column = imf_column(
            snap_imf_slope(parameters.x1),
            snap_imf_slope(parameters.x2),
        );
        let selected = interpolate_column(&selection, &imf_blocks, &rows, column);
        let base = if column == REFERENCE_IMF_COLUMN {
            selected.clone()
        } else {
            interpolate_column(&selection, &imf_blocks, &rows, REFERENCE_IMF_COLUMN)
        };

        if !parameters.has_abundances() {
            return Ok(SyntheticSpectrum {
                wavelength,
                flux: selected,
                base,
            });
        }

        let abundance_blocks = points
            .iter()
            .zip(selection.keys())
            .map(|(point, key)| {
                point.abundance().ok_or_else(|| {
                    FitError::grid_lookup(
                        "GRID.ABUNDANCE_MISSING",
                        format!("no abundance table for grid point {}", key),
                    )
                })
            })
            .collect::<FitResult<Vec<_>>>()?;
        let mut columns = AbundanceColumns::new();
        for index in required_columns(parameters) {
            columns.insert(
                index,
                interpolate_column(&selection, &abundance_blocks, &rows, index),
            );
        }
        let contributions = abundance_contributions(parameters, &columns)?;

        let (flux, base) = if policy == WavelengthRangePolicy::BlueOnly {
            let flux = apply_contribution(&selected, &base, &contributions.elemental);
            let base = apply_contribution(&base, &base, &contributions.alpha);
            (flux, base)
        } else {
            let flux = apply_contribution(&selected, &base, &contributions.combined());
            (flux, base)
        };

        Ok(SyntheticSpectrum {
            wavelength,
            flux,
            base,
        })
    }

    fn policy_rows(&self, policy: WavelengthRangePolicy) -> FitResult<Vec<usize>> {
        let range = policy.range();
        let rows: Vec<usize> = self
            .store
            .wavelength()
            .iter()
            .enumerate()
            .filter(|(_, lambda)| range.contains(**lambda))
            .map(|(row, _)| row)
            .collect();
        if rows.is_empty() {
            return Err(FitError::grid_lookup(
                "GRID.WAVELENGTH_RANGE",
                format!(
                    "grid has no wavelengths inside the {} range ({}, {})",
                    policy, range.low, range.high
                ),
            ));
        }
        Ok(rows)
    }
}

/// Interpolate one column of the selected blocks over `rows`. Blocks follow
/// the order of `GridSelection::keys`.
fn interpolate_column(
    selection: &GridSelection,
    blocks: &[&DenseMatrix],
    rows: &[usize],
    column: usize,
) -> Vec<f64> {
    match selection {
        GridSelection::Exact(_) => rows.iter().map(|row| blocks[0][(*row, column)]).collect(),
        GridSelection::MixAge { weight, .. } | GridSelection::MixMetallicity { weight, .. } => {
            rows.iter()
                .map(|row| lerp(blocks[0][(*row, column)], blocks[1][(*row, column)], *weight))
                .collect()
        }
        GridSelection::Bilinear {
            age_weight,
            metallicity_weight,
            ..
        } => rows
            .iter()
            .map(|row| {
                interpolate_age_then_metallicity(
                    [
                        blocks[0][(*row, column)],
                        blocks[1][(*row, column)],
                        blocks[2][(*row, column)],
                        blocks[3][(*row, column)],
                    ],
                    *age_weight,
                    *metallicity_weight,
                )
            })
            .collect(),
    }
}

/// `spectrum · (1 + (base / spectrum) · contribution)`; rows with no
/// contribution are passed through untouched.
fn apply_contribution(spectrum: &[f64], base: &[f64], contribution: &[f64]) -> Vec<f64> {
    spectrum
        .iter()
        .zip(base)
        .zip(contribution)
        .map(|((value, base), contribution)| {
            if *contribution == 0.0 {
                *value
            } else {
                value * (1.0 + (base / value) * contribution)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        SpectrumSynthesizer, interpolate_age_then_metallicity, snap_imf_slope, synthesize,
    };
    use crate::common::constants::{
        ABUNDANCE_COLUMN_COUNT, FE_MINUS, FE_PLUS, IMF_COLUMN_COUNT, NA_PLUS, REFERENCE_IMF_COLUMN,
        imf_column,
    };
    use crate::domain::{
        FitErrorCategory, FixedParameters, ParameterKind, ParameterVector, WavelengthRangePolicy,
    };
    use crate::grid::{GridKey, GridPoint, GridStore};
    use crate::numerics::DenseMatrix;

    const WAVELENGTH: [f64; 6] = [5000.0, 8600.0, 9000.0, 10000.0, 12000.0, 13900.0];

    fn point(level: f64, with_abundance: bool) -> GridPoint {
        let imf = DenseMatrix::from_fn(WAVELENGTH.len(), IMF_COLUMN_COUNT, |row, col| {
            level + row as f64 * 0.1 + col as f64 * 0.001
        });
        let abundance = with_abundance.then(|| {
            DenseMatrix::from_fn(WAVELENGTH.len(), ABUNDANCE_COLUMN_COUNT, |row, col| {
                let solar = level + row as f64 * 0.1;
                match col {
                    NA_PLUS => solar * 1.1,
                    FE_PLUS => solar * 1.03,
                    FE_MINUS => solar * 0.97,
                    _ => solar,
                }
            })
        });
        GridPoint::new(imf, abundance)
    }

    fn store() -> GridStore {
        let mut points = Vec::new();
        for (age, age_level) in [(3.0, 1.0), (5.0, 2.0), (7.0, 4.0)] {
            for (metallicity, metallicity_level) in [(-0.5, 0.0), (0.0, 10.0)] {
                points.push((
                    GridKey::new(age, metallicity),
                    point(age_level + metallicity_level, true),
                ));
            }
        }
        GridStore::from_points(WAVELENGTH.to_vec(), points).expect("store")
    }

    fn parameters(pairs: &[(ParameterKind, f64)]) -> ParameterVector {
        ParameterVector::from_pairs(pairs.iter().copied()).expect("parameters")
    }

    fn column(store: &GridStore, age: f64, metallicity: f64, column: usize) -> Vec<f64> {
        let point = store.get(GridKey::new(age, metallicity)).expect("point");
        (1..WAVELENGTH.len())
            .map(|row| point.imf_value(row, column))
            .collect()
    }

    #[test]
    fn snapping_picks_the_nearest_tabulated_slope() {
        assert_eq!(snap_imf_slope(1.3), 4);
        assert_eq!(snap_imf_slope(2.3), 9);
        assert_eq!(snap_imf_slope(1.39), 4);
        assert_eq!(snap_imf_slope(-4.0), 0);
        assert_eq!(snap_imf_slope(9.0), 15);
        assert_eq!(imf_column(snap_imf_slope(1.3), snap_imf_slope(2.3)), REFERENCE_IMF_COLUMN);
    }

    #[test]
    fn on_grid_reference_imf_returns_the_raw_column() {
        let store = store();
        let spectrum = synthesize(
            &parameters(&[
                (ParameterKind::Age, 5.0),
                (ParameterKind::Metallicity, 0.0),
                (ParameterKind::X1, 1.3),
                (ParameterKind::X2, 2.3),
                (ParameterKind::Na, 0.0),
                (ParameterKind::VelDisp, 200.0),
            ]),
            &FixedParameters::new(),
            &store,
            WavelengthRangePolicy::NearInfrared,
        )
        .expect("spectrum");

        let raw = column(&store, 5.0, 0.0, REFERENCE_IMF_COLUMN);
        assert_eq!(spectrum.wavelength, WAVELENGTH[1..].to_vec());
        assert_eq!(spectrum.flux, raw);
        assert_eq!(spectrum.base, raw);
    }

    #[test]
    fn off_grid_age_is_the_linear_mix_of_its_brackets() {
        let store = store();
        let spectrum = synthesize(
            &parameters(&[(ParameterKind::Age, 4.0), (ParameterKind::Metallicity, 0.0)]),
            &FixedParameters::new(),
            &store,
            WavelengthRangePolicy::NearInfrared,
        )
        .expect("spectrum");

        let lower = column(&store, 3.0, 0.0, REFERENCE_IMF_COLUMN);
        let upper = column(&store, 5.0, 0.0, REFERENCE_IMF_COLUMN);
        for ((value, lower), upper) in spectrum.flux.iter().zip(lower).zip(upper) {
            assert!((value - 0.5 * (lower + upper)).abs() < 1.0e-12);
        }
    }

    #[test]
    fn bilinear_order_is_age_first() {
        let corners = [1.0, 3.0, 10.0, 30.0];
        let value = interpolate_age_then_metallicity(corners, 0.25, 0.5);
        let lower = 1.0 + (3.0 - 1.0) * 0.25;
        let upper = 10.0 + (30.0 - 10.0) * 0.25;
        assert_eq!(value, lower + (upper - lower) * 0.5);
    }

    #[test]
    fn solar_abundances_reproduce_the_selected_imf() {
        let store = store();
        let x1 = 2.1;
        let with_solar = synthesize(
            &parameters(&[
                (ParameterKind::Age, 6.0),
                (ParameterKind::Metallicity, -0.25),
                (ParameterKind::X1, x1),
                (ParameterKind::Na, 0.0),
                (ParameterKind::Fe, 0.0),
                (ParameterKind::Alpha, 0.0),
            ]),
            &FixedParameters::new(),
            &store,
            WavelengthRangePolicy::NearInfrared,
        )
        .expect("spectrum");
        let without = synthesize(
            &parameters(&[
                (ParameterKind::Age, 6.0),
                (ParameterKind::Metallicity, -0.25),
                (ParameterKind::X1, x1),
            ]),
            &FixedParameters::new(),
            &store,
            WavelengthRangePolicy::NearInfrared,
        )
        .expect("spectrum");

        assert_eq!(with_solar.flux, without.flux);
        assert_ne!(with_solar.flux, with_solar.base);
    }

    #[test]
    fn abundance_offsets_scale_by_base_over_selected() {
        let store = store();
        let spectrum = synthesize(
            &parameters(&[
                (ParameterKind::Age, 5.0),
                (ParameterKind::Metallicity, 0.0),
                (ParameterKind::X1, 3.5),
                (ParameterKind::Fe, 0.3),
            ]),
            &FixedParameters::new(),
            &store,
            WavelengthRangePolicy::NearInfrared,
        )
        .expect("spectrum");

        let selected = column(&store, 5.0, 0.0, imf_column(15, 9));
        for ((flux, base), selected) in spectrum.flux.iter().zip(&spectrum.base).zip(selected) {
            let expected = selected * (1.0 + (base / selected) * 0.03);
            assert!((flux - expected).abs() < 1.0e-9);
        }
    }

    #[test]
    fn repeated_synthesis_is_bit_identical() {
        let store = store();
        let synthesizer = SpectrumSynthesizer::new(&store).expect("synthesizer");
        let vector = parameters(&[
            (ParameterKind::Age, 6.3),
            (ParameterKind::Metallicity, -0.1),
            (ParameterKind::Na, 0.42),
            (ParameterKind::K, -0.2),
        ]);
        let first = synthesizer
            .synthesize(&vector, &FixedParameters::new(), WavelengthRangePolicy::Full)
            .expect("first");
        let second = synthesizer
            .synthesize(&vector, &FixedParameters::new(), WavelengthRangePolicy::Full)
            .expect("second");
        assert_eq!(first, second);
        assert_eq!(first.wavelength.len(), WAVELENGTH.len());
    }

    #[test]
    fn sparse_off_axis_points_do_not_change_the_bracket() {
        let reference = store();
        let mut sparse = store();
        sparse
            .insert(GridKey::new(4.0, -0.5), point(1.5, true))
            .expect("extra point");
        let vector = parameters(&[
            (ParameterKind::Age, 4.5),
            (ParameterKind::Metallicity, -0.25),
        ]);

        let expected = synthesize(
            &vector,
            &FixedParameters::new(),
            &reference,
            WavelengthRangePolicy::Full,
        )
        .expect("reference grid");
        let spectrum = synthesize(
            &vector,
            &FixedParameters::new(),
            &sparse,
            WavelengthRangePolicy::Full,
        )
        .expect("sparse grid still brackets on 3 and 5 Gyr");
        assert_eq!(spectrum, expected);
    }

    #[test]
    fn blue_only_routes_alpha_into_the_base_spectrum() {
        let store = store();
        let spectrum = synthesize(
            &parameters(&[
                (ParameterKind::Age, 5.0),
                (ParameterKind::Metallicity, 0.0),
                (ParameterKind::Alpha, 0.3),
            ]),
            &FixedParameters::new(),
            &store,
            WavelengthRangePolicy::BlueOnly,
        )
        .expect("spectrum");
        assert_eq!(spectrum.wavelength, vec![5000.0]);
        // All alpha variants equal Solar in this grid.
        let reference = store
            .get(GridKey::new(5.0, 0.0))
            .expect("point")
            .imf_value(0, REFERENCE_IMF_COLUMN);
        assert_eq!(spectrum.base, vec![reference]);
        assert_eq!(spectrum.flux, spectrum.base);
    }

    #[test]
    fn fixed_values_must_agree_with_sampled_values() {
        let store = store();
        let vector = parameters(&[(ParameterKind::Age, 5.0), (ParameterKind::Metallicity, 0.0)]);
        let error = synthesize(
            &vector,
            &FixedParameters::new().with(ParameterKind::Age, 7.0),
            &store,
            WavelengthRangePolicy::NearInfrared,
        )
        .expect_err("conflict");
        assert_eq!(error.category(), FitErrorCategory::ParameterConflictError);

        synthesize(
            &vector,
            &FixedParameters::new().with(ParameterKind::Age, 5.0),
            &store,
            WavelengthRangePolicy::NearInfrared,
        )
        .expect("identical values are accepted");
    }

    #[test]
    fn unresolvable_selections_are_grid_lookup_errors() {
        let store = store();
        for (age, metallicity) in [(1.0, 0.0), (5.0, 0.2)] {
            let error = synthesize(
                &parameters(&[
                    (ParameterKind::Age, age),
                    (ParameterKind::Metallicity, metallicity),
                ]),
                &FixedParameters::new(),
                &store,
                WavelengthRangePolicy::NearInfrared,
            )
            .expect_err("outside the grid");
            assert_eq!(error.category(), FitErrorCategory::GridLookupError);
        }
    }

    #[test]
    fn missing_abundance_tables_fail_only_when_abundances_are_active() {
        let store = GridStore::from_points(
            WAVELENGTH.to_vec(),
            [(GridKey::new(5.0, 0.0), point(1.0, false))],
        )
        .expect("store");
        let base = [(ParameterKind::Age, 5.0), (ParameterKind::Metallicity, 0.0)];
        synthesize(
            &parameters(&base),
            &FixedParameters::new(),
            &store,
            WavelengthRangePolicy::NearInfrared,
        )
        .expect("IMF-only synthesis");

        let error = synthesize(
            &parameters(&base),
            &FixedParameters::new().with(ParameterKind::Na, 0.3),
            &store,
            WavelengthRangePolicy::NearInfrared,
        )
        .expect_err("no abundance table");
        assert_eq!(error.placeholder(), "GRID.ABUNDANCE_MISSING");
    }
}
