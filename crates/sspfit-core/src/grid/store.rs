use crate::common::constants::{ABUNDANCE_COLUMN_COUNT, IMF_COLUMN_COUNT};
use crate::domain::{FitError, FitResult};
use crate::numerics::{DenseMatrix, is_strictly_increasing};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

const KEY_SCALE: f64 = 100.0;

/// (age, metallicity) discretised to 0.01 so grid values such as 12.25 Gyr and
/// -1.25 dex are distinct keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridKey {
    age_centi: i64,
    metallicity_centi: i64,
}

impl GridKey {
    pub fn new(age: f64, metallicity: f64) -> Self {
        Self {
            age_centi: discretise(age),
            metallicity_centi: discretise(metallicity),
        }
    }

    pub fn age(&self) -> f64 {
        self.age_centi as f64 / KEY_SCALE
    }

    pub fn metallicity(&self) -> f64 {
        self.metallicity_centi as f64 / KEY_SCALE
    }
}

impl Display for GridKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "(age={}, Z={})", self.age(), self.metallicity())
    }
}

fn discretise(value: f64) -> i64 {
    (value * KEY_SCALE).round() as i64
}

/// IMF block (λ × 256) plus the optional abundance block (λ × 34) for one
/// (age, metallicity).
#[derive(Debug, Clone, PartialEq)]
pub struct GridPoint {
    imf: DenseMatrix,
    abundance: Option<DenseMatrix>,
}

impl GridPoint {
    pub fn new(imf: DenseMatrix, abundance: Option<DenseMatrix>) -> Self {
        Self { imf, abundance }
    }

    pub fn imf(&self) -> &DenseMatrix {
        &self.imf
    }

    pub fn abundance(&self) -> Option<&DenseMatrix> {
        self.abundance.as_ref()
    }

    pub fn has_abundance(&self) -> bool {
        self.abundance.is_some()
    }

    pub fn imf_value(&self, row: usize, column: usize) -> f64 {
        self.imf[(row, column)]
    }

    pub fn abundance_value(&self, row: usize, column: usize) -> Option<f64> {
        self.abundance.as_ref().map(|block| block[(row, column)])
    }
}

/// Immutable after construction; shared by reference across sampler threads.
#[derive(Debug, Clone, PartialEq)]
pub struct GridStore {
    wavelength: Vec<f64>,
    points: BTreeMap<GridKey, GridPoint>,
}

impl GridStore {
    pub fn new(wavelength: Vec<f64>) -> FitResult<Self> {
        if wavelength.len() < 2 || !is_strictly_increasing(&wavelength) {
            return Err(FitError::input_validation(
                "INPUT.GRID_WAVELENGTH",
                format!(
                    "grid wavelength axis must hold at least 2 strictly increasing values ({} given)",
                    wavelength.len()
                ),
            ));
        }
        if wavelength.iter().any(|value| !value.is_finite()) {
            return Err(FitError::input_validation(
                "INPUT.GRID_WAVELENGTH",
                "grid wavelength axis contains non-finite values",
            ));
        }

        Ok(Self {
            wavelength,
            points: BTreeMap::new(),
        })
    }

    pub fn from_points(
        wavelength: Vec<f64>,
        points: impl IntoIterator<Item = (GridKey, GridPoint)>,
    ) -> FitResult<Self> {
        let mut store = Self::new(wavelength)?;
        for (key, point) in points {
            store.insert(key, point)?;
        }
        Ok(store)
    }

    pub fn insert(&mut self, key: GridKey, point: GridPoint) -> FitResult<()> {
        let rows = self.wavelength.len();
        validate_block(key, "IMF", point.imf(), rows, IMF_COLUMN_COUNT)?;
        if let Some(abundance) = point.abundance() {
            validate_block(key, "abundance", abundance, rows, ABUNDANCE_COLUMN_COUNT)?;
        }
        if self.points.contains_key(&key) {
            return Err(FitError::input_validation(
                "INPUT.GRID_DUPLICATE",
                format!("grid point {} is defined more than once", key),
            ));
        }

        self.points.insert(key, point);
        Ok(())
    }

    pub fn wavelength(&self) -> &[f64] {
        &self.wavelength
    }

    pub fn get(&self, key: GridKey) -> FitResult<&GridPoint> {
        self.points.get(&key).ok_or_else(|| {
            FitError::grid_lookup("GRID.LOOKUP", format!("no grid point at {}", key))
        })
    }

    pub fn contains(&self, key: GridKey) -> bool {
        self.points.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = GridKey> + '_ {
        self.points.keys().copied()
    }

    pub fn ages(&self) -> Vec<f64> {
        let mut ages: Vec<GridKey> = self.points.keys().copied().collect();
        ages.dedup_by_key(|key| key.age_centi);
        ages.into_iter().map(|key| key.age()).collect()
    }

    pub fn metallicities(&self) -> Vec<f64> {
        let mut values: Vec<i64> = self
            .points
            .keys()
            .map(|key| key.metallicity_centi)
            .collect();
        values.sort_unstable();
        values.dedup();
        values
            .into_iter()
            .map(|value| value as f64 / KEY_SCALE)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn validate_block(
    key: GridKey,
    label: &str,
    block: &DenseMatrix,
    rows: usize,
    columns: usize,
) -> FitResult<()> {
    if block.nrows() != rows || block.ncols() != columns {
        return Err(FitError::input_validation(
            "INPUT.GRID_SHAPE",
            format!(
                "{} block for {} must be {}x{}, got {}x{}",
                label,
                key,
                rows,
                columns,
                block.nrows(),
                block.ncols()
            ),
        ));
    }
    Ok(())
}
