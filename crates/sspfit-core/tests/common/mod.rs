#![allow(dead_code)]

use sspfit_core::common::GridConfig;
use sspfit_core::common::constants::{ABUNDANCE_COLUMN_COUNT, IMF_COLUMN_COUNT};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const AGES: [f64; 2] = [1.0, 13.5];
pub const METALLICITIES: [f64; 2] = [-0.5, 0.2];

pub fn grid_wavelength() -> Vec<f64> {
    (0..=860).map(|index| 4600.0 + 10.0 * index as f64).collect()
}

/// Linear in age and metallicity, so grid interpolation reproduces it exactly
/// up to rounding.
pub fn model_flux(lambda: f64, age: f64, metallicity: f64, column: usize) -> f64 {
    let continuum = 1.0 + 0.02 * age + 0.1 * metallicity + 1.0e-5 * (lambda - 9000.0);
    let depth = (0.1 + 0.001 * column as f64)
        * (-(lambda - 11393.0).powi(2) / (2.0 * 15.0 * 15.0)).exp();
    continuum * (1.0 - depth)
}

fn metallicity_tag(metallicity: f64) -> String {
    let sign = if metallicity < 0.0 { 'm' } else { 'p' };
    format!("Z{}{:.1}", sign, metallicity.abs())
}

pub fn imf_file_name(age: f64, metallicity: f64) -> String {
    format!(
        "VCJ_v8_mcut0.08_t{:04.1}_{}.ssp.imf_varydoublex.s100",
        age,
        metallicity_tag(metallicity)
    )
}

pub fn abundance_file_name(age: f64, metallicity: f64) -> String {
    let age = if age == 13.5 { 13.0 } else { age };
    format!(
        "atlas_ssp_t{:02}_{}.abund.krpa.s100",
        age as u32,
        metallicity_tag(metallicity)
    )
}

pub fn write_imf_table(path: &Path, age: f64, metallicity: f64) {
    let mut contents = String::new();
    for lambda in grid_wavelength() {
        write!(contents, "{}", lambda).expect("format");
        for column in 0..IMF_COLUMN_COUNT {
            write!(contents, " {}", model_flux(lambda, age, metallicity, column)).expect("format");
        }
        contents.push('\n');
    }
    fs::write(path, contents).expect("write IMF table");
}

pub fn write_abundance_table(path: &Path, age: f64, metallicity: f64) {
    let mut contents = String::from("# synthetic abundance table\n# lambda solar variants\n");
    for lambda in grid_wavelength() {
        let solar = model_flux(lambda, age, metallicity, 73);
        write!(contents, "{}", lambda).expect("format");
        for column in 0..ABUNDANCE_COLUMN_COUNT {
            let value = if column == 0 {
                solar
            } else {
                solar * (1.0 + 0.01 * column as f64)
            };
            write!(contents, " {}", value).expect("format");
        }
        contents.push('\n');
    }
    fs::write(path, contents).expect("write abundance table");
}

/// Four-corner grid under `root/vcj_ssp` and `root/atlas`.
pub fn write_grid(root: &Path, with_abundances: bool) -> GridConfig {
    let config = GridConfig::with_root(root);
    fs::create_dir_all(config.imf_directory()).expect("imf dir");
    if with_abundances {
        fs::create_dir_all(config.abundance_directory()).expect("abundance dir");
    }
    for age in AGES {
        for metallicity in METALLICITIES {
            write_imf_table(
                &config.imf_directory().join(imf_file_name(age, metallicity)),
                age,
                metallicity,
            );
            if with_abundances {
                write_abundance_table(
                    &config
                        .abundance_directory()
                        .join(abundance_file_name(age, metallicity)),
                    age,
                    metallicity,
                );
            }
        }
    }
    config
}

/// Three-column observed table sampled from the model at `age`, `metallicity`.
pub fn write_observed(path: &Path, start: f64, end: f64, age: f64, metallicity: f64) -> PathBuf {
    let mut contents = String::from("# lambda flux error\n");
    let mut lambda = start;
    while lambda <= end {
        let flux = model_flux(lambda, age, metallicity, 73);
        writeln!(contents, "{} {} {}", lambda, flux, 0.01).expect("format");
        lambda += 2.0;
    }
    fs::write(path, contents).expect("write observed");
    path.to_path_buf()
}
