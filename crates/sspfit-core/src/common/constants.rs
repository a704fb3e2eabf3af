//! Grid axes, IMF tabulation and abundance-variant layout shared by the loader,
//! selector and synthesizer.

/// Speed of light in km/s.
pub const C_KMS: f64 = 299_792.458;

pub const COARSE_AGES: [f64; 7] = [1.0, 3.0, 5.0, 7.0, 9.0, 11.0, 13.5];
pub const COARSE_METALLICITIES: [f64; 5] = [-1.5, -1.0, -0.5, 0.0, 0.2];

pub const FINE_AGES: [f64; 13] = [
    1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.25, 13.5,
];
pub const FINE_METALLICITIES: [f64; 9] = [-1.5, -1.25, -1.0, -0.75, -0.5, -0.25, 0.0, 0.1, 0.2];

/// Tabulated IMF slopes, `0.5 + i/5` for `i` in `0..16`.
pub const IMF_SLOPES: [f64; 16] = [
    0.5, 0.7, 0.9, 1.1, 1.3, 1.5, 1.7, 1.9, 2.1, 2.3, 2.5, 2.7, 2.9, 3.1, 3.3, 3.5,
];
pub const IMF_COLUMN_COUNT: usize = IMF_SLOPES.len() * IMF_SLOPES.len();

pub const REFERENCE_X1: f64 = 1.3;
pub const REFERENCE_X2: f64 = 2.3;
pub const REFERENCE_IMF_COLUMN: usize = 73;

/// Abundance file ages are tabulated in whole Gyr; 13 stands for the 13.5 Gyr
/// SSP age.
pub const ABUNDANCE_AGE_ALIAS: (f64, f64) = (13.0, 13.5);

pub const ABUNDANCE_VARIANTS: [&str; 34] = [
    "Solar", "Na+", "Na-", "Ca+", "Ca-", "Fe+", "Fe-", "C+", "C-", "a/Fe+", "N+", "N-", "as/Fe+",
    "Ti+", "Ti-", "Mg+", "Mg-", "Si+", "Si-", "T+", "T-", "Cr+", "Mn+", "Ba+", "Ba-", "Ni+",
    "Co+", "Eu+", "Sr+", "K+", "V+", "Cu+", "Na+0.6", "Na+0.9",
];
pub const ABUNDANCE_COLUMN_COUNT: usize = ABUNDANCE_VARIANTS.len();

pub const SOLAR: usize = 0;
pub const NA_PLUS: usize = 1;
pub const NA_MINUS: usize = 2;
pub const CA_PLUS: usize = 3;
pub const CA_MINUS: usize = 4;
pub const FE_PLUS: usize = 5;
pub const FE_MINUS: usize = 6;
pub const C_PLUS: usize = 7;
pub const MG_PLUS: usize = 15;
pub const SI_PLUS: usize = 17;
pub const K_PLUS: usize = 29;
pub const NA_PLUS_06: usize = 32;
pub const NA_PLUS_09: usize = 33;

pub fn imf_column(x1_index: usize, x2_index: usize) -> usize {
    x1_index * IMF_SLOPES.len() + x2_index
}

pub fn abundance_variant_index(name: &str) -> Option<usize> {
    ABUNDANCE_VARIANTS
        .iter()
        .position(|variant| *variant == name)
}

#[cfg(test)]
mod tests {
    use super::{
        ABUNDANCE_VARIANTS, C_PLUS, CA_MINUS, CA_PLUS, FE_MINUS, FE_PLUS, IMF_COLUMN_COUNT,
        IMF_SLOPES, K_PLUS, MG_PLUS, NA_MINUS, NA_PLUS, NA_PLUS_06, NA_PLUS_09,
        REFERENCE_IMF_COLUMN, REFERENCE_X1, REFERENCE_X2, SI_PLUS, SOLAR,
        abundance_variant_index, imf_column,
    };

    #[test]
    fn imf_slopes_follow_tabulation_rule() {
        for (index, slope) in IMF_SLOPES.iter().enumerate() {
            assert!((slope - (0.5 + index as f64 / 5.0)).abs() < 1.0e-12);
        }
        assert_eq!(IMF_COLUMN_COUNT, 256);
    }

    #[test]
    fn reference_column_matches_reference_slopes() {
        let x1 = IMF_SLOPES
            .iter()
            .position(|slope| *slope == REFERENCE_X1)
            .expect("x1 tabulated");
        let x2 = IMF_SLOPES
            .iter()
            .position(|slope| *slope == REFERENCE_X2)
            .expect("x2 tabulated");
        assert_eq!(imf_column(x1, x2), REFERENCE_IMF_COLUMN);
    }

    #[test]
    fn named_variant_indices_match_column_layout() {
        let cases = [
            ("Solar", SOLAR),
            ("Na+", NA_PLUS),
            ("Na-", NA_MINUS),
            ("Ca+", CA_PLUS),
            ("Ca-", CA_MINUS),
            ("Fe+", FE_PLUS),
            ("Fe-", FE_MINUS),
            ("C+", C_PLUS),
            ("Mg+", MG_PLUS),
            ("Si+", SI_PLUS),
            ("K+", K_PLUS),
            ("Na+0.6", NA_PLUS_06),
            ("Na+0.9", NA_PLUS_09),
        ];
        for (name, index) in cases {
            assert_eq!(abundance_variant_index(name), Some(index), "{name}");
            assert_eq!(ABUNDANCE_VARIANTS[index], name);
        }
        assert_eq!(abundance_variant_index("Zn+"), None);
    }
}
