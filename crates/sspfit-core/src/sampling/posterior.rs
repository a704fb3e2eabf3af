//! Log-posterior target handed to the ensemble sampler.

use crate::domain::{FitResult, ParameterSpace};
use crate::likelihood::LikelihoodEvaluator;
use crate::prior::log_prior;

/// Log-probability density over a flat parameter vector.
///
/// `ln_prob` short-circuits on a non-finite prior so the likelihood is never
/// evaluated outside the support.
pub trait LogProbability: Sync {
    fn dimension(&self) -> usize;

    fn ln_prior(&self, theta: &[f64]) -> FitResult<f64>;

    fn ln_likelihood(&self, theta: &[f64]) -> FitResult<f64>;

    fn ln_prob(&self, theta: &[f64]) -> FitResult<f64> {
        let prior = self.ln_prior(theta)?;
        if !prior.is_finite() {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(prior + self.ln_likelihood(theta)?)
    }
}

/// Box priors over the sampled parameters plus the spectral likelihood.
#[derive(Debug)]
pub struct SpectralPosterior<'a> {
    space: ParameterSpace,
    likelihood: LikelihoodEvaluator<'a>,
}

impl<'a> SpectralPosterior<'a> {
    pub fn new(space: ParameterSpace, likelihood: LikelihoodEvaluator<'a>) -> Self {
        Self { space, likelihood }
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn likelihood(&self) -> &LikelihoodEvaluator<'a> {
        &self.likelihood
    }
}

impl LogProbability for SpectralPosterior<'_> {
    fn dimension(&self) -> usize {
        self.space.dimension()
    }

    fn ln_prior(&self, theta: &[f64]) -> FitResult<f64> {
        Ok(log_prior(&self.space.vector(theta)?))
    }

    fn ln_likelihood(&self, theta: &[f64]) -> FitResult<f64> {
        self.likelihood.log_likelihood(&self.space.resolve(theta)?)
    }
}
