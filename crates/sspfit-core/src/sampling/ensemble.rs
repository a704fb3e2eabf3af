//! Affine-invariant ensemble sampler (Goodman & Weare stretch move).
//!
//! The ensemble is split into two halves; each half proposes against the
//! other and its proposals are evaluated in parallel. Every random draw for a
//! half is taken serially before evaluation, so a seed fixes the whole chain
//! independently of the thread count.

use super::posterior::LogProbability;
use crate::domain::{FitError, FitResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

pub const STRETCH_SCALE: f64 = 2.0;

/// Walker positions and their log-probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleState {
    pub positions: Vec<Vec<f64>>,
    pub log_prob: Vec<f64>,
}

impl EnsembleState {
    pub fn walkers(&self) -> usize {
        self.positions.len()
    }
}

struct Proposal {
    walker: usize,
    position: Vec<f64>,
    ln_stretch: f64,
    ln_uniform: f64,
}

pub struct EnsembleSampler<'p, P: LogProbability> {
    target: &'p P,
    walkers: usize,
    scale: f64,
    rng: StdRng,
    pool: Option<rayon::ThreadPool>,
    accepted: Vec<u64>,
    steps: u64,
}

impl<'p, P: LogProbability> EnsembleSampler<'p, P> {
    pub fn new(target: &'p P, walkers: usize, seed: u64, threads: Option<usize>) -> FitResult<Self> {
        let dimension = target.dimension();
        if walkers % 2 != 0 || walkers < 2 * dimension || walkers < 2 {
            return Err(FitError::input_validation(
                "INPUT.CONFIG_WALKERS",
                format!(
                    "ensemble needs an even number of walkers, at least {}; got {}",
                    (2 * dimension).max(2),
                    walkers
                ),
            ));
        }

        let pool = threads
            .map(|threads| {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|error| {
                        FitError::internal(
                            "SYS.THREAD_POOL",
                            format!("failed to create thread pool: {}", error),
                        )
                    })
            })
            .transpose()?;

        Ok(Self {
            target,
            walkers,
            scale: STRETCH_SCALE,
            rng: StdRng::seed_from_u64(seed),
            pool,
            accepted: vec![0; walkers],
            steps: 0,
        })
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn walkers(&self) -> usize {
        self.walkers
    }

    /// Evaluate the target at every starting position.
    pub fn initial_state(&self, positions: Vec<Vec<f64>>) -> FitResult<EnsembleState> {
        if positions.len() != self.walkers {
            return Err(FitError::input_validation(
                "INPUT.INITIAL_POSITIONS",
                format!(
                    "expected {} walker positions, got {}",
                    self.walkers,
                    positions.len()
                ),
            ));
        }
        let dimension = self.target.dimension();
        if let Some(position) = positions.iter().find(|position| position.len() != dimension) {
            return Err(FitError::input_validation(
                "INPUT.INITIAL_POSITIONS",
                format!(
                    "walker position has {} values, expected {}",
                    position.len(),
                    dimension
                ),
            ));
        }

        let log_prob = self.evaluate(&positions)?;
        Ok(EnsembleState {
            positions,
            log_prob,
        })
    }

    /// Advance every walker by one stretch move.
    pub fn step(&mut self, state: &mut EnsembleState) -> FitResult<()> {
        let half = self.walkers / 2;
        for (active, complement) in [(0..half, half..self.walkers), (half..self.walkers, 0..half)] {
            let proposals: Vec<Proposal> = active
                .map(|walker| self.propose(state, walker, complement.clone()))
                .collect();
            let positions: Vec<Vec<f64>> = proposals
                .iter()
                .map(|proposal| proposal.position.clone())
                .collect();
            let log_prob = self.evaluate(&positions)?;

            for (proposal, candidate) in proposals.into_iter().zip(log_prob) {
                let walker = proposal.walker;
                let ln_accept = proposal.ln_stretch + candidate - state.log_prob[walker];
                if ln_accept > proposal.ln_uniform {
                    state.positions[walker] = proposal.position;
                    state.log_prob[walker] = candidate;
                    self.accepted[walker] += 1;
                }
            }
        }
        self.steps += 1;
        Ok(())
    }

    /// Fraction of steps in which each walker moved.
    pub fn acceptance_fraction(&self) -> Vec<f64> {
        self.accepted
            .iter()
            .map(|accepted| {
                if self.steps == 0 {
                    0.0
                } else {
                    *accepted as f64 / self.steps as f64
                }
            })
            .collect()
    }

    fn propose(
        &mut self,
        state: &EnsembleState,
        walker: usize,
        complement: std::ops::Range<usize>,
    ) -> Proposal {
        let dimension = state.positions[walker].len();
        let u: f64 = self.rng.random();
        let stretch = ((self.scale - 1.0) * u + 1.0).powi(2) / self.scale;
        let partner = self.rng.random_range(complement);
        let ln_uniform = self.rng.random::<f64>().ln();

        let current = &state.positions[walker];
        let anchor = &state.positions[partner];
        let position = current
            .iter()
            .zip(anchor)
            .map(|(current, anchor)| anchor + stretch * (current - anchor))
            .collect();

        Proposal {
            walker,
            position,
            ln_stretch: (dimension as f64 - 1.0) * stretch.ln(),
            ln_uniform,
        }
    }

    fn evaluate(&self, positions: &[Vec<f64>]) -> FitResult<Vec<f64>> {
        let target = self.target;
        let run = || {
            positions
                .par_iter()
                .map(|position| target.ln_prob(position))
                .collect::<FitResult<Vec<_>>>()
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }
}
