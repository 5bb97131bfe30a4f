//! Per-activity duration samplers.

use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use rand_distr::{Beta, Normal, Triangular};

use crate::config::DistributionType;

use super::types::DurationEstimate;

/// Weight of the most likely value in the PERT mean.
const PERT_LAMBDA: f64 = 4.0;

/// Duration distribution for one activity, built once per run.
#[derive(Clone, Debug)]
pub(crate) enum Sampler {
    Fixed(i64),
    Triangular(Triangular<f64>),
    /// Beta on [0, 1] scaled to [min, min + range].
    Pert {
        beta: Beta<f64>,
        min: f64,
        range: f64,
    },
    Normal(Normal<f64>),
    Uniform(Uniform<i64>),
}

impl Sampler {
    pub fn new(estimate: &DurationEstimate, default: DistributionType) -> Result<Self, String> {
        estimate.validate()?;

        let a = estimate.optimistic;
        let m = estimate.most_likely;
        let b = estimate.pessimistic;
        if a == b {
            return Ok(Sampler::Fixed(m));
        }

        let (af, mf, bf) = (a as f64, m as f64, b as f64);
        let range = bf - af;
        let invalid = |e: &dyn std::fmt::Display| format!("{}: {}", estimate.activity_id, e);

        let sampler = match estimate.distribution.unwrap_or(default) {
            DistributionType::Triangular => {
                Sampler::Triangular(Triangular::new(af, bf, mf).map_err(|e| invalid(&e))?)
            }
            DistributionType::Pert => {
                let alpha = 1.0 + PERT_LAMBDA * (mf - af) / range;
                let beta = 1.0 + PERT_LAMBDA * (bf - mf) / range;
                Sampler::Pert {
                    beta: Beta::new(alpha, beta).map_err(|e| invalid(&e))?,
                    min: af,
                    range,
                }
            }
            DistributionType::Normal => {
                let mean = estimate
                    .mean
                    .unwrap_or((af + PERT_LAMBDA * mf + bf) / (PERT_LAMBDA + 2.0));
                let std_dev = estimate.std_dev.unwrap_or(range / 6.0);
                if std_dev == 0.0 {
                    return Ok(Sampler::Fixed(mean.round() as i64));
                }
                Sampler::Normal(Normal::new(mean, std_dev).map_err(|e| invalid(&e))?)
            }
            DistributionType::Uniform => Sampler::Uniform(Uniform::new_inclusive(a, b)),
        };
        Ok(sampler)
    }

    /// Draw a whole-day duration, never negative.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        let raw = match self {
            Sampler::Fixed(d) => return (*d).max(0),
            Sampler::Uniform(u) => return u.sample(rng).max(0),
            Sampler::Triangular(t) => t.sample(rng),
            Sampler::Pert { beta, min, range } => *min + beta.sample(rng) * *range,
            Sampler::Normal(n) => n.sample(rng),
        };
        (raw.round() as i64).max(0)
    }

    #[cfg(test)]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Sampler::Fixed(_))
    }
}
