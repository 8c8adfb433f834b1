//
// mixture.rs
// Dicom-AutoWL
//
// Three-component 1D Gaussian mixture fitted by expectation-maximization over the distinct sample values.
//
// Dicom-AutoWL contributors - October 2026

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const COMPONENTS: usize = 3;

const LLOYD_ITERATIONS: usize = 50;

/// One Gaussian of a fitted mixture.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianComponent {
    pub weight: f64,
    pub mean: f64,
    pub std_dev: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum MixtureError {
    #[error("need at least 3 distinct sample values to fit the mixture, found {distinct}")]
    DegenerateHistogram { distinct: usize },
}

/// Capability: fit exactly three Gaussian components to a set of samples.
pub trait MixtureFitter: Send + Sync {
    fn fit(&self, samples: &[f64]) -> Result<[GaussianComponent; COMPONENTS], MixtureError>;
}

/// EM tuning knobs. Defaults follow the usual maximum-likelihood mixture settings.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixtureOptions {
    pub max_iter: usize,
    /// Convergence threshold on the change of the mean log-likelihood.
    pub tol: f64,
    /// Added to every variance so single-valued components stay finite.
    pub reg_covar: f64,
}

impl Default for MixtureOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-3,
            reg_covar: 1e-6,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EmMixtureFitter {
    options: MixtureOptions,
}

impl EmMixtureFitter {
    pub fn new(options: MixtureOptions) -> Self {
        Self { options }
    }
}

/// Distinct sample value and how often it occurs.
#[derive(Debug, Copy, Clone)]
struct Bin {
    value: f64,
    count: f64,
}

fn compress(samples: &[f64]) -> Vec<Bin> {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);

    let mut bins: Vec<Bin> = Vec::new();
    for value in sorted {
        match bins.last_mut() {
            Some(last) if last.value == value => last.count += 1.0,
            _ => bins.push(Bin { value, count: 1.0 }),
        }
    }
    bins
}

#[derive(Debug, Clone, Copy)]
struct Params {
    weights: [f64; COMPONENTS],
    means: [f64; COMPONENTS],
    variances: [f64; COMPONENTS],
}

impl MixtureFitter for EmMixtureFitter {
    fn fit(&self, samples: &[f64]) -> Result<[GaussianComponent; COMPONENTS], MixtureError> {
        let bins = compress(samples);
        if bins.len() < COMPONENTS {
            return Err(MixtureError::DegenerateHistogram {
                distinct: bins.len(),
            });
        }

        let total: f64 = bins.iter().map(|b| b.count).sum();
        let mut params = initialise(&bins, total, self.options.reg_covar);
        let mut responsibilities = vec![[0.0; COMPONENTS]; bins.len()];
        let mut previous = f64::NEG_INFINITY;
        let mut converged = false;

        for iteration in 0..self.options.max_iter {
            let log_likelihood = expectation(&bins, &params, &mut responsibilities) / total;
            params = maximisation(&bins, &responsibilities, total, self.options.reg_covar);

            if (log_likelihood - previous).abs() < self.options.tol {
                debug!(iteration, log_likelihood, "mixture fit converged");
                converged = true;
                break;
            }
            previous = log_likelihood;
        }
        if !converged {
            warn!(
                max_iter = self.options.max_iter,
                "mixture fit did not converge, using last estimate"
            );
        }

        Ok(std::array::from_fn(|k| GaussianComponent {
            weight: params.weights[k],
            mean: params.means[k],
            std_dev: params.variances[k].sqrt(),
        }))
    }
}

/// Seed the components at the lowest, median and highest distinct value and refine with Lloyd iterations.
fn initialise(bins: &[Bin], total: f64, reg_covar: f64) -> Params {
    let mut centres = [
        bins[0].value,
        bins[bins.len() / 2].value,
        bins[bins.len() - 1].value,
    ];
    let mut labels = vec![0usize; bins.len()];

    for _ in 0..LLOYD_ITERATIONS {
        let mut changed = false;
        for (bin, label) in bins.iter().zip(labels.iter_mut()) {
            let nearest = nearest_centre(&centres, bin.value);
            if nearest != *label {
                *label = nearest;
                changed = true;
            }
        }

        let mut sums = [0.0; COMPONENTS];
        let mut counts = [0.0; COMPONENTS];
        for (bin, &label) in bins.iter().zip(labels.iter()) {
            sums[label] += bin.value * bin.count;
            counts[label] += bin.count;
        }
        for k in 0..COMPONENTS {
            // An emptied cluster keeps its previous centre.
            if counts[k] > 0.0 {
                centres[k] = sums[k] / counts[k];
            }
        }

        if !changed {
            break;
        }
    }

    let mut weights = [0.0; COMPONENTS];
    let mut variances = [0.0; COMPONENTS];
    for (bin, &label) in bins.iter().zip(labels.iter()) {
        let diff = bin.value - centres[label];
        weights[label] += bin.count;
        variances[label] += bin.count * diff * diff;
    }
    for k in 0..COMPONENTS {
        let count = weights[k];
        variances[k] = if count > 0.0 { variances[k] / count } else { 0.0 } + reg_covar;
        weights[k] = (count / total).max(f64::EPSILON);
    }

    Params {
        weights,
        means: centres,
        variances,
    }
}

fn nearest_centre(centres: &[f64; COMPONENTS], value: f64) -> usize {
    let mut best = 0;
    for k in 1..COMPONENTS {
        if (value - centres[k]).abs() < (value - centres[best]).abs() {
            best = k;
        }
    }
    best
}

/// E-step: fill the responsibilities and return the total log-likelihood.
fn expectation(bins: &[Bin], params: &Params, responsibilities: &mut [[f64; COMPONENTS]]) -> f64 {
    let log_norm: [f64; COMPONENTS] = std::array::from_fn(|k| {
        params.weights[k].ln() - 0.5 * (2.0 * std::f64::consts::PI * params.variances[k]).ln()
    });

    let mut log_likelihood = 0.0;
    for (bin, resp) in bins.iter().zip(responsibilities.iter_mut()) {
        let log_prob: [f64; COMPONENTS] = std::array::from_fn(|k| {
            let diff = bin.value - params.means[k];
            log_norm[k] - diff * diff / (2.0 * params.variances[k])
        });
        let max = log_prob.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = log_prob.iter().map(|lp| (lp - max).exp()).sum();
        let log_sum = max + sum.ln();

        for k in 0..COMPONENTS {
            resp[k] = (log_prob[k] - log_sum).exp();
        }
        log_likelihood += bin.count * log_sum;
    }
    log_likelihood
}

/// M-step: weighted means, variances and mixing weights from the responsibilities.
fn maximisation(
    bins: &[Bin],
    responsibilities: &[[f64; COMPONENTS]],
    total: f64,
    reg_covar: f64,
) -> Params {
    let mut mass = [10.0 * f64::EPSILON; COMPONENTS];
    let mut sums = [0.0; COMPONENTS];
    for (bin, resp) in bins.iter().zip(responsibilities) {
        for k in 0..COMPONENTS {
            let w = bin.count * resp[k];
            mass[k] += w;
            sums[k] += w * bin.value;
        }
    }
    let means: [f64; COMPONENTS] = std::array::from_fn(|k| sums[k] / mass[k]);

    let mut spread = [0.0; COMPONENTS];
    for (bin, resp) in bins.iter().zip(responsibilities) {
        for k in 0..COMPONENTS {
            let diff = bin.value - means[k];
            spread[k] += bin.count * resp[k] * diff * diff;
        }
    }

    Params {
        weights: std::array::from_fn(|k| mass[k] / total),
        means,
        variances: std::array::from_fn(|k| spread[k] / mass[k] + reg_covar),
    }
}

/// Index of the component whose mean is the median of the three means.
pub fn median_component(components: &[GaussianComponent; COMPONENTS]) -> usize {
    let mut order = [0, 1, 2];
    order.sort_by(|&a, &b| components[a].mean.total_cmp(&components[b].mean));
    order[COMPONENTS / 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Evenly spaced integers `lo..=hi`; population std dev is `sqrt((n^2 - 1) / 12)`.
    fn uniform(lo: i32, hi: i32) -> Vec<f64> {
        (lo..=hi).map(f64::from).collect()
    }

    fn sorted_by_mean(
        mut components: [GaussianComponent; COMPONENTS],
    ) -> [GaussianComponent; COMPONENTS] {
        components.sort_by(|a, b| a.mean.total_cmp(&b.mean));
        components
    }

    #[test]
    fn recovers_three_separated_clusters() {
        let mut samples = uniform(100, 300);
        samples.extend(uniform(1481, 2519));
        samples.extend(uniform(3900, 4100));

        let fitted = EmMixtureFitter::default().fit(&samples).expect("fit");
        let [low, mid, high] = sorted_by_mean(fitted);

        assert!((low.mean - 200.0).abs() < 1.0, "{low:?}");
        assert!((mid.mean - 2000.0).abs() < 1.0, "{mid:?}");
        assert!((high.mean - 4000.0).abs() < 1.0, "{high:?}");
        assert!((mid.std_dev - 299.93).abs() < 2.0, "{mid:?}");

        let weight_sum: f64 = fitted.iter().map(|c| c.weight).sum();
        assert!((weight_sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn fewer_than_three_distinct_values_is_degenerate() {
        let samples = vec![5.0, 5.0, 7.0, 7.0, 7.0];
        assert_eq!(
            EmMixtureFitter::default().fit(&samples),
            Err(MixtureError::DegenerateHistogram { distinct: 2 })
        );
        assert_eq!(
            EmMixtureFitter::default().fit(&[]),
            Err(MixtureError::DegenerateHistogram { distinct: 0 })
        );
    }

    #[test]
    fn exactly_three_values_fit_as_spikes() {
        let samples = vec![10.0, 10.0, 20.0, 30.0, 30.0, 30.0];
        let fitted = sorted_by_mean(EmMixtureFitter::default().fit(&samples).expect("fit"));
        assert!((fitted[0].mean - 10.0).abs() < 1e-6);
        assert!((fitted[1].mean - 20.0).abs() < 1e-6);
        assert!((fitted[2].mean - 30.0).abs() < 1e-6);
        assert!(fitted.iter().all(|c| c.std_dev < 0.01));
    }

    #[test]
    fn median_component_ignores_index_and_weight() {
        let components = [
            GaussianComponent { weight: 0.7, mean: 900.0, std_dev: 1.0 },
            GaussianComponent { weight: 0.1, mean: 10.0, std_dev: 1.0 },
            GaussianComponent { weight: 0.2, mean: 400.0, std_dev: 1.0 },
        ];
        assert_eq!(median_component(&components), 2);
    }
}
