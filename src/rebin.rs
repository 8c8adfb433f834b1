//
// rebin.rs
// Dicom-AutoWL
//
// Linear compression of a slice's intensity range into a fixed number of bins.
//
// Dicom-AutoWL contributors - October 2026

use ndarray::Array2;

#[derive(Debug, Clone, PartialEq)]
pub enum RebinOutcome {
    Rebinned(Array2<f64>),
    /// `max == min`: there is no range to divide, every sample becomes zero.
    Flat(Array2<f64>),
}

impl RebinOutcome {
    pub fn into_inner(self) -> Array2<f64> {
        match self {
            RebinOutcome::Rebinned(values) | RebinOutcome::Flat(values) => values,
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, RebinOutcome::Flat(_))
    }
}

/// Number of bins that halves the count of intensity levels in `[min, max]`.
#[inline]
pub fn half_range_bins(min: i32, max: i32) -> f64 {
    (f64::from(max) - f64::from(min) + 1.0) / 2.0
}

/// Map `[min, max]` linearly so that each bin has width `(max - min) / nbins`.
///
/// `min` maps to 0 and `max` maps to `nbins`.
pub fn rebin(samples: &Array2<i32>, nbins: f64) -> RebinOutcome {
    let (Some(min), Some(max)) = (samples.iter().copied().min(), samples.iter().copied().max())
    else {
        return RebinOutcome::Flat(Array2::zeros(samples.raw_dim()));
    };
    if max == min {
        return RebinOutcome::Flat(Array2::zeros(samples.raw_dim()));
    }

    let min = f64::from(min);
    let delta = (f64::from(max) - min) / nbins;
    RebinOutcome::Rebinned(samples.mapv(|v| (f64::from(v) - min) / delta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn half_range_bins_halves_the_levels() {
        assert_eq!(half_range_bins(1100, 4100), 1500.5);
        assert_eq!(half_range_bins(0, 255), 128.0);
    }

    #[test]
    fn min_maps_to_zero_and_max_to_nbins() {
        let samples = array![[1000, 2000], [3000, 5000]];
        let out = rebin(&samples, 100.0).into_inner();
        assert_eq!(out, array![[0.0, 25.0], [50.0, 100.0]]);
    }

    #[test]
    fn rebinning_preserves_order() {
        let samples = array![[7, -3, 12, 12, 40, 0, 25, 1]];
        let out = rebin(&samples, half_range_bins(-3, 40)).into_inner();
        let pairs: Vec<(i32, f64)> = samples.iter().copied().zip(out.iter().copied()).collect();
        for &(a, ra) in &pairs {
            for &(b, rb) in &pairs {
                assert_eq!(a.cmp(&b), ra.total_cmp(&rb), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn zero_based_slice_with_unit_bins_is_unchanged() {
        let samples = array![[0, 3, 9], [4, 4, 1]];
        let out = rebin(&samples, 9.0).into_inner();
        assert_eq!(out, samples.mapv(f64::from));

        // A second pass with the same bin count is still a no-op.
        let again = rebin(&out.mapv(|v| v as i32), 9.0).into_inner();
        assert_eq!(again, out);
    }

    #[test]
    fn flat_slice_becomes_zero() {
        let samples = Array2::from_elem((3, 3), 1100);
        let outcome = rebin(&samples, half_range_bins(1100, 1100));
        assert!(outcome.is_flat());
        assert!(outcome.into_inner().iter().all(|&v| v == 0.0));
    }
}
