//! Summary statistics over simulation samples.
//!
//! Inputs are whole-day durations and cent amounts, so sums are kept as
//! `i128` and the results do not depend on the order samples arrive in.

use crate::models::{div_round, Money};

use super::types::HistogramBin;

/// Value at percentile `p` (0..=100) of a sorted sample, interpolating
/// linearly between the two nearest ranks.
pub fn percentile(sorted: &[i64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0] as f64,
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let weight = rank - lo as f64;
            sorted[lo] as f64 + (sorted[hi] - sorted[lo]) as f64 * weight
        }
    }
}

/// Money percentile with the same interpolation, in integer cents.
pub fn money_percentile(sorted_cents: &[i64], level: u8) -> Money {
    match sorted_cents.len() {
        0 => Money::ZERO,
        1 => Money(sorted_cents[0]),
        n => {
            let scaled = level.min(100) as usize * (n - 1);
            let lo = scaled / 100;
            let remainder = (scaled % 100) as i128;
            let base = sorted_cents[lo] as i128;
            let step = if remainder == 0 {
                0
            } else {
                sorted_cents[lo + 1] as i128 - base
            };
            Money((base + div_round(step * remainder, 100)) as i64)
        }
    }
}

/// Mean and sample standard deviation.
pub fn mean_std_dev(values: &[i64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let sum: i128 = values.iter().map(|&v| v as i128).sum();
    let sum_sq: i128 = values.iter().map(|&v| (v as i128) * (v as i128)).sum();
    let mean = sum as f64 / n as f64;
    if n == 1 {
        return (mean, 0.0);
    }
    // n * sum_sq - sum^2 is exact and never negative
    let numerator = (n as i128 * sum_sq - sum * sum) as f64;
    let variance = numerator / (n as f64 * (n - 1) as f64);
    (mean, variance.max(0.0).sqrt())
}

/// Equal-width histogram over [min, max] of a sorted sample.
///
/// A sample with a single distinct value yields one bin.
pub fn histogram(sorted: &[i64], bins: u32) -> Vec<HistogramBin> {
    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return Vec::new();
    };
    let total = sorted.len() as f64;
    if min == max || bins <= 1 {
        return vec![HistogramBin {
            lower: min as f64,
            upper: max as f64,
            count: sorted.len() as u32,
            frequency: 1.0,
        }];
    }

    let width = (max - min) as f64 / bins as f64;
    let mut counts = vec![0u32; bins as usize];
    for &value in sorted {
        // The max value falls into the last bin
        let bin = (((value - min) as f64 / width) as usize).min(bins as usize - 1);
        counts[bin] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: min as f64 + width * i as f64,
            upper: if i + 1 == bins as usize {
                max as f64
            } else {
                min as f64 + width * (i + 1) as f64
            },
            count,
            frequency: count as f64 / total,
        })
        .collect()
}

/// Running sums for a Pearson correlation between two integer series.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PearsonSums {
    n: i128,
    sum_x: i128,
    sum_y: i128,
    sum_xx: i128,
    sum_yy: i128,
    sum_xy: i128,
}

impl PearsonSums {
    #[inline]
    pub fn add(&mut self, x: i64, y: i64) {
        let (x, y) = (x as i128, y as i128);
        self.n += 1;
        self.sum_x += x;
        self.sum_y += y;
        self.sum_xx += x * x;
        self.sum_yy += y * y;
        self.sum_xy += x * y;
    }

    pub fn merge(&mut self, other: &PearsonSums) {
        self.n += other.n;
        self.sum_x += other.sum_x;
        self.sum_y += other.sum_y;
        self.sum_xx += other.sum_xx;
        self.sum_yy += other.sum_yy;
        self.sum_xy += other.sum_xy;
    }

    /// Correlation coefficient; 0 when either series has no variance.
    pub fn coefficient(&self) -> f64 {
        let n = self.n;
        let var_x = n * self.sum_xx - self.sum_x * self.sum_x;
        let var_y = n * self.sum_yy - self.sum_y * self.sum_y;
        if n < 2 || var_x <= 0 || var_y <= 0 {
            return 0.0;
        }
        let cov = n * self.sum_xy - self.sum_x * self.sum_y;
        let r = cov as f64 / ((var_x as f64).sqrt() * (var_y as f64).sqrt());
        r.clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [10, 20, 30, 40, 50];
        assert_eq!(percentile(&sorted, 0.0), 10.0);
        assert_eq!(percentile(&sorted, 50.0), 30.0);
        assert_eq!(percentile(&sorted, 100.0), 50.0);
        // rank 0.1 * 4 = 0.4
        assert!((percentile(&sorted, 10.0) - 14.0).abs() < 1e-9);
        assert_eq!(percentile(&[7], 90.0), 7.0);
        assert_eq!(percentile(&[], 90.0), 0.0);
    }

    #[test]
    fn test_money_percentile_integer() {
        let sorted = [1000, 2000, 3000, 4000, 5000];
        assert_eq!(money_percentile(&sorted, 50), Money(3000));
        assert_eq!(money_percentile(&sorted, 10), Money(1400));
        assert_eq!(money_percentile(&sorted, 95), Money(4800));
        assert_eq!(money_percentile(&sorted, 100), Money(5000));
    }

    #[test]
    fn test_mean_std_dev() {
        let (mean, std_dev) = mean_std_dev(&[2, 4, 4, 4, 5, 5, 7, 9]);
        assert_eq!(mean, 5.0);
        // sample variance 32 / 7
        assert!((std_dev - (32.0f64 / 7.0).sqrt()).abs() < 1e-9);
        assert_eq!(mean_std_dev(&[3]), (3.0, 0.0));
    }

    #[test]
    fn test_histogram_counts_every_sample() {
        let sorted = [10, 11, 12, 15, 19, 20];
        let bins = histogram(&sorted, 5);
        assert_eq!(bins.len(), 5);
        assert_eq!(bins.iter().map(|b| b.count).sum::<u32>(), 6);
        assert_eq!(bins[0].lower, 10.0);
        assert_eq!(bins[4].upper, 20.0);
        assert_eq!(bins[4].count, 2);
        assert!((bins.iter().map(|b| b.frequency).sum::<f64>() - 1.0).abs() < 1e-9);

        let flat = histogram(&[5, 5, 5], 10);
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].count, 3);
    }

    #[test]
    fn test_pearson() {
        let mut perfect = PearsonSums::default();
        let mut inverse = PearsonSums::default();
        let mut flat = PearsonSums::default();
        for x in 0..10 {
            perfect.add(x, 2 * x + 3);
            inverse.add(x, 100 - x);
            flat.add(4, x);
        }
        assert!((perfect.coefficient() - 1.0).abs() < 1e-12);
        assert!((inverse.coefficient() + 1.0).abs() < 1e-12);
        assert_eq!(flat.coefficient(), 0.0);

        let mut left = PearsonSums::default();
        let mut right = PearsonSums::default();
        for x in 0..5 {
            left.add(x, 2 * x + 3);
        }
        for x in 5..10 {
            right.add(x, 2 * x + 3);
        }
        left.merge(&right);
        assert_eq!(left, perfect);
    }
}
