//! Temporal alignment and correlation of keyed series.

use std::cmp::Ordering;

use monarch_map_analytics_models::{
    Correlation, CorrelationResult, TimeSeries, UndefinedReason,
};

/// Inner-joins two series on their keys and computes Pearson's r over the
/// shared keys.
///
/// Keys present in only one series are dropped. With fewer than two
/// shared keys, or when either side is constant over the shared keys, the
/// result is [`Correlation::Undefined`] rather than a number.
#[must_use]
pub fn align<K: Ord>(a: &TimeSeries<K>, b: &TimeSeries<K>) -> CorrelationResult {
    let pairs = paired_values(a, b);
    let correlation = pearson(&pairs);

    log::debug!(
        "Aligned {:?} with {:?} over {} shared keys: {correlation:?}",
        a.name(),
        b.name(),
        pairs.len()
    );

    CorrelationResult {
        series_a: a.name().to_string(),
        series_b: b.name().to_string(),
        common_key_count: pairs.len(),
        correlation,
    }
}

/// Correlates every unordered pair of series, in input order.
#[must_use]
pub fn align_many<K: Ord>(series: &[TimeSeries<K>]) -> Vec<CorrelationResult> {
    let mut results = Vec::new();
    for (i, a) in series.iter().enumerate() {
        for b in &series[i + 1..] {
            results.push(align(a, b));
        }
    }
    results
}

/// Values of both series at each shared key, in key order.
#[must_use]
pub fn paired_values<K: Ord>(a: &TimeSeries<K>, b: &TimeSeries<K>) -> Vec<(f64, f64)> {
    let (left, right) = (a.points(), b.points());
    let mut pairs = Vec::with_capacity(left.len().min(right.len()));
    let (mut i, mut j) = (0, 0);

    while i < left.len() && j < right.len() {
        match left[i].key.cmp(&right[j].key) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                pairs.push((left[i].value, right[j].value));
                i += 1;
                j += 1;
            }
        }
    }

    pairs
}

/// Pearson product-moment correlation of paired samples.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pearson(pairs: &[(f64, f64)]) -> Correlation {
    if pairs.len() < 2 {
        return Correlation::Undefined {
            reason: UndefinedReason::InsufficientOverlap,
        };
    }

    if is_constant(pairs.iter().map(|p| p.0)) || is_constant(pairs.iter().map(|p| p.1)) {
        return Correlation::Undefined {
            reason: UndefinedReason::ZeroVariance,
        };
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for &(x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    let denominator = sxx.sqrt() * syy.sqrt();
    let coefficient = sxy / denominator;

    // Deviations can underflow to zero or overflow to infinity at extreme
    // magnitudes.
    if denominator == 0.0 || !coefficient.is_finite() {
        return Correlation::Undefined {
            reason: UndefinedReason::ZeroVariance,
        };
    }

    Correlation::Defined {
        coefficient: coefficient.clamp(-1.0, 1.0),
    }
}

#[allow(clippy::float_cmp)]
fn is_constant(mut values: impl Iterator<Item = f64>) -> bool {
    values
        .next()
        .is_none_or(|first| values.all(|value| value == first))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(name: &str, points: &[(i32, f64)]) -> TimeSeries<i32> {
        TimeSeries::new(name, points.iter().copied()).unwrap()
    }

    fn assert_close(correlation: Correlation, expected: f64) {
        let coefficient = correlation.coefficient().expect("defined correlation");
        assert!(
            (coefficient - expected).abs() < 1e-9,
            "expected {expected}, got {coefficient}"
        );
    }

    #[test]
    fn perfectly_correlated_series() {
        let a = series("texas", &[(2021, 10.0), (2022, 20.0), (2023, 30.0)]);
        let b = series("other", &[(2021, 1.0), (2022, 2.0), (2023, 3.0)]);

        let result = align(&a, &b);
        assert_eq!(result.common_key_count, 3);
        assert_eq!(result.series_a, "texas");
        assert_eq!(result.series_b, "other");
        assert_close(result.correlation, 1.0);
    }

    #[test]
    fn anti_correlated_series() {
        let a = series("a", &[(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0)]);
        let b = series("b", &[(1, 8.0), (2, 6.0), (3, 4.0), (4, 2.0)]);

        assert_close(align(&a, &b).correlation, -1.0);
    }

    #[test]
    fn only_shared_keys_are_used() {
        let a = series("a", &[(2019, 100.0), (2020, 1.0), (2021, 2.0), (2022, 3.0)]);
        let b = series("b", &[(2020, 2.0), (2021, 4.0), (2022, 6.0), (2030, -50.0)]);

        let result = align(&a, &b);
        assert_eq!(result.common_key_count, 3);
        assert_close(result.correlation, 1.0);
    }

    #[test]
    fn disjoint_keys_are_undefined() {
        let a = series("a", &[(2021, 1.0), (2022, 2.0)]);
        let b = series("b", &[(2023, 1.0), (2024, 2.0)]);

        let result = align(&a, &b);
        assert_eq!(result.common_key_count, 0);
        assert_eq!(
            result.correlation,
            Correlation::Undefined {
                reason: UndefinedReason::InsufficientOverlap
            }
        );
    }

    #[test]
    fn single_shared_key_is_undefined() {
        let a = series("a", &[(2021, 1.0), (2022, 2.0)]);
        let b = series("b", &[(2022, 5.0), (2023, 7.0)]);

        let result = align(&a, &b);
        assert_eq!(result.common_key_count, 1);
        assert_eq!(
            result.correlation,
            Correlation::Undefined {
                reason: UndefinedReason::InsufficientOverlap
            }
        );
    }

    #[test]
    fn constant_series_is_undefined() {
        let a = series("a", &[(1, 0.1), (2, 0.1), (3, 0.1)]);
        let b = series("b", &[(1, 1.0), (2, 5.0), (3, 2.0)]);

        assert_eq!(
            align(&a, &b).correlation,
            Correlation::Undefined {
                reason: UndefinedReason::ZeroVariance
            }
        );
        assert_eq!(
            align(&b, &a).correlation,
            Correlation::Undefined {
                reason: UndefinedReason::ZeroVariance
            }
        );
    }

    #[test]
    fn coefficient_is_symmetric_and_bounded() {
        let a = series("a", &[(1, 3.0), (2, 9.0), (3, 4.0), (4, 11.0), (5, 2.0)]);
        let b = series("b", &[(1, 1.0), (2, 7.0), (3, 2.0), (4, 3.0), (5, 6.0)]);

        let ab = align(&a, &b).correlation.coefficient().unwrap();
        let ba = align(&b, &a).correlation.coefficient().unwrap();
        assert!((ab - ba).abs() < 1e-12);
        assert!((-1.0..=1.0).contains(&ab));
    }

    #[test]
    fn align_many_covers_each_pair_once() {
        let all = vec![
            series("a", &[(1, 1.0), (2, 2.0)]),
            series("b", &[(1, 2.0), (2, 4.0)]),
            series("c", &[(1, 4.0), (2, 1.0)]),
        ];

        let results = align_many(&all);
        let names: Vec<(&str, &str)> = results
            .iter()
            .map(|r| (r.series_a.as_str(), r.series_b.as_str()))
            .collect();
        assert_eq!(names, vec![("a", "b"), ("a", "c"), ("b", "c")]);
    }

    #[test]
    fn too_few_samples_for_pearson() {
        assert_eq!(
            pearson(&[]),
            Correlation::Undefined {
                reason: UndefinedReason::InsufficientOverlap
            }
        );
        assert_eq!(
            pearson(&[(1.0, 2.0)]),
            Correlation::Undefined {
                reason: UndefinedReason::InsufficientOverlap
            }
        );
    }
}
