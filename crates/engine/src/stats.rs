//! # Rank Statistics
//!
//! Deterministic, pure statistical primitives for the correlation analyzer:
//! midrank assignment, the two-sided Mann-Whitney U test (tie-corrected
//! normal approximation with continuity correction), Spearman rank
//! correlation with a t-based two-sided p, and Bonferroni correction.
//!
//! Edge policies are explicit and tested rather than left to float
//! arithmetic: an empty sample yields `None`, an all-tied comparison yields
//! p = 1.0, and a perfect monotone correlation yields p = 0.
//!
//! ## Table of Contents
//! 1. Midranks
//! 2. Mann-Whitney U
//! 3. Spearman rank correlation
//! 4. Bonferroni correction
//! 5. Distribution tails

use statrs::function::beta::beta_reg;
use statrs::function::erf::erfc;

// ============================================================================
// 1. Midranks
// ============================================================================

/// Assign 1-based ranks with ties receiving the group average (midranks).
pub fn midranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // average of 1-based positions i+1 ..= j+1
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = rank;
        }
        i = j + 1;
    }
    ranks
}

// ============================================================================
// 2. Mann-Whitney U
// ============================================================================

/// Mann-Whitney U result.
#[derive(Debug, Clone, Copy)]
pub struct MannWhitney {
    /// The smaller of U1/U2
    pub u: f64,
    /// Standardized statistic (continuity-corrected)
    pub z: f64,
    /// Two-sided p-value
    pub p_value: f64,
}

/// Two-sided Mann-Whitney U test on two independent samples.
///
/// Uses the normal approximation with tie-corrected variance and a 0.5
/// continuity correction. Returns `None` when either sample is empty; a
/// fully tied comparison (zero variance) reports p = 1.0.
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> Option<MannWhitney> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let n = n1 + n2;

    let mut combined: Vec<f64> = Vec::with_capacity(a.len() + b.len());
    combined.extend_from_slice(a);
    combined.extend_from_slice(b);
    let ranks = midranks(&combined);

    let r1: f64 = ranks[..a.len()].iter().sum();
    let u1 = r1 - n1 * (n1 + 1.0) / 2.0;
    let u2 = n1 * n2 - u1;
    let u = u1.min(u2);

    // tie correction: sum of t^3 - t over tie groups of the combined sample
    let mut sorted = combined;
    sorted.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j + 1 < sorted.len() && sorted[j + 1] == sorted[i] {
            j += 1;
        }
        let t = (j - i + 1) as f64;
        tie_term += t.powi(3) - t;
        i = j + 1;
    }

    let variance = n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));
    if variance <= 0.0 {
        // every value equal: no evidence of a difference
        return Some(MannWhitney { u, z: 0.0, p_value: 1.0 });
    }

    let mean = n1 * n2 / 2.0;
    let z = ((u - mean).abs() - 0.5).max(0.0) / variance.sqrt();
    Some(MannWhitney { u, z, p_value: normal_two_sided_p(z) })
}

// ============================================================================
// 3. Spearman rank correlation
// ============================================================================

/// Spearman result.
#[derive(Debug, Clone, Copy)]
pub struct SpearmanRho {
    /// Rank correlation coefficient in [-1, 1]
    pub rho: f64,
    /// Two-sided p-value
    pub p_value: f64,
    /// Sample size
    pub n: usize,
}

/// Spearman rank correlation: Pearson correlation of midranks, with a
/// two-sided p from the t-distribution on n-2 degrees of freedom.
///
/// Returns `None` for mismatched or too-short inputs (n < 3) and for
/// zero-variance sides, where the coefficient is undefined.
pub fn spearman(x: &[f64], y: &[f64]) -> Option<SpearmanRho> {
    if x.len() != y.len() || x.len() < 3 {
        return None;
    }
    let n = x.len();
    let rx = midranks(x);
    let ry = midranks(y);

    let mean_x: f64 = rx.iter().sum::<f64>() / n as f64;
    let mean_y: f64 = ry.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = rx[i] - mean_x;
        let dy = ry[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }

    let rho = (cov / (var_x * var_y).sqrt()).clamp(-1.0, 1.0);
    let df = (n - 2) as f64;
    let p_value = if 1.0 - rho * rho < f64::EPSILON {
        0.0
    } else {
        let t = rho * (df / (1.0 - rho * rho)).sqrt();
        t_two_sided_p(t, df)
    };
    Some(SpearmanRho { rho, p_value, n })
}

// ============================================================================
// 4. Bonferroni correction
// ============================================================================

/// Bonferroni family-wise correction: multiply by the family size, clamp
/// to 1. Monotone: the corrected p never drops below the raw p.
pub fn bonferroni(p: f64, family_size: usize) -> f64 {
    (p * family_size.max(1) as f64).min(1.0)
}

// ============================================================================
// 5. Distribution tails
// ============================================================================

/// Two-sided normal tail: P(|Z| >= z).
fn normal_two_sided_p(z: f64) -> f64 {
    erfc(z.abs() / std::f64::consts::SQRT_2).clamp(0.0, 1.0)
}

/// Two-sided t tail on `df` degrees of freedom, via the regularized
/// incomplete beta function: P(|T| >= t) = I_{df/(df+t^2)}(df/2, 1/2).
fn t_two_sided_p(t: f64, df: f64) -> f64 {
    beta_reg(df / 2.0, 0.5, df / (df + t * t)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midranks_no_ties() {
        assert_eq!(midranks(&[10.0, 30.0, 20.0]), vec![1.0, 3.0, 2.0]);
    }

    #[test]
    fn test_midranks_with_ties() {
        // 5.0 occupies positions 2 and 3 -> both rank 2.5
        assert_eq!(midranks(&[1.0, 5.0, 5.0, 9.0]), vec![1.0, 2.5, 2.5, 4.0]);
        // all equal -> all midrank
        assert_eq!(midranks(&[7.0, 7.0, 7.0]), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_mann_whitney_empty_sample() {
        assert!(mann_whitney_u(&[], &[1.0, 2.0]).is_none());
        assert!(mann_whitney_u(&[1.0], &[]).is_none());
    }

    #[test]
    fn test_mann_whitney_all_tied() {
        let result = mann_whitney_u(&[3.0, 3.0, 3.0], &[3.0, 3.0, 3.0]).unwrap();
        assert_eq!(result.p_value, 1.0);
        assert_eq!(result.z, 0.0);
    }

    #[test]
    fn test_mann_whitney_identical_distributions() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [1.0, 2.0, 3.0, 4.0, 5.0];
        let result = mann_whitney_u(&a, &b).unwrap();
        assert!(result.p_value > 0.5, "p = {}", result.p_value);
    }

    #[test]
    fn test_mann_whitney_separated_samples() {
        let a: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let result = mann_whitney_u(&a, &b).unwrap();
        assert_eq!(result.u, 0.0);
        assert!(result.p_value < 0.001, "p = {}", result.p_value);
    }

    #[test]
    fn test_mann_whitney_deterministic() {
        let a = [1.0, 4.0, 2.5, 7.0];
        let b = [3.0, 3.0, 8.0];
        let p1 = mann_whitney_u(&a, &b).unwrap().p_value;
        let p2 = mann_whitney_u(&a, &b).unwrap().p_value;
        assert_eq!(p1, p2);
    }

    #[test]
    fn test_spearman_perfect_monotone() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [10.0, 20.0, 30.0, 40.0, 50.0];
        let result = spearman(&x, &y).unwrap();
        assert_eq!(result.rho, 1.0);
        assert_eq!(result.p_value, 0.0);

        let y_rev = [50.0, 40.0, 30.0, 20.0, 10.0];
        let result = spearman(&x, &y_rev).unwrap();
        assert_eq!(result.rho, -1.0);
    }

    #[test]
    fn test_spearman_too_short_or_degenerate() {
        assert!(spearman(&[1.0, 2.0], &[1.0, 2.0]).is_none());
        assert!(spearman(&[1.0, 2.0, 3.0], &[5.0, 5.0, 5.0]).is_none());
        assert!(spearman(&[1.0, 2.0, 3.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn test_spearman_uncorrelated_is_insignificant() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = [3.0, 1.0, 4.0, 2.0, 6.0, 5.0];
        let result = spearman(&x, &y).unwrap();
        assert!(result.rho.abs() < 1.0);
        assert!(result.p_value > 0.05);
    }

    #[test]
    fn test_bonferroni_monotone_and_clamped() {
        assert_eq!(bonferroni(0.125, 3), 0.375);
        assert_eq!(bonferroni(0.5, 4), 1.0);
        assert_eq!(bonferroni(0.02, 0), 0.02);
        // corrected >= raw, always
        for &p in &[0.0, 0.001, 0.04, 0.2, 1.0] {
            for m in 1..6 {
                assert!(bonferroni(p, m) >= p);
            }
        }
    }

    #[test]
    fn test_normal_tail_sanity() {
        // P(|Z| >= 1.96) ~ 0.05
        let p = normal_two_sided_p(1.96);
        assert!((p - 0.05).abs() < 0.001, "p = {p}");
        assert_eq!(normal_two_sided_p(0.0), 1.0);
    }

    #[test]
    fn test_t_tail_sanity() {
        // wide df approaches the normal tail
        let p = t_two_sided_p(1.96, 1000.0);
        assert!((p - 0.05).abs() < 0.005, "p = {p}");
    }
}
