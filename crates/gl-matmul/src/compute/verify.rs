//! Host-side checks of a device product

use super::types::Matrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Absolute difference above which an element counts as a mismatch
pub const MISMATCH_THRESHOLD: f64 = 1e-3;
/// Relative L2 error below which a full check passes
pub const RELATIVE_ERROR_THRESHOLD: f64 = 1e-4;
/// Mismatches kept in a full check report
pub const MAX_REPORTED_MISMATCHES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub row: usize,
    pub col: usize,
    pub gpu: f64,
    pub host: f64,
    pub abs_diff: f64,
}

/// First, one interior and last element of an `n x n` product
pub fn default_points(n: usize) -> Vec<(usize, usize)> {
    if n == 0 {
        return Vec::new();
    }
    vec![(0, 0), (n / 2, n / 3), (n - 1, n - 1)]
}

/// Row `row` of `a` dotted with column `col` of `b`, accumulated in f64
pub fn reference_dot(a: &Matrix, b: &Matrix, row: usize, col: usize) -> f64 {
    a.row(row)
        .iter()
        .enumerate()
        .map(|(k, &a_ik)| a_ik as f64 * b.get(k, col) as f64)
        .sum()
}

/// Compares the given cells of `c` against a host reference
///
/// Points outside the matrix are skipped.
pub fn sample(c: &Matrix, a: &Matrix, b: &Matrix, points: &[(usize, usize)]) -> Vec<Sample> {
    let n = c.n();
    points
        .iter()
        .filter(|(row, col)| *row < n && *col < n)
        .map(|&(row, col)| {
            let gpu = c.get(row, col) as f64;
            let host = reference_dot(a, b, row, col);
            Sample {
                row,
                col,
                gpu,
                host,
                abs_diff: (gpu - host).abs(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub row: usize,
    pub col: usize,
    pub got: f32,
    pub expected: f32,
    pub diff: f32,
}

/// Outcome of comparing every element against a host product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullCheck {
    pub relative_l2_error: f64,
    pub mismatches: Vec<Mismatch>,
    pub passed: bool,
}

/// Serial host product in i-k-j order
pub fn host_product(a: &Matrix, b: &Matrix) -> Matrix {
    let n = a.n();
    let mut c = vec![0.0f32; n * n];
    for i in 0..n {
        let a_row = a.row(i);
        let c_row = &mut c[i * n..(i + 1) * n];
        for (k, &a_ik) in a_row.iter().enumerate() {
            for (c_ij, &b_kj) in c_row.iter_mut().zip(b.row(k)) {
                *c_ij += a_ik * b_kj;
            }
        }
    }
    Matrix::from_parts(n, c)
}

/// Compares all of `c` against the host product of `a` and `b`
pub fn full_check(c: &Matrix, a: &Matrix, b: &Matrix) -> FullCheck {
    let reference = host_product(a, b);
    let n = c.n();
    let mut diff_sum = 0.0f64;
    let mut ref_sum = 0.0f64;
    let mut mismatches = Vec::new();

    for (i, (&got, &expected)) in c.as_slice().iter().zip(reference.as_slice()).enumerate() {
        let diff = (got - expected).abs();
        if diff as f64 > MISMATCH_THRESHOLD && mismatches.len() < MAX_REPORTED_MISMATCHES {
            mismatches.push(Mismatch {
                row: i / n,
                col: i % n,
                got,
                expected,
                diff,
            });
        }
        diff_sum += (got as f64 - expected as f64).powi(2);
        ref_sum += (expected as f64).powi(2);
    }

    let relative_l2_error = (diff_sum / (ref_sum + 1e-12)).sqrt();
    debug!("Full check relative L2 error {:.3e}", relative_l2_error);
    FullCheck {
        relative_l2_error,
        mismatches,
        passed: relative_l2_error < RELATIVE_ERROR_THRESHOLD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(n: usize) -> Matrix {
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Matrix::from_vec(n, data).unwrap()
    }

    #[test]
    fn test_default_points() {
        assert_eq!(default_points(128), vec![(0, 0), (64, 42), (127, 127)]);
        assert_eq!(default_points(1), vec![(0, 0), (0, 0), (0, 0)]);
    }

    #[test]
    fn test_sample_against_identity() {
        let a = Matrix::random(16, 123);
        let c = a.clone();
        let samples = sample(&c, &a, &identity(16), &default_points(16));

        assert_eq!(samples.len(), 3);
        for s in &samples {
            assert!(s.abs_diff < 1e-6, "{s:?}");
        }
        assert_eq!((samples[1].row, samples[1].col), (8, 5));
    }

    #[test]
    fn test_sample_reports_differences() {
        let a = identity(4);
        let b = identity(4);
        let c = Matrix::from_vec(4, vec![2.0; 16]).unwrap();
        let samples = sample(&c, &a, &b, &[(0, 0), (0, 1)]);
        assert_eq!(samples[0].abs_diff, 1.0);
        assert_eq!(samples[1].abs_diff, 2.0);
    }

    #[test]
    fn test_host_product_small() {
        let a = Matrix::from_vec(2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Matrix::from_vec(2, vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        assert_eq!(host_product(&a, &b).as_slice(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_full_check_passes_on_exact_product() {
        let a = Matrix::random(24, 1);
        let b = Matrix::random(24, 2);
        let c = host_product(&a, &b);
        let check = full_check(&c, &a, &b);
        assert!(check.passed);
        assert!(check.mismatches.is_empty());
    }

    #[test]
    fn test_full_check_caps_reported_mismatches() {
        let a = Matrix::random(8, 1);
        let b = Matrix::random(8, 2);
        let c = Matrix::zeros(8);
        let check = full_check(&c, &a, &b);
        assert!(!check.passed);
        assert_eq!(check.mismatches.len(), MAX_REPORTED_MISMATCHES);
        assert_eq!((check.mismatches[1].row, check.mismatches[1].col), (0, 1));
    }
}
