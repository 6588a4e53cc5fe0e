//! Host matrices, device handles and dispatch geometry

use crate::error::ConfigurationError;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Lower bound of generated matrix entries
pub const RANDOM_LOWER_BOUND: f32 = 0.0;
/// Upper bound (exclusive) of generated matrix entries
pub const RANDOM_UPPER_BOUND: f32 = 1.0;

/// Square, row-major single-precision matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    n: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    /// Uniformly distributed entries in `[0, 1)` from a fixed seed
    pub fn random(n: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let dist = Uniform::new(RANDOM_LOWER_BOUND, RANDOM_UPPER_BOUND);
        Self {
            n,
            data: (0..n * n).map(|_| dist.sample(&mut rng)).collect(),
        }
    }

    pub fn from_vec(n: usize, data: Vec<f32>) -> Result<Self, ConfigurationError> {
        if data.len() != n * n {
            return Err(ConfigurationError::InvalidValue {
                key: "matrix".to_string(),
                value: data.len().to_string(),
                reason: format!("expected {} elements for a {n}x{n} matrix", n * n),
            });
        }
        Ok(Self { n, data })
    }

    pub(crate) fn from_parts(n: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), n * n);
        Self { n, data }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.n + col]
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.n..(row + 1) * self.n]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        std::mem::size_of_val(self.data.as_slice())
    }

    /// This matrix in the top-left corner of a zeroed `padded_n` square
    ///
    /// Borrows `self` when no padding is needed.
    pub fn padded(&self, padded_n: usize) -> Cow<'_, Matrix> {
        debug_assert!(padded_n >= self.n);
        if padded_n == self.n {
            return Cow::Borrowed(self);
        }
        let mut out = Matrix::zeros(padded_n);
        for row in 0..self.n {
            out.data[row * padded_n..row * padded_n + self.n].copy_from_slice(self.row(row));
        }
        Cow::Owned(out)
    }

    /// The leading `n x n` submatrix, compacted in place
    pub fn top_left(mut self, n: usize) -> Matrix {
        debug_assert!(n <= self.n);
        if n == self.n {
            return self;
        }
        // Row r moves to r * n, which never passes its source at r * self.n.
        for row in 1..n {
            let src = row * self.n;
            self.data.copy_within(src..src + n, row * n);
        }
        self.data.truncate(n * n);
        Matrix { n, data: self.data }
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Smallest multiple of `tile` that is `>= n`
pub fn padded_dimension(n: usize, tile: usize) -> usize {
    n.div_ceil(tile) * tile
}

/// Work groups needed to cover `extent` elements with `tile`-wide groups; never zero
pub fn groups_for(extent: usize, tile: usize) -> u32 {
    u32::try_from(extent.div_ceil(tile).max(1)).unwrap_or(u32::MAX)
}

/// Fixed shader storage binding slots for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Binding {
    A,
    B,
    C,
}

impl Binding {
    pub const ALL: [Binding; 3] = [Binding::A, Binding::B, Binding::C];

    pub fn index(self) -> u32 {
        match self {
            Binding::A => 0,
            Binding::B => 1,
            Binding::C => 2,
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Binding::A => "A",
            Binding::B => "B",
            Binding::C => "C",
        };
        write!(f, "{name}@{}", self.index())
    }
}

/// Device buffer name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Linked compute program name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Work group counts for one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkGroups {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl WorkGroups {
    /// Groups covering a `cols x rows` region with square tiles
    pub fn covering(cols: usize, rows: usize, tile: usize) -> Self {
        Self {
            x: groups_for(cols, tile),
            y: groups_for(rows, tile),
            z: 1,
        }
    }

    pub fn as_array(&self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }
}

impl fmt::Display for WorkGroups {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_dimension() {
        assert_eq!(padded_dimension(1000, 16), 1008);
        assert_eq!(padded_dimension(1024, 16), 1024);
        assert_eq!(padded_dimension(1, 16), 16);
        for n in 1..200 {
            let padded = padded_dimension(n, 16);
            assert!(padded >= n);
            assert_eq!(padded % 16, 0);
            assert!(padded - n < 16);
        }
    }

    #[test]
    fn test_groups_never_zero() {
        assert_eq!(groups_for(0, 16), 1);
        assert_eq!(groups_for(1, 16), 1);
        assert_eq!(groups_for(16, 16), 1);
        assert_eq!(groups_for(17, 16), 2);
        assert_eq!(groups_for(128, 16), 8);
    }

    #[test]
    fn test_random_is_deterministic_and_bounded() {
        let a = Matrix::random(8, 123);
        let b = Matrix::random(8, 123);
        let c = Matrix::random(8, 456);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a
            .as_slice()
            .iter()
            .all(|v| (RANDOM_LOWER_BOUND..RANDOM_UPPER_BOUND).contains(v)));
    }

    #[test]
    fn test_padding_keeps_values_and_zeroes_border() {
        let m = Matrix::from_vec(3, (1..=9).map(|v| v as f32).collect()).unwrap();
        let p = m.padded(4);

        assert_eq!(p.n(), 4);
        assert_eq!(p.row(0), &[1.0, 2.0, 3.0, 0.0]);
        assert_eq!(p.row(2), &[7.0, 8.0, 9.0, 0.0]);
        assert_eq!(p.row(3), &[0.0; 4]);
        assert_eq!(p.into_owned().top_left(3), m);
    }

    #[test]
    fn test_padding_to_same_size_borrows() {
        let m = Matrix::random(8, 1);
        let p = m.padded(8);
        assert!(matches!(p, Cow::Borrowed(_)));
        assert!(std::ptr::eq(p.as_slice().as_ptr(), m.as_slice().as_ptr()));
    }

    #[test]
    fn test_top_left_reuses_storage() {
        let m = Matrix::from_vec(4, (0..16).map(|v| v as f32).collect()).unwrap();
        let same = m.clone().top_left(4);
        assert_eq!(same, m);

        let ptr = m.as_slice().as_ptr();
        let cropped = m.top_left(3);
        assert_eq!(cropped.n(), 3);
        assert_eq!(
            cropped.as_slice(),
            &[0.0, 1.0, 2.0, 4.0, 5.0, 6.0, 8.0, 9.0, 10.0]
        );
        assert!(std::ptr::eq(cropped.as_slice().as_ptr(), ptr));
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        assert!(Matrix::from_vec(3, vec![0.0; 8]).is_err());
    }

    #[test]
    fn test_byte_len() {
        assert_eq!(Matrix::zeros(4).byte_len(), 64);
    }

    #[test]
    fn test_binding_indices_are_fixed() {
        let indices: Vec<u32> = Binding::ALL.iter().map(|b| b.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(Binding::C.to_string(), "C@2");
    }
}
