//! A symmetric matrix stored as a lower triangle, no diagonal.
//!
//! spec.md §9's redesign note replaces the original's inheritance-based
//! symmetric-matrix hierarchy (`original_source/.../types/symmetric_matrix.hpp`)
//! with a plain generic struct: half storage, an `(i, j) -> index` mapping,
//! and iteration only over the cells that are actually defined (`i != j`).
//! Every matrix in this crate is indexed by relay pairs, which are never
//! taken against a relay and itself, so the diagonal is never allocated.

/// A symmetric `n x n` matrix over distinct index pairs, stored as a
/// lower triangle (`row > col`) with no diagonal.
#[derive(Clone, Debug)]
pub struct TriMatrix<T> {
    n: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> TriMatrix<T> {
    /// A new `n x n` matrix with every defined cell set to `T::default()`.
    pub fn new(n: usize) -> Self {
        let len = triangle_len(n);
        TriMatrix {
            n,
            data: vec![T::default(); len],
        }
    }
}

impl<T> TriMatrix<T> {
    /// The matrix's dimension.
    pub fn dim(&self) -> usize {
        self.n
    }

    fn cell_index(&self, i: usize, j: usize) -> usize {
        assert_ne!(i, j, "TriMatrix has no diagonal entries");
        assert!(i < self.n && j < self.n, "index out of bounds");
        let (row, col) = if i > j { (i, j) } else { (j, i) };
        triangle_len(row) + col
    }

    /// Read the cell for the symmetric pair `(i, j)`.
    ///
    /// # Panics
    /// Panics if `i == j` or either index is out of bounds — an
    /// out-of-range index anywhere in this system is a programming error
    /// (spec.md §7's `OutOfRangeIndex`), not a recoverable condition.
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[self.cell_index(i, j)]
    }

    /// Write the cell for the symmetric pair `(i, j)`.
    pub fn set(&mut self, i: usize, j: usize, value: T) {
        let idx = self.cell_index(i, j);
        self.data[idx] = value;
    }

    /// Iterate over every defined `(i, j, &value)` triple, `i > j`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        let n = self.n;
        self.data.iter().enumerate().map(move |(idx, v)| {
            let (i, j) = unrank(idx, n);
            (i, j, v)
        })
    }
}

/// Number of defined cells in the lower triangle (no diagonal) of an `n x
/// n` matrix: `0 + 1 + ... + (n - 1)`.
fn triangle_len(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Inverse of `triangle_len`-based ranking: map a flat index back to its
/// `(row, col)` pair, `row > col`.
fn unrank(mut idx: usize, n: usize) -> (usize, usize) {
    let mut row = 1;
    while row < n {
        let row_len = row;
        if idx < row_len {
            return (row, idx);
        }
        idx -= row_len;
        row += 1;
    }
    unreachable!("flat index {idx} out of range for dimension {n}")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn get_set_roundtrip() {
        let mut m: TriMatrix<f64> = TriMatrix::new(5);
        m.set(3, 1, 2.5);
        assert_eq!(*m.get(3, 1), 2.5);
        assert_eq!(*m.get(1, 3), 2.5, "matrix must be symmetric by construction");
    }

    #[test]
    fn defaults_to_zero() {
        let m: TriMatrix<f64> = TriMatrix::new(4);
        assert_eq!(*m.get(2, 0), 0.0);
    }

    #[test]
    #[should_panic]
    fn diagonal_access_panics() {
        let m: TriMatrix<f64> = TriMatrix::new(4);
        let _ = m.get(2, 2);
    }

    #[test]
    fn iter_covers_every_defined_cell_once() {
        let n = 6;
        let mut m: TriMatrix<u32> = TriMatrix::new(n);
        let mut count = 0u32;
        for i in 0..n {
            for j in 0..i {
                count += 1;
                m.set(i, j, count);
            }
        }
        let collected: Vec<_> = m.iter().collect();
        assert_eq!(collected.len(), triangle_len(n));
        for (i, j, v) in collected {
            assert!(i > j);
            assert_eq!(*m.get(i, j), *v);
        }
    }
}
