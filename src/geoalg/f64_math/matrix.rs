use std::ops::{Index, IndexMut};

use crate::partitioner::Partitioner;
use crate::random::Random;

use super::optimized_functions::{dot_product_of_vector_slices, vector_row_max};

/// Matrix is implemented as a single dimensional vector of f64s.
/// This implementation of Matrix is row-major.
/// Rows of a batch are contiguous, so they can be handed to partitions.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Matrix {
    rows: usize,
    columns: usize,
    values: Vec<f64>
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (row, column): (usize, usize)) -> &Self::Output {
        &self.values[self.index_for(row, column)]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (row, column): (usize, usize)) -> &mut Self::Output {
        let index = self.index_for(row, column);
        &mut self.values[index]
    }
}

impl Matrix {
    /// Returns a new Matrix.
    pub fn new(rows: usize, columns: usize, values: Vec<f64>) -> Self {
        assert_eq!(rows * columns, values.len(), "Matrix values must fill rows x columns exactly.");

        Self { rows, columns, values }
    }

    /// Creates a matrix with rows * columns elements where every element is zero.
    pub fn new_zeroed(rows: usize, columns: usize) -> Self {
        Self::new(rows, columns, vec![0.; rows * columns])
    }

    /// Creates a matrix filled with one repeated value.
    pub fn new_filled(rows: usize, columns: usize, value: f64) -> Self {
        Self::new(rows, columns, vec![value; rows * columns])
    }

    /// Returns a rows x columns matrix of zero-mean normal draws scaled by std_dev.
    pub fn new_randomized_normal(rows: usize, columns: usize, std_dev: f64, rng: &mut Random) -> Self {
        let values = (0..rows * columns).map(|_| rng.normal() * std_dev).collect();

        Self::new(rows, columns, values)
    }

    /// Returns size of underlying vector.
    pub fn len(&self) -> usize { self.values.len() }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Returns number of rows this matrix has.
    pub fn row_count(&self) -> usize { self.rows }

    /// Returns number of columns this matrix has.
    pub fn column_count(&self) -> usize { self.columns }

    pub fn shape(&self) -> (usize, usize) { (self.rows, self.columns) }

    /// Returns a slice of the values this matrix has.
    pub fn read_values(&self) -> &[f64] { &self.values }

    pub fn values_mut(&mut self) -> &mut [f64] { &mut self.values }

    pub fn into_values(self) -> Vec<f64> { self.values }

    /// Returns index in vec given row and column.
    pub fn index_for(&self, row: usize, column: usize) -> usize {
        assert!(row < self.rows, "Row {row} out of bounds for {} rows.", self.rows);
        assert!(column < self.columns, "Column {column} out of bounds for {} columns.", self.columns);

        row * self.columns + column
    }

    /// Returns a contiguous slice of data representing a row in the matrix.
    pub fn row(&self, row_index: usize) -> &[f64] {
        assert!(row_index < self.rows, "Tried to get a row that was out of bounds.");

        let start = row_index * self.columns;
        &self.values[start..start + self.columns]
    }

    /// Builds a new matrix out of the listed rows, in the listed order.
    pub fn gather_rows(&self, row_indices: &[usize]) -> Matrix {
        let mut values = Vec::with_capacity(row_indices.len() * self.columns);
        for &row_index in row_indices {
            values.extend_from_slice(self.row(row_index));
        }

        Matrix::new(row_indices.len(), self.columns, values)
    }

    /// Returns a newly allocated matrix that is the transpose of the matrix operated on.
    pub fn transpose(&self) -> Matrix {
        if self.rows == 1 || self.columns == 1 {
            return Matrix::new(self.columns, self.rows, self.values.clone());
        }

        let capacity = self.len();
        let mut transposed = Vec::with_capacity(capacity);
        for i in 0..capacity {
            let index_to_read = self.columns * (i % self.rows) + i / self.rows;
            transposed.push(self.values[index_to_read]);
        }

        Matrix::new(self.columns, self.rows, transposed)
    }

    /// Multiplies self by the transpose of rhs, so rows of both operands are read contiguously.
    /// Output rows are computed in parallel.
    pub fn mul_with_transpose(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(self.columns, rhs.columns, "When multiplying by a transpose, lhs columns must equal rhs columns.");

        let partitioner = Partitioner::for_available_cores(self.rows);
        let values = partitioner.parallelized(|partition| {
            let mut partition_values = Vec::with_capacity(partition.get_size() * rhs.rows);
            for row in partition.get_range() {
                let lhs_row = self.row(row);
                for rhs_row in 0..rhs.rows {
                    partition_values.push(dot_product_of_vector_slices(lhs_row, rhs.row(rhs_row)));
                }
            }
            partition_values
        });

        Matrix::new(self.rows, rhs.rows, values)
    }

    /// Standard matrix product.
    pub fn mul(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(self.columns, rhs.rows, "When multiplying matrices, lhs columns must equal rhs rows.");

        self.mul_with_transpose(&rhs.transpose())
    }

    /// Applies func to every element.
    pub fn map(&self, func: impl Fn(f64) -> f64) -> Matrix {
        Matrix::new(self.rows, self.columns, self.values.iter().map(|&x| func(x)).collect())
    }

    fn zip_with(&self, rhs: &Matrix, func: impl Fn(f64, f64) -> f64) -> Matrix {
        assert_eq!(self.shape(), rhs.shape(), "Elementwise operations require matrices of equal shape.");

        let values = self.values.iter()
            .zip(rhs.values.iter())
            .map(|(&x, &y)| func(x, y))
            .collect();

        Matrix::new(self.rows, self.columns, values)
    }

    pub fn elementwise_multiply(&self, rhs: &Matrix) -> Matrix {
        self.zip_with(rhs, |x, y| x * y)
    }

    /// Adds two matrices together.
    pub fn add(&self, rhs: &Matrix) -> Matrix {
        self.zip_with(rhs, |x, y| x + y)
    }

    /// Elementwise difference of two matrices.
    pub fn sub(&self, rhs: &Matrix) -> Matrix {
        self.zip_with(rhs, |x, y| x - y)
    }

    /// Scales matrix by scalar.
    pub fn scale(&self, scalar: f64) -> Matrix {
        self.map(|x| x * scalar)
    }

    /// Elementwise division of matrix by scalar.
    pub fn div_by_scalar(&self, scalar: f64) -> Matrix {
        assert_ne!(scalar, 0.0, "Cannot divide matrix elements by zero.");
        self.map(|x| x / scalar)
    }

    /// Adds a given 1 x columns row to each row in lhs matrix.
    pub fn add_row_vector(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(rhs.rows, 1, "Rhs matrix must have 1 row.");
        assert_eq!(self.columns, rhs.columns, "Lhs and rhs must have equal number of columns.");

        let mut values = Vec::with_capacity(self.len());
        for row in 0..self.rows {
            values.extend(self.row(row).iter().zip(rhs.values.iter()).map(|(a, b)| a + b));
        }

        Matrix::new(self.rows, self.columns, values)
    }

    /// Sums each column, producing a 1 x columns matrix.
    pub fn reduce_rows_by_add(&self) -> Matrix {
        let mut sums = vec![0.; self.columns];
        for row in 0..self.rows {
            for (sum, value) in sums.iter_mut().zip(self.row(row)) {
                *sum += value;
            }
        }

        Matrix::new(1, self.columns, sums)
    }

    /// Sum of every element.
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Index of the largest value in a row, the first one winning ties.
    pub fn row_argmax(&self, row: usize) -> usize {
        vector_row_max(self.row(row)).0
    }
}
