const ROWS_DIFFERENT_LENGTHS: &str = "Cannot take dot product of two &[f64] of unequal length.";

/// Dot product of two equal length slices.
pub fn dot_product_of_vector_slices(lhs: &[f64], rhs: &[f64]) -> f64 {
    assert_eq!(lhs.len(), rhs.len(), "{}", ROWS_DIFFERENT_LENGTHS);

    lhs.iter().zip(rhs.iter()).map(|(x, y)| x * y).sum()
}

/// Calculates the Kronecker Delta given i and j that are equatable to eachother.
pub fn kronecker_delta_f64<I: PartialEq>(i: I, j: I) -> f64 {
    if i == j { 1.0 } else { 0.0 }
}

/// Converts a class label into a one-hot row.
/// A label outside of bounds yields a row of zeroes.
pub fn one_hot_encode(label: usize, bounds: usize) -> Vec<f64> {
    (0..bounds)
        .map(|x| kronecker_delta_f64(label, x))
        .collect()
}

/// Argmax. Returns index and value at the index.
/// The first occurrence wins when several entries share the maximum.
pub fn vector_row_max(values: &[f64]) -> (usize, f64) {
    assert!(!values.is_empty(), "Cannot take the max of an empty row.");

    let mut max = values[0];
    let mut index = 0;
    for (i, &value) in values.iter().enumerate().skip(1) {
        if value > max {
            max = value;
            index = i;
        }
    }

    (index, max)
}
