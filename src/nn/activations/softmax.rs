use crate::error::Result;
use crate::geoalg::f64_math::matrix::Matrix;
use crate::geoalg::f64_math::optimized_functions::{dot_product_of_vector_slices, vector_row_max};
use crate::nn::layers::{LayerCache, Propagates};

/// Row-wise softmax, shifted by the row maximum before exponentiating.
#[derive(Debug, Clone, Default)]
pub struct Softmax {
    cache: LayerCache
}

/// Row-wise log of softmax: `x - (max + ln Σ exp(x - max))`.
#[derive(Debug, Clone, Default)]
pub struct LogSoftmax {
    cache: LayerCache
}

impl Softmax {
    pub fn new() -> Self { Softmax::default() }
}

impl LogSoftmax {
    pub fn new() -> Self { LogSoftmax::default() }
}

/// Applies func to each row, returning a matrix of the same shape.
fn map_rows(inputs: &Matrix, func: impl Fn(&[f64], &mut Vec<f64>)) -> Matrix {
    let mut values = Vec::with_capacity(inputs.len());
    for row in 0..inputs.row_count() {
        func(inputs.row(row), &mut values);
    }

    Matrix::new(inputs.row_count(), inputs.column_count(), values)
}

/// `max + ln Σ exp(x - max)` over one row.
fn log_sum_exp(row: &[f64]) -> f64 {
    let (_, max) = vector_row_max(row);
    max + row.iter().map(|x| (x - max).exp()).sum::<f64>().ln()
}

impl Propagates for Softmax {
    fn forward(&mut self, inputs: &Matrix) -> Result<&Matrix> {
        let output = map_rows(inputs, |row, values| {
            let (_, max) = vector_row_max(row);
            let start = values.len();
            values.extend(row.iter().map(|x| (x - max).exp()));

            let sum: f64 = values[start..].iter().sum();
            values[start..].iter_mut().for_each(|v| *v /= sum);
        });

        Ok(self.cache.store(inputs, output))
    }

    /// `g_i = o_i * (d_i - Σ_j d_j o_j)`
    fn backward(&mut self, dvalues: &Matrix, _learning_rate: f64, _momentum: f64) -> Result<Matrix> {
        let (_, output) = self.cache.for_backward("softmax", dvalues)?;

        let mut values = Vec::with_capacity(output.len());
        for row in 0..output.row_count() {
            let o = output.row(row);
            let d = dvalues.row(row);
            let weighted = dot_product_of_vector_slices(o, d);
            values.extend(o.iter().zip(d).map(|(o_i, d_i)| o_i * (d_i - weighted)));
        }

        Ok(Matrix::new(output.row_count(), output.column_count(), values))
    }

    fn output(&self) -> Option<&Matrix> {
        self.cache.output()
    }
}

impl Propagates for LogSoftmax {
    fn forward(&mut self, inputs: &Matrix) -> Result<&Matrix> {
        let output = map_rows(inputs, |row, values| {
            let normalizer = log_sum_exp(row);
            values.extend(row.iter().map(|x| x - normalizer));
        });

        Ok(self.cache.store(inputs, output))
    }

    /// `g_i = d_i - exp(o_i) * Σ_j d_j`
    fn backward(&mut self, dvalues: &Matrix, _learning_rate: f64, _momentum: f64) -> Result<Matrix> {
        let (_, output) = self.cache.for_backward("log softmax", dvalues)?;

        let mut values = Vec::with_capacity(output.len());
        for row in 0..output.row_count() {
            let o = output.row(row);
            let d = dvalues.row(row);
            let total: f64 = d.iter().sum();
            values.extend(o.iter().zip(d).map(|(o_i, d_i)| d_i - o_i.exp() * total));
        }

        Ok(Matrix::new(output.row_count(), output.column_count(), values))
    }

    fn output(&self) -> Option<&Matrix> {
        self.cache.output()
    }
}
