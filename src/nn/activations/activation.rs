use crate::error::Result;
use crate::geoalg::f64_math::matrix::Matrix;
use crate::nn::layers::{LayerCache, Propagates};

/// Elementwise activation layer.
/// `f` maps each input, `d` gives the local derivative from the input and the output it produced.
#[derive(Debug, Clone)]
pub struct Activation {
    name: &'static str,
    f: fn(f64) -> f64,
    d: fn(f64, f64) -> f64,
    cache: LayerCache
}

impl Activation {
    /// `max(0, x)`. Gradient passes wherever the input is at least zero.
    pub fn relu() -> Self {
        Activation {
            name: "relu",
            f: |x| if x > 0. { x } else { 0. },
            d: |x, _| if x >= 0. { 1. } else { 0. },
            cache: LayerCache::default()
        }
    }

    /// Logistic function.
    pub fn sigmoid() -> Self {
        Activation {
            name: "sigmoid",
            f: |x| 1. / (1. + (-x).exp()),
            d: |_, y| y * (1. - y),
            cache: LayerCache::default()
        }
    }

    pub fn name(&self) -> &'static str { self.name }
}

impl Propagates for Activation {
    fn forward(&mut self, inputs: &Matrix) -> Result<&Matrix> {
        let output = inputs.map(self.f);
        Ok(self.cache.store(inputs, output))
    }

    fn backward(&mut self, dvalues: &Matrix, _learning_rate: f64, _momentum: f64) -> Result<Matrix> {
        let (inputs, output) = self.cache.for_backward(self.name, dvalues)?;

        let values = inputs.read_values().iter()
            .zip(output.read_values())
            .zip(dvalues.read_values())
            .map(|((&x, &y), &delta)| delta * (self.d)(x, y))
            .collect();

        Ok(Matrix::new(dvalues.row_count(), dvalues.column_count(), values))
    }

    fn output(&self) -> Option<&Matrix> {
        self.cache.output()
    }
}
