use tracing::debug;

use crate::error::{ensure_shape, NetworkError, Result};
use crate::geoalg::f64_math::matrix::Matrix;
use crate::nn::momentum::MomentumBuffer;
use crate::random::Random;

use super::{ensure_features, LayerCache, Propagates};

/// A fully connected layer.
/// Weights are stored output x input, so forward multiplies by their transpose.
#[derive(Debug, Clone)]
pub struct Dense {
    weights: Matrix,
    biases: Matrix,
    weights_momentum: MomentumBuffer,
    biases_momentum: MomentumBuffer,
    cache: LayerCache
}

impl Dense {
    /// Initializes weights using Glorot normal initialization, biases start at zero.
    pub fn new(input_size: usize, neuron_count: usize, rng: &mut Random) -> Result<Dense> {
        if input_size == 0 || neuron_count == 0 {
            return Err(NetworkError::Configuration("dense layer needs non-zero input and output widths".to_string()));
        }

        let std_dev = (2. / (input_size + neuron_count) as f64).sqrt();
        let weights = Matrix::new_randomized_normal(neuron_count, input_size, std_dev, rng);
        let biases = Matrix::new_zeroed(1, neuron_count);

        debug!(input_size, neuron_count, std_dev, "created dense layer");
        Dense::from_parameters(weights, biases)
    }

    /// Builds a layer from explicit weights (output x input) and a 1 x output bias row.
    pub fn from_parameters(weights: Matrix, biases: Matrix) -> Result<Dense> {
        if weights.is_empty() {
            return Err(NetworkError::Configuration("dense layer needs non-zero input and output widths".to_string()));
        }
        ensure_shape("dense biases", (1, weights.row_count()), biases.shape())?;

        Ok(Dense {
            weights_momentum: MomentumBuffer::for_parameter(&weights),
            biases_momentum: MomentumBuffer::for_parameter(&biases),
            weights,
            biases,
            cache: LayerCache::default()
        })
    }

    /// Creates the next fully connected layer, reading its input width off self.
    pub fn feed_into_dense(&self, neuron_count: usize, rng: &mut Random) -> Result<Dense> {
        Dense::new(self.neuron_count(), neuron_count, rng)
    }

    pub fn input_size(&self) -> usize { self.weights.column_count() }

    pub fn neuron_count(&self) -> usize { self.weights.row_count() }

    pub fn weights(&self) -> &Matrix { &self.weights }

    pub fn biases(&self) -> &Matrix { &self.biases }
}

impl Propagates for Dense {
    /// Forward propagates by performing inputs dot weights transposed + biases.
    fn forward(&mut self, inputs: &Matrix) -> Result<&Matrix> {
        ensure_features("dense forward", self.input_size(), inputs)?;

        let output = inputs
            .mul_with_transpose(&self.weights)
            .add_row_vector(&self.biases);

        Ok(self.cache.store(inputs, output))
    }

    /// Back propagates.
    /// Will return dvalues to be used in next back propagation layer.
    fn backward(&mut self, dvalues: &Matrix, learning_rate: f64, momentum: f64) -> Result<Matrix> {
        let (inputs, _) = self.cache.for_backward("dense backward", dvalues)?;
        let batch_size = inputs.row_count() as f64;

        // Uses the weights as they were during forward.
        let dinputs = dvalues.mul(&self.weights);

        let dweights = dvalues.transpose().mul(inputs).div_by_scalar(batch_size);
        let dbiases = dvalues.reduce_rows_by_add().div_by_scalar(batch_size);

        self.weights_momentum.step(&mut self.weights, &dweights, learning_rate, momentum);
        self.biases_momentum.step(&mut self.biases, &dbiases, learning_rate, momentum);

        Ok(dinputs)
    }

    fn output(&self) -> Option<&Matrix> {
        self.cache.output()
    }
}
