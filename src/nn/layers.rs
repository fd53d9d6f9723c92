pub mod average_pooling;
pub mod channel_affine;
pub mod connectivity;
pub mod convolution2d;
pub mod dense;
pub mod max_pooling;

use crate::error::{ensure_shape, NetworkError, Result};
use crate::geoalg::f64_math::matrix::Matrix;

/// Implemented by every layer a network can hold.
pub trait Propagates {
    /// Stores inputs, computes and stores the outputs, and returns them.
    fn forward(&mut self, inputs: &Matrix) -> Result<&Matrix>;

    /// Consumes the state stored by the last forward, updates any owned parameters,
    /// and returns the gradient with respect to that forward's inputs.
    fn backward(&mut self, dvalues: &Matrix, learning_rate: f64, momentum: f64) -> Result<Matrix>;

    /// Output of the last forward, if any.
    fn output(&self) -> Option<&Matrix>;
}

/// Height and width of a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub height: usize,
    pub width: usize
}

impl Dimensions {
    pub fn new(height: usize, width: usize) -> Self {
        Dimensions { height, width }
    }

    /// Square dimensions.
    pub fn square(side: usize) -> Self {
        Dimensions { height: side, width: side }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Number of units in one channel.
    pub fn area(&self) -> usize {
        self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// Flat id of (y, x) inside a channel.
    pub fn flat_index(&self, y: usize, x: usize) -> usize {
        y * self.width + x
    }
}

/// Input and output of the most recent forward pass.
#[derive(Debug, Clone, Default)]
pub struct LayerCache {
    input: Option<Matrix>,
    output: Option<Matrix>
}

impl LayerCache {
    /// Overwrites both matrices, returning the stored output.
    pub fn store(&mut self, input: &Matrix, output: Matrix) -> &Matrix {
        self.input = Some(input.clone());
        self.output.insert(output)
    }

    pub fn input(&self) -> Option<&Matrix> { self.input.as_ref() }

    pub fn output(&self) -> Option<&Matrix> { self.output.as_ref() }

    /// Returns stored (input, output) after checking dvalues lines up with the output.
    pub fn for_backward(&self, layer: &'static str, dvalues: &Matrix) -> Result<(&Matrix, &Matrix)> {
        match (&self.input, &self.output) {
            (Some(input), Some(output)) => {
                ensure_shape(layer, output.shape(), dvalues.shape())?;
                Ok((input, output))
            },
            _ => Err(NetworkError::UninitializedState(layer))
        }
    }
}

/// Fails unless inputs hold at least one row and every row carries exactly `features` values.
pub(crate) fn ensure_features(layer: &'static str, features: usize, inputs: &Matrix) -> Result<()> {
    if inputs.row_count() == 0 {
        return Err(NetworkError::Configuration(format!("{layer} received an empty batch")));
    }

    ensure_shape(layer, (inputs.row_count(), features), inputs.shape())
}
