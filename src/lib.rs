pub mod error;
pub mod geoalg;
pub mod idx_reader;
pub mod nn;
pub mod partition;
pub mod partitioner;
pub mod random;
pub mod statistics;

pub use error::{NetworkError, Result};
pub use geoalg::f64_math::matrix::Matrix;
pub use nn::layers::{Dimensions, Propagates};
pub use nn::network::{Network, NeuralNetworkNode};
pub use random::Random;
