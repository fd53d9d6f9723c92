pub mod activations;
pub mod layers;
pub mod losses;
pub mod momentum;
pub mod network;
pub mod trainer;
