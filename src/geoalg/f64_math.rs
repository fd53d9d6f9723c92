pub mod atomic;
pub mod matrix;
pub mod optimized_functions;
