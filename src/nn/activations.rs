pub mod activation;
pub mod softmax;
