use tracing::trace;

use crate::error::{NetworkError, Result};
use crate::geoalg::f64_math::matrix::Matrix;

use super::activations::{activation::Activation, softmax::{LogSoftmax, Softmax}};
use super::layers::{
    average_pooling::AveragePooling, convolution2d::Convolution2d, dense::Dense,
    max_pooling::MaxPooling, Propagates
};

/// Every kind of layer a network can hold.
#[derive(Debug, Clone)]
pub enum NeuralNetworkNode {
    DenseLayer(Dense),
    Convolution2dLayer(Convolution2d),
    MaxPoolingLayer(MaxPooling),
    AveragePoolingLayer(AveragePooling),
    ActivationLayer(Activation),
    SoftmaxLayer(Softmax),
    LogSoftmaxLayer(LogSoftmax)
}

impl NeuralNetworkNode {
    fn as_propagates(&self) -> &dyn Propagates {
        match self {
            NeuralNetworkNode::DenseLayer(n) => n,
            NeuralNetworkNode::Convolution2dLayer(n) => n,
            NeuralNetworkNode::MaxPoolingLayer(n) => n,
            NeuralNetworkNode::AveragePoolingLayer(n) => n,
            NeuralNetworkNode::ActivationLayer(n) => n,
            NeuralNetworkNode::SoftmaxLayer(n) => n,
            NeuralNetworkNode::LogSoftmaxLayer(n) => n
        }
    }

    fn as_propagates_mut(&mut self) -> &mut dyn Propagates {
        match self {
            NeuralNetworkNode::DenseLayer(n) => n,
            NeuralNetworkNode::Convolution2dLayer(n) => n,
            NeuralNetworkNode::MaxPoolingLayer(n) => n,
            NeuralNetworkNode::AveragePoolingLayer(n) => n,
            NeuralNetworkNode::ActivationLayer(n) => n,
            NeuralNetworkNode::SoftmaxLayer(n) => n,
            NeuralNetworkNode::LogSoftmaxLayer(n) => n
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            NeuralNetworkNode::DenseLayer(_) => "dense",
            NeuralNetworkNode::Convolution2dLayer(_) => "convolution",
            NeuralNetworkNode::MaxPoolingLayer(_) => "max pooling",
            NeuralNetworkNode::AveragePoolingLayer(_) => "average pooling",
            NeuralNetworkNode::ActivationLayer(n) => n.name(),
            NeuralNetworkNode::SoftmaxLayer(_) => "softmax",
            NeuralNetworkNode::LogSoftmaxLayer(_) => "log softmax"
        }
    }
}

impl Propagates for NeuralNetworkNode {
    fn forward(&mut self, inputs: &Matrix) -> Result<&Matrix> {
        self.as_propagates_mut().forward(inputs)
    }

    fn backward(&mut self, dvalues: &Matrix, learning_rate: f64, momentum: f64) -> Result<Matrix> {
        self.as_propagates_mut().backward(dvalues, learning_rate, momentum)
    }

    fn output(&self) -> Option<&Matrix> {
        self.as_propagates().output()
    }
}

macro_rules! impl_from_layer {
    ($layer:ty, $variant:ident) => {
        impl From<$layer> for NeuralNetworkNode {
            fn from(layer: $layer) -> Self {
                NeuralNetworkNode::$variant(layer)
            }
        }
    };
}

impl_from_layer!(Dense, DenseLayer);
impl_from_layer!(Convolution2d, Convolution2dLayer);
impl_from_layer!(MaxPooling, MaxPoolingLayer);
impl_from_layer!(AveragePooling, AveragePoolingLayer);
impl_from_layer!(Activation, ActivationLayer);
impl_from_layer!(Softmax, SoftmaxLayer);
impl_from_layer!(LogSoftmax, LogSoftmaxLayer);

/// Ordered chain of layers.
/// Threads batches forward and gradients backward; each layer updates its own parameters.
#[derive(Debug, Clone, Default)]
pub struct Network {
    nodes: Vec<NeuralNetworkNode>
}

impl Network {
    pub fn new() -> Self {
        Network::default()
    }

    pub fn from_nodes(nodes: Vec<NeuralNetworkNode>) -> Self {
        Network { nodes }
    }

    /// Appends a layer, builder style.
    pub fn with_node(mut self, node: impl Into<NeuralNetworkNode>) -> Self {
        self.push(node);
        self
    }

    pub fn push(&mut self, node: impl Into<NeuralNetworkNode>) {
        self.nodes.push(node.into());
    }

    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn nodes(&self) -> &[NeuralNetworkNode] { &self.nodes }

    /// Forward propagates the batch through every layer, returning the last layer's output.
    pub fn forward(&mut self, batch: &Matrix) -> Result<&Matrix> {
        let (first, rest) = self.nodes
            .split_first_mut()
            .ok_or_else(|| NetworkError::Configuration("network has no layers".to_string()))?;

        let first_kind = first.kind();
        let mut current = first.forward(batch)?;
        trace!(layer = first_kind, rows = current.row_count(), columns = current.column_count(), "forward");

        for node in rest {
            let kind = node.kind();
            current = node.forward(current)?;
            trace!(layer = kind, rows = current.row_count(), columns = current.column_count(), "forward");
        }

        Ok(current)
    }

    /// Applies backpropagation from the loss gradient to the first layer.
    /// Returns the gradient with respect to the network input.
    pub fn backward(&mut self, loss_gradient: &Matrix, learning_rate: f64, momentum: f64) -> Result<Matrix> {
        if self.nodes.is_empty() {
            return Err(NetworkError::Configuration("network has no layers".to_string()));
        }

        let mut dvalues = loss_gradient.clone();
        for node in self.nodes.iter_mut().rev() {
            dvalues = node.backward(&dvalues, learning_rate, momentum)?;
            trace!(layer = node.kind(), rows = dvalues.row_count(), columns = dvalues.column_count(), "backward");
        }

        Ok(dvalues)
    }

    /// Output of the last forward, if any.
    pub fn output(&self) -> Option<&Matrix> {
        self.nodes.last().and_then(|node| node.output())
    }

    /// Forward pass returning an owned copy of the predictions.
    pub fn predict(&mut self, batch: &Matrix) -> Result<Matrix> {
        self.forward(batch).cloned()
    }
}
