use crate::geoalg::f64_math::{atomic::AtomicAccumulator, matrix::Matrix};
use crate::nn::momentum::MomentumBuffer;

/// Learned per-channel `scale * x + bias` applied by pooling layers.
#[derive(Debug, Clone)]
pub struct ChannelAffine {
    scale: Matrix,
    bias: Matrix,
    scale_momentum: MomentumBuffer,
    bias_momentum: MomentumBuffer
}

impl ChannelAffine {
    /// Scale starts at 1 and bias at 0, so a fresh layer behaves like plain pooling.
    pub fn new(channels: usize) -> Self {
        let scale = Matrix::new_filled(1, channels, 1.);
        let bias = Matrix::new_zeroed(1, channels);
        let scale_momentum = MomentumBuffer::for_parameter(&scale);
        let bias_momentum = MomentumBuffer::for_parameter(&bias);

        ChannelAffine { scale, bias, scale_momentum, bias_momentum }
    }

    pub fn scale(&self) -> &Matrix { &self.scale }

    pub fn bias(&self) -> &Matrix { &self.bias }

    pub fn scale_for(&self, channel: usize) -> f64 { self.scale[(0, channel)] }

    pub fn apply(&self, channel: usize, x: f64) -> f64 {
        self.scale[(0, channel)] * x + self.bias[(0, channel)]
    }

    /// Applies accumulated gradient sums after dividing them by `normalizer`.
    pub fn update(&mut self, scale_sums: AtomicAccumulator, bias_sums: AtomicAccumulator, normalizer: f64, learning_rate: f64, momentum: f64) {
        let channels = self.scale.column_count();
        let grad_scale = Matrix::new(1, channels, scale_sums.into_values()).div_by_scalar(normalizer);
        let grad_bias = Matrix::new(1, channels, bias_sums.into_values()).div_by_scalar(normalizer);

        self.scale_momentum.step(&mut self.scale, &grad_scale, learning_rate, momentum);
        self.bias_momentum.step(&mut self.bias, &grad_bias, learning_rate, momentum);
    }
}

/// Scale and bias of a channel, identity when the layer carries no learned affine.
pub(crate) fn channel_scale(affine: Option<&ChannelAffine>, channel: usize) -> f64 {
    affine.map_or(1., |a| a.scale_for(channel))
}

pub(crate) fn apply_channel(affine: Option<&ChannelAffine>, channel: usize, x: f64) -> f64 {
    affine.map_or(x, |a| a.apply(channel, x))
}
