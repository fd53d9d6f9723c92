use tracing::debug;

use crate::error::Result;
use crate::geoalg::f64_math::{atomic::AtomicAccumulator, matrix::Matrix};
use crate::partitioner::Partitioner;
use crate::random::Random;

use super::channel_affine::{apply_channel, channel_scale, ChannelAffine};
use super::connectivity::ConnectivityGraph;
use super::convolution2d::Convolution2d;
use super::dense::Dense;
use super::{ensure_features, Dimensions, LayerCache, Propagates};

/// Non-overlapping average pooling over the same graph max pooling uses.
#[derive(Debug, Clone)]
pub struct AveragePooling {
    channels: usize,
    input_dimensions: Dimensions,
    output_dimensions: Dimensions,
    window_size: f64,
    graph: ConnectivityGraph,
    affine: Option<ChannelAffine>,
    cache: LayerCache
}

fn window_mean(graph: &ConnectivityGraph, destination: usize, input_row: &[f64], window_size: f64) -> f64 {
    graph.incoming_edges(destination).map(|edge| input_row[edge.source]).sum::<f64>() / window_size
}

impl AveragePooling {
    pub fn new(channels: usize, p_d: Dimensions, i_d: Dimensions) -> Result<Self> {
        let graph = ConnectivityGraph::pooling(i_d, p_d, channels)?;
        let output_dimensions = Dimensions::new(i_d.height / p_d.height, i_d.width / p_d.width);

        debug!(channels, output_height = output_dimensions.height, output_width = output_dimensions.width, "created average pooling layer");
        Ok(AveragePooling {
            channels,
            input_dimensions: i_d,
            output_dimensions,
            window_size: p_d.area() as f64,
            graph,
            affine: None,
            cache: LayerCache::default()
        })
    }

    /// Pooling followed by a learned per-channel scale and bias.
    pub fn with_scale_and_bias(channels: usize, p_d: Dimensions, i_d: Dimensions) -> Result<Self> {
        let mut pooling = AveragePooling::new(channels, p_d, i_d)?;
        pooling.affine = Some(ChannelAffine::new(channels));
        Ok(pooling)
    }

    /// Fully connected layer reading every pooled unit.
    pub fn feed_into_dense(&self, neuron_count: usize, rng: &mut Random) -> Result<Dense> {
        Dense::new(self.output_features(), neuron_count, rng)
    }

    /// Convolution over the pooled channels.
    pub fn feed_into_convolution(&self, k_d: Dimensions, output_channels: usize, rng: &mut Random) -> Result<Convolution2d> {
        Convolution2d::new(self.output_dimensions, k_d, self.channels, output_channels, rng)
    }

    pub fn output_dimensions(&self) -> Dimensions { self.output_dimensions }

    pub fn channels(&self) -> usize { self.channels }

    pub fn affine(&self) -> Option<&ChannelAffine> { self.affine.as_ref() }

    fn output_features(&self) -> usize { self.channels * self.output_dimensions.area() }
}

impl Propagates for AveragePooling {
    fn forward(&mut self, inputs: &Matrix) -> Result<&Matrix> {
        ensure_features("average pooling forward", self.channels * self.input_dimensions.area(), inputs)?;

        let output_features = self.output_features();
        let output_area = self.output_dimensions.area();
        let window_size = self.window_size;
        let graph = &self.graph;
        let affine = self.affine.as_ref();

        let values = Partitioner::for_available_cores(inputs.row_count()).parallelized(|partition| {
            let mut partition_values = Vec::with_capacity(partition.get_size() * output_features);
            for sample in partition.get_range() {
                let input_row = inputs.row(sample);
                for destination in 0..output_features {
                    let mean = window_mean(graph, destination, input_row, window_size);
                    partition_values.push(apply_channel(affine, destination / output_area, mean));
                }
            }
            partition_values
        });

        let output = Matrix::new(inputs.row_count(), output_features, values);
        Ok(self.cache.store(inputs, output))
    }

    fn backward(&mut self, dvalues: &Matrix, learning_rate: f64, momentum: f64) -> Result<Matrix> {
        let (inputs, _) = self.cache.for_backward("average pooling backward", dvalues)?;

        let batches = inputs.row_count();
        let input_features = inputs.column_count();
        let output_features = self.output_features();
        let output_area = self.output_dimensions.area();
        let window_size = self.window_size;
        let graph = &self.graph;
        let affine = self.affine.as_ref();

        let scale_sums = AtomicAccumulator::new_zeroed(self.channels);
        let bias_sums = AtomicAccumulator::new_zeroed(self.channels);

        let values = Partitioner::for_available_cores(batches).parallelized(|partition| {
            let mut partition_values = vec![0.; partition.get_size() * input_features];
            for (local, sample) in partition.get_range().enumerate() {
                let input_row = inputs.row(sample);
                let dinput_row = &mut partition_values[local * input_features..(local + 1) * input_features];
                for destination in 0..output_features {
                    let channel = destination / output_area;
                    let delta = dvalues[(sample, destination)];
                    let share = channel_scale(affine, channel) * delta / window_size;

                    for edge in graph.incoming_edges(destination) {
                        dinput_row[edge.source] += share;
                    }

                    if affine.is_some() {
                        scale_sums.add(channel, window_mean(graph, destination, input_row, window_size) * delta);
                        bias_sums.add(channel, delta);
                    }
                }
            }
            partition_values
        });

        if let Some(affine) = self.affine.as_mut() {
            affine.update(scale_sums, bias_sums, (batches * output_area) as f64, learning_rate, momentum);
        }

        Ok(Matrix::new(batches, input_features, values))
    }

    fn output(&self) -> Option<&Matrix> {
        self.cache.output()
    }
}
