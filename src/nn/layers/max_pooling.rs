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

/// Non-overlapping max pooling with no padding.
/// The active input of a window is the first one, in edge order, holding the maximum.
/// Backward recomputes it from the stored input rather than remembering it.
#[derive(Debug, Clone)]
pub struct MaxPooling {
    channels: usize,
    input_dimensions: Dimensions,
    output_dimensions: Dimensions,
    graph: ConnectivityGraph,
    affine: Option<ChannelAffine>,
    cache: LayerCache
}

/// Source unit of the first edge holding the window maximum.
fn active_source(graph: &ConnectivityGraph, destination: usize, input_row: &[f64]) -> usize {
    let ids = graph.incoming(destination);
    let mut best = graph.edge(ids[0]).source;
    for &id in &ids[1..] {
        let source = graph.edge(id).source;
        if input_row[source] > input_row[best] {
            best = source;
        }
    }
    best
}

impl MaxPooling {
    pub fn new(channels: usize, p_d: Dimensions, i_d: Dimensions) -> Result<Self> {
        let graph = ConnectivityGraph::pooling(i_d, p_d, channels)?;
        let output_dimensions = Dimensions::new(i_d.height / p_d.height, i_d.width / p_d.width);

        debug!(channels, output_height = output_dimensions.height, output_width = output_dimensions.width, "created max pooling layer");
        Ok(MaxPooling {
            channels,
            input_dimensions: i_d,
            output_dimensions,
            graph,
            affine: None,
            cache: LayerCache::default()
        })
    }

    /// Pooling followed by a learned per-channel scale and bias.
    pub fn with_scale_and_bias(channels: usize, p_d: Dimensions, i_d: Dimensions) -> Result<Self> {
        let mut pooling = MaxPooling::new(channels, p_d, i_d)?;
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

impl Propagates for MaxPooling {
    fn forward(&mut self, inputs: &Matrix) -> Result<&Matrix> {
        ensure_features("max pooling forward", self.channels * self.input_dimensions.area(), inputs)?;

        let output_features = self.output_features();
        let output_area = self.output_dimensions.area();
        let graph = &self.graph;
        let affine = self.affine.as_ref();

        let values = Partitioner::for_available_cores(inputs.row_count()).parallelized(|partition| {
            let mut partition_values = Vec::with_capacity(partition.get_size() * output_features);
            for sample in partition.get_range() {
                let input_row = inputs.row(sample);
                for destination in 0..output_features {
                    let max = input_row[active_source(graph, destination, input_row)];
                    partition_values.push(apply_channel(affine, destination / output_area, max));
                }
            }
            partition_values
        });

        let output = Matrix::new(inputs.row_count(), output_features, values);
        Ok(self.cache.store(inputs, output))
    }

    fn backward(&mut self, dvalues: &Matrix, learning_rate: f64, momentum: f64) -> Result<Matrix> {
        let (inputs, _) = self.cache.for_backward("max pooling backward", dvalues)?;

        let batches = inputs.row_count();
        let input_features = inputs.column_count();
        let output_features = self.output_features();
        let output_area = self.output_dimensions.area();
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
                    let source = active_source(graph, destination, input_row);

                    dinput_row[source] += channel_scale(affine, channel) * delta;
                    if affine.is_some() {
                        scale_sums.add(channel, input_row[source] * delta);
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

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::error::NetworkError;

    use super::*;

    #[test]
    fn test_forward2x2() {
        // 2 channels that are 4 x 4 for a single image.
        let tc = Matrix::new(1, 2 * 4 * 4, vec![
            1., 3., 2., 1.,
            4., 2., 1., 5.,
            3., 1., 4., 2.,
            8., 6., 7., 9.,

            6., 4., 3., 8.,
            2., 4., 3., 7.,
            1., 5., 4., 3.,
            4., 7., 6., 4.
        ]);

        let mut pooling = MaxPooling::new(2, Dimensions::square(2), Dimensions::square(4)).unwrap();

        let forward_output = pooling.forward(&tc).unwrap().clone();
        let expected = Matrix::new(1, 2 * 2 * 2, vec![
            4.0, 5.0,
            8.0, 9.0,

            6.0, 8.0,
            7.0, 6.0]);

        assert_eq!(forward_output, expected);

        // Assume these values came from the previous layers back-propagation.
        let dvalues = Matrix::new(1, 2 * 4, vec![
            0.2, -0.5,
            0.3, 0.1,

            -1., 4.,
            3., 8.
        ]);

        let backward_output = pooling.backward(&dvalues, 0.1, 0.).unwrap();
        let expected = Matrix::new(1, 2 * 4 * 4, vec![
            0., 0., 0., 0.,
            0.2, 0., 0., -0.5,
            0., 0., 0., 0.,
            0.3, 0., 0., 0.1,

            -1., 0., 0., 4.,
            0., 0., 0., 0.,
            0., 0., 0., 0.,
            0., 3., 8., 0.
        ]);

        assert_eq!(backward_output, expected);
    }

    #[test]
    fn test_ties_pick_first_edge() {
        let mut pooling = MaxPooling::new(1, Dimensions::square(2), Dimensions::square(2)).unwrap();
        let inputs = Matrix::new(1, 4, vec![1., 7., 7., 7.]);

        for _ in 0..3 {
            pooling.forward(&inputs).unwrap();
            let dinputs = pooling.backward(&Matrix::new(1, 1, vec![1.]), 0.1, 0.).unwrap();
            assert_eq!(dinputs, Matrix::new(1, 4, vec![0., 1., 0., 0.]));
        }
    }

    #[test]
    fn test_backward_routes_to_latest_forward() {
        let mut pooling = MaxPooling::new(1, Dimensions::square(2), Dimensions::new(2, 4)).unwrap();
        let first = Matrix::new(1, 8, vec![
            9., 0., 0., 0.,
            0., 0., 0., 9.
        ]);
        let second = Matrix::new(2, 8, vec![
            0., 1., 2., 0.,
            0., 0., 0., 0.,

            0., 0., 0., -1.,
            5., 0., -3., -2.
        ]);

        pooling.forward(&first).unwrap();
        let output = pooling.forward(&second).unwrap();
        assert_eq!(output, &Matrix::new(2, 2, vec![1., 2., 5., 0.]));

        let dvalues = Matrix::new(2, 2, vec![
            1., 2.,
            3., 4.
        ]);
        let dinputs = pooling.backward(&dvalues, 0.1, 0.).unwrap();
        assert_eq!(dinputs, Matrix::new(2, 8, vec![
            0., 1., 2., 0.,
            0., 0., 0., 0.,

            0., 0., 4., 0.,
            3., 0., 0., 0.
        ]));
    }

    #[test]
    fn test_learned_scale_and_bias() {
        let mut pooling = MaxPooling::with_scale_and_bias(1, Dimensions::new(1, 2), Dimensions::new(1, 4)).unwrap();
        let inputs = Matrix::new(2, 4, vec![
            1., 3., 5., 2.,
            0., -1., 2., 2.
        ]);

        let output = pooling.forward(&inputs).unwrap();
        assert_eq!(output, &Matrix::new(2, 2, vec![3., 5., 0., 2.]));

        let dvalues = Matrix::new_filled(2, 2, 1.);
        let dinputs = pooling.backward(&dvalues, 1., 0.).unwrap();
        assert_eq!(dinputs, Matrix::new(2, 4, vec![0., 1., 1., 0., 1., 0., 1., 0.]));

        // grad_scale = (3 + 5 + 0 + 2) / 4, grad_bias = 4 / 4
        let affine = pooling.affine().unwrap();
        assert_abs_diff_eq!(affine.scale_for(0), 1. - 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(affine.bias()[(0, 0)], -1., epsilon = 1e-12);
    }

    #[test]
    fn test_indivisible_input() {
        let err = MaxPooling::new(1, Dimensions::square(3), Dimensions::square(4)).unwrap_err();
        assert!(matches!(err, NetworkError::Configuration(_)));
    }
}
