use tracing::debug;

use crate::error::{NetworkError, Result};
use crate::geoalg::f64_math::{atomic::AtomicAccumulator, matrix::Matrix};
use crate::nn::momentum::MomentumBuffer;
use crate::partitioner::Partitioner;
use crate::random::Random;

use super::average_pooling::AveragePooling;
use super::connectivity::{ConnectionTable, ConnectivityGraph};
use super::max_pooling::MaxPooling;
use super::{ensure_features, Dimensions, LayerCache, Propagates};

/// Valid, stride 1 convolution over multi-channel images flattened into rows.
/// One kernel per (input channel, output channel) pair, stored at `out * input_channels + in`,
/// and one bias per output channel.
#[derive(Debug, Clone)]
pub struct Convolution2d {
    input_dimensions: Dimensions,
    kernel_dimensions: Dimensions,
    output_dimensions: Dimensions,
    input_channels: usize,
    output_channels: usize,
    graph: ConnectivityGraph,
    kernels: Vec<Matrix>,
    biases: Matrix,
    kernels_momentum: Vec<MomentumBuffer>,
    biases_momentum: MomentumBuffer,
    cache: LayerCache
}

impl Convolution2d {
    /// Every input channel feeds every output channel.
    pub fn new(i_d: Dimensions, k_d: Dimensions, input_channels: usize, output_channels: usize, rng: &mut Random) -> Result<Self> {
        Convolution2d::with_connections(i_d, k_d, &ConnectionTable::full(input_channels, output_channels), rng)
    }

    /// Only the channel pairs marked in the table are connected.
    pub fn with_connections(i_d: Dimensions, k_d: Dimensions, connections: &ConnectionTable, rng: &mut Random) -> Result<Self> {
        let graph = ConnectivityGraph::convolution(i_d, k_d, connections)?;

        let input_channels = connections.input_channels();
        let output_channels = connections.output_channels();
        let fan_in = input_channels * k_d.area();
        let fan_out = output_channels * k_d.area();
        let std_dev = (2. / (fan_in + fan_out) as f64).sqrt();

        let kernels: Vec<Matrix> = (0..input_channels * output_channels)
            .map(|_| Matrix::new_randomized_normal(k_d.height, k_d.width, std_dev, rng))
            .collect();
        let biases = Matrix::new_zeroed(1, output_channels);

        debug!(input_channels, output_channels, std_dev, "created convolution layer");
        Ok(Convolution2d {
            input_dimensions: i_d,
            kernel_dimensions: k_d,
            output_dimensions: Dimensions::new(i_d.height - k_d.height + 1, i_d.width - k_d.width + 1),
            input_channels,
            output_channels,
            graph,
            kernels_momentum: kernels.iter().map(MomentumBuffer::for_parameter).collect(),
            biases_momentum: MomentumBuffer::for_parameter(&biases),
            kernels,
            biases,
            cache: LayerCache::default()
        })
    }

    /// Replaces the kernels and biases, e.g. to start from known values.
    pub fn set_parameters(&mut self, kernels: Vec<Matrix>, biases: Matrix) -> Result<()> {
        if kernels.len() != self.kernels.len()
            || kernels.iter().any(|k| k.shape() != self.kernel_dimensions.shape())
            || biases.shape() != self.biases.shape() {
            return Err(NetworkError::Configuration("replacement parameters must match the layer geometry".to_string()));
        }

        self.kernels = kernels;
        self.biases = biases;
        Ok(())
    }

    /// Max pooling sized to this layer's output.
    pub fn feed_into_maxpool(&self, p_d: Dimensions) -> Result<MaxPooling> {
        MaxPooling::new(self.output_channels, p_d, self.output_dimensions)
    }

    /// Average pooling sized to this layer's output.
    pub fn feed_into_average_pool(&self, p_d: Dimensions) -> Result<AveragePooling> {
        AveragePooling::new(self.output_channels, p_d, self.output_dimensions)
    }

    pub fn output_dimensions(&self) -> Dimensions { self.output_dimensions }

    pub fn input_channels(&self) -> usize { self.input_channels }

    pub fn output_channels(&self) -> usize { self.output_channels }

    /// Kernel connecting input channel to output channel.
    pub fn kernel(&self, input_channel: usize, output_channel: usize) -> &Matrix {
        &self.kernels[output_channel * self.input_channels + input_channel]
    }

    pub fn biases(&self) -> &Matrix { &self.biases }

    fn input_features(&self) -> usize { self.input_channels * self.input_dimensions.area() }

    fn output_features(&self) -> usize { self.output_channels * self.output_dimensions.area() }
}

impl Propagates for Convolution2d {
    fn forward(&mut self, inputs: &Matrix) -> Result<&Matrix> {
        ensure_features("convolution forward", self.input_features(), inputs)?;

        let output_features = self.output_features();
        let output_area = self.output_dimensions.area();
        let graph = &self.graph;
        let kernels = &self.kernels;
        let biases = &self.biases;

        let partitioner = Partitioner::for_available_cores(inputs.row_count());
        let values = partitioner.parallelized(|partition| {
            let mut partition_values = Vec::with_capacity(partition.get_size() * output_features);
            for sample in partition.get_range() {
                let input_row = inputs.row(sample);
                for destination in 0..output_features {
                    let bias = biases[(0, destination / output_area)];
                    let sum: f64 = graph.incoming_edges(destination)
                        .map(|edge| input_row[edge.source] * kernels[edge.kernel][edge.offset])
                        .sum();
                    partition_values.push(sum + bias);
                }
            }
            partition_values
        });

        let output = Matrix::new(inputs.row_count(), output_features, values);
        Ok(self.cache.store(inputs, output))
    }

    fn backward(&mut self, dvalues: &Matrix, learning_rate: f64, momentum: f64) -> Result<Matrix> {
        let (inputs, _) = self.cache.for_backward("convolution backward", dvalues)?;

        let batches = inputs.row_count();
        let input_features = self.input_features();
        let output_features = self.output_features();
        let output_area = self.output_dimensions.area();
        let kernel_area = self.kernel_dimensions.area();
        let kernel_width = self.kernel_dimensions.width;

        let dinputs = AtomicAccumulator::new_zeroed(batches * input_features);
        let dkernels = AtomicAccumulator::new_zeroed(self.kernels.len() * kernel_area);
        let dbiases = AtomicAccumulator::new_zeroed(self.output_channels);

        let graph = &self.graph;
        let kernels = &self.kernels;

        // Output units share input units, so scatter goes through atomics.
        Partitioner::for_available_cores(output_features).for_each_partition(|partition| {
            for destination in partition.get_range() {
                let channel = destination / output_area;
                for sample in 0..batches {
                    let delta = dvalues[(sample, destination)];
                    if delta == 0. {
                        continue;
                    }

                    let input_row = inputs.row(sample);
                    dbiases.add(channel, delta);
                    for edge in graph.incoming_edges(destination) {
                        let (ky, kx) = edge.offset;
                        dinputs.add(sample * input_features + edge.source, delta * kernels[edge.kernel][edge.offset]);
                        dkernels.add(edge.kernel * kernel_area + ky * kernel_width + kx, delta * input_row[edge.source]);
                    }
                }
            }
        });

        let normalizer = (batches * output_area) as f64;
        let dkernels = dkernels.into_values();
        for (k, (kernel, kernel_momentum)) in self.kernels.iter_mut().zip(self.kernels_momentum.iter_mut()).enumerate() {
            let gradient = Matrix::new(
                self.kernel_dimensions.height,
                self.kernel_dimensions.width,
                dkernels[k * kernel_area..(k + 1) * kernel_area].to_vec()).div_by_scalar(normalizer);
            kernel_momentum.step(kernel, &gradient, learning_rate, momentum);
        }

        let dbiases = Matrix::new(1, self.output_channels, dbiases.into_values()).div_by_scalar(normalizer);
        self.biases_momentum.step(&mut self.biases, &dbiases, learning_rate, momentum);

        Ok(Matrix::new(batches, input_features, dinputs.into_values()))
    }

    fn output(&self) -> Option<&Matrix> {
        self.cache.output()
    }
}
