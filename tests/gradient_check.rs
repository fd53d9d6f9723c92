use approx::assert_relative_eq;

use convnet::nn::activations::{activation::Activation, softmax::{LogSoftmax, Softmax}};
use convnet::nn::layers::{
    average_pooling::AveragePooling, convolution2d::Convolution2d, dense::Dense,
    max_pooling::MaxPooling, Dimensions, Propagates
};
use convnet::{Matrix, Random};

const EPS: f64 = 1e-6;

/// Scalar loss `Σ output ⊙ weights`, whose gradient with respect to the output is `weights`.
fn weighted_sum<L: Propagates>(layer: &mut L, inputs: &Matrix, weights: &Matrix) -> f64 {
    layer.forward(inputs).unwrap().elementwise_multiply(weights).sum()
}

fn central_difference(mut loss_at: impl FnMut(f64) -> f64) -> f64 {
    (loss_at(EPS) - loss_at(-EPS)) / (2. * EPS)
}

fn assert_close(analytic: f64, numeric: f64) {
    assert_relative_eq!(analytic, numeric, max_relative = 1e-4, epsilon = 1e-7);
}

/// Compares the returned input gradient against finite differences on each input.
fn check_input_gradient<L: Propagates + Clone>(layer: &L, inputs: &Matrix, rng: &mut Random) {
    let mut probe = layer.clone();
    let (rows, columns) = probe.forward(inputs).unwrap().shape();
    let weights = Matrix::new_randomized_normal(rows, columns, 1., rng);

    // A zero learning rate leaves parameters untouched.
    let analytic = probe.backward(&weights, 0., 0.).unwrap();
    assert_eq!(analytic.shape(), inputs.shape());

    for i in 0..inputs.row_count() {
        for j in 0..inputs.column_count() {
            let numeric = central_difference(|delta| {
                let mut shifted = inputs.clone();
                shifted[(i, j)] += delta;
                weighted_sum(&mut layer.clone(), &shifted, &weights)
            });
            assert_close(analytic[(i, j)], numeric);
        }
    }
}

#[test]
fn dense_input_gradient() {
    let mut rng = Random::new(100);
    let dense = Dense::new(4, 3, &mut rng).unwrap();
    let inputs = Matrix::new_randomized_normal(5, 4, 1., &mut rng);

    check_input_gradient(&dense, &inputs, &mut rng);
}

#[test]
fn dense_parameter_gradients_are_batch_means() {
    let mut rng = Random::new(101);
    let weights = Matrix::new_randomized_normal(3, 4, 1., &mut rng);
    let biases = Matrix::new_randomized_normal(1, 3, 1., &mut rng);
    let inputs = Matrix::new_randomized_normal(5, 4, 1., &mut rng);
    let dvalues = Matrix::new_randomized_normal(5, 3, 1., &mut rng);
    let batch = inputs.row_count() as f64;

    // With learning rate 1 and no momentum the parameter change is the gradient.
    let mut layer = Dense::from_parameters(weights.clone(), biases.clone()).unwrap();
    layer.forward(&inputs).unwrap();
    layer.backward(&dvalues, 1., 0.).unwrap();
    let grad_weights = weights.sub(layer.weights());
    let grad_biases = biases.sub(layer.biases());

    for i in 0..3 {
        for j in 0..4 {
            let numeric = central_difference(|delta| {
                let mut shifted = weights.clone();
                shifted[(i, j)] += delta;
                let mut probe = Dense::from_parameters(shifted, biases.clone()).unwrap();
                weighted_sum(&mut probe, &inputs, &dvalues)
            });
            assert_close(grad_weights[(i, j)], numeric / batch);
        }

        let numeric = central_difference(|delta| {
            let mut shifted = biases.clone();
            shifted[(0, i)] += delta;
            let mut probe = Dense::from_parameters(weights.clone(), shifted).unwrap();
            weighted_sum(&mut probe, &inputs, &dvalues)
        });
        assert_close(grad_biases[(0, i)], numeric / batch);
    }
}

#[test]
fn convolution_input_gradient() {
    let mut rng = Random::new(200);
    let conv = Convolution2d::new(Dimensions::new(5, 4), Dimensions::new(3, 2), 2, 3, &mut rng).unwrap();
    let inputs = Matrix::new_randomized_normal(2, 2 * 5 * 4, 1., &mut rng);

    check_input_gradient(&conv, &inputs, &mut rng);
}

fn kernels_of(conv: &Convolution2d) -> Vec<Matrix> {
    let mut kernels = Vec::new();
    for output_channel in 0..conv.output_channels() {
        for input_channel in 0..conv.input_channels() {
            kernels.push(conv.kernel(input_channel, output_channel).clone());
        }
    }
    kernels
}

#[test]
fn convolution_parameter_gradients_are_normalized_by_batch_and_output_area() {
    let mut rng = Random::new(201);
    let conv = Convolution2d::new(Dimensions::square(4), Dimensions::square(2), 2, 2, &mut rng).unwrap();
    let kernels = kernels_of(&conv);
    let biases = Matrix::new_randomized_normal(1, 2, 1., &mut rng);
    let inputs = Matrix::new_randomized_normal(3, 2 * 16, 1., &mut rng);
    let dvalues = Matrix::new_randomized_normal(3, 2 * 9, 1., &mut rng);
    let normalizer = (3 * 9) as f64;

    let mut layer = conv.clone();
    layer.set_parameters(kernels.clone(), biases.clone()).unwrap();
    layer.forward(&inputs).unwrap();
    layer.backward(&dvalues, 1., 0.).unwrap();
    let updated = kernels_of(&layer);

    for k in 0..kernels.len() {
        for ky in 0..2 {
            for kx in 0..2 {
                let numeric = central_difference(|delta| {
                    let mut shifted = kernels.clone();
                    shifted[k][(ky, kx)] += delta;
                    let mut probe = conv.clone();
                    probe.set_parameters(shifted, biases.clone()).unwrap();
                    weighted_sum(&mut probe, &inputs, &dvalues)
                });
                assert_close(kernels[k][(ky, kx)] - updated[k][(ky, kx)], numeric / normalizer);
            }
        }
    }

    for channel in 0..2 {
        let numeric = central_difference(|delta| {
            let mut shifted = biases.clone();
            shifted[(0, channel)] += delta;
            let mut probe = conv.clone();
            probe.set_parameters(kernels.clone(), shifted).unwrap();
            weighted_sum(&mut probe, &inputs, &dvalues)
        });
        assert_close(biases[(0, channel)] - layer.biases()[(0, channel)], numeric / normalizer);
    }
}

#[test]
fn pooling_input_gradients() {
    let mut rng = Random::new(300);
    let inputs = Matrix::new_randomized_normal(2, 2 * 4 * 6, 1., &mut rng);

    let max = MaxPooling::new(2, Dimensions::new(2, 3), Dimensions::new(4, 6)).unwrap();
    check_input_gradient(&max, &inputs, &mut rng);

    let average = AveragePooling::new(2, Dimensions::new(2, 3), Dimensions::new(4, 6)).unwrap();
    check_input_gradient(&average, &inputs, &mut rng);

    let learned = MaxPooling::with_scale_and_bias(2, Dimensions::square(2), Dimensions::new(4, 6)).unwrap();
    check_input_gradient(&learned, &inputs, &mut rng);
}

/// Pooled output scaled by `1 + scale_shift` and offset by `bias_shift` on one channel.
fn shifted_pool_loss(plain: &Matrix, dvalues: &Matrix, channel: usize, area: usize, scale_shift: f64, bias_shift: f64) -> f64 {
    let mut total = 0.;
    for row in 0..plain.row_count() {
        for column in 0..plain.column_count() {
            let (scale, bias) = if column / area == channel { (1. + scale_shift, bias_shift) } else { (1., 0.) };
            total += dvalues[(row, column)] * (scale * plain[(row, column)] + bias);
        }
    }
    total
}

#[test]
fn pooling_scale_and_bias_gradients() {
    let mut rng = Random::new(301);
    let channels = 3;
    let pool = Dimensions::square(2);
    let image = Dimensions::new(4, 2);
    let area = 2;
    let inputs = Matrix::new_randomized_normal(4, channels * image.area(), 1., &mut rng);
    let dvalues = Matrix::new_randomized_normal(4, channels * area, 1., &mut rng);
    let normalizer = (4 * area) as f64;

    let mut max_plain = MaxPooling::new(channels, pool, image).unwrap();
    let mut average_plain = AveragePooling::new(channels, pool, image).unwrap();
    let max_output = max_plain.forward(&inputs).unwrap().clone();
    let average_output = average_plain.forward(&inputs).unwrap().clone();

    let mut max_learned = MaxPooling::with_scale_and_bias(channels, pool, image).unwrap();
    max_learned.forward(&inputs).unwrap();
    max_learned.backward(&dvalues, 1., 0.).unwrap();

    let mut average_learned = AveragePooling::with_scale_and_bias(channels, pool, image).unwrap();
    average_learned.forward(&inputs).unwrap();
    average_learned.backward(&dvalues, 1., 0.).unwrap();

    for channel in 0..channels {
        let (max_affine, average_affine) = (max_learned.affine().unwrap(), average_learned.affine().unwrap());

        let numeric = central_difference(|d| shifted_pool_loss(&max_output, &dvalues, channel, area, d, 0.));
        assert_close(1. - max_affine.scale_for(channel), numeric / normalizer);
        let numeric = central_difference(|d| shifted_pool_loss(&max_output, &dvalues, channel, area, 0., d));
        assert_close(-max_affine.bias()[(0, channel)], numeric / normalizer);

        let numeric = central_difference(|d| shifted_pool_loss(&average_output, &dvalues, channel, area, d, 0.));
        assert_close(1. - average_affine.scale_for(channel), numeric / normalizer);
        let numeric = central_difference(|d| shifted_pool_loss(&average_output, &dvalues, channel, area, 0., d));
        assert_close(-average_affine.bias()[(0, channel)], numeric / normalizer);
    }
}

#[test]
fn activation_input_gradients() {
    let mut rng = Random::new(400);
    let inputs = Matrix::new_randomized_normal(3, 5, 2., &mut rng);

    check_input_gradient(&Activation::relu(), &inputs, &mut rng);
    check_input_gradient(&Activation::sigmoid(), &inputs, &mut rng);
    check_input_gradient(&Softmax::new(), &inputs, &mut rng);
    check_input_gradient(&LogSoftmax::new(), &inputs, &mut rng);
}
