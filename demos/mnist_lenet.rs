// For this example to work, extract the four MNIST idx files into a data folder.
// Use the following command to run in release mode:
// cargo run --release --example mnist_lenet -- --cnn

use std::process::ExitCode;
use std::time::Instant;

use convnet::idx_reader::{load_images, load_labels};
use convnet::nn::activations::{activation::Activation, softmax::LogSoftmax};
use convnet::nn::layers::{convolution2d::Convolution2d, dense::Dense, Dimensions};
use convnet::nn::losses::NegativeLogLikelihood;
use convnet::nn::trainer::{evaluate, train_network, TrainingHyperParameters};
use convnet::{Network, Random, Result};
use tracing::{error, info, Level};

const CLASSES: usize = 10;

/// 784 -> 300 -> 10 with a sigmoid hidden layer.
fn multilayer_perceptron(rng: &mut Random) -> Result<Network> {
    let dense1 = Dense::new(28 * 28, 300, rng)?;
    let dense2 = dense1.feed_into_dense(CLASSES, rng)?;

    Ok(Network::new()
        .with_node(dense1)
        .with_node(Activation::sigmoid())
        .with_node(dense2)
        .with_node(LogSoftmax::new()))
}

/// LeNet style: two convolution and pooling stages followed by two dense layers.
fn lenet(rng: &mut Random) -> Result<Network> {
    let convo1 = Convolution2d::new(Dimensions::square(28), Dimensions::square(5), 1, 6, rng)?;
    let maxpool1 = convo1.feed_into_maxpool(Dimensions::square(2))?;
    let convo2 = maxpool1.feed_into_convolution(Dimensions::square(5), 16, rng)?;
    let maxpool2 = convo2.feed_into_maxpool(Dimensions::square(2))?;
    let dense1 = maxpool2.feed_into_dense(84, rng)?;
    let dense2 = dense1.feed_into_dense(CLASSES, rng)?;

    Ok(Network::new()
        .with_node(convo1)
        .with_node(maxpool1)
        .with_node(Activation::relu())
        .with_node(convo2)
        .with_node(maxpool2)
        .with_node(Activation::relu())
        .with_node(dense1)
        .with_node(Activation::relu())
        .with_node(dense2)
        .with_node(LogSoftmax::new()))
}

fn handwritten_digits(use_cnn: bool) -> Result<()> {
    let started = Instant::now();
    let mut rng = Random::from_entropy();

    let train_images = load_images("./data/train-images-idx3-ubyte")?;
    let train_labels = load_labels("./data/train-labels-idx1-ubyte", CLASSES)?;
    let test_images = load_images("./data/t10k-images-idx3-ubyte")?;
    let test_labels = load_labels("./data/t10k-labels-idx1-ubyte", CLASSES)?;
    info!(training = train_images.row_count(), testing = test_images.row_count(), "loaded mnist");

    let mut network = if use_cnn { lenet(&mut rng)? } else { multilayer_perceptron(&mut rng)? };
    let tp = TrainingHyperParameters::default();

    train_network(&mut network, &mut NegativeLogLikelihood::new(), &train_images, &train_labels, &tp, &mut rng)?;
    let accuracy = evaluate(&mut network, &test_images, &test_labels)?;

    info!(accuracy, seconds = started.elapsed().as_secs_f64(), "finished");
    Ok(())
}

// Runs a neural network for handwritten digit recognition.
fn main() -> ExitCode {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let use_cnn = match std::env::args().nth(1).as_deref() {
        None | Some("--cnn") => true,
        Some("--mlp") => false,
        Some(other) => {
            error!(argument = other, "expected --mlp or --cnn");
            return ExitCode::FAILURE;
        }
    };

    match handwritten_digits(use_cnn) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "training failed");
            ExitCode::FAILURE
        }
    }
}
