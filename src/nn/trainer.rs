use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{ensure_shape, NetworkError, Result};
use crate::geoalg::f64_math::matrix::Matrix;
use crate::random::Random;
use crate::statistics::sample::Sample;

use super::losses::{mean_loss, Loss};
use super::network::Network;

const EVALUATION_CHUNK: usize = 1000;

/// Knobs for a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingHyperParameters {
    pub total_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub momentum: f64
}

impl Default for TrainingHyperParameters {
    fn default() -> Self {
        TrainingHyperParameters {
            total_epochs: 6,
            batch_size: 64,
            learning_rate: 1e-2,
            momentum: 0.5
        }
    }
}

impl TrainingHyperParameters {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(NetworkError::Configuration("batch size must be at least 1".to_string()));
        }
        if !self.learning_rate.is_finite() || !self.momentum.is_finite() {
            return Err(NetworkError::Configuration("learning rate and momentum must be finite".to_string()));
        }

        Ok(())
    }
}

/// Summary of one pass over the training data.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub mean_loss: f64,
    /// Percentage of training samples classified correctly while training.
    pub accuracy: f64,
    pub seconds: f64
}

/// Percentage of rows whose predicted class matches the target class.
pub fn accuracy(predictions: &Matrix, targets: &Matrix) -> f64 {
    if predictions.row_count() == 0 {
        return 0.;
    }

    correct_count(predictions, targets) as f64 * 100. / predictions.row_count() as f64
}

fn correct_count(predictions: &Matrix, targets: &Matrix) -> usize {
    (0..predictions.row_count())
        .filter(|&row| predictions.row_argmax(row) == targets.row_argmax(row))
        .count()
}

/// Assembles the rows of a batch in index order.
pub fn gather_rows(matrix: &Matrix, indices: &[usize]) -> Matrix {
    matrix.gather_rows(indices)
}

/// Trains the network with shuffled mini-batches, one report per epoch.
pub fn train_network(
    network: &mut Network,
    loss: &mut impl Loss,
    images: &Matrix,
    labels: &Matrix,
    tp: &TrainingHyperParameters,
    rng: &mut Random
) -> Result<Vec<EpochReport>> {
    tp.validate()?;
    if images.row_count() != labels.row_count() {
        return Err(NetworkError::Configuration(format!(
            "{} images but {} labels", images.row_count(), labels.row_count())));
    }

    let samples = images.row_count();
    let mut sample = Sample::create_sample(samples, rng);
    let mut reports = Vec::with_capacity(tp.total_epochs);
    let mut lowest_loss = f64::INFINITY;

    info!(samples, epochs = tp.total_epochs, batch_size = tp.batch_size, "beginning training");
    for epoch in 1..=tp.total_epochs {
        let started = Instant::now();
        let mut total_loss = 0.;
        let mut correct = 0;
        let mut batch_index = 0;

        sample.reset(rng);
        while let Some(indices) = sample.random_batch(tp.batch_size) {
            let batch = gather_rows(images, indices);
            let targets = gather_rows(labels, indices);

            let predictions = network.forward(&batch)?;
            ensure_shape("training predictions", targets.shape(), predictions.shape())?;
            correct += correct_count(predictions, &targets);

            let sample_losses = loss.forward(predictions, &targets)?;
            total_loss += sample_losses.sum();

            let gradient = loss.backward()?;
            network.backward(&gradient, tp.learning_rate, tp.momentum)?;

            debug!(epoch, batch = batch_index, loss = mean_loss(&sample_losses), "trained batch");
            batch_index += 1;
        }

        let report = EpochReport {
            epoch,
            mean_loss: if samples == 0 { 0. } else { total_loss / samples as f64 },
            accuracy: if samples == 0 { 0. } else { correct as f64 * 100. / samples as f64 },
            seconds: started.elapsed().as_secs_f64()
        };

        info!(epoch, loss = report.mean_loss, accuracy = report.accuracy, seconds = report.seconds, "epoch complete");
        if report.mean_loss < lowest_loss {
            lowest_loss = report.mean_loss;
        } else {
            warn!(epoch, loss = report.mean_loss, lowest = lowest_loss, "loss has not improved, consider stopping training here");
        }

        reports.push(report);
    }

    Ok(reports)
}

/// Accuracy of the network over a held-out set.
/// Rows are forwarded in chunks so large sets do not hold every activation at once.
pub fn evaluate(network: &mut Network, images: &Matrix, labels: &Matrix) -> Result<f64> {
    ensure_shape("evaluation labels", (images.row_count(), labels.column_count()), labels.shape())?;

    let samples = images.row_count();
    let mut correct = 0;
    for start in (0..samples).step_by(EVALUATION_CHUNK) {
        let indices: Vec<usize> = (start..samples.min(start + EVALUATION_CHUNK)).collect();
        let targets = gather_rows(labels, &indices);

        let predictions = network.forward(&gather_rows(images, &indices))?;
        ensure_shape("evaluation predictions", targets.shape(), predictions.shape())?;
        correct += correct_count(predictions, &targets);
    }

    let accuracy = if samples == 0 { 0. } else { correct as f64 * 100. / samples as f64 };
    info!(samples, accuracy, "evaluated network");
    Ok(accuracy)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::nn::activations::softmax::LogSoftmax;
    use crate::nn::layers::dense::Dense;
    use crate::nn::losses::NegativeLogLikelihood;

    use super::*;

    #[test]
    fn test_accuracy() {
        let predictions = Matrix::new(4, 3, vec![
            0.1, 0.8, 0.1,
            0.5, 0.5, 0.,
            0.2, 0.2, 0.6,
            0.9, 0.05, 0.05
        ]);
        let targets = Matrix::new(4, 3, vec![
            0., 1., 0.,
            1., 0., 0.,
            1., 0., 0.,
            0., 0., 1.
        ]);

        // Row 1 ties, the first maximum wins.
        assert_abs_diff_eq!(accuracy(&predictions, &targets), 50.);
    }

    #[test]
    fn test_default_parameters_validate() {
        let tp = TrainingHyperParameters::default();
        assert!(tp.validate().is_ok());
        assert_eq!(tp.batch_size, 64);

        let bad = TrainingHyperParameters { batch_size: 0, ..tp.clone() };
        assert!(matches!(bad.validate(), Err(NetworkError::Configuration(_))));

        let bad = TrainingHyperParameters { learning_rate: f64::NAN, ..tp };
        assert!(matches!(bad.validate(), Err(NetworkError::Configuration(_))));
    }

    #[test]
    fn test_training_reports_each_epoch() {
        let mut rng = Random::new(4);
        let mut network = Network::new()
            .with_node(Dense::new(2, 2, &mut rng).unwrap())
            .with_node(LogSoftmax::new());

        // Class is 0 when the first feature dominates.
        let images = Matrix::new(6, 2, vec![
            1., 0.,
            0.9, 0.1,
            0.8, 0.,
            0., 1.,
            0.1, 0.9,
            0., 0.7
        ]);
        let labels = Matrix::new(6, 2, vec![
            1., 0.,
            1., 0.,
            1., 0.,
            0., 1.,
            0., 1.,
            0., 1.
        ]);

        let tp = TrainingHyperParameters { total_epochs: 40, batch_size: 4, learning_rate: 0.5, momentum: 0.5 };
        let reports = train_network(&mut network, &mut NegativeLogLikelihood::new(), &images, &labels, &tp, &mut rng).unwrap();

        assert_eq!(reports.len(), 40);
        assert_eq!(reports[0].epoch, 1);
        assert!(reports[39].mean_loss < reports[0].mean_loss);
        assert_abs_diff_eq!(evaluate(&mut network, &images, &labels).unwrap(), 100.);
    }

    #[test]
    fn test_mismatched_sample_counts() {
        let mut rng = Random::new(4);
        let mut network = Network::new().with_node(Dense::new(2, 2, &mut rng).unwrap());

        let err = train_network(
            &mut network,
            &mut NegativeLogLikelihood::new(),
            &Matrix::new_zeroed(3, 2),
            &Matrix::new_zeroed(2, 2),
            &TrainingHyperParameters::default(),
            &mut rng).unwrap_err();
        assert!(matches!(err, NetworkError::Configuration(_)));
    }
}
