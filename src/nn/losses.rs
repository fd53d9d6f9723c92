use crate::error::{ensure_shape, NetworkError, Result};
use crate::geoalg::f64_math::matrix::Matrix;

/// Terminates the backward pass.
pub trait Loss {
    /// Stores predictions and targets, returning the per-sample loss as a batch x 1 matrix.
    fn forward(&mut self, predictions: &Matrix, targets: &Matrix) -> Result<Matrix>;

    /// Gradient of the loss with respect to the stored predictions.
    fn backward(&self) -> Result<Matrix>;
}

#[derive(Debug, Clone, Default)]
struct LossCache {
    predictions: Option<Matrix>,
    targets: Option<Matrix>
}

impl LossCache {
    fn store(&mut self, predictions: &Matrix, targets: &Matrix) -> Result<(&Matrix, &Matrix)> {
        ensure_shape("loss targets", predictions.shape(), targets.shape())?;

        let predictions = self.predictions.insert(predictions.clone());
        let targets = self.targets.insert(targets.clone());
        Ok((&*predictions, &*targets))
    }

    fn stored(&self, loss: &'static str) -> Result<(&Matrix, &Matrix)> {
        match (&self.predictions, &self.targets) {
            (Some(predictions), Some(targets)) => Ok((predictions, targets)),
            _ => Err(NetworkError::UninitializedState(loss))
        }
    }
}

/// Sums `term(prediction, target)` across each row into a batch x 1 matrix.
fn per_sample(predictions: &Matrix, targets: &Matrix, term: impl Fn(f64, f64) -> f64) -> Matrix {
    let values = (0..predictions.row_count())
        .map(|row| predictions.row(row).iter().zip(targets.row(row)).map(|(&p, &t)| term(p, t)).sum::<f64>())
        .collect();

    Matrix::new(predictions.row_count(), 1, values)
}

/// Categorical cross entropy over probabilities, `Σ -t ln p`.
/// Classes with a zero target contribute nothing, even where p is zero.
#[derive(Debug, Clone, Default)]
pub struct CrossEntropy {
    cache: LossCache
}

impl CrossEntropy {
    pub fn new() -> Self { CrossEntropy::default() }
}

impl Loss for CrossEntropy {
    fn forward(&mut self, predictions: &Matrix, targets: &Matrix) -> Result<Matrix> {
        let (predictions, targets) = self.cache.store(predictions, targets)?;
        Ok(per_sample(predictions, targets, |p, t| if t == 0. { 0. } else { -t * p.ln() }))
    }

    /// `-t / p`
    fn backward(&self) -> Result<Matrix> {
        let (predictions, targets) = self.cache.stored("cross entropy")?;
        let values = predictions.read_values().iter()
            .zip(targets.read_values())
            .map(|(&p, &t)| if t == 0. { 0. } else { -t / p })
            .collect();

        Ok(Matrix::new(predictions.row_count(), predictions.column_count(), values))
    }
}

/// Negative log likelihood over log-probabilities, `Σ -t p`.
#[derive(Debug, Clone, Default)]
pub struct NegativeLogLikelihood {
    cache: LossCache
}

impl NegativeLogLikelihood {
    pub fn new() -> Self { NegativeLogLikelihood::default() }
}

impl Loss for NegativeLogLikelihood {
    fn forward(&mut self, predictions: &Matrix, targets: &Matrix) -> Result<Matrix> {
        let (predictions, targets) = self.cache.store(predictions, targets)?;
        Ok(per_sample(predictions, targets, |p, t| -t * p))
    }

    /// `-t`
    fn backward(&self) -> Result<Matrix> {
        let (_, targets) = self.cache.stored("negative log likelihood")?;
        Ok(targets.scale(-1.))
    }
}

/// Mean of a batch x 1 per-sample loss.
pub fn mean_loss(sample_losses: &Matrix) -> f64 {
    if sample_losses.is_empty() {
        return 0.;
    }

    sample_losses.sum() / sample_losses.len() as f64
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_cross_entropy() {
        let predictions = Matrix::new(2, 3, vec![
            0.7, 0.2, 0.1,
            0., 0.5, 0.5
        ]);
        let targets = Matrix::new(2, 3, vec![
            1., 0., 0.,
            0., 1., 0.
        ]);

        let mut loss = CrossEntropy::new();
        let losses = loss.forward(&predictions, &targets).unwrap();
        assert_abs_diff_eq!(losses[(0, 0)], -(0.7f64.ln()), epsilon = 1e-12);
        assert_abs_diff_eq!(losses[(1, 0)], 2f64.ln(), epsilon = 1e-12);

        let gradient = loss.backward().unwrap();
        assert_abs_diff_eq!(gradient[(0, 0)], -1. / 0.7, epsilon = 1e-12);
        assert_eq!(gradient[(1, 0)], 0.);
        assert_eq!(gradient[(1, 1)], -2.);
    }

    #[test]
    fn test_negative_log_likelihood() {
        let predictions = Matrix::new(1, 3, vec![-0.1, -2.5, -4.]);
        let targets = Matrix::new(1, 3, vec![0., 1., 0.]);

        let mut loss = NegativeLogLikelihood::new();
        let losses = loss.forward(&predictions, &targets).unwrap();
        assert_eq!(losses, Matrix::new(1, 1, vec![2.5]));
        assert_eq!(mean_loss(&losses), 2.5);

        assert_eq!(loss.backward().unwrap(), Matrix::new(1, 3, vec![-0., -1., -0.]));
    }

    #[test]
    fn test_backward_before_forward() {
        let loss = NegativeLogLikelihood::new();
        assert!(matches!(loss.backward(), Err(NetworkError::UninitializedState(_))));
    }

    #[test]
    fn test_mismatched_targets() {
        let mut loss = CrossEntropy::new();
        let err = loss.forward(&Matrix::new_zeroed(2, 3), &Matrix::new_zeroed(2, 4)).unwrap_err();
        assert!(matches!(err, NetworkError::ShapeMismatch { .. }));
    }
}
