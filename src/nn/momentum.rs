use crate::geoalg::f64_math::matrix::Matrix;

/// Velocity buffer paired with one parameter matrix.
/// Applies `velocity = momentum * velocity + learning_rate * gradient` then `parameter -= velocity`.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentumBuffer {
    velocity: Matrix
}

impl MomentumBuffer {
    /// Zeroed velocity shaped like the parameter it tracks.
    pub fn for_parameter(parameter: &Matrix) -> Self {
        MomentumBuffer { velocity: Matrix::new_zeroed(parameter.row_count(), parameter.column_count()) }
    }

    pub fn velocity(&self) -> &Matrix { &self.velocity }

    /// Updates parameter in place from its gradient.
    pub fn step(&mut self, parameter: &mut Matrix, gradient: &Matrix, learning_rate: f64, momentum: f64) {
        assert_eq!(parameter.shape(), self.velocity.shape(), "Momentum buffer must match its parameter.");
        assert_eq!(parameter.shape(), gradient.shape(), "Gradient must match its parameter.");

        let velocities = self.velocity.values_mut();
        let parameters = parameter.values_mut();
        for ((v, p), g) in velocities.iter_mut().zip(parameters.iter_mut()).zip(gradient.read_values()) {
            *v = momentum * *v + learning_rate * g;
            *p -= *v;
        }
    }
}
