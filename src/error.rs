use thiserror::Error;

/// Errors surfaced by layer construction, propagation and dataset loading.
/// None of these are transient, so callers should not retry.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Incompatible geometry caught while building a layer or training setup.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("shape mismatch in {context}: expected {} x {}, found {} x {}", .expected.0, .expected.1, .actual.0, .actual.1)]
    ShapeMismatch {
        context: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// Backward was requested before any forward pass stored its input and output.
    #[error("{0} backward called before forward")]
    UninitializedState(&'static str),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NetworkError>;

/// Fails with a shape mismatch unless both shapes agree.
pub(crate) fn ensure_shape(context: &'static str, expected: (usize, usize), actual: (usize, usize)) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(NetworkError::ShapeMismatch { context, expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_message() {
        let err = ensure_shape("dense backward", (2, 3), (2, 4)).unwrap_err();
        assert_eq!(err.to_string(), "shape mismatch in dense backward: expected 2 x 3, found 2 x 4");
    }

    #[test]
    fn test_matching_shapes_pass() {
        assert!(ensure_shape("relu", (5, 5), (5, 5)).is_ok());
    }
}
