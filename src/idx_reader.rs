use std::fs::File;
use std::io::{self, prelude::*, BufReader};
use std::path::Path;

use tracing::debug;

use crate::error::{NetworkError, Result};
use crate::geoalg::f64_math::matrix::Matrix;
use crate::geoalg::f64_math::optimized_functions::one_hot_encode;

const IMAGE_MAGIC: u32 = 2051;
const LABEL_MAGIC: u32 = 2049;

/// Reads MNIST style IDX files: big-endian headers followed by unsigned bytes.
pub struct IdxReader<R: Read> {
    reader: R
}

impl IdxReader<BufReader<File>> {
    /// Opens file and creates reader.
    pub fn open(file_path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(file_path)?;
        Ok(IdxReader { reader: BufReader::new(file) })
    }
}

impl<R: Read> IdxReader<R> {
    pub fn from_reader(reader: R) -> Self {
        IdxReader { reader }
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        let mut bytes = [0u8; 4];
        self.read_exact_or_truncated(&mut bytes, what)?;
        Ok(u32::from_be_bytes(bytes))
    }

    fn read_exact_or_truncated(&mut self, buffer: &mut [u8], what: &str) -> Result<()> {
        self.reader.read_exact(buffer).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => NetworkError::Dataset(format!("file ended while reading {what}")),
            _ => NetworkError::Io(e)
        })
    }

    /// Reads exactly len bytes without trusting len for the allocation up front.
    fn read_bytes(&mut self, len: usize, what: &str) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        (&mut self.reader).take(len as u64).read_to_end(&mut bytes)?;
        if bytes.len() < len {
            return Err(NetworkError::Dataset(format!("file ended after {} of {len} bytes of {what}", bytes.len())));
        }

        Ok(bytes)
    }

    fn expect_magic(&mut self, magic: u32) -> Result<()> {
        let found = self.read_u32("magic number")?;
        if found != magic {
            return Err(NetworkError::Dataset(format!("expected magic number {magic}, found {found}")));
        }
        Ok(())
    }

    /// Reads an image file into a samples x pixels matrix with each pixel scaled into [0, 1].
    pub fn read_images(mut self) -> Result<Matrix> {
        self.expect_magic(IMAGE_MAGIC)?;
        let count = self.read_u32("image count")? as usize;
        let rows = self.read_u32("row count")? as usize;
        let columns = self.read_u32("column count")? as usize;

        let pixels = rows.checked_mul(columns)
            .ok_or_else(|| NetworkError::Dataset(format!("{rows} x {columns} pixels per image overflows")))?;
        let total = count.checked_mul(pixels)
            .ok_or_else(|| NetworkError::Dataset(format!("{count} images of {pixels} pixels overflows")))?;
        let bytes = self.read_bytes(total, "pixels")?;

        debug!(count, rows, columns, "read idx images");
        Ok(Matrix::new(count, pixels, bytes.into_iter().map(|b| b as f64 / 255.).collect()))
    }

    /// Reads a label file into one-hot rows over `classes` classes.
    pub fn read_labels(mut self, classes: usize) -> Result<Matrix> {
        self.expect_magic(LABEL_MAGIC)?;
        let count = self.read_u32("label count")? as usize;

        let bytes = self.read_bytes(count, "labels")?;

        let mut values = Vec::with_capacity(count.saturating_mul(classes));
        for label in bytes {
            let label = label as usize;
            if label >= classes {
                return Err(NetworkError::Dataset(format!("label {label} is outside of {classes} classes")));
            }
            values.extend(one_hot_encode(label, classes));
        }

        debug!(count, classes, "read idx labels");
        Ok(Matrix::new(count, classes, values))
    }
}

/// Reads an IDX image file from disk.
pub fn load_images(file_path: impl AsRef<Path>) -> Result<Matrix> {
    IdxReader::open(file_path)?.read_images()
}

/// Reads an IDX label file from disk, one-hot encoded.
pub fn load_labels(file_path: impl AsRef<Path>, classes: usize) -> Result<Matrix> {
    IdxReader::open(file_path)?.read_labels(classes)
}
