//! A HyperLogLog cardinality estimator with sparse and dense representations,
//! bias-corrected raw estimates, and a linear-counting fallback.
//!
//! Estimators are constructed with [`Hll::new`], fed caller-supplied 64-bit
//! hashes with [`Hll::add`], and combined with [`Hll::merge`]. The hash
//! function itself is an external concern: this crate never hashes anything,
//! it only consumes the top bits of whatever hash the caller provides.

use dense::DenseRegisters;
use settings::{Precision, SettingsError};
use sparse::SparseRegisters;
use thiserror::Error;

mod dense;
#[cfg(test)]
mod dense_test;
pub mod settings;
mod sparse;
mod rank;
mod tables;
mod utils;

/// Which internal storage an estimator starts in. `add` and `merge` may
/// promote a `Sparse` estimator to `Dense` once it grows large enough; there
/// is no path back from `Dense` to `Sparse`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Representation {
    Sparse,
    Dense,
}

#[derive(Clone, Debug, Error)]
pub enum HllError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("cannot combine estimators built with different precisions: {0} vs {1}")]
    MismatchedPrecision(u8, u8),
    #[error("unrecognized serialized representation tag {0}")]
    UnknownRepresentation(u8),
    #[error("truncated buffer: expected at least {expected} bytes, got {actual}")]
    TruncatedBuffer { expected: usize, actual: usize },
}

/// Tag byte written by `to_bytes`/read by `from_bytes` to identify which
/// variant a serialized buffer holds.
const TAG_SPARSE: u8 = 1;
const TAG_DENSE: u8 = 2;

#[derive(Clone, Debug)]
pub enum Hll {
    Sparse(SparseRegisters),
    Dense(DenseRegisters),
}

impl Hll {
    pub fn new(precision: u8, representation: Representation) -> Result<Self, HllError> {
        let precision = Precision::new(precision)?;
        Ok(match representation {
            Representation::Sparse => Hll::Sparse(SparseRegisters::with_precision(precision)),
            Representation::Dense => Hll::Dense(DenseRegisters::with_precision(precision)),
        })
    }

    /// Record one observation. `hash` is the caller's 64-bit hash of the
    /// observed element, not the element itself.
    pub fn add(&mut self, hash: u64) {
        match self {
            Hll::Sparse(sparse) => {
                sparse.add(hash);
                if sparse.needs_promotion() {
                    *self = Hll::Dense(sparse.to_dense());
                }
            }
            Hll::Dense(dense) => dense.add(hash),
        }
    }

    /// Fold `src`'s observations into `self`. Both estimators must share a
    /// precision. A sparse destination merged with a dense source (or one
    /// that grows past the sparse capacity) is promoted to dense.
    pub fn merge(&mut self, src: &Hll) -> Result<(), HllError> {
        if self.precision() != src.precision() {
            return Err(HllError::MismatchedPrecision(
                self.precision(),
                src.precision(),
            ));
        }

        match (&mut *self, src) {
            (Hll::Sparse(dst), Hll::Sparse(src)) => {
                dst.merge(src);
                if dst.needs_promotion() {
                    *self = Hll::Dense(dst.to_dense());
                }
            }
            (Hll::Sparse(dst), Hll::Dense(src)) => {
                let mut dense = dst.to_dense();
                dense.merge(src);
                *self = Hll::Dense(dense);
            }
            (Hll::Dense(dst), Hll::Sparse(src)) => {
                dst.merge(&src.to_dense());
            }
            (Hll::Dense(dst), Hll::Dense(src)) => {
                dst.merge(src);
            }
        }

        Ok(())
    }

    /// The cardinality estimate. Cached until the next `add`/`merge`.
    pub fn estimate(&mut self) -> u64 {
        match self {
            Hll::Sparse(sparse) => sparse.estimate(),
            Hll::Dense(dense) => dense.estimate(),
        }
    }

    pub fn precision(&self) -> u8 {
        match self {
            Hll::Sparse(sparse) => sparse.precision().value(),
            Hll::Dense(dense) => dense.precision().value(),
        }
    }

    pub fn representation(&self) -> Representation {
        match self {
            Hll::Sparse(_) => Representation::Sparse,
            Hll::Dense(_) => Representation::Dense,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let (tag, precision, payload_size) = match self {
            Hll::Sparse(sparse) => (TAG_SPARSE, sparse.precision().value(), sparse.bytes_size()),
            Hll::Dense(dense) => (TAG_DENSE, dense.precision().value(), dense.bytes_size()),
        };

        let mut buf = vec![0u8; 2 + payload_size];
        buf[0] = tag;
        buf[1] = precision;
        match self {
            Hll::Sparse(sparse) => sparse.to_bytes(&mut buf[2..]),
            Hll::Dense(dense) => dense.to_bytes(&mut buf[2..]),
        }
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, HllError> {
        if buf.len() < 2 {
            return Err(HllError::TruncatedBuffer {
                expected: 2,
                actual: buf.len(),
            });
        }

        let tag = buf[0];
        let precision = Precision::new(buf[1])?;
        let payload = &buf[2..];

        Ok(match tag {
            TAG_SPARSE => Hll::Sparse(SparseRegisters::from_bytes(precision, payload)),
            TAG_DENSE => Hll::Dense(DenseRegisters::from_bytes(precision, payload)),
            other => return Err(HllError::UnknownRepresentation(other)),
        })
    }
}

/// The theoretical relative standard error of an estimator at the given
/// precision: `1.04 / sqrt(2^precision)`.
pub fn standard_error(precision: u8) -> Result<f64, HllError> {
    Ok(Precision::new(precision)?.standard_error())
}
