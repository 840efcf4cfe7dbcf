use thiserror::Error;

/// Number of bits used to store the rank (trailing-zero count + 1) of a hash.
pub const RANK_BITS: u32 = 6;
/// The largest value a register or sparse-pair rank can hold.
pub const RANK_MAX: u8 = (1 << RANK_BITS) - 1;

/// Precision used internally by the sparse representation, independent of
/// the dense precision an estimator was created with.
pub const SPARSE_PRECISION: u8 = 26;

/// Minimum and maximum supported dense precision values.
pub const MIN_PRECISION: u8 = 6;
pub const MAX_PRECISION: u8 = 18;

/// Below this precision the sparse representation can't store enough pairs
/// to be worth it; dense is already small.
pub const SPARSE_MIN_PRECISION: u8 = 10;
/// Initial allocation size, in bytes, of a sparse buffer. Must exceed the
/// pairs header size.
pub const SPARSE_INITIAL_BSIZE: u32 = 48;
/// Sparse buffers double in size each time they grow.
pub const SPARSE_GROW_COEF: u32 = 2;

#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("precision must be between {MIN_PRECISION} and {MAX_PRECISION}, got {0}")]
    UnsupportedPrecision(u8),
}

fn is_supported_precision(precision: u8) -> bool {
    (MIN_PRECISION..=MAX_PRECISION).contains(&precision)
}

/// Validated dense precision, plus the constants derived from it that the
/// hot path (`add`/`estimate`) needs so they are never recomputed per call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Precision {
    pub(crate) value: u8,
    pub(crate) n_registers: u32,
    pub(crate) dense_bsize: usize,
    pub(crate) alpha_m_squared: f64,
}

impl Precision {
    pub fn new(value: u8) -> Result<Self, SettingsError> {
        if !is_supported_precision(value) {
            return Err(SettingsError::UnsupportedPrecision(value));
        }

        let n_registers: u32 = 1 << value;
        Ok(Self {
            value,
            n_registers,
            dense_bsize: (n_registers as usize * RANK_BITS as usize) / 8,
            alpha_m_squared: alpha(value) * (n_registers as f64) * (n_registers as f64),
        })
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn n_registers(&self) -> u32 {
        self.n_registers
    }

    pub fn dense_bsize(&self) -> usize {
        self.dense_bsize
    }

    pub fn standard_error(&self) -> f64 {
        1.04 / (self.n_registers as f64).sqrt()
    }

    pub(crate) fn alpha_m_squared(&self) -> f64 {
        self.alpha_m_squared
    }
}

/// The alpha constant used in the raw HyperLogLog estimation formula.
fn alpha(precision: u8) -> f64 {
    match precision {
        4 => 0.673,
        5 => 0.697,
        6 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / (1u32 << precision) as f64),
    }
}
