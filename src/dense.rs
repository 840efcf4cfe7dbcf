use crate::rank::{self, POW2_NEG};
use crate::settings::{Precision, RANK_BITS, RANK_MAX};
use crate::tables;
use crate::utils::{calc_position, read_u8_bits, write_u8_bits};

/// The fully materialized register array: one 6-bit rank per bucket, packed
/// four-to-a-24-bit-word the way the reference's `reg_bucket` does, cached
/// estimate invalidated on every write.
#[derive(Clone, Debug)]
pub struct DenseRegisters {
    precision: Precision,
    buf: Vec<u8>,
    cached_estimate: Option<u64>,
}

impl DenseRegisters {
    pub fn with_precision(precision: Precision) -> Self {
        Self {
            precision,
            buf: vec![0; precision.dense_bsize()],
            cached_estimate: None,
        }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn add(&mut self, hash: u64) {
        let index = rank::register_index(hash, self.precision.value());
        let value = rank::hash_rank(hash, self.precision.value());
        self.set_if_greater(index, value);
    }

    pub fn get(&self, reg_num: u32) -> u8 {
        let (idx, pos) = calc_position(reg_num, RANK_BITS as u8);
        read_u8_bits(&self.buf, idx, pos, RANK_BITS as u8)
    }

    pub fn set_if_greater(&mut self, reg_num: u32, value: u8) {
        debug_assert!(value <= RANK_MAX);
        let (idx, pos) = calc_position(reg_num, RANK_BITS as u8);
        let current = read_u8_bits(&self.buf, idx, pos, RANK_BITS as u8);

        if value > current {
            write_u8_bits(&mut self.buf, idx, pos, value, RANK_BITS as u8);
            self.cached_estimate = None;
        }
    }

    pub fn merge(&mut self, other: &Self) {
        for (reg_num, value) in other.iter() {
            self.set_if_greater(reg_num, value);
        }
    }

    /// Number of registers still at rank 0.
    fn count_zeros(&self) -> u32 {
        (0..self.precision.n_registers())
            .filter(|&i| self.get(i) == 0)
            .count() as u32
    }

    /// The indicator sum `Z = sum(2^-M[j])` and the number of zero registers.
    fn indicator(&self) -> (f64, u32) {
        let mut sum = 0.0;
        let mut zeros = 0;
        for i in 0..self.precision.n_registers() {
            let value = self.get(i);
            sum += POW2_NEG[value as usize];
            if value == 0 {
                zeros += 1;
            }
        }
        (sum, zeros)
    }

    pub fn estimate(&mut self) -> u64 {
        if let Some(cached) = self.cached_estimate {
            return cached;
        }

        let n_registers = self.precision.n_registers() as u64;
        let zeros = self.count_zeros();
        let linear_threshold = tables::linear_counting_threshold(self.precision.value());

        let result = if zeros > 0 {
            let linear = linear_counting(n_registers, zeros);
            if linear < linear_threshold as f64 {
                linear as u64
            } else {
                self.raw_estimate()
            }
        } else {
            self.raw_estimate()
        };

        self.cached_estimate = Some(result);
        result
    }

    fn raw_estimate(&self) -> u64 {
        let (sum, _zeros) = self.indicator();
        let raw = self.precision.alpha_m_squared() / sum;
        let corrected = raw - tables::bias_correction(self.precision.value(), raw);
        corrected as u64
    }

    pub fn iter(&self) -> RegisterIter<'_> {
        RegisterIter {
            reg_num: 0,
            reg_cnt: self.precision.n_registers(),
            registers: self,
        }
    }

    pub fn bytes_size(&self) -> usize {
        self.buf.len()
    }

    pub fn to_bytes(&self, buf: &mut [u8]) {
        buf[..self.buf.len()].copy_from_slice(&self.buf);
    }

    pub fn from_bytes(precision: Precision, buf: &[u8]) -> Self {
        let mut res = Self::with_precision(precision);
        let n = res.buf.len().min(buf.len());
        res.buf[..n].copy_from_slice(&buf[..n]);
        res
    }
}

/// Linear-counting estimate: `m * ln(m / zeros)`.
fn linear_counting(n_registers: u64, zeros: u32) -> f64 {
    let m = n_registers as f64;
    m * (m / zeros as f64).ln()
}

pub struct RegisterIter<'a> {
    reg_num: u32,
    reg_cnt: u32,
    registers: &'a DenseRegisters,
}

impl Iterator for RegisterIter<'_> {
    type Item = (u32, u8);

    fn next(&mut self) -> Option<Self::Item> {
        if self.reg_num < self.reg_cnt {
            let value = self.registers.get(self.reg_num);
            let res = Some((self.reg_num, value));
            self.reg_num += 1;
            return res;
        }
        None
    }
}
