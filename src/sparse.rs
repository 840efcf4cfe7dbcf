use crate::dense::DenseRegisters;
use crate::rank;
use crate::settings::{
    Precision, RANK_BITS, SPARSE_GROW_COEF, SPARSE_INITIAL_BSIZE, SPARSE_PRECISION,
};

/// Bytes used to encode one `(index, rank)` pair: a 26-bit index and a 6-bit
/// rank packed into a single `u32`.
const PAIR_BYTES: usize = 4;

fn encode_pair(index: u32, rank: u8) -> u32 {
    (index << RANK_BITS) | rank as u32
}

fn decode_pair(pair: u32) -> (u32, u8) {
    (pair >> RANK_BITS, (pair & ((1 << RANK_BITS) - 1)) as u8)
}

/// Sparse cardinality storage: a sorted `list` of coalesced pairs plus an
/// unsorted `buffer` of recent appends, merged into the list once the buffer
/// fills. Pairs always use the fixed 26-bit sparse index space regardless of
/// the estimator's dense precision; conversion to dense collapses the extra
/// index bits.
#[derive(Clone, Debug)]
pub struct SparseRegisters {
    precision: Precision,
    list: Vec<u32>,
    buffer: Vec<u32>,
    byte_size: usize,
    cached_estimate: Option<u64>,
    /// Set once growing the backing allocation would exceed the dense
    /// representation's size; the caller should promote to dense.
    needs_promotion: bool,
}

impl SparseRegisters {
    pub fn with_precision(precision: Precision) -> Self {
        Self {
            precision,
            list: Vec::new(),
            buffer: Vec::new(),
            byte_size: SPARSE_INITIAL_BSIZE as usize,
            cached_estimate: None,
            needs_promotion: false,
        }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn needs_promotion(&self) -> bool {
        self.needs_promotion
    }

    pub fn add(&mut self, hash: u64) {
        let index = rank::register_index(hash, SPARSE_PRECISION);
        let value = rank::hash_rank(hash, SPARSE_PRECISION);
        self.buffer.push(encode_pair(index, value));
        self.cached_estimate = None;

        if self.pair_count() > self.capacity_pairs() {
            self.flush();
        }
    }

    fn pair_count(&self) -> usize {
        self.list.len() + self.buffer.len()
    }

    fn capacity_pairs(&self) -> usize {
        self.byte_size / PAIR_BYTES
    }

    /// Sort the buffer, merge it into the list, and coalesce duplicate
    /// indexes by keeping the higher rank. Grows the backing allocation if
    /// the merged list still doesn't fit, and flags promotion if it can't.
    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        self.buffer.sort_unstable();
        self.list = merge_coalesce(&self.list, &self.buffer);
        self.buffer.clear();

        while self.pair_count() > self.capacity_pairs() {
            let dense_bsize = self.precision.dense_bsize();
            if self.byte_size >= dense_bsize {
                self.needs_promotion = true;
                break;
            }
            self.byte_size = (self.byte_size * SPARSE_GROW_COEF as usize).min(dense_bsize);
        }
    }

    pub fn merge(&mut self, other: &Self) {
        for pair in other.iter_pairs() {
            self.buffer.push(pair);
        }
        self.cached_estimate = None;
        if self.pair_count() > self.capacity_pairs() {
            self.flush();
        }
    }

    fn iter_pairs(&self) -> impl Iterator<Item = u32> + '_ {
        self.list.iter().copied().chain(self.buffer.iter().copied())
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u8)> + '_ {
        self.iter_pairs().map(decode_pair)
    }

    /// Coalesced, sorted view of every `(index, rank)` pair currently held,
    /// flushing the buffer first so duplicates are resolved.
    fn coalesced(&self) -> Vec<u32> {
        if self.buffer.is_empty() {
            return self.list.clone();
        }
        let mut buffer = self.buffer.clone();
        buffer.sort_unstable();
        merge_coalesce(&self.list, &buffer)
    }

    /// Sparse cardinality is always estimated by linear counting against the
    /// fixed `2^26` sparse register space: the representation promotes to
    /// dense long before that space could fill, so the raw/bias-corrected
    /// HLL estimate never applies here.
    pub fn estimate(&mut self) -> u64 {
        if let Some(cached) = self.cached_estimate {
            return cached;
        }

        let pairs = self.coalesced();
        let n_sparse_registers = 1u64 << SPARSE_PRECISION;
        let zeros = n_sparse_registers - pairs.len() as u64;
        let result = linear_counting(n_sparse_registers, zeros.max(1)) as u64;

        self.cached_estimate = Some(result);
        result
    }

    pub fn to_dense(&self) -> DenseRegisters {
        let mut dense = DenseRegisters::with_precision(self.precision);
        let shift = SPARSE_PRECISION - self.precision.value();
        for pair in self.coalesced() {
            let (index, value) = decode_pair(pair);
            dense.set_if_greater(index >> shift, value);
        }
        dense
    }

    pub fn bytes_size(&self) -> usize {
        self.coalesced().len() * PAIR_BYTES
    }

    pub fn to_bytes(&self, buf: &mut [u8]) {
        for (i, pair) in self.coalesced().into_iter().enumerate() {
            let offset = i * PAIR_BYTES;
            buf[offset..offset + PAIR_BYTES].copy_from_slice(&pair.to_le_bytes());
        }
    }

    pub fn from_bytes(precision: Precision, buf: &[u8]) -> Self {
        let mut res = Self::with_precision(precision);
        let n_pairs = buf.len() / PAIR_BYTES;
        res.list = (0..n_pairs)
            .map(|i| {
                let offset = i * PAIR_BYTES;
                u32::from_le_bytes(buf[offset..offset + PAIR_BYTES].try_into().unwrap())
            })
            .collect();
        res.byte_size = res.byte_size.max(res.list.len() * PAIR_BYTES);
        res
    }
}

/// Two-way merge of an already-sorted `list` with a freshly sorted `buffer`,
/// keeping only the highest rank for duplicate indexes.
fn merge_coalesce(list: &[u32], buffer: &[u32]) -> Vec<u32> {
    let mut merged = Vec::with_capacity(list.len() + buffer.len());
    let (mut i, mut j) = (0, 0);

    while i < list.len() && j < buffer.len() {
        let (li, lv) = decode_pair(list[i]);
        let (bi, bv) = decode_pair(buffer[j]);

        match li.cmp(&bi) {
            std::cmp::Ordering::Less => {
                merged.push(list[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                merged.push(buffer[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                merged.push(encode_pair(li, lv.max(bv)));
                i += 1;
                j += 1;
            }
        }
    }
    merged.extend_from_slice(&list[i..]);
    merged.extend_from_slice(&buffer[j..]);

    dedup_adjacent_keep_max(&mut merged);
    merged
}

/// The buffer itself can contain repeated indexes from repeated `add` calls;
/// collapse those before or after the list merge so every index appears once.
fn dedup_adjacent_keep_max(pairs: &mut Vec<u32>) {
    if pairs.len() < 2 {
        return;
    }
    let mut write = 0;
    for read in 1..pairs.len() {
        let (wi, wv) = decode_pair(pairs[write]);
        let (ri, rv) = decode_pair(pairs[read]);
        if wi == ri {
            pairs[write] = encode_pair(wi, wv.max(rv));
        } else {
            write += 1;
            pairs[write] = pairs[read];
        }
    }
    pairs.truncate(write + 1);
}

fn linear_counting(n_registers: u64, zeros: u64) -> f64 {
    let m = n_registers as f64;
    m * (m / zeros as f64).ln()
}
