use crate::dense::DenseRegisters;
use crate::settings::Precision;

fn dense_test_precision() -> Precision {
    Precision::new(11).unwrap()
}

/// Builds a hash whose top `precision` bits are `index` and whose payload has
/// its lowest set bit at position `rank - 1`, so `hash_rank` reports `rank`.
pub(crate) fn construct_hash(precision: u8, index: u32, rank: u8) -> u64 {
    let index_bits = (index as u64) << (64 - precision as u32);
    let payload = 1u64 << (rank - 1);
    index_bits | payload
}

#[test]
fn set_if_greater_is_a_no_op_for_smaller_values() {
    let mut dense = DenseRegisters::with_precision(dense_test_precision());
    dense.set_if_greater(1, 5);
    dense.set_if_greater(1, 3);
    assert_eq!(dense.get(1), 5);
}

#[test]
fn set_if_greater_updates_on_larger_values() {
    let mut dense = DenseRegisters::with_precision(dense_test_precision());
    dense.set_if_greater(1, 5);
    dense.set_if_greater(1, 9);
    assert_eq!(dense.get(1), 9);
}

#[test]
fn registers_pack_independently_across_the_whole_range() {
    let precision = dense_test_precision();
    let mut dense = DenseRegisters::with_precision(precision);

    for i in 0..precision.n_registers() {
        dense.set_if_greater(i, ((i % 63) + 1) as u8);
    }

    for i in 0..precision.n_registers() {
        assert_eq!(dense.get(i), ((i % 63) + 1) as u8, "register {i}");
    }
}

#[test]
fn add_selects_the_register_named_by_the_top_bits() {
    let precision = dense_test_precision();
    let mut dense = DenseRegisters::with_precision(precision);

    let hash = construct_hash(precision.value(), 7, 4);
    dense.add(hash);

    assert_eq!(dense.get(7), 4);
    for i in 0..precision.n_registers() {
        if i != 7 {
            assert_eq!(dense.get(i), 0);
        }
    }
}

#[test]
fn to_bytes_from_bytes_round_trips_register_contents() {
    let precision = dense_test_precision();
    let mut dense = DenseRegisters::with_precision(precision);
    for i in 0..20 {
        dense.set_if_greater(i, ((i % 9) + 1) as u8);
    }

    let mut buf = vec![0u8; dense.bytes_size()];
    dense.to_bytes(&mut buf);

    let restored = DenseRegisters::from_bytes(precision, &buf);
    for i in 0..precision.n_registers() {
        assert_eq!(dense.get(i), restored.get(i), "register {i}");
    }
}

#[test]
fn estimate_uses_linear_counting_when_registers_are_mostly_zero() {
    let precision = Precision::new(14).unwrap();
    let mut dense = DenseRegisters::with_precision(precision);
    for i in 0..10 {
        dense.set_if_greater(i, 1);
    }

    // 10 out of 16384 registers set; far below the linear-counting threshold.
    let estimate = dense.estimate();
    assert!((8..=12).contains(&estimate), "estimate was {estimate}");
}

#[test]
fn estimate_is_cached_until_the_next_write() {
    let precision = dense_test_precision();
    let mut dense = DenseRegisters::with_precision(precision);
    dense.set_if_greater(0, 1);

    let first = dense.estimate();
    dense.set_if_greater(1, 1);
    let second = dense.estimate();

    assert_ne!(first, second);
}
