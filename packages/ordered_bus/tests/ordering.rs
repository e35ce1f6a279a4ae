//! Checks the public ordering primitives against the standard library sort.

use ordered_bus::{MAX_BUCKET_BITS, MIN_RADIX, bucketed_sort, radix_sort};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

fn random_pairs(rng: &mut StdRng, count: usize, max_key: u64) -> Vec<(usize, u64)> {
    (0..count)
        .map(|index| (index, rng.random_range(0..=max_key)))
        .collect()
}

fn expected_order(pairs: &[(usize, u64)]) -> Vec<usize> {
    let mut sorted = pairs.to_vec();
    sorted.sort_by_key(|(_, key)| *key);
    sorted.into_iter().map(|(index, _)| index).collect()
}

#[test]
fn radix_sort_matches_stable_sort_with_duplicates() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for radix in [MIN_RADIX, 3, 10, 16, 32, 1000] {
        for max_key in [0, 1, 7, 1_000, u64::MAX] {
            let mut pairs = random_pairs(&mut rng, 500, max_key);
            let expected = expected_order(&pairs);

            radix_sort(&mut pairs, radix);

            let actual: Vec<usize> = pairs.into_iter().map(|(index, _)| index).collect();
            assert_eq!(actual, expected, "radix {radix}, max key {max_key}");
        }
    }
}

#[test]
fn bucketed_sort_restores_permutations() {
    let mut rng = StdRng::seed_from_u64(42);

    for bucket_bits in [1, 2, 4, MAX_BUCKET_BITS] {
        for radix in [10, 32] {
            let start = rng.random_range(0..1_000_000_u64);
            let mut pairs: Vec<(u64, u64)> = (start..start + 3000).map(|s| (s, s)).collect();
            pairs.shuffle(&mut rng);

            let sorted = bucketed_sort(pairs, bucket_bits, radix);

            assert_eq!(
                sorted,
                (start..start + 3000).collect::<Vec<_>>(),
                "bucket bits {bucket_bits}, radix {radix}"
            );
        }
    }
}

#[test]
fn bucketed_sort_with_sparse_keys() {
    let mut rng = StdRng::seed_from_u64(7);
    let pairs = random_pairs(&mut rng, 2000, u64::MAX / 2);
    let expected = expected_order(&pairs);

    assert_eq!(bucketed_sort(pairs, 4, 32), expected);
}
