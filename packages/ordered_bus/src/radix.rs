//! Order reconstruction by sequence number.
//!
//! Items arrive as `(item, sequence)` pairs in arbitrary order. They are split into `2^bits`
//! buckets by the high bits of their (rebased) sequence number, each bucket is radix sorted on
//! its own, and the buckets are concatenated. Every key in bucket `k` is smaller than every key
//! in bucket `k + 1`, so the concatenation is globally sorted without a merge step and the
//! buckets can be sorted in parallel.

use std::mem;

/// Smallest radix accepted by [`radix_sort()`].
pub const MIN_RADIX: usize = 2;

/// Largest bucket split accepted by [`bucketed_sort()`], as a power of two.
pub const MAX_BUCKET_BITS: u32 = 8;

/// Stable least-significant-digit radix sort of `items` by their `u64` key.
///
/// Each pass is a counting sort on one base-`radix` digit. The number of passes is the number
/// of base-`radix` digits in the largest key, so small keys sort in few passes.
///
/// # Panics
///
/// Panics if `radix` is below [`MIN_RADIX`].
///
/// # Example
///
/// ```
/// use ordered_bus::radix_sort;
///
/// let mut items = vec![('c', 30), ('a', 10), ('b', 20), ('d', 30)];
/// radix_sort(&mut items, 10);
///
/// let order: Vec<char> = items.iter().map(|(c, _)| *c).collect();
/// assert_eq!(order, vec!['a', 'b', 'c', 'd']);
/// ```
pub fn radix_sort<T>(items: &mut Vec<(T, u64)>, radix: usize) {
    assert!(
        radix >= MIN_RADIX,
        "radix must be at least {MIN_RADIX}, got {radix}"
    );

    if items.len() < 2 {
        return;
    }

    let mut keys: Vec<(u64, usize)> = items
        .iter()
        .enumerate()
        .map(|(index, (_, key))| (*key, index))
        .collect();

    sort_keys(&mut keys, radix);

    let mut slots: Vec<Option<(T, u64)>> = mem::take(items).into_iter().map(Some).collect();

    items.extend(keys.into_iter().map(|(_, index)| {
        slots
            .get_mut(index)
            .and_then(Option::take)
            .expect("sort_keys produces a permutation of the original indexes")
    }));
}

/// Counting sort passes over `(key, original index)` pairs, ping-ponging between two buffers.
#[expect(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "digits are always below radix, counts never exceed the item count"
)]
#[expect(
    clippy::cast_possible_truncation,
    reason = "a digit is below radix, which is a usize"
)]
fn sort_keys(keys: &mut Vec<(u64, usize)>, radix: usize) {
    let max_key = keys.iter().map(|(key, _)| *key).max().unwrap_or(0);
    let radix_u64 = radix as u64;

    let mut scratch = vec![(0_u64, 0_usize); keys.len()];
    let mut counts = vec![0_usize; radix];
    let mut exp: u64 = 1;

    while max_key / exp > 0 {
        counts.fill(0);

        for (key, _) in keys.iter() {
            counts[((key / exp) % radix_u64) as usize] += 1;
        }

        for digit in 1..radix {
            counts[digit] += counts[digit - 1];
        }

        // Walking backwards keeps equal digits in their current relative order.
        for &(key, index) in keys.iter().rev() {
            let digit = ((key / exp) % radix_u64) as usize;
            counts[digit] -= 1;
            scratch[counts[digit]] = (key, index);
        }

        mem::swap(keys, &mut scratch);

        match exp.checked_mul(radix_u64) {
            Some(next) => exp = next,
            None => break,
        }
    }
}

/// The result of splitting a drained set of events by sequence number.
#[derive(Debug)]
pub(crate) enum Partition<T> {
    /// Nothing to sort: at most one distinct key.
    Trivial(Vec<T>),

    /// Buckets in ascending key order, each still to be sorted. Keys are rebased so the
    /// smallest sequence number in the set becomes zero.
    Buckets(Vec<Vec<(T, u64)>>),
}

/// Splits `items` into `2^bucket_bits` buckets by the `bucket_bits` bits just below the most
/// significant set bit of the largest rebased key.
pub(crate) fn partition<T>(items: Vec<(T, u64)>, bucket_bits: u32) -> Partition<T> {
    let bucket_bits = bucket_bits.clamp(1, MAX_BUCKET_BITS);

    let min_sequence = items.iter().map(|(_, sequence)| *sequence).min().unwrap_or(0);
    let max_key = items
        .iter()
        .map(|(_, sequence)| sequence.wrapping_sub(min_sequence))
        .max()
        .unwrap_or(0);

    if max_key == 0 {
        return Partition::Trivial(items.into_iter().map(|(item, _)| item).collect());
    }

    let significant_bits = u64::BITS.wrapping_sub(max_key.leading_zeros());
    let shift = significant_bits.saturating_sub(bucket_bits);
    let bucket_count = 1_usize << bucket_bits;

    let mut buckets: Vec<Vec<(T, u64)>> = (0..bucket_count).map(|_| Vec::new()).collect();

    for (item, sequence) in items {
        let key = sequence.wrapping_sub(min_sequence);

        #[expect(
            clippy::cast_possible_truncation,
            reason = "key >> shift is below 2^bucket_bits, which fits in usize"
        )]
        let bucket = (key >> shift) as usize;

        buckets
            .get_mut(bucket)
            .expect("key >> shift is always below the bucket count")
            .push((item, key));
    }

    Partition::Buckets(buckets)
}

/// Joins sorted buckets back into one sequence, dropping the keys.
pub(crate) fn concatenate<T>(buckets: Vec<Vec<(T, u64)>>) -> Vec<T> {
    let total = buckets.iter().map(Vec::len).sum();
    let mut ordered = Vec::with_capacity(total);

    for bucket in buckets {
        ordered.extend(bucket.into_iter().map(|(item, _)| item));
    }

    ordered
}

/// Orders `items` by sequence number on the calling thread, using the same bucket split that
/// the bus uses for its parallel sort.
///
/// If no two items have different sequence numbers, the input order is returned unchanged.
///
/// # Panics
///
/// Panics if `radix` is below [`MIN_RADIX`].
///
/// # Example
///
/// ```
/// use ordered_bus::bucketed_sort;
///
/// let items = vec![("late", 900), ("early", 3), ("middle", 450)];
/// let ordered = bucketed_sort(items, 4, 32);
///
/// assert_eq!(ordered, vec!["early", "middle", "late"]);
/// ```
pub fn bucketed_sort<T>(items: Vec<(T, u64)>, bucket_bits: u32, radix: usize) -> Vec<T> {
    match partition(items, bucket_bits) {
        Partition::Trivial(items) => items,
        Partition::Buckets(mut buckets) => {
            for bucket in &mut buckets {
                radix_sort(bucket, radix);
            }

            concatenate(buckets)
        }
    }
}
