/// Number of size classes for both input and output lengths
pub const NUM_BUCKETS: usize = 6;

/// Inclusive upper bounds of buckets 0..=4; anything larger is bucket 5
const BUCKET_UPPER_BOUNDS: [u32; NUM_BUCKETS - 1] = [25, 100, 250, 500, 1000];

/// Map a token count to its size bucket in `0..NUM_BUCKETS`.
///
/// Used identically for prompt and output lengths.
pub fn size_bucket(len: u32) -> usize {
    BUCKET_UPPER_BOUNDS
        .iter()
        .position(|&bound| len <= bound)
        .unwrap_or(NUM_BUCKETS - 1)
}
