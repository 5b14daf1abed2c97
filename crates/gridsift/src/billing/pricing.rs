/// Price tiers as `(max photos, credits)`. Larger batches cost the top rate.
const TIERS: &[(usize, u64)] = &[(100, 1), (500, 3), (1000, 5), (2000, 8)];
const TOP_RATE: u64 = 10;

/// Credits charged for triaging `photo_count` photos.
pub fn credit_cost(photo_count: usize) -> u64 {
    TIERS
        .iter()
        .find(|(max, _)| photo_count <= *max)
        .map(|(_, cost)| *cost)
        .unwrap_or(TOP_RATE)
}
