use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

/// Generates a random level for a new node based on the HNSW probability formula.
/// Uses the formula: floor(-ln(uniform(0,1)) * ml)
pub(crate) fn generate_random_level(ml: f64, rng: &mut impl Rng) -> usize {
    // (0.0, 1.0] - avoid exactly 0 for ln
    let uniform_random: f64 = rng.gen_range(f64::EPSILON..=1.0);
    (-uniform_random.ln() * ml).floor() as usize
}

/// Creates an RNG that depends only on `seed` and `position`, so a node's level
/// is the same no matter how many process runs it took to insert it.
pub(crate) fn position_rng(seed: u64, position: usize) -> StdRng {
    // splitmix64 finalizer spreads adjacent positions apart
    let mut z = seed ^ (position as u64).wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    StdRng::seed_from_u64(z ^ (z >> 31))
}
