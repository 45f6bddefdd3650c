pub use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::utils;

static ENV_RNG_SEED: &str = "SEED";

/// Seed from the `SEED` environment variable. Unparsable values are ignored.
pub fn env_seed() -> Option<u64> {
    utils::env::var_opt::<_, u64>(ENV_RNG_SEED).unwrap_or(None)
}

/// A generator seeded from `SEED` when it is set, from entropy otherwise.
pub fn rng() -> StdRng {
    match env_seed() {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

pub fn rng_with_seed(seed: Option<u64>) -> StdRng {
    match seed.or_else(env_seed) {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
