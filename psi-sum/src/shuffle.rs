//! Uniform permutation of outbound message contents.

use rand::seq::SliceRandom;
use rand::{CryptoRng, RngCore};

/// Shuffle `items` in place with a Fisher-Yates pass driven by `rng`.
///
/// Every outbound collection goes through here after it is fully computed,
/// so its order never reflects input order or worker completion order.
pub fn shuffle<T, R: RngCore + CryptoRng>(items: &mut [T], rng: &mut R) {
    items.shuffle(rng);
}
