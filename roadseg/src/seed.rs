//! Process-wide PRNG seeding.

use burn::tensor::backend::Backend;

/// Seed every PRNG source the backend depends on from one integer.
///
/// Call once at process start. Data-side randomness (the augmentor, the
/// dataset splitter) takes the same integer explicitly at construction,
/// so there is no hidden global state beyond the backend's own.
pub fn setup_seed<B: Backend>(seed: u64) {
    B::seed(seed);
}
