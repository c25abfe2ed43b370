//! Random helpers used by the background loops.
//!
//! Every helper has an `_with` variant taking an explicit generator so the
//! probabilistic decisions can be replayed in tests with a seeded `StdRng`.

use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

/// Returns a uniform random float in [0,1).
pub fn float64() -> f64 {
    rand::thread_rng().gen::<f64>()
}

/// Draws a uniform integer in `[0, upper)`. An `upper` of zero behaves like one.
pub fn below(upper: u64) -> u64 {
    below_with(&mut rand::thread_rng(), upper)
}

pub fn below_with<R: Rng + ?Sized>(rng: &mut R, upper: u64) -> u64 {
    if upper <= 1 {
        return 0;
    }
    rng.gen_range(0..upper)
}

/// Picks one element uniformly.
pub fn pick<T>(items: &[T]) -> Option<&T> {
    items.choose(&mut rand::thread_rng())
}

pub fn pick_with<'a, T, R: Rng + ?Sized>(rng: &mut R, items: &'a [T]) -> Option<&'a T> {
    items.choose(rng)
}

/// Spreads `base` uniformly over `[base * (1 - spread), base * (1 + spread)]`.
pub fn jitter(base: Duration, spread: f64) -> Duration {
    jitter_with(&mut rand::thread_rng(), base, spread)
}

pub fn jitter_with<R: Rng + ?Sized>(rng: &mut R, base: Duration, spread: f64) -> Duration {
    let spread = spread.clamp(0.0, 1.0);
    if spread == 0.0 || base.is_zero() {
        return base;
    }
    let factor = 1.0 - spread + rng.gen::<f64>() * 2.0 * spread;
    base.mul_f64(factor)
}
