// src/nn/sampling.rs
// Window-coordinate sampling for fractional pooling. Everything here is pure
// index arithmetic except the permutation draw, which goes through an
// injectable source so tests can pin the order.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Mutex;

/// Supplies the random permutation of the pooling step sequence.
///
/// The operator consumes randomness, it does not own it: the default source
/// reads the process-wide RNG, a seeded source reproduces runs, and tests
/// substitute deterministic fakes to assert exact coordinates.
pub trait PermutationSource: std::fmt::Debug + Send + Sync {
    fn shuffle(&self, steps: &mut [usize]) -> Result<(), String>;
}

/// Default source: uniformly random permutation from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngPermutation;

impl PermutationSource for ThreadRngPermutation {
    fn shuffle(&self, steps: &mut [usize]) -> Result<(), String> {
        steps.shuffle(&mut rand::rng());
        Ok(())
    }
}

/// No-op source: leaves the step sequence in construction order, i.e. all
/// size-2 steps before the size-1 steps. Deliberately not random; it exists
/// so callers can pin coordinates when debugging or testing.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPermutation;

impl PermutationSource for IdentityPermutation {
    fn shuffle(&self, _steps: &mut [usize]) -> Result<(), String> {
        Ok(())
    }
}

/// Reproducible source backed by a seeded `StdRng`.
#[derive(Debug)]
pub struct SeededPermutation {
    rng: Mutex<StdRng>,
}

impl SeededPermutation {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl PermutationSource for SeededPermutation {
    fn shuffle(&self, steps: &mut [usize]) -> Result<(), String> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| "Permutation source lock poisoned".to_string())?;
        steps.shuffle(&mut *rng);
        Ok(())
    }
}

/// Output extent for one spatial axis: ceil(n_in / ratio).
pub fn pooled_extent(n_in: usize, ratio: f64) -> usize {
    (n_in as f64 / ratio).ceil() as usize
}

/// The unique multiset of `n_out` steps of size 1 and 2 summing to `n_in`:
/// `(n_in - n_out)` twos followed by `(2*n_out - n_in)` ones. Solving
/// `twos + ones = n_out` and `2*twos + ones = n_in` gives both counts.
pub fn step_multiset(n_in: usize, n_out: usize) -> Result<Vec<usize>, String> {
    if n_out == 0 || n_out > n_in || 2 * n_out < n_in {
        return Err(format!(
            "No mixture of size-1 and size-2 steps maps extent {} onto {} windows",
            n_in, n_out
        ));
    }
    let twos = n_in - n_out;
    let ones = 2 * n_out - n_in;
    let mut steps = vec![2usize; twos];
    steps.resize(twos + ones, 1);
    Ok(steps)
}

/// Pooling-window coordinates for one spatial axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowCoords {
    /// Window start positions: cumulative sums of the permuted steps with an
    /// implicit leading zero (the final step never becomes a start).
    pub starts: Vec<usize>,
    /// Companion positions `start + 1`, clipped to the last valid index so
    /// the final window never reads out of bounds.
    pub nexts: Vec<usize>,
}

/// Turns a permuted step sequence into window coordinates.
pub fn window_coords(steps: &[usize], n_in: usize) -> WindowCoords {
    let mut starts = Vec::with_capacity(steps.len());
    let mut acc = 0usize;
    for &step in steps {
        starts.push(acc);
        acc += step;
    }
    let last = n_in.saturating_sub(1);
    let nexts = starts.iter().map(|&s| (s + 1).min(last)).collect();
    WindowCoords { starts, nexts }
}

/// Draws a fresh permutation and returns the resulting window coordinates
/// for an axis of extent `n_in` pooled at `ratio`.
pub fn sample_windows(
    n_in: usize,
    ratio: f64,
    source: &dyn PermutationSource,
) -> Result<WindowCoords, String> {
    let n_out = pooled_extent(n_in, ratio);
    let mut steps = step_multiset(n_in, n_out)?;
    source.shuffle(&mut steps)?;
    Ok(window_coords(&steps, n_in))
}
