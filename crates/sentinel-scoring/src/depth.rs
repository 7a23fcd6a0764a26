//! Isolation depth of a single value inside one random partitioning tree.
//!
//! Only the path of the candidate matters for its score, so a tree is never
//! materialised. Each step draws a cut in the current value range, keeps the
//! side that holds the candidate, and discards the rest. The distribution of
//! the resulting depth is the same as building the full tree over the
//! sample and walking it.

use rand::Rng;

/// Euler–Mascheroni constant, used in the harmonic number approximation.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Expected path length of an unsuccessful search in a random binary tree
/// built over `n` values.
///
/// `c(n) = 2·H(n−1) − 2(n−1)/n`, with `c(2) = 1` and `c(0) = c(1) = 0`.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * harmonic(n - 1.0) - 2.0 * (n - 1.0) / n
        }
    }
}

fn harmonic(i: f64) -> f64 {
    i.ln() + EULER_GAMMA
}

/// Number of random cuts needed to separate `candidate` from `others`.
///
/// `others` is consumed as scratch space. When the remaining values are all
/// equal to the candidate no cut can separate them, and the expected depth
/// of a tree over that group is added instead. The same applies if a cut
/// fails to shrink the group, which only floating-point rounding can cause.
pub fn isolation_depth<R: Rng + ?Sized>(
    mut others: Vec<f64>,
    candidate: f64,
    rng: &mut R,
) -> f64 {
    let mut depth = 0.0;

    loop {
        if others.is_empty() {
            return depth;
        }

        let (lo, hi) = others
            .iter()
            .fold((candidate, candidate), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        if lo >= hi {
            return depth + average_path_length(others.len() + 1);
        }

        // Interpolate rather than use `hi - lo`, which overflows for ranges
        // wider than f64::MAX. The cut lies in (lo, hi]; values below it go left.
        let u = 1.0 - rng.gen::<f64>();
        let mut cut = lo * (1.0 - u) + hi * u;
        if !(cut > lo && cut <= hi) {
            cut = hi;
        }

        let before = others.len();
        let candidate_left = candidate < cut;
        others.retain(|&v| (v < cut) == candidate_left);
        depth += 1.0;

        if others.len() == before {
            return depth + average_path_length(others.len() + 1);
        }
    }
}
