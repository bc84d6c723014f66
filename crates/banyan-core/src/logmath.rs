//! Log-space arithmetic shared by the scoring engine and the samplers.
//!
//! All scores stay in log space; partial sums are never exponentiated.
//! Addition of two log values uses `logadd(x, y) = max + ln(1 + exp(-|x-y|))`
//! with a floor to keep severe underflow from producing `-inf` chains.

use rand::RngExt;
use rand::rngs::SmallRng;
use std::sync::{Arc, Mutex};

/// ln(1e-100), the underflow floor for log-space addition.
const LOG_FLOOR: f64 = -230.25850929940458;

static LN_FACTORIALS: Mutex<Option<Arc<[f64]>>> = Mutex::new(None);

/// Returns the shared log-factorial table, grown to hold at least
/// `min_len` entries: `table[k] == ln(k!)`, with `table[0] == 0` so that
/// empty cells contribute nothing.
///
/// Growth happens under the lock; the returned `Arc` snapshot is then
/// indexed without any synchronization. The table only ever grows.
pub fn ln_factorials(min_len: usize) -> Arc<[f64]> {
    let mut guard = LN_FACTORIALS.lock().unwrap();
    if let Some(table) = guard.as_ref() {
        if table.len() >= min_len {
            return table.clone();
        }
    }

    let target = min_len.max(2) + 16;
    let mut values: Vec<f64> = Vec::with_capacity(target);
    if let Some(table) = guard.as_ref() {
        values.extend_from_slice(table);
    } else {
        values.push(0.0);
    }
    for k in values.len()..target {
        values.push(values[k - 1] + (k as f64).ln());
    }

    let table: Arc<[f64]> = values.into();
    *guard = Some(table.clone());
    table
}

#[inline]
pub fn log_add(x: f64, y: f64) -> f64 {
    let (hi, lo) = if x >= y { (x, y) } else { (y, x) };
    if lo == f64::NEG_INFINITY {
        return hi;
    }
    let sum = hi + (lo - hi).exp().ln_1p();
    if sum < LOG_FLOOR { LOG_FLOOR } else { sum }
}

pub fn log_sum(values: impl IntoIterator<Item = f64>) -> f64 {
    values.into_iter().fold(f64::NEG_INFINITY, log_add)
}

/// Draws an index with probability proportional to `exp(score - max_score)`.
pub fn log_prob_wheel(rng: &mut SmallRng, scores: &[f64]) -> usize {
    debug_assert!(!scores.is_empty());
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return rng.random_range(0..scores.len());
    }

    let weights: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = weights.iter().sum();
    let draw = rng.random::<f64>() * total;

    let mut acc = 0.0;
    for (i, w) in weights.iter().enumerate() {
        acc += w;
        if draw <= acc {
            return i;
        }
    }
    // rounding can push the draw past the final edge
    scores.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn factorial_table_values() {
        let table = ln_factorials(17);
        let expected = [
            0.0, 0.0, 0.69314718, 1.79175947, 3.17805383, 4.78749174, 6.57925121, 8.52516136,
            10.6046029, 12.80182748, 15.10441257, 17.50230785, 19.9872145, 22.55216385,
            25.19122118, 27.89927138, 30.67186011,
        ];
        for (k, want) in expected.iter().enumerate() {
            assert!(
                (table[k] - want).abs() < 1e-7,
                "ln({}!) = {}, want {}",
                k,
                table[k],
                want
            );
        }
    }

    #[test]
    fn factorial_table_grows_monotonically() {
        let small = ln_factorials(8);
        let big = ln_factorials(small.len() + 100);
        assert!(big.len() > small.len());
        for k in 0..small.len() {
            assert_eq!(small[k], big[k]);
        }
    }

    #[test]
    fn log_add_matches_direct() {
        let x = (0.25f64).ln();
        let y = (0.5f64).ln();
        assert!(close(log_add(x, y), (0.75f64).ln()));
        assert!(close(log_add(y, x), (0.75f64).ln()));
        assert_eq!(log_add(f64::NEG_INFINITY, y), y);
    }

    #[test]
    fn log_sum_matches_direct() {
        let values = [0.1f64, 0.2, 0.3].map(f64::ln);
        assert!(close(log_sum(values), (0.6f64).ln()));
        assert_eq!(log_sum(std::iter::empty()), f64::NEG_INFINITY);
    }

    #[test]
    fn wheel_is_deterministic_per_seed() {
        let scores = [-3.0, -1.0, -2.0];
        let mut a = SmallRng::seed_from_u64(7);
        let mut b = SmallRng::seed_from_u64(7);
        for _ in 0..50 {
            assert_eq!(log_prob_wheel(&mut a, &scores), log_prob_wheel(&mut b, &scores));
        }
    }

    #[test]
    fn wheel_prefers_high_scores() {
        let scores = [-100.0, 0.0];
        let mut rng = SmallRng::seed_from_u64(11);
        let picks: usize = (0..200).map(|_| log_prob_wheel(&mut rng, &scores)).sum();
        assert!(picks > 190);
    }
}
