use std::hash::Hash;

use anyhow::Context;
use indexmap::IndexMap;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

#[cfg(test)]
#[ctor::ctor]
fn init_backtrace() {
    color_backtrace::install();
}

pub trait LogAbuse {
    fn ln_or_inf(self) -> f64;
}

impl LogAbuse for f64 {
    fn ln_or_inf(self) -> f64 {
        if self == 0.0 {
            -f64::INFINITY
        } else {
            self.ln()
        }
    }
}

/// The sum of two values in log space.
#[inline(always)]
pub fn log_add(a: f64, b: f64) -> f64 {
    let min = f64::min(a, b);
    let max = f64::max(a, b);

    debug_assert!(!a.is_nan());
    debug_assert!(!b.is_nan());

    if min == -f64::INFINITY {
        max
    } else {
        max + (min - max).exp().ln_1p()
    }
}

#[macro_export]
macro_rules! log_sum {
    // Base case:
    ($x:expr) => ($x);
    // `$x` followed by at least one `$y,`
    ($x:expr, $($y:expr),+) => (
        // Call `log_sum!` on the tail `$y`
        $crate::util::log_add($x, $crate::log_sum!($($y),+))
    )
}

/// Compute log(sum(exp(x))) with the max shifted out so that nothing underflows.
///
/// An empty slice, or one that holds nothing but -inf, sums to -inf.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(-f64::INFINITY, f64::max);

    if max == -f64::INFINITY {
        return -f64::INFINITY;
    }

    if max == f64::INFINITY {
        return f64::INFINITY;
    }

    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Normalize a categorical distribution given as log probabilities, in place.
///
/// If every entry has zero probability, the distribution is replaced
/// by the uniform distribution instead of producing NaNs.
///
/// Returns false if the uniform fallback was used.
pub fn normalize_log_probs(values: &mut [f64]) -> bool {
    if values.is_empty() {
        return true;
    }

    let norm = log_sum_exp(values);

    if norm == -f64::INFINITY {
        let uniform = -(values.len() as f64).ln();
        values.iter_mut().for_each(|v| *v = uniform);
        false
    } else {
        values.iter_mut().for_each(|v| *v -= norm);
        true
    }
}

/// The same as [`normalize_log_probs`], for a keyed table.
pub fn normalize_log_map<K: Hash + Eq>(table: &mut IndexMap<K, f64>) -> bool {
    let mut values: Vec<f64> = table.values().copied().collect();
    let normalized = normalize_log_probs(&mut values);
    table
        .values_mut()
        .zip(values)
        .for_each(|(v, normalized_v)| *v = normalized_v);
    normalized
}

/// Draw an index from a categorical distribution given in log space.
pub fn sample_log_categorical<R: Rng + ?Sized>(rng: &mut R, log_probs: &[f64]) -> anyhow::Result<usize> {
    let weights = log_probs.iter().map(|p| p.exp());
    let distribution =
        WeightedIndex::new(weights).context("failed to build a categorical distribution")?;
    Ok(distribution.sample(rng))
}

/// Choose `k` from `n`.
pub fn binomial(n: usize, k: usize) -> usize {
    if k > n {
        return 0;
    }
    (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
}

/// Every strictly increasing selection of `k` indices out of `0..n`, in lexicographic order.
pub fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    fn visit(start: usize, n: usize, k: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for idx in start..n {
            current.push(idx);
            visit(idx + 1, n, k, current, out);
            current.pop();
        }
    }

    let mut out = vec![];
    if k <= n {
        visit(0, n, k, &mut Vec::with_capacity(k), &mut out);
    }
    out
}

/// Every string of length `len` over `symbols`, in lexicographic order of `symbols`.
pub fn cartesian_strings(symbols: &[char], len: usize) -> Vec<String> {
    (0..len).fold(vec![String::new()], |prefixes, _| {
        prefixes
            .iter()
            .flat_map(|prefix| {
                symbols.iter().map(move |s| {
                    let mut next = prefix.clone();
                    next.push(*s);
                    next
                })
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    #[test]
    fn test_log_sum_exp() {
        let values = [0.2f64.ln(), 0.3f64.ln(), 0.5f64.ln()];
        assert!(log_sum_exp(&values).abs() < 1e-12);

        assert!(log_sum_exp(&[]) == -f64::INFINITY);
        assert!(log_sum_exp(&[-f64::INFINITY, -f64::INFINITY]) == -f64::INFINITY);

        // would underflow without the max shift
        let tiny = [-1000.0, -1000.0];
        assert!((log_sum_exp(&tiny) - (-1000.0 + 2f64.ln())).abs() < 1e-9);

        let a = 0.25f64.ln();
        let b = 0.5f64.ln();
        assert!((log_sum!(a, b, a) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_log_probs() {
        let mut values = vec![1.0f64.ln(), 3.0f64.ln()];
        assert!(normalize_log_probs(&mut values));
        assert!((values[0].exp() - 0.25).abs() < 1e-12);
        assert!((values[1].exp() - 0.75).abs() < 1e-12);

        let mut values = vec![-f64::INFINITY; 4];
        assert!(!normalize_log_probs(&mut values));
        values
            .iter()
            .for_each(|v| assert!((v.exp() - 0.25).abs() < 1e-12));

        let mut table: IndexMap<&str, f64> = IndexMap::new();
        table.insert("A", 0.0);
        table.insert("B", -f64::INFINITY);
        table.insert("C", 0.0);
        normalize_log_map(&mut table);
        assert!((table["A"].exp() - 0.5).abs() < 1e-12);
        assert!(table["B"] == -f64::INFINITY);
    }

    #[test]
    fn test_ln_or_inf() {
        assert!(0.0f64.ln_or_inf() == -f64::INFINITY);
        assert!(1.0f64.ln_or_inf() == 0.0);
    }

    #[test]
    fn test_sample_log_categorical() -> anyhow::Result<()> {
        let mut rng = Pcg64::seed_from_u64(0);
        let log_probs = [-f64::INFINITY, 0.0, -f64::INFINITY];
        for _ in 0..10 {
            assert!(sample_log_categorical(&mut rng, &log_probs)? == 1);
        }

        assert!(sample_log_categorical(&mut rng, &[-f64::INFINITY]).is_err());
        Ok(())
    }

    #[test]
    fn test_combinatorics() {
        assert!(binomial(4, 2) == 6);
        assert!(binomial(5, 3) == 10);
        assert!(binomial(3, 4) == 0);

        assert!(combinations(4, 2).len() == 6);
        assert!(combinations(3, 3) == vec![vec![0, 1, 2]]);
        assert!(combinations(2, 0) == vec![Vec::<usize>::new()]);

        let strings = cartesian_strings(&['A', 'C'], 2);
        assert!(strings == vec!["AA", "AC", "CA", "CC"]);
        assert!(cartesian_strings(&['A'], 0) == vec![""]);
    }
}
