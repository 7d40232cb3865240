use std::fmt::{Display, Formatter};

use anyhow::Result;
use indexmap::IndexMap;
use thiserror::Error;

use crate::alphabet::Alphabet;
use crate::structs::state::InvalidEmissionKeyError;
use crate::util::{
    binomial, cartesian_strings, combinations, log_sum_exp, normalize_log_map, LogAbuse,
};

/// The number of bases in a codon.
pub const CODON_LENGTH: usize = 3;
/// The shortest fragment a codon can be observed as.
pub const MIN_FRAGMENT_LENGTH: usize = 1;
/// The longest fragment a codon can be observed as.
pub const MAX_FRAGMENT_LENGTH: usize = 5;
/// The number of independent edit trials (two deletions, two insertions).
pub const NUM_EDIT_TRIALS: usize = 4;

#[derive(Error, Debug)]
#[error("epsilon must be within [0, 1], got: {epsilon}")]
pub struct EpsilonRangeError {
    epsilon: f64,
}

/// The emission model of a codon observed through a channel that
/// deletes or inserts bases with probability epsilon per event.
///
/// A hidden codon x1x2x3 goes through four independent edit trials:
/// two that may delete a base of the codon and two that may insert a
/// background base. The observed fragment z1..zf therefore has between
/// one and five bases. The joint probability p(Z=z, F=f) marginalizes
/// over every arrangement of codon bases and background filler that
/// could have produced the fragment.
#[derive(Clone, Debug)]
pub struct FrameEmission {
    alphabet: Alphabet,
    epsilon: f64,
    /// log p(X=x1x2x3)
    codon_emission: IndexMap<String, f64>,
    /// log p(background base)
    base_emission: IndexMap<char, f64>,
    /// Codon marginals for every (symbol | wildcard)^3 pattern. The
    /// wildcard has index alphabet.len().
    marginals: Vec<f64>,
}

impl FrameEmission {
    pub fn new(
        mut codon_emission: IndexMap<String, f64>,
        mut base_emission: IndexMap<char, f64>,
        epsilon: f64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(EpsilonRangeError { epsilon }.into());
        }

        let alphabet = Alphabet::new(&base_emission.keys().collect::<String>());

        for codon in codon_emission.keys() {
            if codon.chars().count() != CODON_LENGTH || !alphabet.covers(codon) {
                return Err(InvalidEmissionKeyError {
                    key: codon.clone(),
                    expected_length: CODON_LENGTH,
                }
                .into());
            }
        }

        normalize_log_map(&mut codon_emission);
        normalize_log_map(&mut base_emission);

        let mut emission = FrameEmission {
            alphabet,
            epsilon,
            codon_emission,
            base_emission,
            marginals: vec![],
        };
        emission.marginals = emission.compute_marginals();
        Ok(emission)
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn codon_emission(&self) -> &IndexMap<String, f64> {
        &self.codon_emission
    }

    pub fn base_emission(&self) -> &IndexMap<char, f64> {
        &self.base_emission
    }

    fn compute_marginals(&self) -> Vec<f64> {
        let width = self.alphabet.len() + 1;
        let wildcard = self.alphabet.len();

        let codons: Vec<([usize; 3], f64)> = self
            .codon_emission
            .iter()
            .filter_map(|(codon, &logp)| {
                let idx: Vec<usize> = codon
                    .chars()
                    .filter_map(|c| self.alphabet.index_of(c))
                    .collect();
                match idx[..] {
                    [a, b, c] => Some(([a, b, c], logp)),
                    _ => None,
                }
            })
            .collect();

        let mut marginals = vec![-f64::INFINITY; width * width * width];
        for (pattern_idx, marginal) in marginals.iter_mut().enumerate() {
            let pattern = [
                pattern_idx / (width * width),
                (pattern_idx / width) % width,
                pattern_idx % width,
            ];

            let matching: Vec<f64> = codons
                .iter()
                .filter(|(codon, _)| {
                    codon
                        .iter()
                        .zip(pattern)
                        .all(|(&x, p)| p == wildcard || p == x)
                })
                .map(|(_, logp)| *logp)
                .collect();

            *marginal = log_sum_exp(&matching);
        }
        marginals
    }

    /// log p(X1=x1, X2=x2, X3=x3), where a `None` position is summed over.
    pub fn codon_marginal(&self, codon: [Option<char>; 3]) -> f64 {
        let width = self.alphabet.len() + 1;
        let mut pattern_idx = 0;
        for symbol in codon {
            let idx = match symbol {
                Some(s) => match self.alphabet.index_of(s) {
                    Some(idx) => idx,
                    None => return -f64::INFINITY,
                },
                None => self.alphabet.len(),
            };
            pattern_idx = pattern_idx * width + idx;
        }
        self.marginals[pattern_idx]
    }

    /// P(F=f): the probability that the observed fragment has `f` bases.
    pub fn len_prob(&self, f: usize) -> f64 {
        let e = self.epsilon;
        match f {
            1 | 5 => e.powi(2) * (1.0 - e).powi(2),
            2 | 4 => 2.0 * e.powi(3) * (1.0 - e) + 2.0 * e * (1.0 - e).powi(3),
            3 => e.powi(4) + 4.0 * e.powi(2) * (1.0 - e).powi(2) + (1.0 - e).powi(4),
            _ => 0.0,
        }
    }

    /// P(M=m): the probability that `m` of the four edit trials succeed.
    pub fn indel_prob(&self, m: usize) -> f64 {
        if m > NUM_EDIT_TRIALS {
            return 0.0;
        }
        let e = self.epsilon;
        binomial(NUM_EDIT_TRIALS, m) as f64
            * (1.0 - e).powi((NUM_EDIT_TRIALS - m) as i32)
            * e.powi(m as i32)
    }

    /// The share of P(F=f) in which exactly `k` of the observed bases come from the codon.
    ///
    /// Summed over `k`, these are the terms of `len_prob(f)`.
    pub fn branch_prob(&self, f: usize, k: usize) -> f64 {
        let e = self.epsilon;
        match (f, k) {
            (1, 1) | (5, 3) => e.powi(2) * (1.0 - e).powi(2),
            (2, 2) | (4, 3) => 2.0 * e * (1.0 - e).powi(3),
            (2, 1) | (4, 2) => 2.0 * e.powi(3) * (1.0 - e),
            (3, 3) => (1.0 - e).powi(4),
            (3, 2) => 4.0 * e.powi(2) * (1.0 - e).powi(2),
            (3, 1) => e.powi(4),
            _ => 0.0,
        }
    }

    /// log p(Z=z1..zf, F=f).
    pub fn prob(&self, fragment: &str) -> f64 {
        let symbols: Vec<char> = fragment.chars().collect();
        let f = symbols.len();

        if !(MIN_FRAGMENT_LENGTH..=MAX_FRAGMENT_LENGTH).contains(&f)
            || !self.alphabet.covers(fragment)
        {
            return -f64::INFINITY;
        }

        let mut terms: Vec<f64> = vec![];
        for k in 1..=CODON_LENGTH.min(f) {
            let mass = self.branch_prob(f, k);
            if mass == 0.0 {
                continue;
            }
            // every arrangement within a branch is equally likely
            let log_weight =
                (mass / (binomial(f, k) * binomial(CODON_LENGTH, k)) as f64).ln();

            for kept in combinations(f, k) {
                let filler: f64 = (0..f)
                    .filter(|j| !kept.contains(j))
                    .map(|j| self.base_log_prob(symbols[j]))
                    .sum();

                for slots in combinations(CODON_LENGTH, k) {
                    let mut codon: [Option<char>; 3] = [None; 3];
                    kept.iter()
                        .zip(&slots)
                        .for_each(|(&j, &slot)| codon[slot] = Some(symbols[j]));

                    terms.push(log_weight + self.codon_marginal(codon) + filler);
                }
            }
        }

        log_sum_exp(&terms)
    }

    /// log p(Z=z1..zf | F=f).
    pub fn conditional_prob(&self, fragment: &str) -> f64 {
        let norm = self.len_prob(fragment.chars().count());
        if norm == 0.0 {
            return -f64::INFINITY;
        }
        self.prob(fragment) - norm.ln()
    }

    fn base_log_prob(&self, symbol: char) -> f64 {
        self.base_emission
            .get(&symbol)
            .copied()
            .unwrap_or(-f64::INFINITY)
    }

    /// Every fragment of length `f`, with log p(Z=z, F=f), in alphabet order.
    pub fn fragments(&self, f: usize) -> Vec<(String, f64)> {
        cartesian_strings(self.alphabet.symbols(), f)
            .into_iter()
            .map(|z| {
                let logp = self.prob(&z);
                (z, logp)
            })
            .collect()
    }

    /// Every fragment of every length, sorted by decreasing probability.
    pub fn emission(&self) -> Vec<(String, f64)> {
        let mut table: Vec<(String, f64)> = (MIN_FRAGMENT_LENGTH..=MAX_FRAGMENT_LENGTH)
            .flat_map(|f| self.fragments(f))
            .collect();
        sort_table(&mut table);
        table
    }
}

/// Sort an emission table by decreasing probability; ties keep their order.
pub(crate) fn sort_table(table: &mut [(String, f64)]) {
    table.sort_by(|a, b| b.1.total_cmp(&a.1));
}

impl Display for FrameEmission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Epsilon = {}", self.epsilon)?;

        writeln!(f)?;
        for m in 0..=NUM_EDIT_TRIALS {
            writeln!(f, "p(M={m}) = {:.4}", self.indel_prob(m))?;
        }

        writeln!(f)?;
        for len in MIN_FRAGMENT_LENGTH..=MAX_FRAGMENT_LENGTH {
            writeln!(f, "p(F={len}) = {:.4}", self.len_prob(len))?;
        }

        writeln!(f)?;
        writeln!(f, "Top codons")?;
        let mut codons: Vec<(String, f64)> = self
            .codon_emission
            .iter()
            .map(|(c, &logp)| (c.clone(), logp))
            .collect();
        sort_table(&mut codons);
        for (codon, logp) in codons.iter().take(5) {
            writeln!(f, "p(X={codon}) = {:.4}", logp.exp())?;
        }

        let mut all: Vec<(String, f64)> = vec![];
        for len in MIN_FRAGMENT_LENGTH..=MAX_FRAGMENT_LENGTH {
            writeln!(f)?;
            writeln!(f, "Top sequences for F={len}")?;
            let mut fragments = self.fragments(len);
            all.extend(fragments.iter().cloned());
            sort_table(&mut fragments);
            let norm = self.len_prob(len).ln_or_inf();
            for (z, logp) in fragments.iter().take(5) {
                writeln!(f, "p(Z={z} | F={len}) = {:.4}", (logp - norm).exp())?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Top final sequences")?;
        sort_table(&mut all);
        for (z, logp) in all.iter().take(100) {
            writeln!(
                f,
                "p(Z={z:<5}, F={}) = {:.4}",
                z.chars().count(),
                logp.exp()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;

    fn uniform_bases(bases: &str) -> IndexMap<char, f64> {
        bases.chars().map(|b| (b, 0.25f64.ln())).collect()
    }

    fn codons(table: &[(&str, f64)]) -> IndexMap<String, f64> {
        table
            .iter()
            .map(|(codon, p)| (codon.to_string(), p.ln_or_inf()))
            .collect()
    }

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_len_prob() -> Result<()> {
        let emission = FrameEmission::new(
            codons(&[("AUG", 0.8), ("AUU", 0.1)]),
            uniform_bases("ACGU"),
            0.1,
        )?;
        assert!(close(emission.len_prob(3), 0.6886, 1e-4));
        assert!(close(emission.len_prob(1), 0.0081, 1e-6));
        assert!(close(emission.len_prob(5), 0.0081, 1e-6));
        assert!(emission.len_prob(0) == 0.0);
        assert!(emission.len_prob(6) == 0.0);

        for f in MIN_FRAGMENT_LENGTH..=MAX_FRAGMENT_LENGTH {
            let branches: f64 = (1..=3).map(|k| emission.branch_prob(f, k)).sum();
            assert!(close(branches, emission.len_prob(f), 1e-12));
        }
        Ok(())
    }

    #[test]
    fn test_indel_prob() -> Result<()> {
        let emission = FrameEmission::new(
            codons(&[("UCU", 0.9), ("GUA", 0.1)]),
            uniform_bases("ACGU"),
            1e-2,
        )?;
        assert!(close(emission.len_prob(1), 9.801e-05, 1e-8));
        assert!(close(emission.indel_prob(1), 0.03881196, 1e-8));
        assert!(emission.indel_prob(5) == 0.0);

        let total: f64 = (0..=NUM_EDIT_TRIALS).map(|m| emission.indel_prob(m)).sum();
        assert!(close(total, 1.0, 1e-12));

        let emission = FrameEmission::new(
            codons(&[("UCU", 0.9), ("GUA", 0.1)]),
            uniform_bases("ACGU"),
            0.5,
        )?;
        assert!(close(emission.len_prob(1), 0.0625, 1e-12));
        assert!(close(emission.indel_prob(1), 0.25, 1e-12));
        Ok(())
    }

    #[test]
    fn test_codon_marginal() -> Result<()> {
        let emission = FrameEmission::new(
            codons(&[("AUG", 0.8), ("AUU", 0.1)]),
            uniform_bases("ACGU"),
            0.1,
        )?;
        let m = |x1, x2, x3| emission.codon_marginal([x1, x2, x3]).exp();

        assert!(close(m(Some('A'), Some('U'), Some('G')), 8.0 / 9.0, 1e-12));
        assert!(close(m(Some('A'), Some('U'), Some('U')), 1.0 / 9.0, 1e-12));
        assert!(close(m(Some('A'), Some('U'), None), 1.0, 1e-12));
        assert!(close(m(Some('A'), None, Some('U')), 1.0 / 9.0, 1e-12));
        assert!(m(None, Some('G'), Some('U')) == 0.0);
        assert!(close(m(None, Some('U'), Some('U')), 1.0 / 9.0, 1e-12));
        assert!(close(m(None, None, Some('U')), 1.0 / 9.0, 1e-12));
        assert!(close(m(None, None, None), 1.0, 1e-12));
        assert!(m(Some('T'), None, None) == 0.0);
        Ok(())
    }

    #[test]
    fn test_joint_prob() -> Result<()> {
        let emission = FrameEmission::new(
            codons(&[("AUG", 0.8), ("AUU", 0.1)]),
            uniform_bases("ACGU"),
            0.1,
        )?;
        let p = |z: &str| emission.prob(z).exp();

        assert!(close(p("AUA"), 0.0010021604938271608, 1e-9));
        assert!(close(p("AUG"), 0.5858020833333333, 1e-9));
        assert!(close(p("AUU"), 0.07500223765432103, 1e-9));
        assert!(close(p("AU"), 0.054158333333333336, 1e-9));
        assert!(close(p("A"), 0.0027000000000000006, 1e-9));
        assert!(close(p("AUUA"), 0.0010270833333333336, 1e-9));
        assert!(close(p("AUUAA"), 5.625000000000003e-06, 1e-9));
        assert!(p("AUUAAA") == 0.0);
        assert!(p("") == 0.0);
        assert!(p("ATG") == 0.0);

        let table = emission.emission();
        assert!(table[0].0 == "AUG");
        assert!(close(table[0].1, -0.5347732882047063, 1e-9));
        assert!(table[1].0 == "AUU");
        assert!(close(table[1].1, -2.590237330499946, 1e-9));
        assert!(table[2].0 == "AU");
        assert!(close(table[2].1, -2.915843423869834, 1e-9));
        Ok(())
    }

    #[test]
    fn test_joint_prob_without_errors() -> Result<()> {
        let emission = FrameEmission::new(
            codons(&[("AUG", 0.8), ("AUU", 0.1)]),
            uniform_bases("ACGU"),
            0.0,
        )?;
        let p = |z: &str| emission.prob(z).exp();

        assert!(p("AUA") == 0.0);
        assert!(close(p("AUG"), 8.0 / 9.0, 1e-12));
        assert!(close(p("AUU"), 1.0 / 9.0, 1e-12));
        assert!(p("AU") == 0.0);
        assert!(p("A") == 0.0);
        assert!(p("AUUA") == 0.0);
        assert!(p("AUUAA") == 0.0);
        Ok(())
    }

    #[test]
    fn test_dna_spelling() -> Result<()> {
        let emission = FrameEmission::new(
            codons(&[("TCT", 0.9), ("GTA", 0.1)]),
            uniform_bases("ACGT"),
            0.5,
        )?;
        assert!(close(emission.prob("TCT").exp(), 0.07703993055555558, 1e-9));
        assert!(close(emission.prob("GTA").exp(), 0.009244791666666667, 1e-9));
        assert!(close(emission.prob("GGA").exp(), 0.0015190972222222225, 1e-9));

        let emission = FrameEmission::new(
            codons(&[("TCT", 0.9), ("GTA", 0.1)]),
            uniform_bases("ACGT"),
            1e-2,
        )?;
        assert!(close(emission.prob("TCT").exp(), 0.864565812326389, 1e-9));
        assert!(close(emission.prob("GTA").exp(), 0.09606286814583331, 1e-9));
        assert!(close(emission.prob("GGA").exp(), 2.178020833333333e-06, 1e-9));
        Ok(())
    }

    #[test]
    fn test_total_probability() -> Result<()> {
        let bases: IndexMap<char, f64> = [('A', 0.1), ('C', 0.2), ('G', 0.3), ('U', 0.4)]
            .iter()
            .map(|(b, p)| (*b, f64::ln(*p)))
            .collect();
        let table = codons(&[
            ("AUG", 0.3),
            ("GGC", 0.2),
            ("UUA", 0.1),
            ("CAG", 0.25),
            ("ACU", 0.15),
        ]);

        for epsilon in [0.0, 0.01, 0.1, 0.5] {
            let emission = FrameEmission::new(table.clone(), bases.clone(), epsilon)?;

            let mut total = 0.0;
            for f in MIN_FRAGMENT_LENGTH..=MAX_FRAGMENT_LENGTH {
                let length_total: f64 = emission.fragments(f).iter().map(|(_, p)| p.exp()).sum();
                assert!(close(length_total, emission.len_prob(f), 1e-9));

                if emission.len_prob(f) > 0.0 {
                    let conditional_total: f64 = cartesian_strings(emission.alphabet().symbols(), f)
                        .iter()
                        .map(|z| emission.conditional_prob(z).exp())
                        .sum();
                    assert!(close(conditional_total, 1.0, 1e-9));
                }
                total += length_total;
            }
            assert!(close(total, 1.0, 1e-6));
        }
        Ok(())
    }

    #[test]
    fn test_invalid_input() {
        let result = FrameEmission::new(codons(&[("AUG", 1.0)]), uniform_bases("ACGU"), 1.5);
        assert!(let Err(_) = result);

        let err = FrameEmission::new(codons(&[("AU", 1.0)]), uniform_bases("ACGU"), 0.1)
            .unwrap_err();
        assert!(err.downcast_ref::<InvalidEmissionKeyError>().is_some());

        let err = FrameEmission::new(codons(&[("ATG", 1.0)]), uniform_bases("ACGU"), 0.1)
            .unwrap_err();
        assert!(err.downcast_ref::<InvalidEmissionKeyError>().is_some());
    }

    #[test]
    fn test_display() -> Result<()> {
        let emission = FrameEmission::new(
            codons(&[("AUG", 0.8), ("AUU", 0.1)]),
            uniform_bases("ACGU"),
            0.1,
        )?;
        let text = emission.to_string();
        assert!(text.starts_with("Epsilon = 0.1\n"));
        assert!(text.contains("p(F=3) = 0.6886"));
        assert!(text.contains("p(X=AUG) = 0.8889"));
        Ok(())
    }
}
