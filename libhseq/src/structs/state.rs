use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use anyhow::Result;
use indexmap::IndexMap;
use rand::Rng;
use thiserror::Error;

use crate::alphabet::Alphabet;
use crate::structs::frame::{sort_table, FrameEmission, MAX_FRAGMENT_LENGTH, MIN_FRAGMENT_LENGTH};
use crate::util::{normalize_log_map, sample_log_categorical, LogAbuse};

/// An Error that is thrown when an emission table holds
/// a key of the wrong length or with a foreign symbol.
#[derive(Error, Debug)]
#[error("invalid emission key \"{key}\": expected {expected_length} symbols of the state alphabet")]
pub struct InvalidEmissionKeyError {
    pub key: String,
    pub expected_length: usize,
}

/// A state that emits nothing.
#[derive(Clone, Debug)]
pub struct SilentState {
    name: String,
    alphabet: Alphabet,
    end_state: bool,
}

impl SilentState {
    pub fn new(name: &str, alphabet: Alphabet, end_state: bool) -> Self {
        SilentState {
            name: name.to_string(),
            alphabet,
            end_state,
        }
    }
}

/// A state that emits exactly one symbol.
#[derive(Clone, Debug)]
pub struct NormalState {
    name: String,
    alphabet: Alphabet,
    emission: IndexMap<char, f64>,
    end_state: bool,
}

impl NormalState {
    /// The keys of `emission` define the state alphabet.
    pub fn new(name: &str, mut emission: IndexMap<char, f64>, end_state: bool) -> Self {
        let alphabet = Alphabet::new(&emission.keys().collect::<String>());
        normalize_log_map(&mut emission);
        NormalState {
            name: name.to_string(),
            alphabet,
            emission,
            end_state,
        }
    }

    pub fn emission(&self) -> &IndexMap<char, f64> {
        &self.emission
    }
}

/// A state that emits exactly three symbols.
#[derive(Clone, Debug)]
pub struct TripletState {
    name: String,
    alphabet: Alphabet,
    emission: IndexMap<String, f64>,
    end_state: bool,
}

impl TripletState {
    pub fn new(
        name: &str,
        alphabet: Alphabet,
        mut emission: IndexMap<String, f64>,
        end_state: bool,
    ) -> Result<Self> {
        for key in emission.keys() {
            if key.chars().count() != 3 || !alphabet.covers(key) {
                return Err(InvalidEmissionKeyError {
                    key: key.clone(),
                    expected_length: 3,
                }
                .into());
            }
        }
        normalize_log_map(&mut emission);
        Ok(TripletState {
            name: name.to_string(),
            alphabet,
            emission,
            end_state,
        })
    }
}

/// A state that emits a codon observed through an indel channel.
///
/// The joint probability of every fragment is computed once, at
/// construction, so that scoring is a lookup.
#[derive(Clone, Debug)]
pub struct FrameState {
    name: String,
    emission: FrameEmission,
    joint: HashMap<String, f64>,
    /// fragments[f - 1] holds every fragment of length f with its joint log probability.
    fragments: Vec<Vec<(String, f64)>>,
    /// log P(F=f) for f in 1..=5
    len_log_probs: Vec<f64>,
    end_state: bool,
}

impl FrameState {
    pub fn new(
        name: &str,
        base_emission: IndexMap<char, f64>,
        codon_emission: IndexMap<String, f64>,
        epsilon: f64,
        end_state: bool,
    ) -> Result<Self> {
        let emission = FrameEmission::new(codon_emission, base_emission, epsilon)?;
        Ok(FrameState::from_emission(name, emission, end_state))
    }

    pub fn from_emission(name: &str, emission: FrameEmission, end_state: bool) -> Self {
        let fragments: Vec<Vec<(String, f64)>> = (MIN_FRAGMENT_LENGTH..=MAX_FRAGMENT_LENGTH)
            .map(|f| emission.fragments(f))
            .collect();

        let joint: HashMap<String, f64> = fragments.iter().flatten().cloned().collect();

        let len_log_probs = (MIN_FRAGMENT_LENGTH..=MAX_FRAGMENT_LENGTH)
            .map(|f| emission.len_prob(f).ln_or_inf())
            .collect();

        FrameState {
            name: name.to_string(),
            emission,
            joint,
            fragments,
            len_log_probs,
            end_state,
        }
    }

    pub fn emission(&self) -> &FrameEmission {
        &self.emission
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<String> {
        let f_idx = sample_log_categorical(rng, &self.len_log_probs)?;
        let candidates = &self.fragments[f_idx];
        let log_probs: Vec<f64> = candidates.iter().map(|(_, logp)| *logp).collect();
        let z_idx = sample_log_categorical(rng, &log_probs)?;
        Ok(candidates[z_idx].0.clone())
    }
}

/// A state of a hidden Markov model.
#[derive(Clone, Debug)]
pub enum State {
    Silent(SilentState),
    Normal(NormalState),
    Triplet(TripletState),
    Frame(FrameState),
}

impl State {
    pub fn silent(name: &str, alphabet: &Alphabet, end_state: bool) -> Self {
        State::Silent(SilentState::new(name, alphabet.clone(), end_state))
    }

    pub fn normal(name: &str, emission: IndexMap<char, f64>, end_state: bool) -> Self {
        State::Normal(NormalState::new(name, emission, end_state))
    }

    pub fn triplet(
        name: &str,
        alphabet: &Alphabet,
        emission: IndexMap<String, f64>,
        end_state: bool,
    ) -> Result<Self> {
        Ok(State::Triplet(TripletState::new(
            name,
            alphabet.clone(),
            emission,
            end_state,
        )?))
    }

    pub fn frame(
        name: &str,
        base_emission: IndexMap<char, f64>,
        codon_emission: IndexMap<String, f64>,
        epsilon: f64,
        end_state: bool,
    ) -> Result<Self> {
        Ok(State::Frame(FrameState::new(
            name,
            base_emission,
            codon_emission,
            epsilon,
            end_state,
        )?))
    }

    pub fn name(&self) -> &str {
        match self {
            State::Silent(s) => &s.name,
            State::Normal(s) => &s.name,
            State::Triplet(s) => &s.name,
            State::Frame(s) => &s.name,
        }
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        let field = match self {
            State::Silent(s) => &mut s.name,
            State::Normal(s) => &mut s.name,
            State::Triplet(s) => &mut s.name,
            State::Frame(s) => &mut s.name,
        };
        *field = name.to_string();
    }

    pub fn alphabet(&self) -> &Alphabet {
        match self {
            State::Silent(s) => &s.alphabet,
            State::Normal(s) => &s.alphabet,
            State::Triplet(s) => &s.alphabet,
            State::Frame(s) => s.emission.alphabet(),
        }
    }

    pub fn is_end_state(&self) -> bool {
        match self {
            State::Silent(s) => s.end_state,
            State::Normal(s) => s.end_state,
            State::Triplet(s) => s.end_state,
            State::Frame(s) => s.end_state,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            State::Silent(_) => "SilentState",
            State::Normal(_) => "NormalState",
            State::Triplet(_) => "TripletState",
            State::Frame(_) => "FrameState",
        }
    }

    pub fn min_len(&self) -> usize {
        match self {
            State::Silent(_) => 0,
            State::Normal(_) => 1,
            State::Triplet(_) => 3,
            State::Frame(_) => MIN_FRAGMENT_LENGTH,
        }
    }

    pub fn max_len(&self) -> usize {
        match self {
            State::Silent(_) => 0,
            State::Normal(_) => 1,
            State::Triplet(_) => 3,
            State::Frame(_) => MAX_FRAGMENT_LENGTH,
        }
    }

    /// The log probability of emitting `symbols`; -inf outside the support.
    pub fn probability(&self, symbols: &str) -> f64 {
        match self {
            State::Silent(_) => {
                if symbols.is_empty() {
                    0.0
                } else {
                    -f64::INFINITY
                }
            }
            State::Normal(s) => {
                let mut chars = symbols.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => s.emission.get(&c).copied().unwrap_or(-f64::INFINITY),
                    _ => -f64::INFINITY,
                }
            }
            State::Triplet(s) => s.emission.get(symbols).copied().unwrap_or(-f64::INFINITY),
            State::Frame(s) => s.joint.get(symbols).copied().unwrap_or(-f64::INFINITY),
        }
    }

    /// Draw an emission. Silent states return an empty string without touching `rng`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<String> {
        match self {
            State::Silent(_) => Ok(String::new()),
            State::Normal(s) => {
                let log_probs: Vec<f64> = s.emission.values().copied().collect();
                let idx = sample_log_categorical(rng, &log_probs)?;
                Ok(s.alphabet.symbols()[idx].to_string())
            }
            State::Triplet(s) => {
                let log_probs: Vec<f64> = s.emission.values().copied().collect();
                let idx = sample_log_categorical(rng, &log_probs)?;
                Ok(s.emission
                    .get_index(idx)
                    .map(|(key, _)| key.clone())
                    .unwrap_or_default())
            }
            State::Frame(s) => s.sample(rng),
        }
    }

    /// The support of the emission distribution, sorted by decreasing log probability.
    pub fn emission_table(&self) -> Vec<(String, f64)> {
        let mut table: Vec<(String, f64)> = match self {
            State::Silent(_) => vec![(String::new(), 0.0)],
            State::Normal(s) => s
                .emission
                .iter()
                .map(|(c, &logp)| (c.to_string(), logp))
                .collect(),
            State::Triplet(s) => s
                .emission
                .iter()
                .map(|(key, &logp)| (key.clone(), logp))
                .collect(),
            State::Frame(s) => s.fragments.iter().flatten().cloned().collect(),
        };
        sort_table(&mut table);
        table
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}>", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::cartesian_strings;
    use assert2::assert;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn bases(table: &[(char, f64)]) -> IndexMap<char, f64> {
        table.iter().map(|(c, p)| (*c, p.ln_or_inf())).collect()
    }

    fn keyed(table: &[(&str, f64)]) -> IndexMap<String, f64> {
        table.iter().map(|(k, p)| (k.to_string(), p.ln_or_inf())).collect()
    }

    #[test]
    fn test_silent_state() -> Result<()> {
        let mut rng = Pcg64::seed_from_u64(0);
        let start = State::silent("S", &Alphabet::new("ACGU"), false);

        assert!(start.name() == "S");
        assert!(!start.is_end_state());
        assert!(start.sample(&mut rng)? == "");
        assert!(start.alphabet().to_string() == "ACGU");
        assert!(start.probability("") == 0.0);
        assert!(start.probability("A") == -f64::INFINITY);
        assert!(start.to_string() == "<S>");
        assert!(start.kind() == "SilentState");
        assert!(start.emission_table() == vec![(String::new(), 0.0)]);

        let end = State::silent("E", &Alphabet::new("ACGU"), true);
        assert!(end.is_end_state());
        assert!(end.min_len() == 0);
        assert!(end.max_len() == 0);
        Ok(())
    }

    #[test]
    fn test_normal_state() -> Result<()> {
        let state = State::normal("M1", bases(&[('A', 0.99), ('B', 0.01)]), false);

        assert!(state.name() == "M1");
        assert!(!state.is_end_state());
        assert!(state.alphabet().same_symbols(&Alphabet::new("AB")));
        assert!(close(state.probability("A").exp(), 0.99));
        assert!(close(state.probability("B").exp(), 0.01));
        assert!(state.probability("AB") == -f64::INFINITY);
        assert!(state.probability("") == -f64::INFINITY);
        assert!(state.to_string() == "<M1>");

        let table = state.emission_table();
        assert!(table[0].0 == "A");
        assert!(close(table[0].1.exp(), 0.99));
        assert!(table[1].0 == "B");

        let mut rng = Pcg64::seed_from_u64(0);
        let sure = State::normal("M2", bases(&[('A', 1.0), ('C', 0.0)]), true);
        assert!(sure.is_end_state());
        for _ in 0..10 {
            assert!(sure.sample(&mut rng)? == "A");
        }
        Ok(())
    }

    #[test]
    fn test_triplet_state() -> Result<()> {
        let alphabet = Alphabet::new("ACGU");
        let state = State::triplet("M2", &alphabet, keyed(&[("AUG", 0.8), ("AUU", 0.8)]), true)?;

        assert!(state.name() == "M2");
        assert!(state.is_end_state());
        assert!(close(state.probability("AUG").exp(), 0.5));
        assert!(close(state.probability("AUU").exp(), 0.5));
        assert!(state.probability("AGU") == -f64::INFINITY);
        assert!(state.min_len() == 3);
        assert!(state.max_len() == 3);

        let table = state.emission_table();
        assert!(table[0].0 == "AUG");
        assert!(table[1].0 == "AUU");

        let mut rng = Pcg64::seed_from_u64(7);
        for _ in 0..20 {
            let sample = state.sample(&mut rng)?;
            assert!(sample == "AUG" || sample == "AUU");
        }

        let err = State::triplet("M3", &alphabet, keyed(&[("AUGA", 1.0)]), false).unwrap_err();
        assert!(err.downcast_ref::<InvalidEmissionKeyError>().is_some());

        let err = State::triplet("M3", &alphabet, keyed(&[("ATG", 1.0)]), false).unwrap_err();
        assert!(err.downcast_ref::<InvalidEmissionKeyError>().is_some());
        Ok(())
    }

    #[test]
    fn test_frame_state() -> Result<()> {
        let background = bases(&[('A', 0.25), ('C', 0.25), ('G', 0.25), ('U', 0.25)]);
        let codons = keyed(&[("AUG", 0.8), ("AUU", 0.1)]);
        let state = State::frame("M5", background, codons, 0.1, false)?;

        assert!(state.min_len() == 1);
        assert!(state.max_len() == 5);
        assert!(state.to_string() == "<M5>");
        assert!(state.kind() == "FrameState");

        assert!((state.probability("AUA").exp() - 0.0010021604938271608).abs() < 1e-9);
        assert!((state.probability("AUG").exp() - 0.5858020833333333).abs() < 1e-9);
        assert!((state.probability("AU").exp() - 0.054158333333333336).abs() < 1e-9);
        assert!(state.probability("AUUAAA") == -f64::INFINITY);

        let table = state.emission_table();
        assert!(table.len() == 4 + 16 + 64 + 256 + 1024);
        assert!(table[0].0 == "AUG");
        assert!((table[0].1 - -0.5347732882047063).abs() < 1e-9);
        assert!(table[2].0 == "AU");

        let State::Frame(frame) = &state else {
            panic!("expected a frame state");
        };
        for f in 1..=5 {
            let total: f64 = cartesian_strings(&['A', 'C', 'G', 'U'], f)
                .iter()
                .map(|z| frame.emission().conditional_prob(z).exp())
                .sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_frame_state_sampling() -> Result<()> {
        let background = bases(&[('A', 0.25), ('C', 0.25), ('G', 0.25), ('U', 0.25)]);
        let codons = keyed(&[("AUG", 0.8), ("AUU", 0.1)]);

        let mut rng = Pcg64::seed_from_u64(0);
        let state = State::frame("M5", background.clone(), codons.clone(), 0.1, false)?;
        for _ in 0..50 {
            let sample = state.sample(&mut rng)?;
            assert!((1..=5).contains(&sample.len()));
            assert!(state.probability(&sample) > -f64::INFINITY);
        }

        // without indels only the listed codons can be observed
        let state = State::frame("M4", background, codons, 0.0, false)?;
        for _ in 0..50 {
            let sample = state.sample(&mut rng)?;
            assert!(sample == "AUG" || sample == "AUU");
        }
        Ok(())
    }
}
