use anyhow::Result;
use indexmap::IndexMap;
use log::{debug, trace};
use rand::Rng;
use thiserror::Error;

use crate::alphabet::Alphabet;
use crate::structs::state::State;
use crate::structs::trace::{Emission, Trace, Viterbi};
use crate::util::{log_sum_exp, normalize_log_map, sample_log_categorical};

/// An Error that is thrown when a state name is used twice in one model.
#[derive(Error, Debug)]
#[error("state already exists: {name}")]
pub struct DuplicateStateError {
    pub name: String,
}

/// An Error that is thrown when a state's alphabet differs from the model's.
#[derive(Error, Debug)]
#[error("state {name} has alphabet \"{found}\", but the model alphabet is \"{expected}\"")]
pub struct AlphabetMismatchError {
    pub name: String,
    pub found: String,
    pub expected: String,
}

/// An Error that is thrown when a state name is not part of the model.
#[derive(Error, Debug)]
#[error("state not found: {name}")]
pub struct StateNotFoundError {
    pub name: String,
}

/// An Error that is thrown when an operation needs an end state and the model has none.
#[derive(Error, Debug)]
#[error("the model has no end state")]
pub struct NoEndStateError;

/// A hidden Markov model whose states may emit strings of different lengths.
///
/// Transition and initial probabilities are kept in log space. States,
/// initial probabilities and transition rows are all keyed by state name
/// and kept in insertion order.
#[derive(Clone, Debug)]
pub struct Hmm {
    alphabet: Alphabet,
    states: IndexMap<String, State>,
    init: IndexMap<String, f64>,
    trans: IndexMap<String, IndexMap<String, f64>>,
}

/// Where the best segment ending at some (prefix length, state) came from.
#[derive(Clone, Copy, Debug)]
enum Pointer {
    Unreached,
    Start,
    Step { pos: usize, state: usize },
}

fn rename_key<V>(map: &mut IndexMap<String, V>, old: &str, new: &str) {
    if let Some((idx, _, value)) = map.shift_remove_full(old) {
        map.shift_insert(idx, new.to_string(), value);
    }
}

impl Hmm {
    pub fn new(alphabet: Alphabet) -> Self {
        Hmm {
            alphabet,
            states: IndexMap::new(),
            init: IndexMap::new(),
            trans: IndexMap::new(),
        }
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.values()
    }

    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(|k| k.as_str())
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn end_states(&self) -> Vec<&State> {
        self.states.values().filter(|s| s.is_end_state()).collect()
    }

    /// The initial log probability of a state; -inf for unknown states.
    pub fn init_prob(&self, name: &str) -> f64 {
        self.init.get(name).copied().unwrap_or(-f64::INFINITY)
    }

    /// The transition log probability from `a` to `b`; -inf when there is no such edge.
    pub fn trans(&self, a: &str, b: &str) -> f64 {
        self.trans
            .get(a)
            .and_then(|row| row.get(b))
            .copied()
            .unwrap_or(-f64::INFINITY)
    }

    /// The outgoing edges of `name`, in the order they were set.
    pub fn successors(&self, name: &str) -> impl Iterator<Item = (&str, f64)> {
        self.trans
            .get(name)
            .into_iter()
            .flat_map(|row| row.iter().map(|(k, &v)| (k.as_str(), v)))
    }

    fn check_state(&self, name: &str) -> Result<()> {
        if !self.states.contains_key(name) {
            return Err(StateNotFoundError {
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn add_state(&mut self, state: State, init_log_prob: f64) -> Result<()> {
        let name = state.name().to_string();

        if self.states.contains_key(&name) {
            return Err(DuplicateStateError { name }.into());
        }

        if !state.alphabet().same_symbols(&self.alphabet) {
            return Err(AlphabetMismatchError {
                name,
                found: state.alphabet().to_string(),
                expected: self.alphabet.to_string(),
            }
            .into());
        }

        self.init.insert(name.clone(), init_log_prob);
        self.trans.insert(name.clone(), IndexMap::new());
        self.states.insert(name, state);
        Ok(())
    }

    pub fn set_trans(&mut self, a: &str, b: &str, log_prob: f64) -> Result<()> {
        self.check_state(a)?;
        self.check_state(b)?;
        if let Some(row) = self.trans.get_mut(a) {
            row.insert(b.to_string(), log_prob);
        }
        Ok(())
    }

    pub fn rename_state(&mut self, old: &str, new: &str) -> Result<()> {
        self.check_state(old)?;

        if self.states.contains_key(new) {
            return Err(DuplicateStateError {
                name: new.to_string(),
            }
            .into());
        }

        rename_key(&mut self.states, old, new);
        if let Some(state) = self.states.get_mut(new) {
            state.set_name(new);
        }
        rename_key(&mut self.init, old, new);
        rename_key(&mut self.trans, old, new);
        self.trans
            .values_mut()
            .for_each(|row| rename_key(row, old, new));
        Ok(())
    }

    pub fn delete_state(&mut self, name: &str) -> Result<()> {
        self.check_state(name)?;

        self.states.shift_remove(name);
        self.init.shift_remove(name);
        self.trans.shift_remove(name);
        self.trans.values_mut().for_each(|row| {
            row.shift_remove(name);
        });
        Ok(())
    }

    /// Make every transition row and the initial distribution sum to one.
    ///
    /// End states become absorbing. A row (or the initial distribution) that
    /// carries no probability mass is replaced by the uniform distribution
    /// over every state.
    pub fn normalize(&mut self) {
        let names: Vec<String> = self.states.keys().cloned().collect();

        for (name, state) in self.states.iter() {
            if state.is_end_state() {
                if let Some(row) = self.trans.get_mut(name) {
                    *row = names
                        .iter()
                        .map(|n| (n.clone(), if n == name { 0.0 } else { -f64::INFINITY }))
                        .collect();
                }
            }
        }

        for (name, row) in self.trans.iter_mut() {
            let values: Vec<f64> = row.values().copied().collect();
            if log_sum_exp(&values) == -f64::INFINITY {
                debug!("state {name} has no outgoing mass, using uniform transitions");
                *row = names
                    .iter()
                    .map(|n| (n.clone(), -f64::INFINITY))
                    .collect();
            }
            normalize_log_map(row);
        }

        if !normalize_log_map(&mut self.init) {
            debug!("initial distribution has no mass, using a uniform distribution");
        }
    }

    /// Sample a path by ancestral sampling, ending with the end state it reaches.
    ///
    /// The model should be normalized first.
    pub fn emit<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<Emission>> {
        if self.end_states().is_empty() {
            return Err(NoEndStateError.into());
        }

        let init: Vec<f64> = self.init.values().copied().collect();
        let idx = sample_log_categorical(rng, &init)?;
        let mut current: &str = self.init.get_index(idx).map(|(k, _)| k.as_str()).unwrap_or_default();

        let mut path: Vec<Emission> = vec![];
        loop {
            let state = self
                .states
                .get(current)
                .ok_or_else(|| StateNotFoundError {
                    name: current.to_string(),
                })?;

            path.push(Emission::new(current, &state.sample(rng)?));
            if state.is_end_state() {
                break;
            }

            let row = self.trans.get(current).ok_or_else(|| StateNotFoundError {
                name: current.to_string(),
            })?;
            let log_probs: Vec<f64> = row.values().copied().collect();
            let idx = sample_log_categorical(rng, &log_probs)?;
            current = row.get_index(idx).map(|(k, _)| k.as_str()).unwrap_or_default();
        }
        Ok(path)
    }

    /// The joint log probability of `seq` and a state path.
    pub fn likelihood(&self, seq: &str, path: &Trace) -> Result<f64> {
        if path.is_empty() {
            return Ok(if seq.is_empty() { 0.0 } else { -f64::INFINITY });
        }

        for step in path.iter() {
            self.check_state(&step.state)?;
        }

        let bounds = char_bounds(seq);
        if path.consumed() != bounds.len() - 1 {
            return Ok(-f64::INFINITY);
        }

        let mut pos = 0;
        let mut emission = |step_state: &str, length: usize| -> f64 {
            let segment = &seq[bounds[pos]..bounds[pos + length]];
            pos += length;
            self.states
                .get(step_state)
                .map(|s| s.probability(segment))
                .unwrap_or(-f64::INFINITY)
        };

        let first = &path.steps[0];
        let mut log_prob = self.init_prob(&first.state) + emission(&first.state, first.length);

        for window in path.steps.windows(2) {
            let (prev, step) = (&window[0], &window[1]);
            let e = emission(&step.state, step.length);
            log_prob += e + self.trans(&prev.state, &step.state);
        }

        Ok(log_prob)
    }

    /// Find the most probable path that consumes all of `seq` and stops in an end state.
    pub fn viterbi(&self, seq: &str) -> Result<Viterbi> {
        let end_states: Vec<usize> = self
            .states
            .values()
            .enumerate()
            .filter(|(_, s)| s.is_end_state())
            .map(|(idx, _)| idx)
            .collect();

        if end_states.is_empty() {
            return Err(NoEndStateError.into());
        }

        let bounds = char_bounds(seq);
        let seq_len = bounds.len() - 1;
        let states: Vec<&State> = self.states.values().collect();
        let names: Vec<&str> = self.states.keys().map(|k| k.as_str()).collect();
        let init: Vec<f64> = names.iter().map(|n| self.init_prob(n)).collect();

        // predecessors[q] holds every non-end state p with a usable edge p -> q
        let mut predecessors: Vec<Vec<(usize, f64)>> = vec![vec![]; states.len()];
        for (p, name) in names.iter().enumerate() {
            if states[p].is_end_state() {
                continue;
            }
            for (target, log_prob) in self.successors(name) {
                if log_prob == -f64::INFINITY {
                    continue;
                }
                if let Some(q) = self.states.get_index_of(target) {
                    predecessors[q].push((p, log_prob));
                }
            }
        }

        let silent: Vec<usize> = (0..states.len())
            .filter(|&q| states[q].min_len() == 0)
            .collect();

        let mut best = vec![vec![-f64::INFINITY; states.len()]; seq_len + 1];
        let mut pointers = vec![vec![Pointer::Unreached; states.len()]; seq_len + 1];

        for pos in 0..=seq_len {
            for (q, state) in states.iter().enumerate() {
                for len in state.min_len().max(1)..=state.max_len().min(pos) {
                    let start = pos - len;
                    let e = state.probability(&seq[bounds[start]..bounds[pos]]);
                    if e == -f64::INFINITY {
                        continue;
                    }

                    if start == 0 {
                        let score = init[q] + e;
                        if score > best[pos][q] {
                            best[pos][q] = score;
                            pointers[pos][q] = Pointer::Start;
                        }
                    }

                    for &(p, t) in predecessors[q].iter() {
                        let score = best[start][p] + (e + t);
                        if score > best[pos][q] {
                            best[pos][q] = score;
                            pointers[pos][q] = Pointer::Step { pos: start, state: p };
                        }
                    }
                }
            }

            if pos == 0 {
                for &q in silent.iter() {
                    let score = init[q] + states[q].probability("");
                    if score > best[0][q] {
                        best[0][q] = score;
                        pointers[0][q] = Pointer::Start;
                    }
                }
            }

            // silent states chain within the same prefix length
            for round in 0..=states.len() {
                let mut changed = false;
                for &q in silent.iter() {
                    let e = states[q].probability("");
                    for &(p, t) in predecessors[q].iter() {
                        let score = best[pos][p] + (e + t);
                        if score > best[pos][q] {
                            best[pos][q] = score;
                            pointers[pos][q] = Pointer::Step { pos, state: p };
                            changed = true;
                        }
                    }
                }
                if !changed {
                    trace!("silent states at position {pos} settled after {round} rounds");
                    break;
                }
            }
        }

        let (mut state, log_probability) = end_states
            .iter()
            .map(|&q| (q, best[seq_len][q]))
            .fold((end_states[0], -f64::INFINITY), |acc, candidate| {
                if candidate.1 > acc.1 {
                    candidate
                } else {
                    acc
                }
            });

        if log_probability == -f64::INFINITY {
            debug!("no path through the model explains the sequence");
            return Ok(Viterbi {
                log_probability,
                trace: Trace::new(),
            });
        }

        let mut steps: Vec<(usize, usize)> = vec![];
        let mut pos = seq_len;
        loop {
            match pointers[pos][state] {
                Pointer::Start => {
                    steps.push((state, pos));
                    break;
                }
                Pointer::Step {
                    pos: prev_pos,
                    state: prev_state,
                } => {
                    steps.push((state, pos - prev_pos));
                    pos = prev_pos;
                    state = prev_state;
                }
                Pointer::Unreached => break,
            }
        }

        let mut trace = Trace::new();
        steps
            .iter()
            .rev()
            .for_each(|&(q, length)| trace.push(names[q], length));

        Ok(Viterbi {
            log_probability,
            trace,
        })
    }
}

/// Byte offsets of every char boundary of `seq`, including its end.
fn char_bounds(seq: &str) -> Vec<usize> {
    seq.char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(seq.len()))
        .collect()
}
