use std::fmt::{Display, Formatter};

use serde::Serialize;

/// One step of a path sampled from a model: the state that was
/// visited and the symbols it emitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Emission {
    pub state: String,
    pub symbols: String,
}

impl Emission {
    pub fn new(state: &str, symbols: &str) -> Self {
        Emission {
            state: state.to_string(),
            symbols: symbols.to_string(),
        }
    }
}

/// Concatenate the symbols emitted along a sampled path.
pub fn emitted_sequence(path: &[Emission]) -> String {
    path.iter().map(|e| e.symbols.as_str()).collect()
}

/// One step of an explicit state path: a state and the
/// number of sequence symbols it consumes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TraceStep {
    pub state: String,
    pub length: usize,
}

impl TraceStep {
    pub fn new(state: &str, length: usize) -> Self {
        TraceStep {
            state: state.to_string(),
            length,
        }
    }
}

impl Display for TraceStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}:{}>", self.state, self.length)
    }
}

/// A state path that consumes a sequence left to right.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Trace {
    pub steps: Vec<TraceStep>,
}

impl Trace {
    pub fn new() -> Self {
        Trace::default()
    }

    pub fn from_pairs(pairs: &[(&str, usize)]) -> Self {
        Trace {
            steps: pairs
                .iter()
                .map(|(state, length)| TraceStep::new(state, *length))
                .collect(),
        }
    }

    pub fn push(&mut self, state: &str, length: usize) {
        self.steps.push(TraceStep::new(state, length))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TraceStep> {
        self.steps.iter()
    }

    /// The total number of symbols consumed along the path.
    pub fn consumed(&self) -> usize {
        self.steps.iter().map(|s| s.length).sum()
    }

    pub fn state_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.state.as_str()).collect()
    }

    pub fn lengths(&self) -> Vec<usize> {
        self.steps.iter().map(|s| s.length).collect()
    }
}

impl Display for Trace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.steps.iter().try_for_each(|s| write!(f, "{s}"))
    }
}

/// The best path found by Viterbi decoding and its log probability.
#[derive(Clone, Debug, Serialize)]
pub struct Viterbi {
    pub log_probability: f64,
    pub trace: Trace,
}

impl Viterbi {
    pub fn probability(&self) -> f64 {
        self.log_probability.exp()
    }
}
