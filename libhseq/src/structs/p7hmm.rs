use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use thiserror::Error;

use crate::alphabet::{Alphabet, AMINO_ALPHABET, DNA_BASES, RNA_BASES};

use self::constants::{
    P7_DELETE_TO_DELETE, P7_DELETE_TO_MATCH, P7_INSERT_TO_INSERT, P7_INSERT_TO_MATCH,
    P7_MATCH_TO_DELETE, P7_MATCH_TO_INSERT, P7_MATCH_TO_MATCH, P7_NUM_TRANSITIONS,
};

pub mod constants {
    // these constants describe indices of transitions
    pub const P7_MATCH_TO_MATCH: usize = 0;
    pub const P7_MATCH_TO_INSERT: usize = 1;
    pub const P7_MATCH_TO_DELETE: usize = 2;
    pub const P7_INSERT_TO_MATCH: usize = 3;
    pub const P7_INSERT_TO_INSERT: usize = 4;
    pub const P7_DELETE_TO_MATCH: usize = 5;
    pub const P7_DELETE_TO_DELETE: usize = 6;
    pub const P7_NUM_TRANSITIONS: usize = 7;
}

// local constants for parsing flags
const P7_HEADER_FORMAT_FLAG: &str = "HMMER3/f";
const P7_HEADER_NAME_FLAG: &str = "NAME";
const P7_HEADER_LENGTH_FLAG: &str = "LENG";
const P7_HEADER_ALPHABET_FLAG: &str = "ALPH";

const P7_BODY_HMM_MODEL_START_FLAG: &str = "HMM";
const P7_BODY_TRANSITION_HEADER_FLAG: &str = "m->m";
const P7_BODY_COMPO_FLAG: &str = "COMPO";
const P7_BODY_END_FLAG: &str = "//";

// this static regex is used to find float strings
lazy_static! {
    static ref FLOAT_RE: Regex = Regex::new(r"-?\d+\.?\d*(?:[eE][-+]?\d+)?").unwrap();
}

enum ParserState {
    Idle,
    Header,
    ModelHead,
    ModelBody,
}

enum ModelParserState {
    MatchEmissions,
    InsertEmissions,
    StateTransitions,
}

/// An Error that is thrown when a line does not start a new P7HMM
/// while the parser is looking for one.
#[derive(Error, Debug)]
#[error("expected a HMMER3/f header, found: {flag}")]
struct UnknownFormatError {
    flag: String,
}

/// An Error that is thrown when a header flag holds a value
/// outside of the ones it may take.
#[derive(Error, Debug)]
#[error("unknown value for {flag}: {value}")]
struct UnknownFlagValueError {
    flag: String,
    value: String,
}

/// An Error that is thrown when a token parsing function
/// recognizes that the token vector index is out of bounds.
#[derive(Error, Debug)]
#[error("token index out of bounds")]
struct TokenIndexError;

/// An Error that is thrown when a token parsing function
/// can't find a float in the token.
#[derive(Error, Debug)]
#[error("unable to find a float-like substring")]
struct FloatRegexError;

/// An Error that is thrown when the node lines of a
/// model body are out of order.
#[derive(Error, Debug)]
#[error("expected node {expected}, found: {found}")]
struct NodeNumberError {
    expected: usize,
    found: String,
}

/// An Error that is thrown when a model body holds a different
/// number of nodes than its LENG header says.
#[derive(Error, Debug)]
#[error("model {name} declares {declared} nodes, but {found} were parsed")]
struct ModelLengthError {
    name: String,
    declared: usize,
    found: usize,
}

/// The alphabet of the sequences represented in a P7HMM.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileAlphabet {
    Amino,
    Dna,
    Rna,
    #[default]
    AlphabetNotSet,
}

impl ProfileAlphabet {
    /// The canonical residues of the alphabet, in HMMER order.
    pub fn symbols(&self) -> &'static str {
        match self {
            ProfileAlphabet::Amino => AMINO_ALPHABET,
            ProfileAlphabet::Dna => DNA_BASES,
            ProfileAlphabet::Rna => RNA_BASES,
            ProfileAlphabet::AlphabetNotSet => "",
        }
    }
}

/// The header lines of a P7HMM that the model builders read.
///
/// Other header lines (DESC, CKSUM, STATS and so on) are skipped.
#[derive(Default, Debug)]
pub struct Header {
    pub name: String,
    pub model_length: usize,
    pub alphabet: ProfileAlphabet,
    /// The residue columns, as listed on the HMM line.
    pub symbols: Vec<char>,
}

/// The probability model, with every value stored as a natural log probability.
#[derive(Default, Debug)]
pub struct Model {
    pub composition: Vec<f64>,
    pub match_emissions: Vec<Vec<f64>>,
    pub insert_emissions: Vec<Vec<f64>>,
    pub transitions: Vec<Vec<f64>>,
}

/// The transitions that leave one node of a profile, in log space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transitions {
    pub mm: f64,
    pub mi: f64,
    pub md: f64,
    pub im: f64,
    pub ii: f64,
    pub dm: f64,
    pub dd: f64,
}

/// The data that describes a complete P7HMM.
#[derive(Default, Debug)]
pub struct P7Hmm {
    pub header: Header,
    pub model: Model,
}

impl P7Hmm {
    pub fn new() -> Self {
        let mut hmm = P7Hmm::default();
        // node 0 has no match state
        hmm.model.match_emissions.push(vec![]);
        hmm
    }

    /// The residues of the model, falling back to the ALPH line when the HMM line lists none.
    pub fn alphabet(&self) -> Alphabet {
        if self.header.symbols.is_empty() {
            return Alphabet::new(self.header.alphabet.symbols());
        }
        Alphabet::new(&self.header.symbols.iter().collect::<String>())
    }

    fn keyed(&self, values: &[f64]) -> IndexMap<char, f64> {
        self.header
            .symbols
            .iter()
            .copied()
            .zip(values.iter().copied())
            .collect()
    }

    /// The background composition, keyed by residue.
    pub fn composition(&self) -> IndexMap<char, f64> {
        self.keyed(&self.model.composition)
    }

    /// The match emissions of node `m`; empty for node 0.
    pub fn match_emission(&self, m: usize) -> IndexMap<char, f64> {
        self.model
            .match_emissions
            .get(m)
            .map(|values| self.keyed(values))
            .unwrap_or_default()
    }

    pub fn insert_emission(&self, m: usize) -> IndexMap<char, f64> {
        self.model
            .insert_emissions
            .get(m)
            .map(|values| self.keyed(values))
            .unwrap_or_default()
    }

    /// The transitions out of node `m`. Missing values are -inf.
    pub fn transitions(&self, m: usize) -> Transitions {
        let row = self.model.transitions.get(m);
        let get = |idx: usize| {
            row.and_then(|r| r.get(idx))
                .copied()
                .unwrap_or(-f64::INFINITY)
        };
        Transitions {
            mm: get(P7_MATCH_TO_MATCH),
            mi: get(P7_MATCH_TO_INSERT),
            md: get(P7_MATCH_TO_DELETE),
            im: get(P7_INSERT_TO_MATCH),
            ii: get(P7_INSERT_TO_INSERT),
            dm: get(P7_DELETE_TO_MATCH),
            dd: get(P7_DELETE_TO_DELETE),
        }
    }
}

pub fn parse_p7hmm_file<P: AsRef<Path>>(path: P) -> Result<Vec<P7Hmm>> {
    let phmm_file = File::open(&path)
        .with_context(|| format!("failed to open p7hmm file: {}", path.as_ref().to_string_lossy()))?;
    let phmm_lines = BufReader::new(phmm_file).lines();

    let mut line_number: usize = 0;
    let mut current_node: usize = 0;

    let mut parser_state = ParserState::Idle;
    let mut body_parser_state = ModelParserState::MatchEmissions;

    let mut hmm_list: Vec<P7Hmm> = vec![];
    let mut current_hmm = P7Hmm::new();

    for line in phmm_lines {
        let line = line?;
        line_number += 1;

        if line.trim().is_empty() {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let flag: &str = get_token_as_str(&tokens, 0)?;

        match parser_state {
            // if we're idle, we're searching for the next header
            ParserState::Idle => match flag {
                P7_HEADER_FORMAT_FLAG => {
                    parser_state = ParserState::Header;
                }
                _ => {
                    return Err(UnknownFormatError {
                        flag: flag.to_string(),
                    })
                    .with_context(|| {
                        format!(
                            "failed to parse p7hmm file: {}\n         on line: {}",
                            &path.as_ref().to_string_lossy(),
                            line_number
                        )
                    })
                }
            },
            ParserState::Header => {
                let error_context = || {
                    format!(
                        "failed to parse p7hmm file header: {}\n         on line: {}\n         with flag: {}",
                        &path.as_ref().to_string_lossy(),
                        line_number,
                        flag
                    )
                };
                let header = &mut current_hmm.header;
                match flag {
                    P7_HEADER_NAME_FLAG => {
                        header.name = get_token_as_string(&tokens, 1).with_context(error_context)?;
                    }
                    P7_HEADER_LENGTH_FLAG => {
                        header.model_length =
                            get_token_as_usize(&tokens, 1).with_context(error_context)?;
                    }
                    P7_HEADER_ALPHABET_FLAG => {
                        let value = get_token_as_str(&tokens, 1).with_context(error_context)?;
                        header.alphabet = match value {
                            "amino" => ProfileAlphabet::Amino,
                            "dna" => ProfileAlphabet::Dna,
                            "rna" => ProfileAlphabet::Rna,
                            _ => {
                                return Err(unknown_value(flag, value)).with_context(error_context)
                            }
                        }
                    }
                    P7_BODY_HMM_MODEL_START_FLAG => {
                        header.symbols = tokens[1..]
                            .iter()
                            .filter_map(|t| t.chars().next())
                            .collect();
                        parser_state = ParserState::ModelHead;
                    }
                    _ => {
                        // the remaining header lines carry nothing the builders use
                    }
                }
            }
            ParserState::ModelHead => {
                let error_context = || {
                    format!(
                        "failed to parse p7hmm file: {}\n         on line: {}\n",
                        &path.as_ref().to_string_lossy(),
                        line_number
                    )
                };
                let num_symbols = current_hmm.header.symbols.len();
                match body_parser_state {
                    ModelParserState::MatchEmissions => match flag {
                        P7_BODY_TRANSITION_HEADER_FLAG => {
                            // no-op for the transition header
                        }
                        P7_BODY_COMPO_FLAG => {
                            current_hmm.model.composition =
                                get_tokens_as_log_probability_vec(&tokens, 1, num_symbols + 1)
                                    .with_context(error_context)?;
                            body_parser_state = ModelParserState::InsertEmissions;
                        }
                        _ => {
                            // the COMPO line is optional, so this is already the node 0 insert line
                            current_hmm.model.insert_emissions.push(
                                get_tokens_as_log_probability_vec(&tokens, 0, num_symbols)
                                    .with_context(error_context)?,
                            );
                            body_parser_state = ModelParserState::StateTransitions;
                        }
                    },
                    ModelParserState::InsertEmissions => {
                        current_hmm.model.insert_emissions.push(
                            get_tokens_as_log_probability_vec(&tokens, 0, num_symbols)
                                .with_context(error_context)?,
                        );
                        body_parser_state = ModelParserState::StateTransitions;
                    }
                    ModelParserState::StateTransitions => {
                        current_hmm.model.transitions.push(
                            get_tokens_as_log_probability_vec(&tokens, 0, P7_NUM_TRANSITIONS)
                                .with_context(error_context)?,
                        );
                        current_node = 1;
                        parser_state = ParserState::ModelBody;
                        body_parser_state = ModelParserState::MatchEmissions;
                    }
                }
            }
            ParserState::ModelBody => {
                let error_context = || {
                    format!(
                        "failed to parse p7hmm file body: {}\n         on line: {}\n",
                        &path.as_ref().to_string_lossy(),
                        line_number,
                    )
                };
                let num_symbols = current_hmm.header.symbols.len();

                match flag {
                    P7_BODY_END_FLAG => {
                        // we want it to be model_length + 1 since nodes are 1-indexed
                        let found = current_hmm.model.match_emissions.len() - 1;
                        if found != current_hmm.header.model_length
                            || current_hmm.model.insert_emissions.len() != found + 1
                            || current_hmm.model.transitions.len() != found + 1
                        {
                            return Err(ModelLengthError {
                                name: current_hmm.header.name.clone(),
                                declared: current_hmm.header.model_length,
                                found,
                            })
                            .with_context(error_context);
                        }

                        if current_hmm.header.alphabet == ProfileAlphabet::AlphabetNotSet {
                            warn!("p7hmm {} has no ALPH line", current_hmm.header.name);
                        }

                        hmm_list.push(std::mem::replace(&mut current_hmm, P7Hmm::new()));
                        parser_state = ParserState::Idle;
                    }
                    _ => match body_parser_state {
                        ModelParserState::MatchEmissions => {
                            if flag != current_node.to_string() {
                                return Err(NodeNumberError {
                                    expected: current_node,
                                    found: flag.to_string(),
                                })
                                .with_context(error_context);
                            }

                            // the MAP, CONS, RF, MM and CS columns after the emissions are skipped
                            current_hmm.model.match_emissions.push(
                                get_tokens_as_log_probability_vec(&tokens, 1, num_symbols + 1)
                                    .with_context(error_context)?,
                            );

                            body_parser_state = ModelParserState::InsertEmissions;
                        }
                        ModelParserState::InsertEmissions => {
                            current_hmm.model.insert_emissions.push(
                                get_tokens_as_log_probability_vec(&tokens, 0, num_symbols)
                                    .with_context(error_context)?,
                            );
                            body_parser_state = ModelParserState::StateTransitions;
                        }
                        ModelParserState::StateTransitions => {
                            current_hmm.model.transitions.push(
                                get_tokens_as_log_probability_vec(&tokens, 0, P7_NUM_TRANSITIONS)
                                    .with_context(error_context)?,
                            );
                            current_node += 1;
                            body_parser_state = ModelParserState::MatchEmissions;
                        }
                    },
                }
            }
        }
    }
    Ok(hmm_list)
}

fn unknown_value(flag: &str, value: &str) -> UnknownFlagValueError {
    UnknownFlagValueError {
        flag: flag.to_string(),
        value: value.to_string(),
    }
}

fn token_index_check(tokens: &[&str], idx: usize) -> Result<()> {
    if idx >= tokens.len() {
        return Err(TokenIndexError.into());
    }
    Ok(())
}

fn get_token_as_str<'a>(tokens: &'a [&str], idx: usize) -> Result<&'a str> {
    token_index_check(tokens, idx)?;
    Ok(tokens[idx])
}

fn get_token_as_string(tokens: &[&str], idx: usize) -> Result<String> {
    token_index_check(tokens, idx)?;
    Ok(String::from(tokens[idx]))
}

fn get_token_as_f64(tokens: &[&str], idx: usize) -> Result<f64> {
    token_index_check(tokens, idx)?;

    let float_str = match FLOAT_RE.find(tokens[idx]) {
        Some(str) => str,
        None => {
            return Err(FloatRegexError)
                .with_context(|| format!("failed to parse token \"{}\" as f64", tokens[idx]));
        }
    };

    float_str
        .as_str()
        .parse::<f64>()
        .with_context(|| format!("failed to parse token \"{}\" as f64", tokens[idx]))
}

fn get_token_as_usize(tokens: &[&str], idx: usize) -> Result<usize> {
    token_index_check(tokens, idx)?;
    tokens[idx]
        .parse::<usize>()
        .with_context(|| format!("failed to parse token \"{}\" as usize", tokens[idx]))
}

/// Get a string token as a log probability, which equates to negating the float.
///
/// This is because in the HMMER3/f P7HMM format, emissions and transitions are written as -ln(P),
/// and "*" stands for a probability of zero.
fn get_token_as_log_probability(tokens: &[&str], idx: usize) -> Result<f64> {
    token_index_check(tokens, idx)?;
    if tokens[idx] == "*" {
        return Ok(-f64::INFINITY);
    }
    let float = get_token_as_f64(tokens, idx)?;
    Ok(-float)
}

fn get_tokens_as_log_probability_vec(tokens: &[&str], start: usize, end: usize) -> Result<Vec<f64>> {
    (start..end)
        .map(|i| get_token_as_log_probability(tokens, i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use std::io::Write;

    const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/tiny.hmm");

    #[test]
    fn test_parse_header() -> Result<()> {
        let hmms = parse_p7hmm_file(FIXTURE)?;
        assert!(hmms.len() == 2);

        let hmm = &hmms[0];
        assert!(hmm.header.name == "tiny");
        assert!(hmm.header.model_length == 2);
        assert!(hmm.header.alphabet == ProfileAlphabet::Amino);
        assert!(hmm.header.symbols.iter().collect::<String>() == AMINO_ALPHABET);

        assert!(hmms[1].header.name == "single");
        assert!(hmms[1].header.model_length == 1);
        Ok(())
    }

    #[test]
    fn test_parse_skips_unused_header_lines() -> Result<()> {
        let fixture = std::fs::read_to_string(FIXTURE)?
            .replacen("CKSUM 1234567", "CKSUM unknown", 1)
            .replacen("STATS LOCAL MSV", "STATS GLOBAL MSV", 1)
            .replacen("NSEQ  4", "NSEQ  many", 1);
        let path = std::env::temp_dir().join("libhseq-skipped-header.hmm");
        std::fs::File::create(&path)?.write_all(fixture.as_bytes())?;

        let hmms = parse_p7hmm_file(&path)?;
        assert!(hmms.len() == 2);
        assert!(hmms[0].header.name == "tiny");
        assert!(hmms[0].header.model_length == 2);
        Ok(())
    }

    #[test]
    fn test_parse_model() -> Result<()> {
        let hmms = parse_p7hmm_file(FIXTURE)?;
        let hmm = &hmms[0];

        assert!(hmm.alphabet() == Alphabet::amino());

        let compo = hmm.composition();
        assert!(compo.len() == 20);
        assert!((compo[&'A'] - -2.68618).abs() < 1e-12);

        assert!(hmm.match_emission(0).is_empty());
        let m1 = hmm.match_emission(1);
        assert!((m1[&'M'] - -0.10536).abs() < 1e-12);
        assert!((m1[&'A'] - -5.04986).abs() < 1e-12);
        let m2 = hmm.match_emission(2);
        assert!((m2[&'W'] - -0.10536).abs() < 1e-12);
        assert!(hmm.insert_emission(0).len() == 20);
        assert!(hmm.match_emission(3).is_empty());

        let t0 = hmm.transitions(0);
        assert!((t0.mm - -0.01).abs() < 1e-12);
        assert!(t0.dm == 0.0);
        assert!(t0.dd == -f64::INFINITY);

        let t2 = hmm.transitions(2);
        assert!(t2.md == -f64::INFINITY);
        assert!((t2.ii - -0.77255).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_parse_errors() -> Result<()> {
        let dir = std::env::temp_dir();

        let path = dir.join("libhseq-bad-format.hmm");
        std::fs::File::create(&path)?.write_all(b"HMMER2.0\n")?;
        assert!(parse_p7hmm_file(&path).is_err());

        let fixture = std::fs::read_to_string(FIXTURE)?;
        let path = dir.join("libhseq-bad-length.hmm");
        std::fs::File::create(&path)?
            .write_all(fixture.replacen("LENG  2", "LENG  3", 1).as_bytes())?;
        let err = parse_p7hmm_file(&path).unwrap_err();
        assert!(err.downcast_ref::<ModelLengthError>().is_some());

        assert!(parse_p7hmm_file(dir.join("libhseq-missing.hmm")).is_err());
        Ok(())
    }
}
