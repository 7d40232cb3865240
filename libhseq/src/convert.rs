use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{debug, info};
use thiserror::Error;

use crate::alphabet::{Alphabet, Molecule};
use crate::genetic_code::GeneticCode;
use crate::structs::frame::CODON_LENGTH;
use crate::structs::hmm::StateNotFoundError;
use crate::structs::{Hmm, P7Hmm, State};
use crate::util::{log_sum_exp, normalize_log_map};

/// An Error that is thrown when a protein model state has the wrong kind
/// to be turned into a frame state.
#[derive(Error, Debug)]
#[error("state {name} is a {kind}, expected a NormalState")]
pub struct UnexpectedStateKindError {
    pub name: String,
    pub kind: &'static str,
}

/// Spreads an amino acid emission over the codons of a genetic code.
///
/// Every amino acid's probability is split evenly between its synonymous
/// codons. Amino acids the code has no codons for are dropped.
#[derive(Clone, Debug)]
pub struct AminoToCodon {
    aa_emission: IndexMap<char, f64>,
    codon_emission: IndexMap<String, f64>,
}

impl AminoToCodon {
    pub fn new(mut aa_emission: IndexMap<char, f64>, code: &GeneticCode) -> Self {
        normalize_log_map(&mut aa_emission);

        let mut codon_emission: IndexMap<String, f64> = IndexMap::new();
        for (&aa, &logp) in aa_emission.iter() {
            let codons = match code.codons(aa) {
                Ok(codons) => codons,
                Err(_) => {
                    debug!("no codons for {aa} in the {} code", code.name());
                    continue;
                }
            };

            let logp_norm = (codons.len() as f64).ln();
            codons.iter().for_each(|codon| {
                codon_emission.insert(codon.clone(), logp - logp_norm);
            });
        }
        normalize_log_map(&mut codon_emission);

        AminoToCodon {
            aa_emission,
            codon_emission,
        }
    }

    pub fn aa_emission(&self) -> &IndexMap<char, f64> {
        &self.aa_emission
    }

    pub fn codon_emission(&self) -> &IndexMap<String, f64> {
        &self.codon_emission
    }

    /// The amino acids of the emission, sorted.
    pub fn amino_acids(&self) -> String {
        let mut aa: Vec<char> = self.aa_emission.keys().copied().collect();
        aa.sort_unstable();
        aa.into_iter().collect()
    }
}

/// The knobs of a nucleotide frame model.
#[derive(Clone, Debug)]
pub struct FrameConfig {
    /// Probability of each insertion or deletion event
    pub epsilon: f64,
    pub molecule: Molecule,
    pub genetic_code: GeneticCode,
}

impl Default for FrameConfig {
    fn default() -> Self {
        FrameConfig {
            epsilon: 0.01,
            molecule: Molecule::Rna,
            genetic_code: GeneticCode::standard(),
        }
    }
}

/// Build the protein model of a profile.
///
/// The topology is the plan7 core: a start state `S`, a silent `M0`,
/// then match, insert and delete states per node, ending in `E`.
pub fn protein_hmm(profile: &P7Hmm) -> Result<Hmm> {
    let alphabet = profile.alphabet();
    let model_length = profile.header.model_length;
    let mut hmm = Hmm::new(alphabet.clone());

    hmm.add_state(State::silent("S", &alphabet, false), 0.0)?;
    hmm.add_state(State::silent("M0", &alphabet, false), -f64::INFINITY)?;
    hmm.add_state(
        State::normal("I0", profile.insert_emission(0), false),
        -f64::INFINITY,
    )?;
    hmm.add_state(State::silent("D0", &alphabet, false), -f64::INFINITY)?;
    hmm.set_trans("S", "M0", 0.0)?;

    for m in 1..=model_length {
        hmm.add_state(
            State::normal(&format!("M{m}"), profile.match_emission(m), false),
            -f64::INFINITY,
        )?;
        hmm.add_state(
            State::normal(&format!("I{m}"), profile.insert_emission(m), false),
            -f64::INFINITY,
        )?;
        hmm.add_state(
            State::silent(&format!("D{m}"), &alphabet, false),
            -f64::INFINITY,
        )?;
        wire_node(&mut hmm, profile, m)?;
    }

    hmm.add_state(State::silent("E", &alphabet, true), -f64::INFINITY)?;
    wire_end(&mut hmm, profile)?;

    hmm.normalize();
    info!(
        "built protein model {} with {} states",
        profile.header.name,
        hmm.num_states()
    );
    Ok(hmm)
}

/// Build the nucleotide model of a profile, with every match and insert
/// column turned into a frame state.
///
/// `protein` must be the model [`protein_hmm`] built from the same profile.
pub fn frame_hmm(profile: &P7Hmm, protein: &Hmm, config: &FrameConfig) -> Result<Hmm> {
    let code = config.genetic_code.for_molecule(config.molecule);
    let alphabet = config.molecule.alphabet();
    let base_compo = infer_base_composition(&profile.composition(), &code, &alphabet)?;
    let model_length = profile.header.model_length;
    let mut hmm = Hmm::new(alphabet.clone());

    let frame_state = |name: &str, column: &str| -> Result<State> {
        let aa_emission = normal_emission(protein, column)?;
        let codons = AminoToCodon::new(aa_emission, &code);
        State::frame(
            name,
            base_compo.clone(),
            codons.codon_emission().clone(),
            config.epsilon,
            false,
        )
        .with_context(|| format!("failed to build frame state {name}"))
    };

    hmm.add_state(State::silent("M0", &alphabet, false), 0.0)?;
    hmm.add_state(frame_state("I0", "I0")?, -f64::INFINITY)?;
    hmm.add_state(State::silent("D0", &alphabet, false), -f64::INFINITY)?;

    for m in 1..=model_length {
        let (mat, ins, del) = (format!("M{m}"), format!("I{m}"), format!("D{m}"));
        hmm.add_state(frame_state(&mat, &mat)?, -f64::INFINITY)?;
        hmm.add_state(frame_state(&ins, &ins)?, -f64::INFINITY)?;
        hmm.add_state(State::silent(&del, &alphabet, false), -f64::INFINITY)?;
        wire_node(&mut hmm, profile, m)?;
        debug!("built frame node {m}");
    }

    hmm.add_state(State::silent("E", &alphabet, true), -f64::INFINITY)?;
    wire_end(&mut hmm, profile)?;

    hmm.rename_state("M0", "B")?;
    hmm.delete_state("D0")?;
    hmm.normalize();
    info!(
        "built frame model {} with {} states (epsilon: {})",
        profile.header.name,
        hmm.num_states(),
        config.epsilon
    );
    Ok(hmm)
}

/// A single frame state `I`, emitting the first insert column of the
/// profile, that loops on itself.
pub fn background_frame_hmm(profile: &P7Hmm, protein: &Hmm, config: &FrameConfig) -> Result<Hmm> {
    let code = config.genetic_code.for_molecule(config.molecule);
    let alphabet = config.molecule.alphabet();
    let base_compo = infer_base_composition(&profile.composition(), &code, &alphabet)?;

    let codons = AminoToCodon::new(normal_emission(protein, "I1")?, &code);
    let mut hmm = Hmm::new(alphabet);
    hmm.add_state(
        State::frame(
            "I",
            base_compo,
            codons.codon_emission().clone(),
            config.epsilon,
            false,
        )?,
        0.0,
    )?;
    hmm.normalize();
    Ok(hmm)
}

/// Connect node `m - 1` to node `m`.
fn wire_node(hmm: &mut Hmm, profile: &P7Hmm, m: usize) -> Result<()> {
    let t = profile.transitions(m - 1);
    let prev = m - 1;

    hmm.set_trans(&format!("M{prev}"), &format!("M{m}"), t.mm)?;
    hmm.set_trans(&format!("M{prev}"), &format!("I{prev}"), t.mi)?;
    hmm.set_trans(&format!("M{prev}"), &format!("D{m}"), t.md)?;
    hmm.set_trans(&format!("I{prev}"), &format!("M{m}"), t.im)?;
    hmm.set_trans(&format!("I{prev}"), &format!("I{prev}"), t.ii)?;
    hmm.set_trans(&format!("D{prev}"), &format!("M{m}"), t.dm)?;
    hmm.set_trans(&format!("D{prev}"), &format!("D{m}"), t.dd)?;
    Ok(())
}

/// Connect the last node to the end state.
fn wire_end(hmm: &mut Hmm, profile: &P7Hmm) -> Result<()> {
    let last = profile.header.model_length;
    let t = profile.transitions(last);

    hmm.set_trans("E", "E", 0.0)?;
    hmm.set_trans(&format!("M{last}"), "E", t.mm)?;
    hmm.set_trans(&format!("M{last}"), &format!("I{last}"), t.mi)?;
    hmm.set_trans(&format!("I{last}"), "E", t.im)?;
    hmm.set_trans(&format!("I{last}"), &format!("I{last}"), t.ii)?;
    hmm.set_trans(&format!("D{last}"), "E", t.dm)?;
    Ok(())
}

fn normal_emission(hmm: &Hmm, name: &str) -> Result<IndexMap<char, f64>> {
    match hmm.state(name) {
        Some(State::Normal(state)) => Ok(state.emission().clone()),
        Some(other) => Err(UnexpectedStateKindError {
            name: name.to_string(),
            kind: other.kind(),
        }
        .into()),
        None => Err(StateNotFoundError {
            name: name.to_string(),
        }
        .into()),
    }
}

/// The base composition implied by an amino acid composition.
///
/// Each amino acid's mass is split over its codons, and each codon gives
/// a third of its mass to each of its bases.
pub fn infer_base_composition(
    aa_composition: &IndexMap<char, f64>,
    code: &GeneticCode,
    alphabet: &Alphabet,
) -> Result<IndexMap<char, f64>> {
    let mut contributions: IndexMap<char, Vec<f64>> =
        alphabet.symbols().iter().map(|&b| (b, vec![])).collect();
    let third = (CODON_LENGTH as f64).ln();

    for (&aa, &logp) in aa_composition.iter() {
        let codons = code
            .codons(aa)
            .with_context(|| "failed to infer the base composition")?;
        let logp_norm = (codons.len() as f64).ln();

        for codon in codons {
            for base in codon.chars() {
                if let Some(values) = contributions.get_mut(&base) {
                    values.push(logp - logp_norm - third);
                }
            }
        }
    }

    let mut base_compo: IndexMap<char, f64> = contributions
        .into_iter()
        .map(|(base, values)| (base, log_sum_exp(&values)))
        .collect();
    normalize_log_map(&mut base_compo);
    Ok(base_compo)
}
