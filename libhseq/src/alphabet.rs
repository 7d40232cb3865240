use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

pub const AMINO_ALPHABET: &str = "ACDEFGHIKLMNPQRSTVWY";

pub const DNA_BASES: &str = "ACGT";
pub const RNA_BASES: &str = "ACGU";

/// An ordered set of one-character symbols.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Alphabet {
    symbols: Vec<char>,
}

impl Alphabet {
    /// Duplicated symbols are dropped, keeping the first occurrence.
    pub fn new(symbols: &str) -> Self {
        let mut unique: Vec<char> = Vec::with_capacity(symbols.len());
        symbols.chars().for_each(|c| {
            if !unique.contains(&c) {
                unique.push(c)
            }
        });
        Alphabet { symbols: unique }
    }

    pub fn amino() -> Self {
        Alphabet::new(AMINO_ALPHABET)
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn contains(&self, symbol: char) -> bool {
        self.symbols.contains(&symbol)
    }

    pub fn index_of(&self, symbol: char) -> Option<usize> {
        self.symbols.iter().position(|&s| s == symbol)
    }

    /// True if every character of `seq` belongs to the alphabet.
    pub fn covers(&self, seq: &str) -> bool {
        seq.chars().all(|c| self.contains(c))
    }

    /// Set equality, ignoring symbol order.
    pub fn same_symbols(&self, other: &Alphabet) -> bool {
        let a: BTreeSet<char> = self.symbols.iter().copied().collect();
        let b: BTreeSet<char> = other.symbols.iter().copied().collect();
        a == b
    }
}

impl Display for Alphabet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.symbols.iter().try_for_each(|c| write!(f, "{c}"))
    }
}

#[derive(Error, Debug)]
#[error("unknown molecule: {name}")]
pub struct UnknownMoleculeError {
    name: String,
}

/// The nucleic acid that codons are spelled in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Molecule {
    Dna,
    #[default]
    Rna,
}

impl Molecule {
    pub fn bases(&self) -> &'static str {
        match self {
            Molecule::Dna => DNA_BASES,
            Molecule::Rna => RNA_BASES,
        }
    }

    pub fn alphabet(&self) -> Alphabet {
        Alphabet::new(self.bases())
    }

    /// Rewrite `seq` in this molecule's spelling (U -> T for DNA, T -> U for RNA).
    pub fn convert(&self, seq: &str) -> String {
        match self {
            Molecule::Dna => seq.replace('U', "T").replace('u', "t"),
            Molecule::Rna => seq.replace('T', "U").replace('t', "u"),
        }
    }
}

impl Display for Molecule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Molecule::Dna => write!(f, "DNA"),
            Molecule::Rna => write!(f, "RNA"),
        }
    }
}

impl FromStr for Molecule {
    type Err = UnknownMoleculeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dna" => Ok(Molecule::Dna),
            "rna" => Ok(Molecule::Rna),
            _ => Err(UnknownMoleculeError {
                name: s.to_string(),
            }),
        }
    }
}
