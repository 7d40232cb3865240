use anyhow::Result;
use indexmap::IndexMap;
use phf::phf_ordered_map;
use thiserror::Error;

use crate::alphabet::Molecule;

/// The standard genetic code, RNA spelling. '*' marks the stop codons.
pub const STANDARD_CODE: phf::OrderedMap<&'static str, char> = phf_ordered_map! {
    "UUU" => 'F', "UUC" => 'F',
    "UUA" => 'L', "UUG" => 'L', "CUU" => 'L', "CUC" => 'L', "CUA" => 'L', "CUG" => 'L',
    "AUU" => 'I', "AUC" => 'I', "AUA" => 'I',
    "AUG" => 'M',
    "GUU" => 'V', "GUC" => 'V', "GUA" => 'V', "GUG" => 'V',
    "UCU" => 'S', "UCC" => 'S', "UCA" => 'S', "UCG" => 'S', "AGU" => 'S', "AGC" => 'S',
    "CCU" => 'P', "CCC" => 'P', "CCA" => 'P', "CCG" => 'P',
    "ACU" => 'T', "ACC" => 'T', "ACA" => 'T', "ACG" => 'T',
    "GCU" => 'A', "GCC" => 'A', "GCA" => 'A', "GCG" => 'A',
    "UAU" => 'Y', "UAC" => 'Y',
    "UAA" => '*', "UAG" => '*', "UGA" => '*',
    "CAU" => 'H', "CAC" => 'H',
    "CAA" => 'Q', "CAG" => 'Q',
    "AAU" => 'N', "AAC" => 'N',
    "AAA" => 'K', "AAG" => 'K',
    "GAU" => 'D', "GAC" => 'D',
    "GAA" => 'E', "GAG" => 'E',
    "UGU" => 'C', "UGC" => 'C',
    "UGG" => 'W',
    "CGU" => 'R', "CGC" => 'R', "CGA" => 'R', "CGG" => 'R', "AGA" => 'R', "AGG" => 'R',
    "GGU" => 'G', "GGC" => 'G', "GGA" => 'G', "GGG" => 'G',
};

/// An Error that is thrown when an amino acid has no codons in a genetic code.
#[derive(Error, Debug)]
#[error("amino acid {amino_acid} was not found in the {code} genetic code")]
pub struct UnknownAminoAcidError {
    pub amino_acid: char,
    pub code: String,
}

/// An Error that is thrown when a codon is not part of a genetic code.
#[derive(Error, Debug)]
#[error("codon {codon} was not found in the {code} genetic code")]
pub struct UnknownCodonError {
    pub codon: String,
    pub code: String,
}

/// A mapping from amino acids to the codons that encode them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneticCode {
    name: String,
    table: IndexMap<char, Vec<String>>,
}

impl Default for GeneticCode {
    fn default() -> Self {
        GeneticCode::standard()
    }
}

impl GeneticCode {
    pub fn new(name: &str, table: IndexMap<char, Vec<String>>) -> Self {
        GeneticCode {
            name: name.to_string(),
            table,
        }
    }

    pub fn standard() -> Self {
        let mut table: IndexMap<char, Vec<String>> = IndexMap::new();
        STANDARD_CODE.entries().for_each(|(codon, aa)| {
            table.entry(*aa).or_default().push(codon.to_string());
        });
        GeneticCode::new("standard", table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn amino_acids(&self) -> Vec<char> {
        self.table.keys().copied().collect()
    }

    /// The codons of `amino_acid`, in table order. The lookup ignores case.
    pub fn codons(&self, amino_acid: char) -> Result<&[String]> {
        self.table
            .get(&amino_acid.to_ascii_uppercase())
            .map(|codons| codons.as_slice())
            .ok_or_else(|| {
                UnknownAminoAcidError {
                    amino_acid,
                    code: self.name.clone(),
                }
                .into()
            })
    }

    /// The amino acid that `codon` encodes. The lookup ignores case and
    /// does not distinguish T from U.
    pub fn amino_acid(&self, codon: &str) -> Result<char> {
        let query = Molecule::Rna.convert(&codon.to_ascii_uppercase());
        self.table
            .iter()
            .find(|(_, codons)| {
                codons
                    .iter()
                    .any(|c| Molecule::Rna.convert(c) == query)
            })
            .map(|(aa, _)| *aa)
            .ok_or_else(|| {
                UnknownCodonError {
                    codon: codon.to_string(),
                    code: self.name.clone(),
                }
                .into()
            })
    }

    /// The same code, with every codon spelled for `molecule`.
    pub fn for_molecule(&self, molecule: Molecule) -> Self {
        let table = self
            .table
            .iter()
            .map(|(aa, codons)| (*aa, codons.iter().map(|c| molecule.convert(c)).collect()))
            .collect();
        GeneticCode::new(&self.name, table)
    }
}
