use seq_io::fasta::{Reader, Record};
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;

use crate::alphabet::{Alphabet, Molecule};
use anyhow::{Context, Result};
use thiserror::Error;

const UTF8_SPACE: u8 = b' ';

#[derive(Error, Debug)]
#[error("sequence {name} holds a symbol outside of \"{alphabet}\": {symbol}")]
pub struct UnknownSequenceSymbolError {
    name: String,
    symbol: char,
    alphabet: String,
}

/// A named biological sequence.
#[derive(Clone, PartialEq, Eq)]
pub struct Sequence {
    /// The name of the sequence
    pub name: String,
    /// The sequence details. If the sequence comes from a fasta, this
    /// is the information following the sequence name in the header
    pub details: Option<String>,
    /// The length of the sequence
    pub length: usize,
    /// The residues, upper case
    pub residues: String,
}

impl Sequence {
    pub fn new(name: &str, residues: &str) -> Self {
        let residues = residues.to_ascii_uppercase();
        Sequence {
            name: name.to_string(),
            details: None,
            length: residues.chars().count(),
            residues,
        }
    }

    pub fn from_fasta<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        let mut seqs: Vec<Self> = vec![];

        let mut reader = Reader::from_path(&path).with_context(|| {
            format!(
                "failed to open fasta file: {}",
                path.as_ref().to_string_lossy()
            )
        })?;

        while let Some(record) = reader.next() {
            let record = record.with_context(|| "failed to read fasta record")?;
            let mut header_bytes = record.head().to_vec();
            let first_space_idx = header_bytes.iter().position(|&b| b == UTF8_SPACE);

            let error_context: fn() -> &'static str =
                || "failed to create String from fasta header bytes";

            let (name, details) = match first_space_idx {
                Some(idx) => {
                    let details_bytes = header_bytes.split_off(idx + 1);
                    header_bytes.pop();
                    (
                        String::from_utf8(header_bytes).with_context(error_context)?,
                        Some(String::from_utf8(details_bytes).with_context(error_context)?),
                    )
                }
                None => (
                    String::from_utf8(header_bytes).with_context(error_context)?,
                    None,
                ),
            };

            let seq_bytes: Vec<u8> = record.seq_lines().flatten().copied().collect();
            let residues =
                String::from_utf8(seq_bytes).with_context(|| "failed to read fasta sequence")?;

            let mut seq = Sequence::new(&name, &residues);
            seq.details = details;
            seqs.push(seq);
        }
        Ok(seqs)
    }

    /// The same sequence, spelled for `molecule` (T and U swapped as needed).
    pub fn to_molecule(&self, molecule: Molecule) -> Self {
        Sequence {
            residues: molecule.convert(&self.residues),
            ..self.clone()
        }
    }

    /// Fail on the first residue that `alphabet` does not hold.
    pub fn validate(&self, alphabet: &Alphabet) -> Result<()> {
        match self.residues.chars().find(|&c| !alphabet.contains(c)) {
            Some(symbol) => Err(UnknownSequenceSymbolError {
                name: self.name.clone(),
                symbol,
                alphabet: alphabet.to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

impl Display for Sequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, ">{}", self.name)?;

        if let Some(ref details) = self.details {
            write!(f, " {details}")?
        };

        writeln!(f)?;

        let chars: Vec<char> = self.residues.chars().collect();
        let mut iter = chars.chunks(80).peekable();

        while let Some(chunk) = iter.next() {
            write!(f, "{}", chunk.iter().collect::<String>())?;
            if iter.peek().is_some() {
                // if we're not on the last
                // line, add a linebreak
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

impl Debug for Sequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.residues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;

    const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/tiny.fa");

    #[test]
    fn test_from_fasta() -> Result<()> {
        let seqs = Sequence::from_fasta(FIXTURE)?;
        assert!(seqs.len() == 2);

        assert!(seqs[0].name == "met-trp");
        assert!(seqs[0].details.as_deref() == Some("exact codons"));
        assert!(seqs[0].residues == "AUGUGG");
        assert!(seqs[0].length == 6);

        assert!(seqs[1].name == "frameshift");
        assert!(seqs[1].details.is_none());
        assert!(seqs[1].residues == "ATGTGGAAA");
        Ok(())
    }

    #[test]
    fn test_to_molecule() -> Result<()> {
        let seq = Sequence::new("s", "atgtgg");
        assert!(seq.residues == "ATGTGG");

        let rna = seq.to_molecule(Molecule::Rna);
        assert!(rna.residues == "AUGUGG");
        rna.validate(&Molecule::Rna.alphabet())?;

        let err = seq.validate(&Molecule::Rna.alphabet()).unwrap_err();
        assert!(err.downcast_ref::<UnknownSequenceSymbolError>().is_some());

        assert!(rna.to_string() == ">s\nAUGUGG");
        Ok(())
    }
}
