use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Context;
use indexmap::IndexMap;
use thiserror::Error;

use libhseq::convert::{frame_hmm, protein_hmm, FrameConfig};
use libhseq::genetic_code::GeneticCode;
use libhseq::structs::p7hmm::parse_p7hmm_file;
use libhseq::structs::{Hmm, P7Hmm};

use crate::args::FrameModelArgs;

#[derive(Error, Debug)]
#[error("no profile found in: {path}")]
pub struct EmptyProfileFileError {
    path: String,
}

#[derive(Error, Debug)]
#[error("malformed emission line {line_number} in {path}: \"{line}\"")]
pub struct EmissionLineError {
    path: String,
    line_number: usize,
    line: String,
}

/// Read "<amino acid> <log probability>" lines. Blank lines are skipped.
pub fn read_emission_table(path: &impl AsRef<Path>) -> anyhow::Result<IndexMap<char, f64>> {
    let file = File::open(path).context(format!(
        "failed to open emission file: {}",
        path.as_ref().to_string_lossy()
    ))?;

    let mut table: IndexMap<char, f64> = IndexMap::new();
    for (line_idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let tokens: Vec<&str> = line.split_whitespace().collect();

        let malformed = || EmissionLineError {
            path: path.as_ref().to_string_lossy().to_string(),
            line_number: line_idx + 1,
            line: line.clone(),
        };

        match tokens[..] {
            [] => continue,
            [aa, logp] => {
                let mut chars = aa.chars();
                let aa = match (chars.next(), chars.next()) {
                    (Some(c), None) => c,
                    _ => return Err(malformed().into()),
                };
                let logp: f64 = logp.parse().map_err(|_| malformed())?;
                table.insert(aa, logp);
            }
            _ => return Err(malformed().into()),
        }
    }
    Ok(table)
}

/// The first profile of a HMMER3 file.
pub fn read_profile(path: &impl AsRef<Path>) -> anyhow::Result<P7Hmm> {
    parse_p7hmm_file(path)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            EmptyProfileFileError {
                path: path.as_ref().to_string_lossy().to_string(),
            }
            .into()
        })
}

pub fn frame_config(args: &FrameModelArgs) -> FrameConfig {
    FrameConfig {
        epsilon: args.epsilon,
        molecule: args.base.into(),
        genetic_code: GeneticCode::standard(),
    }
}

/// The protein model of a profile, or the frame model built on top of it.
pub fn build_model(profile: &P7Hmm, frame: bool, args: &FrameModelArgs) -> anyhow::Result<Hmm> {
    let protein = protein_hmm(profile)?;
    if frame {
        frame_hmm(profile, &protein, &frame_config(args))
    } else {
        Ok(protein)
    }
}
