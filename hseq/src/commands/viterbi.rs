use log::{debug, info};
use serde::Serialize;

use libhseq::alphabet::Molecule;
use libhseq::structs::{Hmm, Sequence, Trace};

use crate::args::ViterbiArgs;
use crate::util::{build_model, read_profile};

#[derive(Serialize, Debug)]
pub struct DecodedSequence {
    pub name: String,
    pub log_probability: f64,
    pub trace: Trace,
}

/// Decode one sequence, after rewriting it in the spelling of the model.
pub fn decode(hmm: &Hmm, seq: &Sequence, molecule: Molecule) -> anyhow::Result<DecodedSequence> {
    let seq = seq.to_molecule(molecule);
    seq.validate(hmm.alphabet())?;

    let viterbi = hmm.viterbi(&seq.residues)?;
    debug!("{}: {}", seq.name, viterbi.trace);

    Ok(DecodedSequence {
        name: seq.name,
        log_probability: viterbi.log_probability,
        trace: viterbi.trace,
    })
}

pub fn viterbi(args: &ViterbiArgs) -> anyhow::Result<()> {
    let profile = read_profile(&args.profile_path)?;
    let hmm = build_model(&profile, true, &args.model_args)?;

    let seqs = Sequence::from_fasta(&args.target_path)?;
    info!("decoding {} sequences", seqs.len());

    let decoded = seqs
        .iter()
        .map(|seq| decode(&hmm, seq, args.model_args.base.into()))
        .collect::<anyhow::Result<Vec<_>>>()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&decoded)?);
    } else {
        decoded.iter().for_each(|d| {
            println!("{}\t{}\t{}", d.name, d.log_probability, d.trace);
        });
    }
    Ok(())
}
