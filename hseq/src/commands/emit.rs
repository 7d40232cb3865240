use log::info;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::Serialize;

use libhseq::structs::trace::emitted_sequence;
use libhseq::structs::{Emission, Hmm};

use crate::args::EmitArgs;
use crate::util::{build_model, read_profile};

#[derive(Serialize, Debug)]
pub struct EmitOutput {
    pub sequence: String,
    pub path: Vec<Emission>,
}

pub fn sample(hmm: &Hmm, seed: u64) -> anyhow::Result<EmitOutput> {
    let mut rng = Pcg64::seed_from_u64(seed);
    let path = hmm.emit(&mut rng)?;
    Ok(EmitOutput {
        sequence: emitted_sequence(&path),
        path,
    })
}

pub fn emit(args: &EmitArgs) -> anyhow::Result<()> {
    let profile = read_profile(&args.profile_path)?;
    let hmm = build_model(&profile, args.frame, &args.model_args)?;

    let output = sample(&hmm, args.seed)?;
    info!(
        "sampled {} symbols over {} states",
        output.sequence.len(),
        output.path.len()
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", output.sequence);
        output
            .path
            .iter()
            .for_each(|step| println!("{}\t{}", step.state, step.symbols));
    }
    Ok(())
}
