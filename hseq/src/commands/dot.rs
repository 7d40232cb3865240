use libhseq::dot::DotOptions;

use crate::args::DotArgs;
use crate::util::{build_model, read_profile};

pub fn dot(args: &DotArgs) -> anyhow::Result<()> {
    let profile = read_profile(&args.profile_path)?;
    let hmm = build_model(&profile, args.frame, &args.model_args)?;

    let options = DotOptions {
        emissions: args.emissions,
        ..DotOptions::default()
    };
    print!("{}", hmm.to_dot(&options)?);
    Ok(())
}
