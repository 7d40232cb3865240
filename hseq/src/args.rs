use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use libhseq::alphabet::Molecule;

#[derive(Subcommand)]
pub enum SubCommands {
    #[command(about = "Show the codon or fragment table of an amino acid emission")]
    Frame(FrameArgs),
    #[command(about = "Sample a path from the model of a profile")]
    Emit(EmitArgs),
    #[command(about = "Decode nucleotide sequences against the frame model of a profile")]
    Viterbi(ViterbiArgs),
    #[command(about = "Write the model of a profile as Graphviz DOT text")]
    Dot(DotArgs),
}

#[derive(Parser)]
#[command(name = "hseq")]
#[command(about = "Frame-shift tolerant nucleotide models built from protein profile HMMs")]
pub struct Cli {
    /// Increase logging output (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: SubCommands,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum Base {
    Dna,
    #[default]
    Rna,
}

impl From<Base> for Molecule {
    fn from(base: Base) -> Self {
        match base {
            Base::Dna => Molecule::Dna,
            Base::Rna => Molecule::Rna,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum Show {
    #[default]
    Codon,
    Frame,
}

#[derive(Args, Debug, Clone)]
pub struct FrameModelArgs {
    /// The probability of each base insertion or deletion event
    #[arg(short = 'e', long = "epsilon", default_value_t = 0.01f64, value_name = "F")]
    pub epsilon: f64,

    /// Spell codons in DNA or RNA
    #[arg(long = "base", value_enum, default_value_t = Base::Rna)]
    pub base: Base,
}

#[derive(Args, Debug, Clone)]
pub struct FrameArgs {
    /// A file of "<amino acid> <log probability>" lines
    #[arg(value_name = "EMISSION.txt")]
    pub emission_path: PathBuf,

    /// The number of table rows to show
    #[arg(short = 'n', default_value_t = 10usize, value_name = "N")]
    pub num_rows: usize,

    /// Show the codon table or the fragment table
    #[arg(long = "show", value_enum, default_value_t = Show::Codon)]
    pub show: Show,

    /// Print JSON instead of a table
    #[arg(long, action)]
    pub json: bool,

    #[command(flatten)]
    pub model_args: FrameModelArgs,
}

#[derive(Args, Debug, Clone)]
pub struct EmitArgs {
    /// Profile file
    #[arg(value_name = "PROFILE.hmm")]
    pub profile_path: PathBuf,

    /// The random seed
    #[arg(short = 's', long = "seed", default_value_t = 0u64, value_name = "N")]
    pub seed: u64,

    /// Sample from the nucleotide frame model instead of the protein model
    #[arg(long, action)]
    pub frame: bool,

    /// Print JSON instead of a table
    #[arg(long, action)]
    pub json: bool,

    #[command(flatten)]
    pub model_args: FrameModelArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ViterbiArgs {
    /// Profile file
    #[arg(value_name = "PROFILE.hmm")]
    pub profile_path: PathBuf,

    /// Nucleotide sequences
    #[arg(value_name = "SEQS.fasta")]
    pub target_path: PathBuf,

    /// Print JSON instead of a table
    #[arg(long, action)]
    pub json: bool,

    #[command(flatten)]
    pub model_args: FrameModelArgs,
}

#[derive(Args, Debug, Clone)]
pub struct DotArgs {
    /// Profile file
    #[arg(value_name = "PROFILE.hmm")]
    pub profile_path: PathBuf,

    /// The number of emissions to list in each state
    #[arg(short = 'n', default_value_t = 0usize, value_name = "N")]
    pub emissions: usize,

    /// Draw the nucleotide frame model instead of the protein model
    #[arg(long, action)]
    pub frame: bool,

    #[command(flatten)]
    pub model_args: FrameModelArgs,
}
