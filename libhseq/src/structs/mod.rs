pub mod frame;
pub use frame::FrameEmission;

pub mod hmm;
pub use hmm::Hmm;

pub mod p7hmm;
pub use p7hmm::P7Hmm;

pub mod sequence;
pub use sequence::Sequence;

pub mod state;
pub use state::State;

pub mod trace;
pub use trace::{Emission, Trace, TraceStep, Viterbi};
