//! External capabilities consumed by the core
//!
//! The engine never talks to the outside world directly; it is handed these
//! trait objects. The upstream recording service, the embedding encoder and
//! the external reasoning model all live behind them, which keeps query time
//! free of network access in every production configuration that matters
//! here and makes the whole engine testable with scripted fakes.

mod encoder;
mod reasoner;
mod source;

pub use encoder::{Encoder, MockEncoder};
pub use reasoner::{Reasoner, ReasonerVerdict};
pub use source::{RawRecording, RecordingSource};
