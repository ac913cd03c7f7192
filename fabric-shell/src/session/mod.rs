//! Command session layer.
//!
//! A [`CommandScript`] describes one intent as data; a [`CommandSession`]
//! executes any script over one connection and classifies how it ended.

mod command;
mod outcome;
mod script;

pub use command::{CommandSession, SessionConfig};
pub use outcome::{SessionOutcome, SessionState, classify};
pub use script::{
    CommandScript, DEFAULT_HOSTNAME, SHOW_SYS_INFO, ScriptBuilder, ScriptStep, validate_hostname,
};
