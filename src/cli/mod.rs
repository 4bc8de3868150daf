//! CLI module containing argument parsing and output rendering

pub mod args;
pub mod output;

pub use args::{Args, Command};
pub use output::ColourManager;
