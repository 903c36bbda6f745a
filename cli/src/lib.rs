//! Command-line front end for the movie search engine.

pub mod app;
pub mod args;
pub mod commands;

pub use args::{help_text, parse_args, Cli, Commands, Invocation};
pub use commands::run;
