//! Command-line construction.
//!
//! - [`params`] tokenizes the free-form extra parameters into [`ParameterToken`]s.
//! - [`ArgumentBuilder`] assembles the full [`CommandLine`] and resolves the data directory.

mod command;
mod params;

pub use command::{ArgumentBuilder, CommandLine, DEFAULT_LOG_FILE, resolve_data_dir};
pub use params::{ParameterToken, tokenize};
