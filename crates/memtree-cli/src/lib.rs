pub mod commands;
pub mod error;
pub mod output;

pub use commands::{ConfigCommand, MemoryCommand, ReorganizeCommand, StatsCommand};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, format_size, format_timestamp, truncate_string};
