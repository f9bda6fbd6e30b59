pub mod config;
pub mod memory;
pub mod reorganize;
pub mod stats;

pub use config::ConfigCommand;
pub use memory::MemoryCommand;
pub use reorganize::ReorganizeCommand;
pub use stats::StatsCommand;
