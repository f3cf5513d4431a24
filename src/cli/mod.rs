pub mod args;
pub mod commands;

pub use args::{AggregateArgs, Cli, Commands, LoadArgs, SchemaArgs};
pub use commands::run;
