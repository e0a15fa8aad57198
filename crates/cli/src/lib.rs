pub mod cli;
pub mod commands;
pub mod logging;
pub mod sql_arg;

pub use cli::{Cli, GlobalArgs};
pub use commands::Commands;
