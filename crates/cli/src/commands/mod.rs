use crate::sql_arg;
use clap::Subcommand;
use sqlbox_service::Handler;
use std::io::Write;
use tokio_util::sync::CancellationToken;

pub mod compare;
pub mod retrieve;
pub mod run;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a query against a schema and print its result
    Run {
        /// Schema SQL, or @path to read it from a file
        #[arg(long, value_parser = sql_arg::parse)]
        schema: String,

        /// Query SQL, or @path to read it from a file
        #[arg(long, value_parser = sql_arg::parse)]
        query: String,

        /// Print JSON lines instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the cached result behind a handle
    Retrieve {
        /// Handle returned by `run`
        id: String,

        /// Print JSON lines instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Check whether two handles produced the same result
    Compare { left_id: String, right_id: String },

    /// Run two queries against one schema and check whether their results match
    Diff {
        /// Schema SQL, or @path to read it from a file
        #[arg(long, value_parser = sql_arg::parse)]
        schema: String,

        /// First query SQL, or @path
        #[arg(long, value_parser = sql_arg::parse)]
        query: String,

        /// Second query SQL, or @path
        #[arg(long, value_parser = sql_arg::parse)]
        query2: String,
    },
}

impl Commands {
    /// Whether the command only reads handles created by an earlier process
    pub fn reads_existing_handles(&self) -> bool {
        matches!(self, Commands::Retrieve { .. } | Commands::Compare { .. })
    }

    pub async fn execute<W: Write>(
        self,
        handler: &Handler,
        cancel: CancellationToken,
        out: &mut W,
    ) -> eyre::Result<()> {
        match self {
            Commands::Run {
                schema,
                query,
                json,
            } => run::execute(handler, schema, query, json, cancel, out).await,
            Commands::Retrieve { id, json } => retrieve::execute(handler, id, json, out).await,
            Commands::Compare { left_id, right_id } => {
                compare::execute(handler, left_id, right_id, out).await
            }
            Commands::Diff {
                schema,
                query,
                query2,
            } => compare::diff(handler, schema, query, query2, cancel, out).await,
        }
    }
}
