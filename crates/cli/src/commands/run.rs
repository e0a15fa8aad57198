use super::retrieve;
use eyre::eyre;
use sqlbox_service::{Handler, RunQueryRequest, RunQueryResponse};
use std::io::Write;
use tokio_util::sync::CancellationToken;

pub async fn execute<W: Write>(
    handler: &Handler,
    schema: String,
    query: String,
    json: bool,
    cancel: CancellationToken,
    out: &mut W,
) -> eyre::Result<()> {
    let id = run_to_id(handler, schema, query, cancel).await?;

    if json {
        writeln!(out, "{}", serde_json::to_string(&RunQueryResponse::Id(id.clone()))?)?;
    } else {
        writeln!(out, "INPUT_HASH: {id}")?;
    }

    retrieve::execute(handler, id, json, out).await
}

/// Run a query and return its handle; an in-band SQL error becomes an error
pub async fn run_to_id(
    handler: &Handler,
    schema: String,
    query: String,
    cancel: CancellationToken,
) -> eyre::Result<String> {
    match handler
        .run_query(RunQueryRequest { schema, query }, cancel)
        .await?
    {
        RunQueryResponse::Id(id) => Ok(id),
        RunQueryResponse::Error(message) => Err(eyre!(message)),
    }
}
