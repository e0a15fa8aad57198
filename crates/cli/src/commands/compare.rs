use super::run::run_to_id;
use sqlbox_service::{AreQueriesOutputSameRequest, Handler};
use std::io::Write;
use tokio_util::sync::CancellationToken;

pub async fn execute<W: Write>(
    handler: &Handler,
    left_id: String,
    right_id: String,
    out: &mut W,
) -> eyre::Result<()> {
    let response = handler
        .are_queries_output_same(AreQueriesOutputSameRequest { left_id, right_id })
        .await?;
    writeln!(out, "OUTPUT_SAME? {}", response.same)?;
    Ok(())
}

pub async fn diff<W: Write>(
    handler: &Handler,
    schema: String,
    query: String,
    query2: String,
    cancel: CancellationToken,
    out: &mut W,
) -> eyre::Result<()> {
    let left_id = run_to_id(handler, schema.clone(), query, cancel.clone()).await?;
    let right_id = run_to_id(handler, schema, query2, cancel).await?;

    writeln!(out, "INPUT_1_HASH: {left_id}")?;
    writeln!(out, "INPUT_2_HASH: {right_id}")?;

    execute(handler, left_id, right_id, out).await
}
