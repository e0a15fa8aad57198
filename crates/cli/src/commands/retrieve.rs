use futures::StreamExt;
use sqlbox_service::{Handler, RetrieveEvent, RetrieveQueryRequest};
use std::io::Write;

pub async fn execute<W: Write>(
    handler: &Handler,
    id: String,
    json: bool,
    out: &mut W,
) -> eyre::Result<()> {
    let response = handler
        .retrieve_query(RetrieveQueryRequest { id })
        .await?;

    if json {
        let metadata = serde_json::json!({ "output_hash": response.output_hash });
        writeln!(out, "{metadata}")?;
    } else {
        writeln!(out, "OUTPUT_HASH: {}", response.output_hash)?;
    }

    let mut events = response.events;
    while let Some(event) = events.next().await {
        if json {
            writeln!(out, "{}", serde_json::to_string(&event)?)?;
        } else {
            writeln!(out, "{}", render_event(&event))?;
        }
    }

    Ok(())
}

/// Tab-separated line for a header or row; NULL cells print as `NULL`
pub fn render_event(event: &RetrieveEvent) -> String {
    match event {
        RetrieveEvent::Header(columns) => columns.join("\t"),
        RetrieveEvent::Row(cells) => cells
            .iter()
            .map(|cell| cell.as_deref().unwrap_or("NULL"))
            .collect::<Vec<_>>()
            .join("\t"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_event() {
        assert_eq!(
            render_event(&RetrieveEvent::Header(vec!["id".into(), "name".into()])),
            "id\tname"
        );
        assert_eq!(
            render_event(&RetrieveEvent::Row(vec![Some("1".into()), None])),
            "1\tNULL"
        );
    }
}
