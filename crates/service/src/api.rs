//! Request and response types at the service boundary
//!
//! [`Handler`] is the translation layer a transport calls: it turns service
//! results into in-band responses or a [`Status`] carrying an [`ErrorCode`].

use crate::service::ExecutionService;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use sqlbox_core::{Error, ErrorCode, Row};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunQueryRequest {
    /// Init script, run verbatim before the query
    pub schema: String,
    pub query: String,
}

/// A handle to the cached result, or an in-band error describing the SQL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunQueryResponse {
    Id(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveQueryRequest {
    pub id: String,
}

/// One message of a retrieval stream: the header first, then each row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrieveEvent {
    Header(Vec<String>),
    Row(Row),
}

/// Retrieval stream with the output hash attached as metadata
pub struct RetrieveQueryResponse {
    pub output_hash: String,
    pub events: BoxStream<'static, RetrieveEvent>,
}

impl std::fmt::Debug for RetrieveQueryResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrieveQueryResponse")
            .field("output_hash", &self.output_hash)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreQueriesOutputSameRequest {
    pub left_id: String,
    pub right_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreQueriesOutputSameResponse {
    pub same: bool,
}

/// Out-of-band failure reported to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Status {
    pub code: ErrorCode,
    pub message: String,
}

impl From<Error> for Status {
    fn from(error: Error) -> Self {
        let code = error.code();
        // internal details stay in the logs
        let message = if code == ErrorCode::Internal {
            "internal error".to_string()
        } else {
            error.to_string()
        };
        Status { code, message }
    }
}

#[derive(Debug, Clone)]
pub struct Handler {
    service: Arc<ExecutionService>,
}

impl Handler {
    pub fn new(service: Arc<ExecutionService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<ExecutionService> {
        &self.service
    }

    pub async fn run_query(
        &self,
        request: RunQueryRequest,
        cancel: CancellationToken,
    ) -> Result<RunQueryResponse, Status> {
        match self
            .service
            .run_query(&request.schema, &request.query, cancel)
            .await
        {
            Ok(id) => Ok(RunQueryResponse::Id(id)),
            Err(e) if e.is_user_facing() => Ok(RunQueryResponse::Error(e.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn retrieve_query(
        &self,
        request: RetrieveQueryRequest,
    ) -> Result<RetrieveQueryResponse, Status> {
        let retrieved = self.service.retrieve_query(&request.id).await?;

        let header = stream::once(async move { RetrieveEvent::Header(retrieved.header) });
        let rows = retrieved.rows.map(RetrieveEvent::Row);
        Ok(RetrieveQueryResponse {
            output_hash: retrieved.output_hash,
            events: header.chain(rows).boxed(),
        })
    }

    pub async fn are_queries_output_same(
        &self,
        request: AreQueriesOutputSameRequest,
    ) -> Result<AreQueriesOutputSameResponse, Status> {
        let same = self
            .service
            .compare(&request.left_id, &request.right_id)
            .await?;
        Ok(AreQueriesOutputSameResponse { same })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_hides_internal_details() {
        let status = Status::from(Error::store("redis", "GETEX", "connection refused"));
        assert_eq!(status.code, ErrorCode::Internal);
        assert_eq!(status.message, "internal error");

        let status = Status::from(Error::not_found("left_id"));
        assert_eq!(status.code, ErrorCode::NotFound);
        assert_eq!(status.message, "left_id expired – re-query again!");
    }

    #[test]
    fn test_status_for_timeout() {
        let status = Status::from(Error::timeout("query", Duration::from_secs(1)));
        assert_eq!(status.code, ErrorCode::Aborted);
    }

    #[test]
    fn test_wire_shapes() {
        assert_eq!(
            serde_json::to_value(RunQueryResponse::Id("abc".into())).unwrap(),
            serde_json::json!({ "id": "abc" })
        );
        assert_eq!(
            serde_json::to_value(RetrieveEvent::Row(vec![None, Some("x".into())])).unwrap(),
            serde_json::json!({ "row": [null, "x"] })
        );
        assert_eq!(
            serde_json::to_value(Status::from(Error::invalid_argument("id"))).unwrap(),
            serde_json::json!({ "code": "invalid_argument", "message": "id is required" })
        );
    }
}
