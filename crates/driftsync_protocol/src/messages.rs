//! Request and response bodies for the remote batch endpoint.

use crate::operation::{OperationType, SyncOperation};
use crate::patch::NotePatch;
use serde::{Deserialize, Serialize};

/// One operation as sent to the batch endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireOperation {
    /// Client-side operation id, echoed back in results.
    pub id: u64,
    /// Operation type.
    #[serde(rename = "type")]
    pub op_type: OperationType,
    /// Target note id (possibly temporary).
    pub note_id: String,
    /// The temporary id for offline-created notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    /// Partial payload.
    pub data: NotePatch,
    /// Enqueue time (epoch ms).
    pub timestamp: i64,
}

impl From<&SyncOperation> for WireOperation {
    fn from(op: &SyncOperation) -> Self {
        Self {
            id: op.id,
            op_type: op.op_type,
            note_id: op.note_id.clone(),
            temp_id: op.temp_id.clone(),
            data: op.data.clone(),
            timestamp: op.timestamp,
        }
    }
}

/// Body of `POST /entities/batch-sync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncRequest {
    /// Operations in delivery order.
    pub operations: Vec<WireOperation>,
}

impl BatchSyncRequest {
    /// Builds a request from queued operations.
    pub fn from_ops(ops: &[SyncOperation]) -> Self {
        Self {
            operations: ops.iter().map(WireOperation::from).collect(),
        }
    }
}

/// Per-operation outcome inside a batch response.
///
/// Results correspond positionally to the request's operations; `op_id`
/// echoes the client id as a cross-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOpResult {
    /// Client-side operation id this result belongs to.
    pub op_id: u64,
    /// Whether the operation was applied.
    pub success: bool,
    /// For successful creates, the server-issued note id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,
    /// Error description for failed operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate counts for a batch response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Operations received.
    pub total: usize,
    /// Operations applied.
    pub succeeded: usize,
    /// Operations rejected.
    pub failed: usize,
}

/// Body of a batch-sync response.
///
/// On a partial timeout the server returns only the results it completed
/// before the deadline; the transport marks that case distinctly so the
/// engine can fall back to individual delivery for the remainder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncResponse {
    /// Per-operation outcomes, in request order.
    pub results: Vec<BatchOpResult>,
    /// Aggregate counts.
    #[serde(default)]
    pub summary: BatchSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_preserves_operation_order() {
        let ops = vec![
            SyncOperation::create("temp-1", Some("temp-1".into()), NotePatch::default()),
            SyncOperation::delete("srv-2"),
        ];
        let req = BatchSyncRequest::from_ops(&ops);

        assert_eq!(req.operations.len(), 2);
        assert_eq!(req.operations[0].note_id, "temp-1");
        assert_eq!(req.operations[1].op_type, OperationType::Delete);
    }

    #[test]
    fn response_roundtrip() {
        let resp = BatchSyncResponse {
            results: vec![
                BatchOpResult {
                    op_id: 1,
                    success: true,
                    note_id: Some("srv-1".into()),
                    error: None,
                },
                BatchOpResult {
                    op_id: 2,
                    success: false,
                    note_id: None,
                    error: Some("validation failed".into()),
                },
            ],
            summary: BatchSummary {
                total: 2,
                succeeded: 1,
                failed: 1,
            },
        };

        let json = serde_json::to_string(&resp).unwrap();
        let back: BatchSyncResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);
        assert!(json.contains("\"opId\""));
    }

    #[test]
    fn wire_type_field_is_lowercase() {
        let op = SyncOperation::delete("srv-1");
        let wire = WireOperation::from(&op);
        let json = serde_json::to_string(&wire).unwrap();
        assert!(json.contains("\"type\":\"delete\""));
    }
}
