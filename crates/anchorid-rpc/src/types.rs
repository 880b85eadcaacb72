//! Wire types the "anchorid" JSON-RPC namespace exposes. Kept separate from
//! `anchorid-core`'s internal types so the wire shape can evolve without
//! touching the pipeline's own data model.

use serde::{Deserialize, Serialize};

use anchorid_core::document::ResolutionResult;

/// `handleOperationRequest`'s success response (spec.md §4.9).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcOperationAccepted {
    pub status: String,
}

impl RpcOperationAccepted {
    pub fn accepted() -> Self {
        Self {
            status: "Accepted".to_string(),
        }
    }
}

/// `handleResolveRequest`'s success response. `status` distinguishes the two
/// "found" outcomes spec.md §6.5 maps to distinct HTTP codes (`Succeeded` /
/// `Deactivated`) — JSON-RPC has no status-code channel of its own, so both
/// ride back as `Ok` results with this field set instead of one being an
/// error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResolutionResponse {
    pub status: String,
    #[serde(flatten)]
    pub result: ResolutionResult,
}

impl RpcResolutionResponse {
    pub fn succeeded(result: ResolutionResult) -> Self {
        Self {
            status: "Succeeded".to_string(),
            result,
        }
    }

    pub fn deactivated(result: ResolutionResult) -> Self {
        Self {
            status: "Deactivated".to_string(),
            result,
        }
    }
}

/// `submitOperation`'s request payload: the operation bytes, Base64URL
/// (no padding) encoded for safe JSON transport.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcSubmitOperationRequest {
    pub operation_b64: String,
}
