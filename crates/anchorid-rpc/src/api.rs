//! JSON-RPC surface for the anchoring node (spec.md §4.9). Mirrors
//! `handleOperationRequest`/`handleResolveRequest` one-to-one; all of the
//! decision logic lives in `handler::RequestHandler`, not here.

use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::{RpcOperationAccepted, RpcResolutionResponse};

#[rpc(server, namespace = "anchorid")]
pub trait AnchoridApi {
    /// Submit a Base64URL-encoded operation for inclusion in the next batch.
    #[method(name = "submitOperation")]
    async fn submit_operation(&self, operation_b64: String) -> RpcResult<RpcOperationAccepted>;

    /// Resolve a short- or long-form DID to its current document.
    #[method(name = "resolve")]
    async fn resolve(&self, did_or_long_form: String) -> RpcResult<RpcResolutionResponse>;
}
