use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObject;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api::AnchoridApiServer;
use crate::error::HandlerError;
use crate::handler::{RequestHandler, ResolveOutcome};
use crate::types::{RpcOperationAccepted, RpcResolutionResponse};

fn rpc_err(code: i32, msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(code, msg.into(), None::<()>)
}

impl From<HandlerError> for ErrorObject<'static> {
    fn from(e: HandlerError) -> Self {
        match e {
            HandlerError::BadRequest(msg) => rpc_err(-32602, msg),
            HandlerError::NotFound => rpc_err(404, "resource not found"),
            HandlerError::ServerError(msg) => rpc_err(-32603, msg),
        }
    }
}

/// Shared state passed to the RPC server.
pub struct RpcServerState {
    pub handler: Arc<RequestHandler>,
}

/// The RPC server implementation.
pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Start the JSON-RPC server on `addr` with permissive CORS headers. Returns a handle to stop it.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);

        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;

        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "anchorid rpc server listening");
        Ok(handle)
    }
}

#[async_trait]
impl AnchoridApiServer for RpcServer {
    async fn submit_operation(&self, operation_b64: String) -> RpcResult<RpcOperationAccepted> {
        let bytes = anchorid_crypto::base64url_decode(&operation_b64)
            .map_err(|e| rpc_err(-32602, format!("invalid base64url: {e}")))?;
        self.state
            .handler
            .handle_operation_request(&bytes)
            .await
            .map_err(ErrorObject::from)?;
        Ok(RpcOperationAccepted::accepted())
    }

    async fn resolve(&self, did_or_long_form: String) -> RpcResult<RpcResolutionResponse> {
        match self.state.handler.handle_resolve_request(&did_or_long_form) {
            Ok(ResolveOutcome::Succeeded(result)) => Ok(RpcResolutionResponse::succeeded(result)),
            Ok(ResolveOutcome::Deactivated(result)) => {
                Ok(RpcResolutionResponse::deactivated(result))
            }
            Err(e) => Err(ErrorObject::from(e).into()),
        }
    }
}
