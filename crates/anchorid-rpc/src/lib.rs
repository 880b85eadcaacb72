//! anchorid-rpc
//!
//! JSON-RPC 2.0 server exposing the DID Layer-2 anchoring node's two
//! operations (spec.md §4.9).
//!
//! Namespace: "anchorid"
//! Methods:
//!   anchorid_submitOperation — queue a Base64URL-encoded operation
//!   anchorid_resolve         — resolve a short- or long-form DID

pub mod api;
pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use api::AnchoridApiServer;
pub use error::HandlerError;
pub use handler::{RequestHandler, ResolveOutcome};
pub use server::{RpcServer, RpcServerState};
pub use types::{RpcOperationAccepted, RpcResolutionResponse, RpcSubmitOperationRequest};
