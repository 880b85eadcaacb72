//! `RequestHandler` (spec.md §4.9): the version-aware dispatch point between
//! an external caller and the rest of the pipeline. None of the pipeline's
//! decision logic lives here — this only selects the active protocol
//! version, parses/verifies, and delegates.

use std::sync::Arc;

use anchorid_clock::LedgerClock;
use anchorid_core::document::ResolutionResult;
use anchorid_protocol::ProtocolVersionManager;
use anchorid_resolver::{Resolution, Resolver};
use anchorid_state::StateDb;
use tracing::debug;

use crate::error::HandlerError;

/// The two "found" outcomes of `handleResolveRequest`, carrying their own
/// HTTP-equivalent status per spec.md §6.5. `NotFound`/parse failures surface
/// as `HandlerError` instead, since those map to the `Err` side of the RPC
/// call.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    Succeeded(ResolutionResult),
    Deactivated(ResolutionResult),
}

pub struct RequestHandler {
    db: StateDb,
    clock: Arc<LedgerClock>,
    protocol: Arc<ProtocolVersionManager>,
    batch_writer: Arc<anchorid_batchwriter::BatchWriter>,
}

impl RequestHandler {
    pub fn new(
        db: StateDb,
        clock: Arc<LedgerClock>,
        protocol: Arc<ProtocolVersionManager>,
        batch_writer: Arc<anchorid_batchwriter::BatchWriter>,
    ) -> Self {
        Self {
            db,
            clock,
            protocol,
            batch_writer,
        }
    }

    /// Parse, validate, and queue a single operation request (spec.md §4.9).
    pub async fn handle_operation_request(&self, bytes: &[u8]) -> Result<(), HandlerError> {
        let version = self.protocol.version_at(self.clock.get_time())?;
        let params = &version.parameters;

        if bytes.len() > params.max_operation_size {
            return Err(HandlerError::BadRequest(format!(
                "operation is {} bytes, exceeding the {}-byte ceiling",
                bytes.len(),
                params.max_operation_size
            )));
        }

        let operation = anchorid_parser::parse_operation(bytes, params)?;
        anchorid_parser::verify_submission_signature(&operation)?;

        self.batch_writer.submit(operation).await?;
        debug!("operation accepted into the batch writer's queue");
        Ok(())
    }

    /// Resolve a short- or long-form DID (spec.md §4.9/§4.8).
    pub fn handle_resolve_request(&self, did_or_long_form: &str) -> Result<ResolveOutcome, HandlerError> {
        let operations = self.db.operation_store()?;
        let resolver = Resolver::new(operations);
        match resolver.resolve(did_or_long_form)? {
            Resolution::Document(result) => Ok(ResolveOutcome::Succeeded(result)),
            Resolution::Deactivated(result) => Ok(ResolveOutcome::Deactivated(result)),
            Resolution::NotFound => Err(HandlerError::NotFound),
        }
    }
}
