//! DID suffix and short/long form parsing.
//!
//! A DID looks like `did:anchor:<suffix>` (short form) or, before the
//! DID's create operation has been anchored and observed,
//! `did:anchor:<suffix>:<base64url(suffix_data)>.<base64url(delta)>`
//! (long form). Both forms address the same DID; the long form embeds
//! enough of the create operation to compose a document without having
//! seen it on the ledger yet.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};

pub const METHOD_NAME: &str = "anchor";

/// The hash-derived unique portion of a DID, opaque outside of the
/// multihash machinery that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DidSuffix(pub String);

impl DidSuffix {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DidSuffix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A parsed DID reference: either the bare short form, or a long form that
/// carries the encoded `suffix_data`/`delta` of an as-yet-unanchored create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DidReference {
    Short {
        suffix: DidSuffix,
    },
    Long {
        suffix: DidSuffix,
        encoded_suffix_data: String,
        encoded_delta: String,
    },
}

impl DidReference {
    pub fn suffix(&self) -> &DidSuffix {
        match self {
            DidReference::Short { suffix } => suffix,
            DidReference::Long { suffix, .. } => suffix,
        }
    }

    pub fn to_short_form(&self) -> String {
        format!("did:{}:{}", METHOD_NAME, self.suffix())
    }
}

/// Parse a short- or long-form DID string.
///
/// Long form is `did:<method>:<suffix>:<B64U(suffix_data)>.<B64U(delta)>`.
/// The alternative `?-<method>-initial-state=` query-string form is also
/// accepted for compatibility with resolvers that strip the colon-joined
/// suffix.
pub fn parse(did: &str) -> Result<DidReference, CoreError> {
    let rest = did
        .strip_prefix("did:")
        .ok_or_else(|| CoreError::MalformedDid(did.to_string()))?;
    let (method, rest) = rest
        .split_once(':')
        .ok_or_else(|| CoreError::MalformedDid(did.to_string()))?;
    if method != METHOD_NAME {
        return Err(CoreError::MalformedDid(format!(
            "unsupported DID method: {method}"
        )));
    }

    // `rest` is either `<suffix>`, `<suffix>:<initial-state>`, or
    // `<suffix>?-<method>-initial-state=<initial-state>`.
    if let Some((suffix, query)) = rest.split_once('?') {
        let marker = format!("-{}-initial-state=", METHOD_NAME);
        let initial_state = query
            .strip_prefix(&marker)
            .ok_or_else(|| CoreError::MalformedDid(did.to_string()))?;
        return parse_initial_state(suffix, initial_state, did);
    }

    match rest.split_once(':') {
        None => Ok(DidReference::Short {
            suffix: DidSuffix(rest.to_string()),
        }),
        Some((suffix, initial_state)) => parse_initial_state(suffix, initial_state, did),
    }
}

fn parse_initial_state(
    suffix: &str,
    initial_state: &str,
    original: &str,
) -> Result<DidReference, CoreError> {
    let (encoded_suffix_data, encoded_delta) = initial_state
        .split_once('.')
        .ok_or_else(|| CoreError::MalformedDid(original.to_string()))?;
    Ok(DidReference::Long {
        suffix: DidSuffix(suffix.to_string()),
        encoded_suffix_data: encoded_suffix_data.to_string(),
        encoded_delta: encoded_delta.to_string(),
    })
}
