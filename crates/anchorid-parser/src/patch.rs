//! Validation of the closed set of document patches a delta may carry
//! (spec.md §4.4). The patch tag itself is already a closed set at the
//! type level (`anchorid_core::operation::Patch`); this module validates
//! the constraints serde's schema can't express: id/type length ceilings,
//! URI-or-object service endpoints, uniqueness, and the closed purpose set.

use std::collections::HashSet;

use anchorid_core::operation::Patch;
use serde_json::Value;

use crate::error::ParseError;

const CLOSED_PURPOSES: &[&str] = &[
    "authentication",
    "assertionMethod",
    "keyAgreement",
    "capabilityInvocation",
    "capabilityDelegation",
];

fn is_base64url(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn validate_service_entry(entry: &Value) -> Result<(), ParseError> {
    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingServiceField("id"))?;
    if id.len() > 50 || !is_base64url(id) {
        return Err(ParseError::InvalidServiceId(id.to_string()));
    }
    let type_ = entry
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingServiceField("type"))?;
    if type_.len() > 30 {
        return Err(ParseError::InvalidServiceType(type_.to_string()));
    }
    let endpoint = entry
        .get("serviceEndpoint")
        .ok_or(ParseError::MissingServiceField("serviceEndpoint"))?;
    match endpoint {
        Value::String(s) if looks_like_uri(s) => Ok(()),
        Value::Object(_) => Ok(()),
        _ => Err(ParseError::InvalidServiceEndpoint),
    }
}

fn looks_like_uri(s: &str) -> bool {
    // A URI has a scheme (`scheme:`); no need for a full RFC-3986 parser —
    // the validator only needs to reject obviously-not-a-URI strings.
    s.split_once(':')
        .map(|(scheme, _)| {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        })
        .unwrap_or(false)
}

fn validate_public_key_entry(entry: &Value, seen_ids: &mut HashSet<String>) -> Result<(), ParseError> {
    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingPublicKeyField("id"))?;
    if !seen_ids.insert(id.to_string()) {
        return Err(ParseError::DuplicatePublicKeyId(id.to_string()));
    }
    if entry.get("publicKeyJwk").is_none() {
        return Err(ParseError::MissingPublicKeyField("publicKeyJwk"));
    }
    if let Some(purposes) = entry.get("purposes") {
        let purposes = purposes
            .as_array()
            .ok_or_else(|| ParseError::InvalidPurpose("purposes must be an array".to_string()))?;
        let mut seen_purposes = HashSet::new();
        for p in purposes {
            let p = p
                .as_str()
                .ok_or_else(|| ParseError::InvalidPurpose(format!("{p:?}")))?;
            if !CLOSED_PURPOSES.contains(&p) || !seen_purposes.insert(p.to_string()) {
                return Err(ParseError::InvalidPurpose(p.to_string()));
            }
        }
    }
    Ok(())
}

/// Validate every patch in a delta against the closed set and its
/// per-patch constraints.
pub fn validate_patches(patches: &[Patch]) -> Result<(), ParseError> {
    for patch in patches {
        match patch {
            Patch::Replace { .. } => {}
            Patch::AddPublicKeys { public_keys } => {
                let mut seen_ids = HashSet::new();
                for entry in public_keys {
                    validate_public_key_entry(entry, &mut seen_ids)?;
                }
            }
            Patch::RemovePublicKeys { ids } => {
                let mut seen = HashSet::new();
                for id in ids {
                    if !seen.insert(id.clone()) {
                        return Err(ParseError::DuplicatePublicKeyId(id.clone()));
                    }
                }
            }
            Patch::AddServices { services } => {
                for entry in services {
                    validate_service_entry(entry)?;
                }
            }
            Patch::RemoveServices { ids } => {
                let mut seen = HashSet::new();
                for id in ids {
                    if id.len() > 50 || !is_base64url(id) {
                        return Err(ParseError::InvalidServiceId(id.clone()));
                    }
                    if !seen.insert(id.clone()) {
                        return Err(ParseError::InvalidServiceId(id.clone()));
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_well_formed_service_entry() {
        let patch = Patch::AddServices {
            services: vec![json!({"id": "svc-1", "type": "LinkedDomains", "serviceEndpoint": "https://example.com"})],
        };
        assert!(validate_patches(&[patch]).is_ok());
    }

    #[test]
    fn rejects_service_endpoint_that_is_an_array() {
        let patch = Patch::AddServices {
            services: vec![json!({"id": "svc-1", "type": "LinkedDomains", "serviceEndpoint": ["https://example.com"]})],
        };
        assert!(validate_patches(&[patch]).is_err());
    }

    #[test]
    fn rejects_duplicate_public_key_ids() {
        let patch = Patch::AddPublicKeys {
            public_keys: vec![
                json!({"id": "key-1", "publicKeyJwk": {}}),
                json!({"id": "key-1", "publicKeyJwk": {}}),
            ],
        };
        assert!(matches!(
            validate_patches(&[patch]),
            Err(ParseError::DuplicatePublicKeyId(_))
        ));
    }

    #[test]
    fn rejects_purpose_outside_closed_set() {
        let patch = Patch::AddPublicKeys {
            public_keys: vec![json!({"id": "key-1", "publicKeyJwk": {}, "purposes": ["flying"]})],
        };
        assert!(validate_patches(&[patch]).is_err());
    }

    #[test]
    fn rejects_duplicate_purpose() {
        let patch = Patch::AddPublicKeys {
            public_keys: vec![json!({
                "id": "key-1",
                "publicKeyJwk": {},
                "purposes": ["authentication", "authentication"]
            })],
        };
        assert!(validate_patches(&[patch]).is_err());
    }

    #[test]
    fn rejects_service_id_over_fifty_chars() {
        let long_id = "a".repeat(51);
        let patch = Patch::AddServices {
            services: vec![json!({"id": long_id, "type": "X", "serviceEndpoint": "https://example.com"})],
        };
        assert!(validate_patches(&[patch]).is_err());
    }
}
