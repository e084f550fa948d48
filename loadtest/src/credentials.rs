//! Handling of the admin keys issued by counter creation.
//!
//! Privilege is obtained solely through a 201 creation response; it is never
//! inferred or rediscovered. A counter that already existed (409) leaves the
//! iteration without privileged operations.

use std::fmt;

use abacus_client::CreateOutcome;

/// A bearer credential scoping privileged operations to one counter.
///
/// The token only lives from the creation response until the counter is
/// deleted or the run ends. Its `Debug` output is redacted; the raw value is
/// only reachable through [`AdminToken::reveal`] and must never end up in
/// logs or metric labels.
#[derive(Clone)]
pub struct AdminToken(String);

impl AdminToken {
    /// Wraps a raw admin key.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw token, for use in the `Authorization` header only.
    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminToken(<redacted>)")
    }
}

/// Extracts the admin token from a create outcome.
///
/// Only a fresh creation carries a token; an already existing counter yields
/// `None` and the caller proceeds without privileged operations.
pub fn from_create(outcome: &CreateOutcome) -> Option<AdminToken> {
    match outcome {
        CreateOutcome::Created { admin_key, .. } => Some(AdminToken::new(admin_key.clone())),
        CreateOutcome::AlreadyExists => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_creation_yields_a_token() {
        let outcome = CreateOutcome::Created {
            admin_key: "s3cr3t".to_owned(),
            value: 0,
        };
        let token = from_create(&outcome).unwrap();
        assert_eq!(token.reveal(), "s3cr3t");
    }

    #[test]
    fn existing_counter_yields_no_token() {
        assert!(from_create(&CreateOutcome::AlreadyExists).is_none());
    }

    #[test]
    fn debug_output_is_redacted() {
        let token = AdminToken::new("s3cr3t");
        let debug = format!("{token:?}");
        assert!(!debug.contains("s3cr3t"));
        assert_eq!(debug, "AdminToken(<redacted>)");
    }
}
