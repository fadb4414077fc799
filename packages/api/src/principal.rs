//! # Principals and identities
//!
//! [`Principal`] is `candid::Principal`: an opaque caller reference of at most 29
//! bytes with one canonical text rendering (`crc32 ++ bytes`, base32, dash groups
//! of five). Every comparison shown to a user and every display goes through that
//! text form; on the wire a principal travels as the same text.
//!
//! | Bytes | Text |
//! |-------|------|
//! | `[]` | `aaaaa-aa` |
//! | `[0x04]` (anonymous) | `2vxsx-fae` |
//!
//! An [`Identity`] pairs a principal with the delegation token the identity provider
//! issued for it.

pub use candid::Principal;
use rand::RngCore;

/// A fresh self-authenticating principal derived from random key material.
///
/// Used by development identity providers; production principals come from
/// the identity provider.
pub fn random_principal() -> Principal {
    let mut public_key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut public_key);
    Principal::self_authenticating(public_key)
}

/// An authenticated caller as handed out by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    principal: Principal,
    delegation: Option<String>,
}

impl Identity {
    pub fn new(principal: Principal, delegation: Option<String>) -> Self {
        Self {
            principal,
            delegation,
        }
    }

    pub fn anonymous() -> Self {
        Self::new(Principal::anonymous(), None)
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Bearer token proving the delegation, if the provider issued one.
    pub fn delegation(&self) -> Option<&str> {
        self.delegation.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.principal == Principal::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_text_forms() {
        assert_eq!(Principal::from_slice(&[]).to_text(), "aaaaa-aa");
        assert_eq!(Principal::anonymous().to_text(), "2vxsx-fae");
        let service = Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0, 1, 1, 1]);
        assert_eq!(service.to_text(), "rrkah-fqaaa-aaaaa-aaaaq-cai");
    }

    #[test]
    fn test_parse_text() {
        let p = Principal::from_text("rdmx6-jaaaa-aaaaa-aaadq-cai").unwrap();
        assert_eq!(p.as_slice(), &[0, 0, 0, 0, 0, 0, 0, 7, 1, 1]);
        assert!(Identity::new(Principal::from_text("2vxsx-fae").unwrap(), None).is_anonymous());
    }

    #[test]
    fn test_rejects_malformed_text() {
        assert!(Principal::from_text("2vxsx-fa1").is_err());
        assert!(Principal::from_text("2vxsx-faf").is_err());
        assert!(Principal::from_text("2vxsxfae").is_err());
    }

    #[test]
    fn test_random_principal_is_authenticated_and_parses_back() {
        let p = random_principal();
        assert!(!Identity::new(p, None).is_anonymous());
        assert_eq!(Principal::from_text(p.to_text()).unwrap(), p);
        assert_ne!(random_principal(), p);
    }

    #[test]
    fn test_wire_form_is_text() {
        let p = Principal::anonymous();
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"2vxsx-fae\"");
        let back: Principal = serde_json::from_str("\"2vxsx-fae\"").unwrap();
        assert_eq!(back, p);
    }
}
