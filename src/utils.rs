//! Identifier and text helpers

use bech32::{Bech32m, Hrp};
use uuid7::uuid7;

use super::error::ApiError;

pub const VIOLATION_HRP: &str = "viol";
pub const TRUCK_HRP: &str = "truck";
pub const RULE_HRP: &str = "rule";

/// A freshly generated document key together with its external bech32 form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocId {
    pub key: [u8; 16],
    pub encoded: String,
}

// construct a unique uuid7 key then encode using bech32
pub fn new_doc_id(hrp: &str) -> Result<DocId, ApiError> {
    let id = uuid7();
    let encoded = encode_key(hrp, id.as_bytes())?;
    Ok(DocId {
        key: *id.as_bytes(),
        encoded,
    })
}

pub fn encode_key(hrp: &str, key: &[u8; 16]) -> Result<String, ApiError> {
    let hrp = Hrp::parse(hrp).map_err(|e| ApiError::internal("invalid id prefix", e))?;
    bech32::encode::<Bech32m>(hrp, key).map_err(|e| ApiError::internal("failed to encode id", e))
}

/// Decode an external id back into its storage key. The prefix must match.
pub fn decode_id(hrp: &str, id: &str) -> Result<[u8; 16], ApiError> {
    let invalid = || ApiError::bad_request(format!("the supplied id {id} is invalid"));

    let (found, data) = bech32::decode(id.trim()).map_err(|_| invalid())?;
    if !found.to_string().eq_ignore_ascii_case(hrp) {
        return Err(invalid());
    }
    let key: [u8; 16] = data.try_into().map_err(|_| invalid())?;
    Ok(key)
}

/// Identity codes, plates and branches are compared in trimmed upper case.
pub fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_recovers_key() {
        let id = new_doc_id(VIOLATION_HRP).unwrap();
        assert!(id.encoded.starts_with("viol1"));
        assert_eq!(decode_id(VIOLATION_HRP, &id.encoded).unwrap(), id.key);
    }

    #[test]
    fn decode_rejects_wrong_prefix() {
        let id = new_doc_id(TRUCK_HRP).unwrap();
        assert!(decode_id(VIOLATION_HRP, &id.encoded).is_err());
        assert!(decode_id(VIOLATION_HRP, "not-an-id").is_err());
    }

    #[test]
    fn ids_sort_by_creation() {
        let a = new_doc_id(VIOLATION_HRP).unwrap();
        let b = new_doc_id(VIOLATION_HRP).unwrap();
        assert!(a.key < b.key);
    }
}
