//! Prefixed Crockford Base32 identifiers
//!
//! Every address space in the system (node keys, depot ids, delegate ids,
//! ticket ids) is a 16-byte value rendered at the API boundary as a fixed
//! prefix plus 26 Crockford Base32 characters. The newtypes here share one
//! encode/decode routine but are distinct Rust types so the compiler, not a
//! string prefix check, keeps the address spaces from mixing at call sites.

use std::fmt;
use std::str::FromStr;

use crate::common::error::CoreError;

fn encode26(bytes: &[u8; 16]) -> String {
    base32::encode(base32::Alphabet::Crockford, bytes)
}

fn decode16(prefix: &'static str, s: &str) -> Result<[u8; 16], CoreError> {
    let rest = s.strip_prefix(prefix).ok_or_else(|| {
        CoreError::validation("INVALID_ID_PREFIX", format!("expected prefix '{prefix}' in '{s}'"))
    })?;

    let decoded = base32::decode(base32::Alphabet::Crockford, rest).ok_or_else(|| {
        CoreError::validation("INVALID_ID_ENCODING", format!("not valid Crockford Base32: '{rest}'"))
    })?;

    if decoded.len() != 16 {
        return Err(CoreError::validation(
            "INVALID_ID_LENGTH",
            format!("expected 16 decoded bytes, got {}", decoded.len()),
        ));
    }

    let mut out = [0u8; 16];
    out.copy_from_slice(&decoded);
    Ok(out)
}

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name([u8; 16]);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, encode26(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(decode16($prefix, s)?))
            }
        }

        impl TryFrom<String> for $name {
            type Error = CoreError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.to_string()
            }
        }
    };
}

define_id!(NodeKey, "nod_");
define_id!(DepotId, "dpt_");
define_id!(DelegateId, "dlt_");
define_id!(TicketId, "tkt_");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let key = NodeKey::from_bytes([7u8; 16]);
        let text = key.to_string();
        assert!(text.starts_with("nod_"));
        assert_eq!(text.len(), 4 + 26);

        let parsed: NodeKey = text.parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_wrong_prefix_rejected() {
        let key = NodeKey::from_bytes([1u8; 16]);
        let text = key.to_string().replace("nod_", "dpt_");
        let parsed = text.parse::<NodeKey>();
        assert!(parsed.is_err());
    }

    #[test]
    fn test_distinct_types_same_bytes_different_text() {
        let node = NodeKey::from_bytes([9u8; 16]);
        let depot = DepotId::from_bytes([9u8; 16]);
        assert_ne!(node.to_string(), depot.to_string());
    }
}
