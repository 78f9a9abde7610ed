//! Lenient numeric (de)serialization helpers for JSON-RPC wire data.
//!
//! Upstream nodes are not perfectly consistent about whether a quantity is encoded as a
//! `0x`-prefixed hex string or a bare JSON number; these helpers accept either.
use ethers_core::types::U256;
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    U256(U256),
    Num(u64),
}

impl From<Numeric> for U256 {
    fn from(n: Numeric) -> U256 {
        match n {
            Numeric::U256(n) => n,
            Numeric::Num(n) => U256::from(n),
        }
    }
}

/// Deserializes a number from hex or int.
pub fn deserialize_number<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    Numeric::deserialize(deserializer).map(Into::into)
}

/// Deserializes an optional number from hex or int; absent/`null` maps to `None` rather than an
/// error, which is how a pending transaction's `blockNumber` shows up on the wire.
pub fn deserialize_number_opt<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Numeric>::deserialize(deserializer)?.map(Into::into))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(deserialize_with = "deserialize_number")]
        value: U256,
        #[serde(default, deserialize_with = "deserialize_number_opt")]
        maybe: Option<U256>,
    }

    #[test]
    fn accepts_hex_and_decimal_quantities() {
        let hex: Wrapper = serde_json::from_str(r#"{"value":"0x10"}"#).unwrap();
        assert_eq!(hex.value, U256::from(16));

        let decimal: Wrapper = serde_json::from_str(r#"{"value":16}"#).unwrap();
        assert_eq!(decimal.value, U256::from(16));
    }

    #[test]
    fn absent_optional_quantity_is_none() {
        let parsed: Wrapper = serde_json::from_str(r#"{"value":"0x1"}"#).unwrap();
        assert_eq!(parsed.maybe, None);
    }
}
