//! Serialization helpers used at the output boundary.
//!
//! Large integers are written as decimal strings with `serde_with`'s
//! `DisplayFromStr` on the structs themselves. Prices that could not be read
//! are written as the literal `unknown`.

use alloy::primitives::Address;
use rust_decimal::Decimal;
use serde::Serializer;

/// Marker written for prices that are not available.
pub const UNKNOWN: &str = "unknown";

/// Serializes an address as a checksummed hex string.
pub(crate) fn serialize_address_as_hex<S>(value: &Address, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_checksum(None))
}

/// Serializes an optional price, falling back to [`UNKNOWN`].
pub(crate) fn serialize_price<S>(value: &Option<Decimal>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(price) => serializer.collect_str(price),
        None => serializer.serialize_str(UNKNOWN),
    }
}

/// Serializes a pair of optional prices.
pub(crate) fn serialize_price_range<S>(
    value: &[Option<Decimal>; 2],
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use serde::ser::SerializeSeq;

    let mut seq = serializer.serialize_seq(Some(2))?;
    for price in value {
        match price {
            Some(price) => seq.serialize_element(&price.to_string())?,
            None => seq.serialize_element(UNKNOWN)?,
        }
    }
    seq.end()
}

/// Formats an optional value for humans, falling back to [`UNKNOWN`].
pub fn display_or_unknown(value: Option<Decimal>) -> String {
    value.map_or_else(|| UNKNOWN.to_owned(), |price| price.to_string())
}
