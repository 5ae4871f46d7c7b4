use std::collections::BTreeMap;

use serde::de::Error as _;
use serde_cbor_2::Value;

pub(crate) type CborMap = BTreeMap<Value, Value>;

/// Decodes the first CBOR item of `input` and reports how many bytes it used.
///
/// Authenticator data places the credential public key and the extensions map
/// back to back with no length prefix, so the key has to be read as a prefix.
pub(crate) fn decode_prefix(input: &[u8]) -> Result<(Value, usize), serde_cbor_2::Error> {
    let mut stream = serde_cbor_2::Deserializer::from_slice(input).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Ok((value, stream.byte_offset())),
        Some(Err(e)) => Err(e),
        None => Err(serde_cbor_2::Error::custom("no CBOR item in input")),
    }
}

pub(crate) fn as_map(value: &Value) -> Option<&CborMap> {
    match value {
        Value::Map(m) => Some(m),
        _ => None,
    }
}

pub(crate) fn int_entry(map: &CborMap, key: i128) -> Option<&Value> {
    map.get(&Value::Integer(key))
}

pub(crate) fn text_entry<'a>(map: &'a CborMap, key: &str) -> Option<&'a Value> {
    map.get(&Value::Text(key.to_string()))
}

pub(crate) fn as_int(value: &Value) -> Option<i128> {
    match value {
        Value::Integer(i) => Some(*i),
        _ => None,
    }
}

pub(crate) fn as_bytes(value: &Value) -> Option<&[u8]> {
    match value {
        Value::Bytes(b) => Some(b.as_slice()),
        _ => None,
    }
}
