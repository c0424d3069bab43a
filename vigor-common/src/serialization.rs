use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Serialization format for published telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON format (human-readable, good for debugging).
    #[default]
    Json,

    /// CBOR format (compact binary).
    Cbor,
}

/// Encode a value to bytes using the specified format.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => serde_json::to_vec(value).map_err(Error::from),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)?;
            Ok(buf)
        }
    }
}

/// Decode bytes to a value using the specified format.
pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Json => serde_json::from_slice(data).map_err(Error::from),
        Format::Cbor => ciborium::from_reader(data).map_err(|e| Error::Cbor(e.to_string())),
    }
}

/// Guess the format of a payload.
///
/// Returns `Json` if the data starts with `{` or `[`, otherwise `Cbor`.
pub fn detect_format(data: &[u8]) -> Format {
    match data.first() {
        Some(b'{') | Some(b'[') => Format::Json,
        _ => Format::Cbor,
    }
}

/// Decode bytes, auto-detecting the format.
///
/// Used for inbound command payloads, which may come from either kind of client.
pub fn decode_auto<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    decode(data, detect_format(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{TelemetryPoint, TelemetryValue};

    fn sample_point() -> TelemetryPoint {
        TelemetryPoint::new("vigor", "bypass_mode", TelemetryValue::from("Closed"))
            .with_label("serial", "123456789012")
    }

    #[test]
    fn test_cbor_decode_matches_json_decode() {
        let point = sample_point();

        let json: TelemetryPoint = decode(&encode(&point, Format::Json).unwrap(), Format::Json).unwrap();
        let cbor: TelemetryPoint = decode(&encode(&point, Format::Cbor).unwrap(), Format::Cbor).unwrap();

        assert_eq!(json.metric, cbor.metric);
        assert_eq!(json.value, cbor.value);
        assert_eq!(json.labels, cbor.labels);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(detect_format(b"{\"command\": \"reset_filter\"}"), Format::Json);
        assert_eq!(detect_format(b"[1, 2, 3]"), Format::Json);
        assert_eq!(detect_format(b"\xa1\x63key\x65value"), Format::Cbor);
        assert_eq!(detect_format(b""), Format::Cbor);
    }

    #[test]
    fn test_auto_decode() {
        let point = sample_point();

        let decoded: TelemetryPoint = decode_auto(&encode(&point, Format::Json).unwrap()).unwrap();
        assert_eq!(point.source, decoded.source);

        let decoded: TelemetryPoint = decode_auto(&encode(&point, Format::Cbor).unwrap()).unwrap();
        assert_eq!(point.source, decoded.source);
    }

    #[test]
    fn test_format_config_names() {
        let format: Format = serde_json::from_str("\"cbor\"").unwrap();
        assert_eq!(format, Format::Cbor);
        assert_eq!(Format::default(), Format::Json);
    }
}
