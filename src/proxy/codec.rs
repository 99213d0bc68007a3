//! Codec for decoding and relabeling vmess and vless proxy lines

use crate::proxy::error::ProxyError;
use crate::proxy::models::{Label, Payload, ProxyRecord, Scheme};
use base64::{
    alphabet,
    engine::{
        general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD},
        DecodePaddingMode,
    },
    Engine,
};
use serde_json::{Map, Value};

/// Field of the vmess JSON object holding the server address
const VMESS_HOST_FIELD: &str = "add";

/// Field of the vmess JSON object holding the remarks
const VMESS_LABEL_FIELD: &str = "ps";

/// Separator between a vless URI and its label
const VLESS_LABEL_DELIMITER: char = '#';

/// Standard alphabet decoder that tolerates non-zero trailing bits and any
/// padding, as subscription providers emit both
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Codec for the supported proxy schemes
pub struct ProxyCodec;

impl ProxyCodec {
    /// Decode a proxy line of the given scheme
    pub fn decode(scheme: Scheme, line: &str) -> Result<ProxyRecord, ProxyError> {
        match scheme {
            Scheme::Vmess => Self::decode_vmess(line),
            Scheme::Vless => Self::decode_vless(line),
        }
    }

    /// Encode a record back into a proxy line carrying the new label.
    ///
    /// Everything except the label is passed through unchanged.
    pub fn reencode(record: &ProxyRecord, label: &Label) -> String {
        match &record.payload {
            Payload::Vmess(object) => Self::reencode_vmess(object, label),
            Payload::Vless { head, .. } => {
                format!("{}{}{}", head, VLESS_LABEL_DELIMITER, label)
            }
        }
    }

    /// Decode `vmess://<base64 JSON>`; the base64 may lack its padding
    fn decode_vmess(line: &str) -> Result<ProxyRecord, ProxyError> {
        let encoded = line
            .strip_prefix(Scheme::Vmess.prefix())
            .ok_or_else(|| ProxyError::malformed(Scheme::Vmess, "missing vmess:// prefix"))?
            .trim();

        let bytes = LENIENT_STANDARD
            .decode(pad_base64(encoded))
            .map_err(|e| ProxyError::malformed(Scheme::Vmess, format!("invalid base64: {}", e)))?;

        let object: Map<String, Value> = serde_json::from_slice(&bytes)
            .map_err(|e| ProxyError::malformed(Scheme::Vmess, format!("invalid JSON: {}", e)))?;

        let host = match object.get(VMESS_HOST_FIELD) {
            Some(Value::String(host)) if !host.trim().is_empty() => host.trim().to_string(),
            Some(_) => {
                return Err(ProxyError::malformed(
                    Scheme::Vmess,
                    "`add` field is not a host name",
                ))
            }
            None => return Err(ProxyError::malformed(Scheme::Vmess, "missing `add` field")),
        };

        Ok(ProxyRecord {
            scheme: Scheme::Vmess,
            host,
            payload: Payload::Vmess(object),
        })
    }

    fn reencode_vmess(object: &Map<String, Value>, label: &Label) -> String {
        let mut object = object.clone();
        object.insert(
            VMESS_LABEL_FIELD.to_string(),
            Value::String(label.to_string()),
        );

        let json = Value::Object(object).to_string();
        format!("{}{}", Scheme::Vmess.prefix(), STANDARD.encode(json))
    }

    /// Decode `vless://<credentials>@<host>:<port>...[#label]`
    fn decode_vless(line: &str) -> Result<ProxyRecord, ProxyError> {
        if !line.starts_with(Scheme::Vless.prefix()) {
            return Err(ProxyError::malformed(Scheme::Vless, "missing vless:// prefix"));
        }

        let (_, after_at) = line
            .split_once('@')
            .ok_or_else(|| ProxyError::malformed(Scheme::Vless, "missing `@` before host"))?;
        let (host, _) = after_at
            .split_once(':')
            .ok_or_else(|| ProxyError::malformed(Scheme::Vless, "missing `:` after host"))?;

        if host.is_empty() {
            return Err(ProxyError::malformed(Scheme::Vless, "empty host"));
        }

        let (head, label) = match line.split_once(VLESS_LABEL_DELIMITER) {
            Some((head, label)) => (head.to_string(), Some(label.to_string())),
            None => (line.to_string(), None),
        };

        Ok(ProxyRecord {
            scheme: Scheme::Vless,
            host: host.to_string(),
            payload: Payload::Vless { head, label },
        })
    }
}

/// Drop any existing `=` and pad base64 text up to the next multiple of four
fn pad_base64(encoded: &str) -> String {
    let mut padded = encoded.trim_end_matches('=').to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    padded
}
