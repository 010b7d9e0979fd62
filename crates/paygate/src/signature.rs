//! Message authentication for provider requests and callbacks.
//!
//! Every provider fixes both its hash function and the way request fields
//! are flattened into the canonical string that gets signed. The helpers
//! here produce those canonical strings; the provider modules decide which
//! fields go in and in what order.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::error::PaygateError;
use crate::provider::{Operation, Provider};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    HmacSha256,
    HmacSha512,
}

impl SignatureAlgorithm {
    /// The algorithm a provider signs with. Providers without a signing
    /// scheme fail with `Unsupported`.
    pub fn for_provider(provider: Provider) -> Result<Self, PaygateError> {
        match provider {
            Provider::Momo | Provider::Payos | Provider::Zalopay => {
                Ok(SignatureAlgorithm::HmacSha256)
            }
            Provider::Vnpay => Ok(SignatureAlgorithm::HmacSha512),
            Provider::Vietqr => Err(PaygateError::not_implemented(provider, Operation::Sign)),
        }
    }

    fn digest_len(&self) -> usize {
        match self {
            SignatureAlgorithm::HmacSha256 => 32,
            SignatureAlgorithm::HmacSha512 => 64,
        }
    }
}

/// Compute the MAC of `canonical` under `secret`. Returns lowercase hex.
pub fn sign(secret: &[u8], canonical: &str, algorithm: SignatureAlgorithm) -> String {
    match algorithm {
        SignatureAlgorithm::HmacSha256 => {
            let mut mac =
                HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
            mac.update(canonical.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
        SignatureAlgorithm::HmacSha512 => {
            let mut mac =
                HmacSha512::new_from_slice(secret).expect("HMAC accepts any key length");
            mac.update(canonical.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
    }
}

/// Verify a claimed hex signature against `canonical`.
///
/// Comparison is constant-time. Malformed hex is compared against zeros
/// so it takes the same path as a wrong signature.
pub fn verify(
    secret: &[u8],
    canonical: &str,
    algorithm: SignatureAlgorithm,
    signature: &str,
) -> bool {
    let expected =
        hex::decode(signature).unwrap_or_else(|_| vec![0u8; algorithm.digest_len()]);
    match algorithm {
        SignatureAlgorithm::HmacSha256 => {
            let mut mac =
                HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
            mac.update(canonical.as_bytes());
            mac.verify_slice(&expected).is_ok()
        }
        SignatureAlgorithm::HmacSha512 => {
            let mut mac =
                HmacSha512::new_from_slice(secret).expect("HMAC accepts any key length");
            mac.update(canonical.as_bytes());
            mac.verify_slice(&expected).is_ok()
        }
    }
}

/// Sign with the algorithm the provider mandates.
pub fn sign_for(provider: Provider, secret: &str, canonical: &str) -> Result<String, PaygateError> {
    let algorithm = SignatureAlgorithm::for_provider(provider)?;
    Ok(sign(secret.as_bytes(), canonical, algorithm))
}

/// Verify with the algorithm the provider mandates.
pub fn verify_for(
    provider: Provider,
    secret: &str,
    canonical: &str,
    signature: &str,
) -> Result<bool, PaygateError> {
    let algorithm = SignatureAlgorithm::for_provider(provider)?;
    Ok(verify(secret.as_bytes(), canonical, algorithm, signature))
}

/// `k1=v1&k2=v2` in exactly the order given.
pub fn ordered_pairs(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// `f1|f2|f3` in exactly the order given.
pub fn pipe_joined(fields: &[&str]) -> String {
    fields.join("|")
}

/// Key-sorted query string with form-style encoding (`%20` becomes `+`).
pub fn sorted_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encode like a browser's `encodeURIComponent`, then turn spaces
/// into `+`.
pub fn encode_component(s: &str) -> String {
    let encoded = urlencoding::encode(s);
    let mut out = String::with_capacity(encoded.len());
    let mut rest = encoded.as_ref();
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let escape = &rest[pos..pos + 3];
        match escape {
            "%20" => out.push('+'),
            "%21" => out.push('!'),
            "%27" => out.push('\''),
            "%28" => out.push('('),
            "%29" => out.push(')'),
            "%2A" => out.push('*'),
            other => out.push_str(other),
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    out
}

/// `k=v` pairs over every key of a JSON object, sorted by key.
///
/// Nulls render as empty strings. Nested arrays and objects render as
/// compact JSON with their own keys sorted.
pub fn sorted_data_pairs(data: &Map<String, Value>) -> String {
    let sorted: BTreeMap<&String, &Value> = data.iter().collect();
    sorted
        .into_iter()
        .map(|(k, v)| format!("{k}={}", flat_value(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn flat_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) if s == "null" || s == "undefined" => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => sorted_json(value).to_string(),
        other => other.to_string(),
    }
}

fn sorted_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, sorted_json(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted_json).collect()),
        other => other.clone(),
    }
}

/// Constant-time byte comparison that does not leak input lengths or content.
///
/// Both inputs are hashed to fixed-length SHA-256 digests before comparison.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let ha = Sha256::digest(a);
    let hb = Sha256::digest(b);
    ha.ct_eq(&hb).into()
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().fold(String::new(), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{b:02x}");
            s
        })
    }

    pub fn decode(s: &str) -> Result<Vec<u8>, ()> {
        if s.len() % 2 != 0 || !s.is_ascii() {
            return Err(());
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // RFC 4231, test case 2
    const KEY: &[u8] = b"Jefe";
    const DATA: &str = "what do ya want for nothing?";

    #[test]
    fn hmac_sha256_fixed_vector() {
        assert_eq!(
            sign(KEY, DATA, SignatureAlgorithm::HmacSha256),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn hmac_sha512_fixed_vector() {
        assert_eq!(
            sign(KEY, DATA, SignatureAlgorithm::HmacSha512),
            "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea2505549758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737"
        );
    }

    #[test]
    fn signing_is_deterministic() {
        let a = sign(b"secret", "amount=1000&orderId=A1", SignatureAlgorithm::HmacSha256);
        let b = sign(b"secret", "amount=1000&orderId=A1", SignatureAlgorithm::HmacSha256);
        assert_eq!(a, b);
    }

    #[test]
    fn changing_any_field_changes_digest() {
        let fields = [("amount", "1000"), ("orderId", "A1"), ("requestId", "R1")];
        let base = sign(b"k", &ordered_pairs(&fields), SignatureAlgorithm::HmacSha256);
        for i in 0..fields.len() {
            let mut changed = fields;
            changed[i].1 = "X";
            let digest = sign(b"k", &ordered_pairs(&changed), SignatureAlgorithm::HmacSha256);
            assert_ne!(digest, base, "field {} did not affect the digest", fields[i].0);
        }
    }

    #[test]
    fn verify_accepts_uppercase_hex() {
        let sig = sign(b"k", "a|b", SignatureAlgorithm::HmacSha512).to_uppercase();
        assert!(verify(b"k", "a|b", SignatureAlgorithm::HmacSha512, &sig));
    }

    #[test]
    fn verify_rejects_reordered_and_added_fields() {
        let canonical = ordered_pairs(&[("a", "1"), ("b", "2")]);
        let sig = sign(b"k", &canonical, SignatureAlgorithm::HmacSha256);
        let reordered = ordered_pairs(&[("b", "2"), ("a", "1")]);
        let added = ordered_pairs(&[("a", "1"), ("b", "2"), ("c", "3")]);
        assert!(verify(b"k", &canonical, SignatureAlgorithm::HmacSha256, &sig));
        assert!(!verify(b"k", &reordered, SignatureAlgorithm::HmacSha256, &sig));
        assert!(!verify(b"k", &added, SignatureAlgorithm::HmacSha256, &sig));
    }

    #[test]
    fn verify_rejects_malformed_hex() {
        assert!(!verify(b"k", "body", SignatureAlgorithm::HmacSha256, "zz-not-hex"));
        assert!(!verify(b"k", "body", SignatureAlgorithm::HmacSha256, ""));
    }

    #[test]
    fn algorithm_is_fixed_per_provider() {
        assert_eq!(
            SignatureAlgorithm::for_provider(Provider::Vnpay).unwrap(),
            SignatureAlgorithm::HmacSha512
        );
        assert_eq!(
            SignatureAlgorithm::for_provider(Provider::Zalopay).unwrap(),
            SignatureAlgorithm::HmacSha256
        );
        assert!(matches!(
            sign_for(Provider::Vietqr, "k", "x"),
            Err(PaygateError::Unsupported { .. })
        ));
    }

    #[test]
    fn sorted_query_encodes_like_a_form() {
        let mut params = BTreeMap::new();
        params.insert("vnp_OrderInfo".to_string(), "Thanh toan don hang".to_string());
        params.insert("vnp_Amount".to_string(), "1000000".to_string());
        params.insert(
            "vnp_ReturnUrl".to_string(),
            "https://shop.example/return?x=1".to_string(),
        );
        assert_eq!(
            sorted_query(&params),
            "vnp_Amount=1000000&vnp_OrderInfo=Thanh+toan+don+hang&vnp_ReturnUrl=https%3A%2F%2Fshop.example%2Freturn%3Fx%3D1"
        );
    }

    #[test]
    fn encode_component_keeps_unreserved_marks() {
        assert_eq!(encode_component("a b!(c)*'"), "a+b!(c)*'");
        assert_eq!(encode_component("Tiếng"), "Ti%E1%BA%BFng");
    }

    #[test]
    fn sorted_data_pairs_flattens_nested_values() {
        let data = json!({
            "orderCode": 123,
            "amount": 3000,
            "desc": null,
            "reference": "null",
            "items": [{"quantity": 1, "name": "A"}],
        });
        let Value::Object(map) = data else { unreachable!() };
        assert_eq!(
            sorted_data_pairs(&map),
            "amount=3000&desc=&items=[{\"name\":\"A\",\"quantity\":1}]&orderCode=123&reference="
        );
    }

    #[test]
    fn constant_time_eq_behaviour() {
        assert!(constant_time_eq(b"token", b"token"));
        assert!(!constant_time_eq(b"token", b"other"));
        assert!(!constant_time_eq(b"", b"notempty"));
    }
}
