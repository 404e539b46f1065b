//! HMAC-SHA256 signatures for GitHub webhook deliveries.
//!
//! GitHub signs every delivery with the secret configured on the webhook and
//! sends the result in `X-Hub-Signature-256` as `sha256=<hex>`. A journey must
//! check this before it looks at the body at all.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Why a delivery failed signature verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The header is not of the form `sha256=<hex>`.
    #[error("malformed signature header")]
    Malformed,

    /// The header is well formed but does not match the payload.
    #[error("signature mismatch")]
    Mismatch,
}

/// Decodes a `sha256=<hex>` header value into the raw digest bytes.
///
/// Returns `None` when the prefix is missing or the hex is invalid.
///
/// ```
/// use journey_relay::webhooks::parse_signature_header;
///
/// assert_eq!(parse_signature_header("sha256=0aff"), Some(vec![0x0a, 0xff]));
/// assert!(parse_signature_header("sha1=0aff").is_none());
/// assert!(parse_signature_header("sha256=zz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

/// Computes the HMAC-SHA256 of `payload` keyed by `secret`.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = new_mac(secret);
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats raw digest bytes as a `sha256=<hex>` header value.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Checks `signature_header` against the HMAC of `payload` under `secret`.
///
/// The digest comparison is constant time (delegated to [`Mac::verify_slice`]).
///
/// ```
/// use journey_relay::webhooks::{
///     SignatureError, compute_signature, format_signature_header, verify_signature,
/// };
///
/// let body = br#"{"zen":"Keep it logically awesome."}"#;
/// let header = format_signature_header(&compute_signature(body, b"hunter2"));
///
/// assert_eq!(verify_signature(body, &header, b"hunter2"), Ok(()));
/// assert_eq!(
///     verify_signature(body, &header, b"hunter3"),
///     Err(SignatureError::Mismatch)
/// );
/// ```
pub fn verify_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &[u8],
) -> Result<(), SignatureError> {
    let expected = parse_signature_header(signature_header).ok_or(SignatureError::Malformed)?;

    let mut mac = new_mac(secret);
    mac.update(payload);
    mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

fn new_mac(secret: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_uppercase_hex() {
        assert_eq!(
            parse_signature_header("sha256=DEADBEEF"),
            Some(vec![0xde, 0xad, 0xbe, 0xef])
        );
    }

    #[test]
    fn rejects_headers_without_sha256_prefix() {
        assert_eq!(parse_signature_header("deadbeef"), None);
        assert_eq!(parse_signature_header("sha1=deadbeef"), None);
        assert_eq!(parse_signature_header(""), None);
    }

    #[test]
    fn rejects_odd_length_hex() {
        assert_eq!(parse_signature_header("sha256=abc"), None);
    }

    /// Test vector from GitHub's "Validating webhook deliveries" guide.
    #[test]
    fn matches_github_documentation_vector() {
        let header = "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";
        assert_eq!(
            verify_signature(b"Hello, World!", header, b"It's a Secret to Everybody"),
            Ok(())
        );
    }

    #[test]
    fn malformed_header_is_distinguished_from_mismatch() {
        let body = b"{}";
        assert_eq!(
            verify_signature(body, "sha256=not-hex", b"s"),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_signature(body, "", b"s"),
            Err(SignatureError::Malformed)
        );
        // Well formed but truncated digest.
        assert_eq!(
            verify_signature(body, "sha256=00", b"s"),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn tampered_body_fails() {
        let header = format_signature_header(&compute_signature(b"{\"action\":\"released\"}", b"s"));
        assert_eq!(
            verify_signature(b"{\"action\":\"deleted\"}", &header, b"s"),
            Err(SignatureError::Mismatch)
        );
    }

    proptest! {
        #[test]
        fn prop_signed_payload_verifies(payload: Vec<u8>, secret: Vec<u8>) {
            let header = format_signature_header(&compute_signature(&payload, &secret));
            prop_assert_eq!(verify_signature(&payload, &header, &secret), Ok(()));
        }

        #[test]
        fn prop_other_secret_is_rejected(payload: Vec<u8>, a: Vec<u8>, b: Vec<u8>) {
            prop_assume!(a != b);
            let header = format_signature_header(&compute_signature(&payload, &a));
            prop_assert_eq!(
                verify_signature(&payload, &header, &b),
                Err(SignatureError::Mismatch)
            );
        }

        #[test]
        fn prop_arbitrary_header_never_panics(header: String, payload: Vec<u8>) {
            let _ = verify_signature(&payload, &header, b"secret");
        }
    }
}
