//! HMAC-SHA-256 request signatures.
//!
//! Every private request carries two signatures keyed by the session key:
//! one over the canonical request line and one over the raw body. Both are
//! transmitted as standard base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const SESSION_ID_HEADER: &str = "x-session-id";
pub const REQUEST_SIGNATURE_HEADER: &str = "x-req-signature";
pub const BODY_SIGNATURE_HEADER: &str = "x-body-signature";

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("signature is not valid base64")]
    Encoding,
    #[error("signature does not match")]
    Mismatch,
    #[error("session key rejected by mac")]
    InvalidKey,
}

/// `METHOD \n PATH \n RAW_QUERY \n TIMESTAMP`
pub fn canonical_request(method: &str, path: &str, raw_query: &str, timestamp: &str) -> String {
    format!("{method}\n{path}\n{raw_query}\n{timestamp}")
}

fn mac(key: &[u8]) -> Result<HmacSha256, SignatureError> {
    HmacSha256::new_from_slice(key).map_err(|_| SignatureError::InvalidKey)
}

pub fn sign(key: &[u8], message: &[u8]) -> Result<Vec<u8>, SignatureError> {
    let mut mac = mac(key)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn sign_base64(key: &[u8], message: &[u8]) -> Result<String, SignatureError> {
    sign(key, message).map(|sig| STANDARD.encode(sig))
}

/// Verify a base64 signature over `message`. The comparison is constant time.
pub fn verify(key: &[u8], message: &[u8], signature: &str) -> Result<(), SignatureError> {
    let provided = STANDARD
        .decode(signature.trim())
        .map_err(|_| SignatureError::Encoding)?;
    let mut mac = mac(key)?;
    mac.update(message);
    mac.verify_slice(&provided)
        .map_err(|_| SignatureError::Mismatch)
}

/// Headers a client attaches to one signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub timestamp: String,
    pub session_id: String,
    pub request_signature: String,
    pub body_signature: String,
}

impl SignedHeaders {
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            (TIMESTAMP_HEADER, &self.timestamp),
            (SESSION_ID_HEADER, &self.session_id),
            (REQUEST_SIGNATURE_HEADER, &self.request_signature),
            (BODY_SIGNATURE_HEADER, &self.body_signature),
        ]
    }
}

/// Client side of the signing scheme, holding an open session.
#[derive(Clone)]
pub struct RequestSigner {
    session_id: String,
    key: Vec<u8>,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("session_id", &self.session_id)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl RequestSigner {
    pub fn new(session_id: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            session_id: session_id.into(),
            key: key.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn sign(
        &self,
        method: &str,
        path: &str,
        raw_query: &str,
        body: &[u8],
        unix_timestamp: i64,
    ) -> Result<SignedHeaders, SignatureError> {
        let timestamp = unix_timestamp.to_string();
        let canonical = canonical_request(method, path, raw_query, &timestamp);
        Ok(SignedHeaders {
            request_signature: sign_base64(&self.key, canonical.as_bytes())?,
            body_signature: sign_base64(&self.key, body)?,
            session_id: self.session_id.clone(),
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn request_sig(method: &str, path: &str, query: &str, ts: &str) -> String {
        sign_base64(KEY, canonical_request(method, path, query, ts).as_bytes()).unwrap()
    }

    #[test]
    fn test_signing_is_deterministic() {
        let a = request_sig("GET", "/api/v1/private/file/list", "", "1700000000");
        let b = request_sig("GET", "/api/v1/private/file/list", "", "1700000000");
        assert_eq!(a, b);
        assert!(verify(
            KEY,
            canonical_request("GET", "/api/v1/private/file/list", "", "1700000000").as_bytes(),
            &a
        )
        .is_ok());
    }

    #[test]
    fn test_single_byte_mutations_flip_signature() {
        let base = ("POST", "/api/v1/private/file/upload/part", "upload_id=u&chunk_id=1", "1700000000");
        let expected = request_sig(base.0, base.1, base.2, base.3);

        let mutations = [
            ("PUT", base.1, base.2, base.3),
            (base.0, "/api/v1/private/file/upload/parT", base.2, base.3),
            (base.0, base.1, "upload_id=u&chunk_id=2", base.3),
            (base.0, base.1, base.2, "1700000001"),
        ];
        for (m, p, q, t) in mutations {
            let canonical = canonical_request(m, p, q, t);
            assert!(matches!(
                verify(KEY, canonical.as_bytes(), &expected),
                Err(SignatureError::Mismatch)
            ));
        }

        let body = b"chunk bytes".to_vec();
        let body_sig = sign_base64(KEY, &body).unwrap();
        let mut tampered = body.clone();
        tampered[0] ^= 0x01;
        assert!(verify(KEY, &body, &body_sig).is_ok());
        assert!(verify(KEY, &tampered, &body_sig).is_err());
    }

    #[test]
    fn test_wrong_key_and_bad_encoding() {
        let sig = sign_base64(KEY, b"hello").unwrap();
        assert!(verify(b"another key", b"hello", &sig).is_err());
        assert!(matches!(
            verify(KEY, b"hello", "%%%"),
            Err(SignatureError::Encoding)
        ));
    }

    #[test]
    fn test_signer_produces_verifiable_headers() {
        let signer = RequestSigner::new("session-1", KEY.to_vec());
        let headers = signer
            .sign("GET", "/api/v1/private/file/list", "", b"", 1_700_000_000)
            .unwrap();
        assert_eq!(headers.timestamp, "1700000000");
        assert_eq!(headers.session_id, "session-1");
        let canonical = canonical_request("GET", "/api/v1/private/file/list", "", "1700000000");
        assert!(verify(KEY, canonical.as_bytes(), &headers.request_signature).is_ok());
        assert!(verify(KEY, b"", &headers.body_signature).is_ok());
        assert!(!format!("{signer:?}").contains("0123"));
    }
}
