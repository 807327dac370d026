//! OPAQUE cipher suite shared by the server and its clients.
//!
//! Both sides must agree on every associated type here; the suite name
//! published by the server lets clients check that before registering.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use opaque_ke::errors::ProtocolError;
use opaque_ke::CipherSuite;
use rand::rngs::OsRng;

/// Published alongside the server id so clients can configure their side.
pub const SUITE_NAME: &str = "ristretto255-tripledh-argon2id";

pub struct XferSuite;

impl CipherSuite for XferSuite {
    type OprfCs = opaque_ke::Ristretto255;
    type KeGroup = opaque_ke::Ristretto255;
    type KeyExchange = opaque_ke::key_exchange::tripledh::TripleDh;
    type Ksf = argon2::Argon2<'static>;
}

/// Long-lived server key material: the static key pair and the OPRF seed.
pub type ServerSetup = opaque_ke::ServerSetup<XferSuite>;

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("server setup is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("server setup could not be deserialized: {0}")]
    Protocol(ProtocolError),
}

pub fn generate_server_setup() -> ServerSetup {
    ServerSetup::new(&mut OsRng)
}

pub fn encode_server_setup(setup: &ServerSetup) -> String {
    STANDARD.encode(setup.serialize())
}

pub fn decode_server_setup(encoded: &str) -> Result<ServerSetup, SetupError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    ServerSetup::deserialize(&bytes).map_err(SetupError::Protocol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_survives_encoding() {
        let setup = generate_server_setup();
        let encoded = encode_server_setup(&setup);
        let decoded = decode_server_setup(&encoded).unwrap();
        assert_eq!(encode_server_setup(&decoded), encoded);
    }

    #[test]
    fn test_garbage_setup_rejected() {
        assert!(matches!(
            decode_server_setup("not base64!"),
            Err(SetupError::Encoding(_))
        ));
        assert!(matches!(
            decode_server_setup("AAAA"),
            Err(SetupError::Protocol(_))
        ));
    }
}
