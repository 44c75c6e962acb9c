//! Client identifier generation and owner resolution.
//!
//! A client id is an opaque token that embeds the owning node's internal
//! RPC address at mint time, so the router answers "is this target local?"
//! without any directory lookup. The resolver is a trait so the encoding
//! scheme can later be swapped for an explicit directory service without
//! touching the router.

use pombo_common::PomboError;
use pombo_common::crypto::SecretBox;

/// Maps a client id to the address of the node owning its connection.
pub trait OwnerResolver: Send + Sync {
    fn resolve(&self, client_id: &str) -> Result<String, PomboError>;
}

/// Mints and resolves sealed client ids.
///
/// The sealed payload is `address|timestamp_millis`; uniqueness comes from
/// the random nonce of every seal, so two connects in the same millisecond
/// still produce distinct ids.
pub struct ClientIdCodec {
    sbox: SecretBox,
}

impl ClientIdCodec {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            sbox: SecretBox::new(key),
        }
    }

    pub fn from_base64_key(key: &str) -> Result<Self, PomboError> {
        let sbox = SecretBox::from_base64_key(key)
            .map_err(|e| PomboError::ConfigError(format!("cluster secret: {}", e)))?;
        Ok(Self { sbox })
    }

    /// Generate a fresh client id owned by `address`.
    pub fn generate(&self, address: &str) -> Result<String, PomboError> {
        let payload = format!("{}|{}", address, chrono::Utc::now().timestamp_millis());
        self.sbox
            .seal(payload.as_bytes())
            .map_err(|e| PomboError::InternalError(format!("client id seal: {}", e)))
    }
}

impl OwnerResolver for ClientIdCodec {
    fn resolve(&self, client_id: &str) -> Result<String, PomboError> {
        let opened = self
            .sbox
            .open(client_id)
            .map_err(|_| PomboError::MalformedClientId(client_id.to_string()))?;
        let payload = String::from_utf8(opened)
            .map_err(|_| PomboError::MalformedClientId(client_id.to_string()))?;

        let address = payload.split('|').next().unwrap_or_default();
        if address.is_empty() || !address.contains(':') {
            return Err(PomboError::MalformedClientId(client_id.to_string()));
        }
        Ok(address.to_string())
    }
}
