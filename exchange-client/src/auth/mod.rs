//! Account credentials and request signing.
//!
//! The exchange signs every authenticated request with RSA-PSS(SHA-256) over
//! `<timestamp><METHOD><path>`, with the result carried in three headers.
//! Credential *loading* (reading key material from disk, env, secret stores)
//! is an external concern; this module only covers holding an already-loaded
//! key and producing a signature.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::thread_rng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::SigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::{ExchangeError, Result};

/// Header names carrying the signed request. Exchanges in this family use a
/// `<PREFIX>-ACCESS-KEY` / `-TIMESTAMP` / `-SIGNATURE` triple; the prefix
/// itself is not meaningful beyond namespacing so it is kept generic here.
pub const HEADER_ACCESS_KEY: &str = "ACCESS-KEY";
pub const HEADER_ACCESS_TIMESTAMP: &str = "ACCESS-TIMESTAMP";
pub const HEADER_ACCESS_SIGNATURE: &str = "ACCESS-SIGNATURE";

/// An already-loaded signing identity: an API key id and its RSA private key
/// in PEM form (PKCS#1 or PKCS#8, both accepted).
#[derive(Clone)]
pub struct Account {
    private_key_pem: String,
    key_id: String,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("key_id", &self.key_id)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

impl Account {
    pub fn new(private_key_pem: String, key_id: impl Into<String>) -> Self {
        Self {
            private_key_pem,
            key_id: key_id.into(),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }
}

/// Milliseconds since the Unix epoch, as a decimal string (the wire format
/// the timestamp header expects).
pub fn current_timestamp_ms() -> String {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch");
    since_epoch.as_millis().to_string()
}

/// Sign `<timestamp><method><path>` with RSA-PSS(SHA-256, salt length =
/// digest length = 32 bytes), returning the base64-encoded signature.
pub fn sign_request(account: &Account, method: &str, path: &str, timestamp_ms: &str) -> Result<String> {
    let message = format!("{timestamp_ms}{method}{path}");

    let private_key = if account.private_key_pem.contains("BEGIN RSA PRIVATE KEY") {
        RsaPrivateKey::from_pkcs1_pem(&account.private_key_pem)
    } else {
        RsaPrivateKey::from_pkcs8_pem(&account.private_key_pem)
    }
    .map_err(|e| ExchangeError::Signing(e.to_string()))?;

    let signing_key = SigningKey::<Sha256>::new_with_salt_len(private_key, 32);
    let mut rng = thread_rng();
    let signature = signing_key.sign_with_rng(&mut rng, message.as_bytes());

    Ok(BASE64.encode(signature.to_bytes()))
}

/// Produce the `(key_id, timestamp, signature)` triple for an authenticated
/// request with the given method and path. The signature covers the path
/// only, never the query string.
pub fn signed_headers(account: &Account, method: &str, path: &str) -> Result<(String, String, String)> {
    let timestamp = current_timestamp_ms();
    let signature = sign_request(account, method, path, &timestamp)?;
    Ok((account.key_id().to_string(), timestamp, signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey;

    fn test_account() -> Account {
        let mut rng = thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let pem = key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .unwrap()
            .to_string();
        Account::new(pem, "key-id-123")
    }

    #[test]
    fn test_sign_request_produces_base64() {
        let account = test_account();
        let timestamp = "1700000000000";
        let sig = sign_request(&account, "GET", "/trade-api/ws/v2", timestamp).unwrap();
        assert!(!sig.is_empty());
        assert!(BASE64.decode(&sig).is_ok());
    }

    #[test]
    fn test_signed_headers_reuses_key_id() {
        let account = test_account();
        let (key_id, timestamp, signature) = signed_headers(&account, "GET", "/markets").unwrap();
        assert_eq!(key_id, "key-id-123");
        assert!(timestamp.parse::<u64>().is_ok());
        assert!(!signature.is_empty());
    }
}
