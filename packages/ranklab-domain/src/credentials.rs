//! AES-256-GCM sealing of search endpoint credentials.
//!
//! Stored form: `base64(nonce || ciphertext || tag)` of `username:password`.

use aes_gcm::{
	Aes256Gcm, Key, Nonce,
	aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine, engine::general_purpose::STANDARD};

use crate::endpoint::Credentials;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Credential key must be base64 encoded.")]
	KeyEncoding,
	#[error("Credential key must be {KEY_LEN} bytes, got {0}.")]
	KeyLength(usize),
	#[error("Stored credentials are not valid base64.")]
	Encoding,
	#[error("Stored credentials are truncated.")]
	Truncated,
	#[error("Failed to seal credentials.")]
	Seal,
	#[error("Failed to open stored credentials; the key does not match.")]
	Open,
	#[error("Stored credentials must be `username:password` UTF-8 text.")]
	Format,
}

#[derive(Clone)]
pub struct CredentialKey([u8; KEY_LEN]);
impl CredentialKey {
	pub fn from_base64(raw: &str) -> Result<Self> {
		let bytes = STANDARD.decode(raw.trim()).map_err(|_| Error::KeyEncoding)?;
		let key: [u8; KEY_LEN] =
			bytes.as_slice().try_into().map_err(|_| Error::KeyLength(bytes.len()))?;

		Ok(Self(key))
	}

	fn cipher(&self) -> Aes256Gcm {
		Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
	}
}
impl std::fmt::Debug for CredentialKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("CredentialKey(<redacted>)")
	}
}

pub fn encrypt_credentials(key: &CredentialKey, credentials: &Credentials) -> Result<String> {
	let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
	let plaintext = format!("{}:{}", credentials.username, credentials.password);
	let sealed = key.cipher().encrypt(&nonce, plaintext.as_bytes()).map_err(|_| Error::Seal)?;
	let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());

	out.extend_from_slice(nonce.as_slice());
	out.extend_from_slice(&sealed);

	Ok(STANDARD.encode(out))
}

pub fn decrypt_credentials(key: &CredentialKey, stored: &str) -> Result<Credentials> {
	let bytes = STANDARD.decode(stored.trim()).map_err(|_| Error::Encoding)?;

	if bytes.len() < NONCE_LEN + TAG_LEN {
		return Err(Error::Truncated);
	}

	let (nonce, sealed) = bytes.split_at(NONCE_LEN);
	let plaintext =
		key.cipher().decrypt(Nonce::from_slice(nonce), sealed).map_err(|_| Error::Open)?;
	let text = String::from_utf8(plaintext).map_err(|_| Error::Format)?;
	let (username, password) = text.split_once(':').ok_or(Error::Format)?;

	Ok(Credentials { username: username.to_string(), password: password.to_string() })
}

#[cfg(test)]
mod tests {
	use super::*;

	fn key(byte: u8) -> CredentialKey {
		CredentialKey::from_base64(&STANDARD.encode([byte; KEY_LEN])).expect("Valid key.")
	}

	#[test]
	fn sealed_credentials_open_with_the_same_key() {
		let credentials =
			Credentials { username: "elastic".to_string(), password: "pa:ss".to_string() };
		let stored = encrypt_credentials(&key(7), &credentials).expect("Failed to seal.");
		let opened = decrypt_credentials(&key(7), &stored).expect("Failed to open.");

		assert_eq!(opened, credentials);
	}

	#[test]
	fn wrong_key_is_rejected() {
		let credentials = Credentials { username: "u".to_string(), password: "p".to_string() };
		let stored = encrypt_credentials(&key(1), &credentials).expect("Failed to seal.");

		assert!(matches!(decrypt_credentials(&key(2), &stored), Err(Error::Open)));
	}

	#[test]
	fn key_length_is_checked() {
		let short = STANDARD.encode([0_u8; 16]);

		assert!(matches!(CredentialKey::from_base64(&short), Err(Error::KeyLength(16))));
	}

	#[test]
	fn truncated_payload_is_rejected() {
		let payload = STANDARD.encode([0_u8; 8]);

		assert!(matches!(decrypt_credentials(&key(1), &payload), Err(Error::Truncated)));
	}
}
