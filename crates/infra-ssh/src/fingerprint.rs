// Connection fingerprints

use sha2::{Digest, Sha256};
use std::fmt;

use duct_core::domain::RemoteSettings;

/// Deterministic identity of a remote target and its credentials.
///
/// Covers host, user, port, password, key and keyfile (absent values hash as
/// empty strings). The key passphrase and trust store path are not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(settings: &RemoteSettings) -> Self {
        let port = settings.port.to_string();
        let fields = [
            settings.host.as_str(),
            settings.username.as_str(),
            port.as_str(),
            settings.password.as_deref().unwrap_or(""),
            settings.key.as_deref().unwrap_or(""),
            settings.keyfile.as_deref().unwrap_or(""),
        ];

        let mut hasher = Sha256::new();
        for field in fields {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0[..12])
    }
}
