// Remote target identity and credential set

use std::fmt;

use duct_core::domain::RemoteSettings;

/// Where a connection goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl Target {
    pub fn from_settings(settings: &RemoteSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            username: settings.username.clone(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// One way of proving identity, tried in [`Credentials::methods`] order
#[derive(Clone, Copy)]
pub enum AuthMethod<'a> {
    /// Private key given inline
    Key {
        material: &'a str,
        passphrase: Option<&'a str>,
    },
    /// Private key read from disk
    KeyFile {
        path: &'a str,
        passphrase: Option<&'a str>,
    },
    Password(&'a str),
}

/// Secrets for a target. `Debug` never prints them.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    password: Option<String>,
    key: Option<String>,
    keyfile: Option<String>,
    keypass: Option<String>,
}

impl Credentials {
    pub fn from_settings(settings: &RemoteSettings) -> Self {
        Self {
            password: settings.password.clone(),
            key: settings.key.clone(),
            keyfile: settings.keyfile.clone(),
            keypass: settings.keypass.clone(),
        }
    }

    pub fn password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            key: None,
            keyfile: None,
            keypass: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.password.is_none() && self.key.is_none() && self.keyfile.is_none()
    }

    /// Key material first, then the password
    pub fn methods(&self) -> Vec<AuthMethod<'_>> {
        let passphrase = self.keypass.as_deref();
        let mut methods = Vec::with_capacity(3);
        if let Some(path) = self.keyfile.as_deref() {
            methods.push(AuthMethod::KeyFile { path, passphrase });
        }
        if let Some(material) = self.key.as_deref() {
            methods.push(AuthMethod::Key { material, passphrase });
        }
        if let Some(password) = self.password.as_deref() {
            methods.push(AuthMethod::Password(password));
        }
        methods
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key", &self.key.as_ref().map(|_| "***"))
            .field("keyfile", &self.keyfile)
            .field("keypass", &self.keypass.as_ref().map(|_| "***"))
            .finish()
    }
}
