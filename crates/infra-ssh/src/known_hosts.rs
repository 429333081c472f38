// Trust-on-first-use host key store
//
// File format: "<host>[,<host>...] <algorithm> <base64-key>" per line. Entries
// are appended one host per line and never removed.

use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
struct HostKey {
    host: String,
    algorithm: String,
    key: String,
}

impl HostKey {
    /// One entry per host named on the line (`db01,10.0.0.5 alg key`)
    fn parse(line: &str) -> Vec<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Vec::new();
        }
        let mut parts = line.split_whitespace();
        let (Some(hosts), Some(algorithm), Some(key)) = (parts.next(), parts.next(), parts.next()) else {
            return Vec::new();
        };
        hosts
            .split(',')
            .filter(|host| !host.is_empty())
            .map(|host| Self {
                host: host.to_string(),
                algorithm: algorithm.to_string(),
                key: key.to_string(),
            })
            .collect()
    }

    fn matches(&self, algorithm: &str, key: &str) -> bool {
        self.algorithm == algorithm && self.key == key
    }
}

/// Outcome of checking a presented host key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The hostname already trusts this key
    Known,
    /// First contact for this key type: the key is now trusted for the
    /// hostname and address
    Learned,
    /// The hostname is known with a different key of the same type
    Mismatch,
}

/// Host key store shared by every connection using the same file
pub struct KnownHosts {
    path: PathBuf,
    entries: Mutex<Vec<HostKey>>,
}

impl KnownHosts {
    /// Load `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => contents.lines().flat_map(HostKey::parse).collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether `host` is trusted with exactly this key
    pub fn has_key(&self, host: &str, algorithm: &str, key: &str) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|e| e.host == host && e.matches(algorithm, key))
    }

    /// Check the key presented by `hostname` (resolved to `address`).
    ///
    /// Only entries of the presented key type are compared. A hostname with
    /// no key of that type is trusted immediately and recorded under both the
    /// hostname and the address. Otherwise it must present a recorded key;
    /// when it does, the address is recorded too if it is new. New entries are
    /// in memory even when writing them to disk fails, which is the `Err` case.
    pub fn verify(
        &self,
        hostname: &str,
        address: Option<&str>,
        algorithm: &str,
        key: &str,
    ) -> io::Result<Verdict> {
        let mut entries = self.entries.lock();
        let mut known_host = false;
        let mut matched = false;
        for entry in entries
            .iter()
            .filter(|e| e.host == hostname && e.algorithm == algorithm)
        {
            known_host = true;
            if entry.matches(algorithm, key) {
                matched = true;
                break;
            }
        }

        if known_host && !matched {
            return Ok(Verdict::Mismatch);
        }

        let mut added = Vec::new();
        if !known_host {
            added.push(HostKey {
                host: hostname.to_string(),
                algorithm: algorithm.to_string(),
                key: key.to_string(),
            });
        }
        if let Some(address) = address.filter(|a| *a != hostname) {
            let address_known = entries
                .iter()
                .any(|e| e.host == address && e.matches(algorithm, key));
            if !address_known {
                added.push(HostKey {
                    host: address.to_string(),
                    algorithm: algorithm.to_string(),
                    key: key.to_string(),
                });
            }
        }

        entries.extend(added.iter().cloned());
        drop(entries);

        if !added.is_empty() {
            self.append(&added)?;
        }

        Ok(if known_host {
            Verdict::Known
        } else {
            Verdict::Learned
        })
    }

    fn append(&self, added: &[HostKey]) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        for entry in added {
            writeln!(file, "{} {} {}", entry.host, entry.algorithm, entry.key)?;
        }
        Ok(())
    }
}
