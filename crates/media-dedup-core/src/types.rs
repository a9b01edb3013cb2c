use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of a hex-encoded SHA-256 digest
pub const DIGEST_HEX_LEN: usize = 64;

/// Hex-encoded SHA-256 content digest, always lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Digest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != DIGEST_HEX_LEN {
            return Err(format!(
                "digest has {} characters, expected {}",
                s.len(),
                DIGEST_HEX_LEN
            ));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err("digest is not hexadecimal".to_string());
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Digest {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One `(digest, path)` record of a hash store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashEntry {
    pub digest: Digest,
    /// Absolute path as recorded in the store
    pub path: String,
}

impl HashEntry {
    pub fn new(digest: Digest, path: impl Into<String>) -> Self {
        Self {
            digest,
            path: path.into(),
        }
    }
}

/// Decision recorded for one path of a duplicate group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// The survivor of the group
    Keep,

    /// Marked for removal from the active library
    Quarantine,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Keep => "KEEP",
            Action::Quarantine => "QUARANTINE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a duplicate plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRow {
    pub digest: Digest,
    pub action: Action,
    pub path: String,
}

/// All paths sharing one digest, in merge order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub digest: Digest,
    pub paths: Vec<String>,
}

impl DuplicateGroup {
    /// A group is a duplicate group when it holds at least two paths
    pub fn is_duplicate(&self) -> bool {
        self.paths.len() >= 2
    }

    /// Label the first path KEEP and every other path QUARANTINE.
    /// Groups with a single path produce no rows.
    pub fn plan_rows(&self) -> Vec<PlanRow> {
        if !self.is_duplicate() {
            return Vec::new();
        }
        self.paths
            .iter()
            .enumerate()
            .map(|(idx, path)| PlanRow {
                digest: self.digest.clone(),
                action: if idx == 0 {
                    Action::Keep
                } else {
                    Action::Quarantine
                },
                path: path.clone(),
            })
            .collect()
    }
}
