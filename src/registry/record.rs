//! Peer record format
//!
//! One file per peer, plain `KEY=value` lines. Records are parsed with
//! explicit field validation; stored content is data, never executed.
//! The peer's address is deliberately not part of the stored record --
//! it is resolved from DNS on every load.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::keys;

/// Role of a peer in the tunnel network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerKind {
    Server,
    Client,
}

impl PeerKind {
    /// The `TYPE` field value for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerKind::Server => "server",
            PeerKind::Client => "client",
        }
    }
}

impl FromStr for PeerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "server" => Ok(PeerKind::Server),
            "client" => Ok(PeerKind::Client),
            other => Err(Error::InvalidPeerType(other.to_string())),
        }
    }
}

impl fmt::Display for PeerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted identity fields of a peer, exactly what lives on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub name: String,
    pub kind: PeerKind,
    pub private_key: String,
    pub public_key: String,
    pub subnets: Vec<String>,
}

impl StoredRecord {
    /// Parse a record file. `name` is the expected peer name (from the
    /// file name) and is used for error context and cross-checking.
    pub fn parse(name: &str, content: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidRecord {
            name: name.to_string(),
            reason,
        };

        let mut fields: Vec<(&str, &str)> = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| invalid(format!("malformed line: {}", line)))?;
            fields.push((key.trim(), value.trim()));
        }

        let field = |key: &str| fields.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);
        let required = |key: &str| match field(key) {
            Some(v) if !v.is_empty() => Ok(v),
            Some(_) => Err(invalid(format!("empty field {}", key))),
            None => Err(invalid(format!("missing field {}", key))),
        };

        let stored_name = required("NAME")?;
        if stored_name != name {
            return Err(invalid(format!(
                "NAME field '{}' does not match record file",
                stored_name
            )));
        }

        let kind = PeerKind::from_str(required("TYPE")?)?;
        let private_key = required("PRIVKEY")?.to_string();
        let public_key = required("PUBKEY")?.to_string();

        // Keys must be well-formed and actually belong together
        let derived = keys::derive_public(&private_key).map_err(|e| invalid(e.to_string()))?;
        if derived != public_key {
            return Err(invalid("PUBKEY is not derived from PRIVKEY".into()));
        }

        let subnets = field("SUBNETS")
            .map(parse_subnet_list)
            .transpose()
            .map_err(|e| invalid(e.to_string()))?
            .unwrap_or_default();

        Ok(Self {
            name: stored_name.to_string(),
            kind,
            private_key,
            public_key,
            subnets,
        })
    }

    /// Render the record file content (the exact inverse of `parse`)
    pub fn to_file_string(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("NAME={}\n", self.name));
        out.push_str(&format!("TYPE={}\n", self.kind));
        out.push_str(&format!("PRIVKEY={}\n", self.private_key));
        out.push_str(&format!("PUBKEY={}\n", self.public_key));
        if !self.subnets.is_empty() {
            out.push_str(&format!("SUBNETS={}\n", self.subnets.join(",")));
        }
        out
    }

    /// Attach a freshly resolved address, producing a usable record
    pub fn with_address(self, address: Ipv4Addr) -> PeerRecord {
        PeerRecord {
            name: self.name,
            kind: self.kind,
            private_key: self.private_key,
            public_key: self.public_key,
            subnets: self.subnets,
            address,
        }
    }
}

/// A fully loaded peer: persisted identity plus the resolved address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerRecord {
    pub name: String,
    pub kind: PeerKind,
    #[serde(skip_serializing)]
    pub private_key: String,
    pub public_key: String,
    pub subnets: Vec<String>,
    pub address: Ipv4Addr,
}

impl PeerRecord {
    /// The persisted half of this record
    pub fn stored(&self) -> StoredRecord {
        StoredRecord {
            name: self.name.clone(),
            kind: self.kind,
            private_key: self.private_key.clone(),
            public_key: self.public_key.clone(),
            subnets: self.subnets.clone(),
        }
    }

    /// Comma-joined subnet scope, as stored
    pub fn subnet_list(&self) -> String {
        self.subnets.join(",")
    }
}

/// Split and validate a comma-separated list of IPv4 CIDR tokens
pub fn parse_subnet_list(list: &str) -> Result<Vec<String>> {
    let mut subnets = Vec::new();
    for token in list.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        token.parse::<ipnet::Ipv4Net>().map_err(|e| {
            Error::Config(format!("invalid subnet '{}': {}", token, e))
        })?;
        subnets.push(token.to_string());
    }
    Ok(subnets)
}

/// Check a peer name is safe to use as a file name and DNS label
pub fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidRecord {
            name: name.to_string(),
            reason: "peer names must be DNS labels (lowercase letters, digits, '-')".into(),
        })
    }
}
