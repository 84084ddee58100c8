//! Validated WireGuard interface record built from verified state data.
//!
//! A [`WireguardInterface`] only exists in a valid state: every constructor
//! runs the full set of checks and either returns the record or a
//! [`ValidationError`]. There are no setters. To change a record, take its
//! [`WireguardInterfaceSpec`] with [`WireguardInterface::to_spec`], edit it,
//! and convert it back.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ipnet::IpNet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::loader::ConfigMap;

/// Default WireGuard listen port for federation members.
pub const DEFAULT_LISTEN_PORT: u16 = 35200;

/// Smallest MTU accepted on an interface.
pub const MIN_MTU: u32 = 576;

/// Base64 of 32 bytes: 43 significant characters, the last one carrying 4 bits, plus padding.
const WIREGUARD_KEY_PATTERN: &str = r"^[A-Za-z0-9+/]{42}[AEIMQUYcgkosw048]=$";

static KEY_REGEX: OnceLock<Result<Regex, String>> = OnceLock::new();

/// A field failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Unvalidated interface fields, as found in state data.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WireguardInterfaceSpec {
    #[serde(default)]
    pub address: Vec<String>,
    pub private_key: String,
    pub public_key: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_up: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_up: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_down: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_down: Vec<String>,
}

fn default_listen_port() -> u32 {
    u32::from(DEFAULT_LISTEN_PORT)
}

impl fmt::Debug for WireguardInterfaceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireguardInterfaceSpec")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .field("listen_port", &self.listen_port)
            .field("mtu", &self.mtu)
            .finish_non_exhaustive()
    }
}

/// A WireGuard interface whose fields have all been validated.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireguardInterfaceSpec", into = "WireguardInterfaceSpec")]
pub struct WireguardInterface {
    address: Vec<IpNet>,
    private_key: String,
    public_key: String,
    listen_port: u16,
    mtu: Option<u16>,
    dns: Vec<IpAddr>,
    table: Option<String>,
    pre_up: Vec<String>,
    post_up: Vec<String>,
    pre_down: Vec<String>,
    post_down: Vec<String>,
}

impl WireguardInterface {
    /// Build from a verified data mapping.
    pub fn from_map(map: &ConfigMap) -> Result<Self, ValidationError> {
        let spec: WireguardInterfaceSpec =
            serde_json::from_value(JsonValue::Object(map.clone()))
                .map_err(|e| ValidationError::new("interface", e.to_string()))?;
        Self::try_from(spec)
    }

    /// Unvalidated copy of this record for editing.
    pub fn to_spec(&self) -> WireguardInterfaceSpec {
        WireguardInterfaceSpec {
            address: self.address.iter().map(ToString::to_string).collect(),
            private_key: self.private_key.clone(),
            public_key: self.public_key.clone(),
            listen_port: u32::from(self.listen_port),
            mtu: self.mtu.map(u32::from),
            dns: self.dns.iter().map(ToString::to_string).collect(),
            table: self.table.clone(),
            pre_up: self.pre_up.clone(),
            post_up: self.post_up.clone(),
            pre_down: self.pre_down.clone(),
            post_down: self.post_down.clone(),
        }
    }

    pub fn address(&self) -> &[IpNet] {
        &self.address
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    pub fn mtu(&self) -> Option<u16> {
        self.mtu
    }

    pub fn dns(&self) -> &[IpAddr] {
        &self.dns
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn pre_up(&self) -> &[String] {
        &self.pre_up
    }

    pub fn post_up(&self) -> &[String] {
        &self.post_up
    }

    pub fn pre_down(&self) -> &[String] {
        &self.pre_down
    }

    pub fn post_down(&self) -> &[String] {
        &self.post_down
    }
}

impl fmt::Debug for WireguardInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireguardInterface")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .field("listen_port", &self.listen_port)
            .field("mtu", &self.mtu)
            .field("dns", &self.dns)
            .finish_non_exhaustive()
    }
}

impl TryFrom<WireguardInterfaceSpec> for WireguardInterface {
    type Error = ValidationError;

    fn try_from(spec: WireguardInterfaceSpec) -> Result<Self, Self::Error> {
        if spec.address.is_empty() {
            return Err(ValidationError::new(
                "address",
                "at least one address is required",
            ));
        }
        let mut seen = HashSet::new();
        let mut address = Vec::with_capacity(spec.address.len());
        for raw in &spec.address {
            let net = parse_interface_address(raw)?;
            if !seen.insert(net) {
                return Err(ValidationError::new(
                    "address",
                    format!("duplicate address {}", net),
                ));
            }
            address.push(net);
        }

        validate_key("private_key", &spec.private_key)?;
        validate_key("public_key", &spec.public_key)?;
        if spec.private_key == spec.public_key {
            return Err(ValidationError::new(
                "public_key",
                "public_key must differ from private_key",
            ));
        }

        let listen_port = u16::try_from(spec.listen_port)
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| {
                ValidationError::new(
                    "listen_port",
                    format!("{} is not in 1..=65535", spec.listen_port),
                )
            })?;

        let mtu = match spec.mtu {
            None => None,
            Some(mtu) => Some(
                u16::try_from(mtu)
                    .ok()
                    .filter(|m| u32::from(*m) >= MIN_MTU)
                    .ok_or_else(|| {
                        ValidationError::new(
                            "mtu",
                            format!("{} is not in {}..=65535", mtu, MIN_MTU),
                        )
                    })?,
            ),
        };

        let dns = spec
            .dns
            .iter()
            .map(|raw| {
                raw.trim().parse::<IpAddr>().map_err(|e| {
                    ValidationError::new("dns", format!("'{}' is not an IP address: {}", raw, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(table) = &spec.table {
            if table.trim().is_empty() {
                return Err(ValidationError::new("table", "table must not be empty"));
            }
        }

        Ok(Self {
            address,
            private_key: spec.private_key,
            public_key: spec.public_key,
            listen_port,
            mtu,
            dns,
            table: spec.table,
            pre_up: spec.pre_up,
            post_up: spec.post_up,
            pre_down: spec.pre_down,
            post_down: spec.post_down,
        })
    }
}

impl From<WireguardInterface> for WireguardInterfaceSpec {
    fn from(interface: WireguardInterface) -> Self {
        interface.to_spec()
    }
}

/// Interface addresses carry a prefix; a bare IP is taken as a host route.
fn parse_interface_address(raw: &str) -> Result<IpNet, ValidationError> {
    let raw = raw.trim();
    if let Ok(net) = raw.parse::<IpNet>() {
        return Ok(net);
    }
    raw.parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| ValidationError::new("address", format!("'{}' is not a CIDR address", raw)))
}

fn key_regex() -> Result<&'static Regex, ValidationError> {
    KEY_REGEX
        .get_or_init(|| Regex::new(WIREGUARD_KEY_PATTERN).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| ValidationError::new("key", format!("key pattern failed to compile: {}", e)))
}

fn validate_key(field: &str, key: &str) -> Result<(), ValidationError> {
    if !key_regex()?.is_match(key) {
        return Err(ValidationError::new(
            field,
            "expected a 44 character base64 WireGuard key",
        ));
    }
    match BASE64.decode(key) {
        Ok(bytes) if bytes.len() == 32 => Ok(()),
        _ => Err(ValidationError::new(field, "key does not decode to 32 bytes")),
    }
}
