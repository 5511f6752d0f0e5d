//! Collection profiles ("modules") and their validation.
//!
//! A [`Config`] maps module names to [`Module`]s: the OIDs to GET, the
//! subtrees to walk, the metric definitions that decode the results, and
//! the SNMP session parameters. Configuration is loaded from YAML; the
//! validation rules that the scrape pipeline relies on (version range,
//! SNMPv3 credential ladder, index types) are enforced here, at load
//! time, not during the scrape.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Full configuration: module name to collection profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config(pub BTreeMap<String, Module>);

impl Config {
    /// Load and validate a YAML configuration file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::load(&content)
    }

    /// Parse and validate YAML configuration.
    pub fn load(content: &str) -> Result<Config> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("cannot parse configuration: {}", e)))?;
        for (name, module) in &config.0 {
            module
                .validate()
                .map_err(|e| Error::config(format!("module {}: {}", name, e)))?;
        }
        Ok(config)
    }

    /// Look up a module by name.
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.0.get(name)
    }
}

/// One collection profile: what to query and how to decode it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    /// Subtree roots to walk.
    #[serde(default)]
    pub walk: Vec<String>,
    /// Scalar OIDs to GET.
    #[serde(default)]
    pub get: Vec<String>,
    /// Metric definitions matched against returned PDUs.
    #[serde(default)]
    pub metrics: Vec<Metric>,
    /// Session parameters, inlined at the module level in YAML.
    #[serde(flatten)]
    pub walk_params: WalkParams,
}

impl Module {
    /// Validate the module against the rules the pipeline assumes.
    pub fn validate(&self) -> Result<()> {
        self.walk_params.validate()
    }
}

/// SNMP session parameters for a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkParams {
    /// SNMP version.
    #[serde(default)]
    pub version: Version,
    /// Max-repetitions for GETBULK; also bounds GET batch sizes.
    #[serde(default = "default_max_repetitions")]
    pub max_repetitions: u8,
    /// Retries per request.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Timeout of each retry attempt.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Authentication parameters.
    #[serde(default)]
    pub auth: Auth,
}

fn default_max_repetitions() -> u8 {
    25
}
fn default_retries() -> u32 {
    3
}
fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

impl Default for WalkParams {
    fn default() -> Self {
        Self {
            version: Version::default(),
            max_repetitions: default_max_repetitions(),
            retries: default_retries(),
            timeout: default_timeout(),
            auth: Auth::default(),
        }
    }
}

impl WalkParams {
    /// SNMPv3 credential ladder: authPriv implies the authNoPriv rules,
    /// which imply the noAuthNoPriv rules.
    pub fn validate(&self) -> Result<()> {
        if self.version != Version::V3 {
            return Ok(());
        }
        let auth = &self.auth;
        if auth.security_level >= SecurityLevel::AuthPriv && auth.priv_password.is_empty() {
            return Err(Error::config(
                "priv password is missing, required for SNMPv3 with priv",
            ));
        }
        if auth.security_level >= SecurityLevel::AuthNoPriv && auth.password.is_empty() {
            return Err(Error::config(
                "auth password is missing, required for SNMPv3 with auth",
            ));
        }
        if auth.username.is_empty() {
            return Err(Error::config(
                "auth username is missing, required for SNMPv3",
            ));
        }
        Ok(())
    }
}

/// SNMP protocol version, written as `1`, `2`, or `3` in YAML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Version {
    /// SNMPv1.
    V1,
    /// SNMPv2c.
    #[default]
    V2c,
    /// SNMPv3 with USM security.
    V3,
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(match self {
            Version::V1 => 1,
            Version::V2c => 2,
            Version::V3 => 3,
        })
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            1 => Ok(Version::V1),
            2 => Ok(Version::V2c),
            3 => Ok(Version::V3),
            other => Err(serde::de::Error::custom(format!(
                "SNMP version must be 1, 2 or 3, got {}",
                other
            ))),
        }
    }
}

/// SNMPv3 security level.
///
/// Ordered so that the validation ladder can use comparisons:
/// `NoAuthNoPriv < AuthNoPriv < AuthPriv`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SecurityLevel {
    #[default]
    #[serde(rename = "noAuthNoPriv")]
    NoAuthNoPriv,
    #[serde(rename = "authNoPriv")]
    AuthNoPriv,
    #[serde(rename = "authPriv")]
    AuthPriv,
}

/// SNMPv3 authentication protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthProtocol {
    #[default]
    #[serde(rename = "MD5")]
    Md5,
    #[serde(rename = "SHA")]
    Sha,
}

/// SNMPv3 privacy protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivProtocol {
    #[default]
    #[serde(rename = "DES")]
    Des,
    #[serde(rename = "AES")]
    Aes,
}

/// Authentication parameters for all SNMP versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auth {
    /// v1/v2c community string.
    #[serde(default = "default_community")]
    pub community: Secret,
    /// SNMPv3 security level.
    #[serde(default)]
    pub security_level: SecurityLevel,
    /// SNMPv3 username.
    #[serde(default)]
    pub username: String,
    /// SNMPv3 authentication passphrase.
    #[serde(default)]
    pub password: Secret,
    /// SNMPv3 authentication protocol.
    #[serde(default)]
    pub auth_protocol: AuthProtocol,
    /// SNMPv3 privacy protocol.
    #[serde(default)]
    pub priv_protocol: PrivProtocol,
    /// SNMPv3 privacy passphrase.
    #[serde(default)]
    pub priv_password: Secret,
    /// SNMPv3 context name.
    #[serde(default)]
    pub context_name: String,
}

fn default_community() -> Secret {
    Secret::from("public")
}

impl Default for Auth {
    fn default() -> Self {
        Self {
            community: default_community(),
            security_level: SecurityLevel::default(),
            username: String::new(),
            password: Secret::default(),
            auth_protocol: AuthProtocol::default(),
            priv_protocol: PrivProtocol::default(),
            priv_password: Secret::default(),
            context_name: String::new(),
        }
    }
}

/// A credential that must not leak through logs or re-serialization.
///
/// `Debug` and `Serialize` render `<secret>`; the underlying string is
/// zeroized on drop.
#[derive(Clone, Default, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Access the underlying value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is unset.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Secret(s.to_string())
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Secret(s)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<secret>")
    }
}

impl Serialize for Secret {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(if self.0.is_empty() { "" } else { "<secret>" })
    }
}

/// One metric definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metric {
    /// Sample name.
    pub name: String,
    /// Base OID in dotted notation.
    pub oid: String,
    /// Metric type tag. `counter`, `gauge`, `Float` and `Double` emit
    /// numeric samples; anything else is treated as a string.
    #[serde(rename = "type", default)]
    pub metric_type: String,
    /// Help text.
    #[serde(default)]
    pub help: String,
    /// Ordered index declarations decoding the OID suffix.
    #[serde(default)]
    pub indexes: Vec<Index>,
    /// Ordered cross-PDU label lookups.
    #[serde(default)]
    pub lookups: Vec<Lookup>,
    /// Name-suffix to regex alternatives for string extraction.
    #[serde(rename = "regex_extracts", default)]
    pub regex_extracts: BTreeMap<String, Vec<RegexpExtract>>,
}

/// One index declaration: how to decode the next piece of the OID suffix
/// into a label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    /// Label to set.
    pub labelname: String,
    /// Index decoding type.
    #[serde(rename = "type")]
    pub index_type: IndexType,
    /// Fixed content size for octet-string types; 0 means the length is
    /// carried in the first OID component.
    #[serde(default)]
    pub fixed_size: usize,
}

/// One cross-PDU lookup: dereference `<oid>.<label arcs...>` within the
/// scrape's PDU index and rewrite a label from the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lookup {
    /// Labels whose raw index arcs are appended to the base OID, in order.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Label to set (may overwrite an index label).
    pub labelname: String,
    /// Base OID of the table column to dereference.
    pub oid: String,
    /// Rendering type for the looked-up value.
    #[serde(rename = "type", default)]
    pub lookup_type: Option<IndexType>,
}

/// Index decoding types.
///
/// The YAML names follow SNMP SMI conventions and are deliberately not
/// normalized; an unrecognized name is rejected when the configuration is
/// loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    Integer32,
    Integer,
    #[serde(rename = "gauge")]
    Gauge,
    #[serde(rename = "counter")]
    Counter,
    PhysAddress48,
    OctetString,
    DisplayString,
    IpAddr,
    InetAddressType,
}

impl IndexType {
    /// Resolve a type name at runtime. Used when free-form metric type
    /// strings feed the byte-sequence renderer.
    pub fn from_name(name: &str) -> Option<IndexType> {
        match name {
            "Integer32" => Some(IndexType::Integer32),
            "Integer" => Some(IndexType::Integer),
            "gauge" => Some(IndexType::Gauge),
            "counter" => Some(IndexType::Counter),
            "PhysAddress48" => Some(IndexType::PhysAddress48),
            "OctetString" => Some(IndexType::OctetString),
            "DisplayString" => Some(IndexType::DisplayString),
            "IpAddr" => Some(IndexType::IpAddr),
            "InetAddressType" => Some(IndexType::InetAddressType),
            _ => None,
        }
    }
}

/// One regex extraction alternative: a pattern and a substitution
/// template whose expansion must parse as a float.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegexpExtract {
    /// Substitution template (`$1`-style group references).
    #[serde(default = "default_extract_value")]
    pub value: String,
    /// Compiled pattern.
    pub regex: Regexp,
}

fn default_extract_value() -> String {
    "$1".to_string()
}

/// A compiled regular expression.
///
/// Patterns loaded from configuration are wrapped in `^(?:...)$` so a
/// configured pattern must match the whole rendered value.
#[derive(Debug, Clone)]
pub struct Regexp(pub regex::Regex);

impl Serialize for Regexp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for Regexp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        let regex = regex::Regex::new(&format!("^(?:{})$", pattern))
            .map_err(serde::de::Error::custom)?;
        Ok(Regexp(regex))
    }
}
