// Structured container creation config (the "run"/"create" form of the UI and of
// adapter-managed containers in config.toml).

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::DockerError;

/// Ordered key/value pairs; iteration order is insertion order.
///
/// Deserializes from a map (document order is kept) or from a list of
/// `key=value` strings. Scalar values (numbers, booleans) are stringified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValues(Vec<(String, String)>);

impl KeyValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends, or replaces the value in place when the key already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KeyValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut kv = KeyValues::new();
        for (k, v) in iter {
            kv.insert(k, v);
        }
        kv
    }
}

impl Serialize for KeyValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Str(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

struct KeyValuesVisitor;

impl<'de> Visitor<'de> for KeyValuesVisitor {
    type Value = KeyValues;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of strings or a list of \"key=value\" strings")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<KeyValues, A::Error> {
        let mut kv = KeyValues::new();
        while let Some((key, value)) = access.next_entry::<String, Scalar>()? {
            kv.insert(key, value.into_string());
        }
        Ok(kv)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<KeyValues, A::Error> {
        let mut kv = KeyValues::new();
        while let Some(item) = access.next_element::<String>()? {
            match item.split_once('=') {
                Some((k, v)) if !k.is_empty() => kv.insert(k, v),
                _ => {
                    return Err(de::Error::custom(format!(
                        "expected \"key=value\", got \"{}\"",
                        item
                    )));
                }
            }
        }
        Ok(kv)
    }
}

impl<'de> Deserialize<'de> for KeyValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(KeyValuesVisitor)
    }
}

/// A command given either as one string or as an argument list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Line(String),
    Args(Vec<String>),
}

impl CommandSpec {
    pub fn is_empty(&self) -> bool {
        match self {
            CommandSpec::Line(s) => s.trim().is_empty(),
            CommandSpec::Args(a) => a.is_empty(),
        }
    }

    pub fn to_vec(&self) -> Vec<String> {
        match self {
            CommandSpec::Line(s) => vec![s.clone()],
            CommandSpec::Args(a) => a.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    Tcp,
    Udp,
    Sctp,
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PortProtocol::Tcp => "tcp",
            PortProtocol::Udp => "udp",
            PortProtocol::Sctp => "sctp",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub container_port: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<PortProtocol>,
}

impl PortMapping {
    pub fn new(container_port: u32) -> Self {
        Self {
            container_port,
            host_port: None,
            host_ip: None,
            protocol: None,
        }
    }

    pub fn published(container_port: u32, host_port: u32) -> Self {
        Self {
            host_port: Some(host_port),
            ..Self::new(container_port)
        }
    }

    pub fn protocol_or_default(&self) -> PortProtocol {
        self.protocol.unwrap_or(PortProtocol::Tcp)
    }
}

/// `-p` syntax: `[hostIP:][hostPort:]containerPort[/protocol]`.
impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.host_ip.as_deref().filter(|ip| !ip.is_empty()), self.host_port) {
            (Some(ip), Some(hp)) => write!(f, "{}:{}:", ip, hp)?,
            (Some(ip), None) => write!(f, "{}::", ip)?,
            (None, Some(hp)) => write!(f, "{}:", hp)?,
            (None, None) => {}
        }
        write!(f, "{}", self.container_port)?;
        if let Some(proto) = self.protocol {
            write!(f, "/{}", proto)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountType {
    Bind,
    Volume,
    Tmpfs,
    Npipe,
}

impl fmt::Display for MountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MountType::Bind => "bind",
            MountType::Volume => "volume",
            MountType::Tmpfs => "tmpfs",
            MountType::Npipe => "npipe",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountSpec {
    #[serde(rename = "type")]
    pub mount_type: MountType,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

impl MountSpec {
    pub fn new(mount_type: MountType, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            mount_type,
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    /// `--mount` value: `type=…,target=…[,source=…][,readonly]`.
    pub fn to_arg(&self) -> String {
        let mut arg = format!("type={},target={}", self.mount_type, self.target);
        if !self.source.is_empty() {
            arg.push_str(",source=");
            arg.push_str(&self.source);
        }
        if self.read_only {
            arg.push_str(",readonly");
        }
        arg
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicyName {
    #[serde(rename = "no")]
    No,
    #[serde(rename = "always")]
    Always,
    #[serde(rename = "unless-stopped")]
    UnlessStopped,
    #[serde(rename = "on-failure")]
    OnFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartPolicy {
    pub name: RestartPolicyName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_retry_count: Option<u32>,
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name, self.maximum_retry_count) {
            (RestartPolicyName::No, _) => write!(f, "no"),
            (RestartPolicyName::Always, _) => write!(f, "always"),
            (RestartPolicyName::UnlessStopped, _) => write!(f, "unless-stopped"),
            (RestartPolicyName::OnFailure, None) => write!(f, "on-failure"),
            (RestartPolicyName::OnFailure, Some(n)) => write!(f, "on-failure:{}", n),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    pub driver: String,
    #[serde(default)]
    pub options: KeyValues,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityOptions {
    pub privileged: bool,
    pub cap_add: Vec<String>,
    pub cap_drop: Vec<String>,
    pub no_new_privileges: bool,
    pub seccomp_profile: Option<String>,
    pub apparmor_profile: Option<String>,
    /// SELinux labels, e.g. `level:s0:c100,c200`.
    pub selinux_labels: Vec<String>,
    pub device_cgroup_rules: Vec<String>,
    pub group_add: Vec<String>,
    pub userns_mode: Option<String>,
    pub pid_mode: Option<String>,
    pub ipc_mode: Option<String>,
    pub uts_mode: Option<String>,
    pub cgroupns_mode: Option<String>,
}

impl SecurityOptions {
    /// `--security-opt` values in a fixed order.
    pub fn security_opts(&self) -> Vec<String> {
        let mut opts = Vec::new();
        if self.no_new_privileges {
            opts.push("no-new-privileges".to_string());
        }
        if let Some(p) = self.seccomp_profile.as_deref().filter(|p| !p.is_empty()) {
            opts.push(format!("seccomp={}", p));
        }
        if let Some(p) = self.apparmor_profile.as_deref().filter(|p| !p.is_empty()) {
            opts.push(format!("apparmor={}", p));
        }
        for label in self.selinux_labels.iter().filter(|l| !l.is_empty()) {
            opts.push(format!("label={}", label));
        }
        opts
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceLimits {
    pub cpus: Option<f64>,
    pub cpu_shares: Option<u32>,
    pub cpuset_cpus: Option<String>,
    /// Docker size string, e.g. `512m`.
    pub memory: Option<String>,
    pub memory_reservation: Option<String>,
    pub memory_swap: Option<String>,
    pub pids_limit: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerConfig {
    pub name: String,
    pub image: String,
    pub tty: bool,
    pub interactive: bool,
    /// `--rm`
    pub remove: bool,
    pub hostname: Option<String>,
    pub domainname: Option<String>,
    pub environment: KeyValues,
    pub env_files: Vec<String>,
    pub labels: KeyValues,
    pub publish_all_ports: bool,
    pub ports: Vec<PortMapping>,
    /// Legacy `-v` strings (`src:dst[:opts]`).
    pub volumes: Vec<String>,
    pub mounts: Vec<MountSpec>,
    pub restart: Option<RestartPolicy>,
    pub user: Option<String>,
    pub workdir: Option<String>,
    pub entrypoint: Option<CommandSpec>,
    pub logging: Option<LoggingConfig>,
    pub security: SecurityOptions,
    pub network_mode: Option<String>,
    pub extra_hosts: Vec<String>,
    pub dns: Vec<String>,
    pub sysctls: KeyValues,
    pub stop_signal: Option<String>,
    pub stop_timeout: Option<u32>,
    pub resources: ResourceLimits,
    pub command: Option<CommandSpec>,
}

fn is_valid_container_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// `^[/a-zA-Z0-9_.-]+$`
fn is_valid_volume_source(source: &str) -> bool {
    !source.is_empty()
        && source
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '.' | '-'))
}

fn port_in_range(port: u32) -> bool {
    (1..=65535).contains(&port)
}

/// Parses a Docker memory string (`1024`, `512k`, `256m`, `2g`) into bytes.
pub fn parse_memory(value: &str) -> Result<i64, DockerError> {
    let v = value.trim().to_ascii_lowercase();
    let v = v.strip_suffix('b').unwrap_or(&v);
    let (digits, factor) = match v.chars().last() {
        Some('k') => (&v[..v.len() - 1], 1024_i64),
        Some('m') => (&v[..v.len() - 1], 1024 * 1024),
        Some('g') => (&v[..v.len() - 1], 1024 * 1024 * 1024),
        _ => (v, 1),
    };
    let n: f64 = digits
        .trim()
        .parse()
        .map_err(|_| DockerError::invalid(format!("invalid memory size \"{}\"", value)))?;
    if n < 0.0 || !n.is_finite() {
        return Err(DockerError::invalid(format!("invalid memory size \"{}\"", value)));
    }
    Ok((n * factor as f64) as i64)
}

impl ContainerConfig {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    /// Checks every invariant and reports all violations at once.
    pub fn validate(&self) -> Result<(), DockerError> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("name is required".to_string());
        } else if !is_valid_container_name(&self.name) {
            errors.push(format!(
                "name \"{}\" may only contain [a-zA-Z0-9_.-] and must start with a letter or digit",
                self.name
            ));
        }
        let image = self.image.trim();
        if image.is_empty() {
            errors.push("image is required".to_string());
        } else if image.starts_with('-') || image.chars().any(char::is_whitespace) {
            errors.push(format!(
                "image \"{}\" must not start with '-' or contain whitespace",
                self.image
            ));
        }

        for (i, mount) in self.mounts.iter().enumerate() {
            if mount.target.trim().is_empty() {
                errors.push(format!("mount #{}: target is required", i + 1));
            }
            // Either character would start a new field of the --mount value.
            for (field, value) in [("target", &mount.target), ("source", &mount.source)] {
                if value.contains([',', '"']) || value.chars().any(char::is_control) {
                    errors.push(format!(
                        "mount #{}: {} \"{}\" must not contain ',', '\"' or control characters",
                        i + 1,
                        field,
                        value
                    ));
                }
            }
            match mount.mount_type {
                MountType::Volume if !is_valid_volume_source(&mount.source) => errors.push(format!(
                    "mount #{}: volume source \"{}\" must match [/a-zA-Z0-9_.-]+",
                    i + 1,
                    mount.source
                )),
                MountType::Tmpfs if !mount.source.is_empty() => errors.push(format!(
                    "mount #{}: tmpfs mounts must not have a source",
                    i + 1
                )),
                MountType::Bind | MountType::Npipe if mount.source.trim().is_empty() => errors.push(
                    format!("mount #{}: {} mounts require a source", i + 1, mount.mount_type),
                ),
                _ => {}
            }
        }

        if !self.publish_all_ports {
            self.validate_ports(&mut errors);
        }

        if let Some(cpus) = self.resources.cpus
            && (cpus <= 0.0 || !cpus.is_finite())
        {
            errors.push(format!("cpus must be > 0, got {}", cpus));
        }
        for value in [
            &self.resources.memory,
            &self.resources.memory_reservation,
            &self.resources.memory_swap,
        ]
        .into_iter()
        .flatten()
        {
            // -1 means unlimited swap
            if value.trim() != "-1"
                && let Err(e) = parse_memory(value)
            {
                errors.push(e.to_string().trim_start_matches("invalid configuration: ").to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DockerError::InvalidConfig(errors))
        }
    }

    fn validate_ports(&self, errors: &mut Vec<String>) {
        let mut container_ports = HashSet::new();
        let mut host_ports = HashSet::new();
        for port in &self.ports {
            if !port_in_range(port.container_port) {
                errors.push(format!(
                    "container port {} is out of range 1-65535",
                    port.container_port
                ));
            }
            let proto = port.protocol_or_default();
            if !container_ports.insert((port.container_port, proto)) {
                errors.push(format!(
                    "container port {}/{} is mapped more than once",
                    port.container_port, proto
                ));
            }
            if let Some(hp) = port.host_port {
                if !port_in_range(hp) {
                    errors.push(format!("host port {} is out of range 1-65535", hp));
                }
                let ip = port.host_ip.clone().unwrap_or_default();
                if !host_ports.insert((ip, hp, proto)) {
                    errors.push(format!("host port {}/{} is bound more than once", hp, proto));
                }
            }
        }
    }
}
