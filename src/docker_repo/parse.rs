// Parsing of `docker ... --format '{{json .}}'` output (one JSON object per line)

use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::Result;
use crate::models::{
    ContainerInfo, ContainerState, DiskUsage, EntryKind, ImageInfo, NetworkInfo, UsageSummary,
    VolumeEntry, VolumeInfo,
};

#[derive(Deserialize)]
struct RawImage {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Repository", default)]
    repository: String,
    #[serde(rename = "Tag", default)]
    tag: String,
    #[serde(rename = "CreatedAt", default)]
    created_at: String,
    #[serde(rename = "Size", default)]
    size: String,
}

#[derive(Deserialize)]
struct RawContainer {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names", default)]
    names: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "Command", default)]
    command: String,
    #[serde(rename = "CreatedAt", default)]
    created_at: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Ports", default)]
    ports: String,
    #[serde(rename = "Labels", default)]
    labels: String,
}

#[derive(Deserialize)]
struct RawNetwork {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Driver", default)]
    driver: String,
    #[serde(rename = "Scope", default)]
    scope: String,
}

#[derive(Deserialize)]
struct RawVolume {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Driver", default)]
    driver: String,
    #[serde(rename = "Mountpoint", default)]
    mountpoint: String,
    #[serde(rename = "Scope", default)]
    scope: String,
}

/// `docker system df` row; every field is a display string.
#[derive(Deserialize)]
struct RawUsage {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "TotalCount", default)]
    total_count: String,
    #[serde(rename = "Active", default)]
    active: String,
    #[serde(rename = "Size", default)]
    size: String,
    #[serde(rename = "Reclaimable", default)]
    reclaimable: String,
}

fn json_lines<T: DeserializeOwned>(stdout: &str) -> Result<Vec<T>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str(l).map_err(Into::into))
        .collect()
}

/// Parses a Docker size string ("77.8MB", "1.2GB (50%)", "0B") to bytes.
/// Docker prints decimal units; `KiB`-style binary units are accepted too.
/// Unparseable input yields 0.
pub fn parse_size(s: &str) -> u64 {
    let s = s.split_whitespace().next().unwrap_or("");
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let Ok(value) = number.parse::<f64>() else {
        return 0;
    };
    let factor: f64 = match unit.to_ascii_lowercase().as_str() {
        "" | "b" => 1.0,
        "kb" | "k" => 1e3,
        "mb" | "m" => 1e6,
        "gb" | "g" => 1e9,
        "tb" | "t" => 1e12,
        "pb" | "p" => 1e15,
        "kib" => 1024.0,
        "mib" => 1024.0 * 1024.0,
        "gib" => 1024.0 * 1024.0 * 1024.0,
        "tib" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return 0,
    };
    (value * factor).round() as u64
}

fn parse_count(s: &str) -> u64 {
    s.trim().parse().unwrap_or(0)
}

pub(super) fn images(stdout: &str) -> Result<Vec<ImageInfo>> {
    Ok(json_lines::<RawImage>(stdout)?
        .into_iter()
        .map(|r| ImageInfo {
            id: r.id,
            repository: r.repository,
            tag: r.tag,
            created_at: r.created_at,
            size: parse_size(&r.size),
        })
        .collect())
}

pub(super) fn containers(stdout: &str) -> Result<Vec<ContainerInfo>> {
    Ok(json_lines::<RawContainer>(stdout)?
        .into_iter()
        .map(|r| ContainerInfo {
            id: r.id,
            // Names is comma-separated when a container has link aliases.
            name: r.names.split(',').next().unwrap_or_default().to_string(),
            image: r.image,
            command: r.command.trim_matches('"').to_string(),
            created_at: r.created_at,
            status: r.status,
            state: ContainerState::from_docker(&r.state),
            ports: r.ports,
            labels: r.labels,
        })
        .collect())
}

pub(super) fn networks(stdout: &str) -> Result<Vec<NetworkInfo>> {
    Ok(json_lines::<RawNetwork>(stdout)?
        .into_iter()
        .map(|r| NetworkInfo {
            id: r.id,
            name: r.name,
            driver: r.driver,
            scope: r.scope,
        })
        .collect())
}

pub(super) fn volumes(stdout: &str) -> Result<Vec<VolumeInfo>> {
    Ok(json_lines::<RawVolume>(stdout)?
        .into_iter()
        .map(|r| VolumeInfo {
            name: r.name,
            driver: r.driver,
            mountpoint: r.mountpoint,
            scope: r.scope,
        })
        .collect())
}

pub(super) fn disk_usage(stdout: &str) -> Result<DiskUsage> {
    let mut usage = DiskUsage::default();
    for row in json_lines::<RawUsage>(stdout)? {
        let summary = UsageSummary {
            total_count: parse_count(&row.total_count),
            active: parse_count(&row.active),
            size: parse_size(&row.size),
            reclaimable: parse_size(&row.reclaimable),
        };
        match row.kind.as_str() {
            "Images" => usage.images = summary,
            "Containers" => usage.containers = summary,
            "Local Volumes" => usage.volumes = summary,
            "Build Cache" => usage.build_cache = summary,
            other => tracing::debug!(kind = other, "ignoring unknown system df row"),
        }
    }
    Ok(usage.with_total())
}

/// Lines of `stat -c '%F|%s|%Y|%n'`.
pub(super) fn volume_entries(stdout: &str) -> Vec<VolumeEntry> {
    let mut entries: Vec<VolumeEntry> = stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(4, '|');
            let kind = fields.next()?;
            let size = fields.next()?.trim().parse().unwrap_or(0);
            let modified = fields.next()?.trim().parse().unwrap_or(0);
            let path = fields.next()?;
            let name = path.rsplit('/').next().unwrap_or(path);
            if name.is_empty() {
                return None;
            }
            let kind = match kind {
                "directory" => EntryKind::Directory,
                "symbolic link" => EntryKind::Symlink,
                k if k.contains("regular") => EntryKind::File,
                _ => EntryKind::Other,
            };
            Some(VolumeEntry {
                name: name.to_string(),
                kind,
                size,
                modified,
            })
        })
        .collect();
    entries.sort_by(|a, b| {
        (a.kind != EntryKind::Directory, &a.name).cmp(&(b.kind != EntryKind::Directory, &b.name))
    });
    entries
}
