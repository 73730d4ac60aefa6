//! Cloud-init NoCloud seed composition.
//!
//! The NoCloud datasource configures a VM on first boot from two files it
//! finds on a volume labeled `CIDATA`: `meta-data` (instance identity) and
//! `user-data` (a `#cloud-config` document).  This module composes both
//! payloads from a [`SeedConfig`] and hands them to the ISO builder.  The
//! caller decides where the resulting image bytes go; nothing here touches
//! the filesystem.

use std::hash::{DefaultHasher, Hash, Hasher};

use facet_value::{VArray, Value, value};

use crate::error::SeedError;
use crate::iso9660::{self, IsoFile};

/// Inputs for a first-boot configuration.
pub struct SeedConfig<'a> {
    pub hostname: &'a str,
    pub ssh_keys: &'a [String],
    pub packages: &'a [String],
}

/// Compute a short hash of the composition inputs, for cache-busting seed
/// artifact names on the caller's side.
pub fn seed_hash(config: &SeedConfig) -> String {
    let mut hasher = DefaultHasher::new();
    config.hostname.hash(&mut hasher);
    for k in config.ssh_keys {
        k.hash(&mut hasher);
    }
    for p in config.packages {
        p.hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}

/// Build the NoCloud seed image from the two payload strings.
///
/// The image carries exactly two root-directory entries, `META-DATA` and
/// `USER-DATA`, on a volume labeled `CIDATA`.  Any two strings are valid,
/// including empty ones: the two fixed names always fit the directory
/// sector, so this cannot fail on payload content.
pub fn build_seed_iso(user_data: &str, meta_data: &str) -> Result<Vec<u8>, SeedError> {
    let files = [
        IsoFile {
            name: "meta-data",
            data: meta_data.as_bytes(),
        },
        IsoFile {
            name: "user-data",
            data: user_data.as_bytes(),
        },
    ];
    iso9660::build_iso("CIDATA", &files)
}

/// Compose both payloads from `config` and build the seed image.
pub fn generate_seed(config: &SeedConfig<'_>) -> Result<Vec<u8>, SeedError> {
    let meta_data = build_meta_data(config);
    let user_data = build_user_data(config);
    let iso = build_seed_iso(&user_data, &meta_data)?;
    tracing::debug!(
        hash = %seed_hash(config),
        bytes = iso.len(),
        "generated cloud-init seed image"
    );
    Ok(iso)
}

/// The `meta-data` payload: instance identity for the datasource.
pub fn build_meta_data(config: &SeedConfig) -> String {
    let hostname = config.hostname;
    format!("instance-id: {hostname}\nlocal-hostname: {hostname}\n")
}

/// The `user-data` payload: a `#cloud-config` YAML document.
pub fn build_user_data(config: &SeedConfig) -> String {
    let mut doc = value!({
        "hostname": (config.hostname),
        "manage_etc_hosts": true,
    });

    if !config.ssh_keys.is_empty() {
        let keys = VArray::from_iter(config.ssh_keys.iter().map(|k| Value::from(k.as_str())));
        if let Some(obj) = doc.as_object_mut() {
            obj.insert("ssh_authorized_keys", Value::from(keys));
        }
    }

    if !config.packages.is_empty() {
        let packages = VArray::from_iter(config.packages.iter().map(|p| Value::from(p.as_str())));
        if let Some(obj) = doc.as_object_mut() {
            obj.insert("packages", Value::from(packages));
        }
    }

    let yaml = facet_yaml::to_string(&doc).expect("valid YAML serialization");
    // Drop the "---\n" document separator; cloud-init wants #cloud-config on
    // the very first line, and some versions reject a separator after it.
    let yaml = yaml.strip_prefix("---\n").unwrap_or(&yaml);
    format!("#cloud-config\n{yaml}")
}
