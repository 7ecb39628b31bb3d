//! Lookups of named entries within an application.
use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::Volume;

use crate::spec::{ConfigMapMod, Named, SecretMod, VolumeClaim};

fn find<'a, T: Named>(entries: &'a [T], name: &str) -> Option<&'a T> {
    entries.iter().find(|entry| entry.name() == Some(name))
}

pub fn find_config_map<'a>(config_maps: &'a [ConfigMapMod], name: &str) -> Option<&'a ConfigMapMod> {
    find(config_maps, name)
}

pub fn find_secret<'a>(secrets: &'a [SecretMod], name: &str) -> Option<&'a SecretMod> {
    find(secrets, name)
}

pub fn is_volume_claim_defined(claims: &[VolumeClaim], name: &str) -> bool {
    find(claims, name).is_some()
}

pub fn is_volume_defined(volumes: &[Volume], name: &str) -> bool {
    volumes.iter().any(|volume| volume.name == name)
}

/// The keys of `data`, in ascending order.
pub fn config_map_keys(config_map: &ConfigMapMod) -> Vec<&str> {
    config_map
        .data
        .iter()
        .flatten()
        .map(|(key, _)| key.as_str())
        .collect()
}

/// The union of the keys of `data` and `stringData`, in ascending order.
pub fn secret_keys(secret: &SecretMod) -> Vec<&str> {
    let data = secret.data.iter().flatten().map(|(key, _)| key.as_str());
    let string_data = secret
        .string_data
        .iter()
        .flatten()
        .map(|(key, _)| key.as_str());
    data.chain(string_data)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
