//! Resolution of references between containers and the resources of an application.
use k8s_openapi::api::core::v1::{Container, Volume};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::debug;

use crate::{
    builder::pod::{
        env::{env_var_from_config_map, env_var_from_secret},
        volume::VolumeBuilder,
    },
    spec::{ConfigMapMod, ContainerSpec, SecretMod, VolumeClaim, lookup},
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to resolve {collection}[{index}]"))]
    ResolveContainer {
        source: ContainerError,
        collection: &'static str,
        index: usize,
    },

    #[snafu(display(
        "neither a volume claim nor a pod volume named {name:?} is defined, referenced in {collection}[{container_index}].volumeMounts[{mount_index}]"
    ))]
    VolumeNotDefined {
        name: String,
        collection: &'static str,
        container_index: usize,
        mount_index: usize,
    },
}

#[derive(Debug, Snafu)]
pub enum ContainerError {
    #[snafu(display(
        "cannot define \"health\" together with \"livenessProbe\" or \"readinessProbe\""
    ))]
    HealthWithProbes,

    #[snafu(display("config map {name:?} not found, referenced in envFrom[{index}].configMapRef"))]
    ConfigMapNotFound { name: String, index: usize },

    #[snafu(display("secret {name:?} not found, referenced in envFrom[{index}].secretRef"))]
    SecretNotFound { name: String, index: usize },
}

/// Turns the `health` shorthand into identical liveness and readiness probes.
pub fn populate_probes(mut container: ContainerSpec) -> Result<ContainerSpec, ContainerError> {
    let Some(health) = container.health.take() else {
        return Ok(container);
    };
    ensure!(
        container.container.liveness_probe.is_none()
            && container.container.readiness_probe.is_none(),
        HealthWithProbesSnafu
    );

    container.container.liveness_probe = Some(health.clone());
    container.container.readiness_probe = Some(health);
    Ok(container)
}

/// Expands every `envFrom` entry into one environment variable per key of the referenced
/// config map or secret.
///
/// The expanded variables come first, followed by the explicitly declared ones. Variables
/// with the same name are not merged.
pub fn populate_env_from(
    mut container: ContainerSpec,
    config_maps: &[ConfigMapMod],
    secrets: &[SecretMod],
) -> Result<ContainerSpec, ContainerError> {
    let Some(env_from) = container.container.env_from.take() else {
        return Ok(container);
    };

    let mut env = Vec::new();
    for (index, source) in env_from.into_iter().enumerate() {
        let prefix = source.prefix.unwrap_or_default();

        if let Some(config_map_ref) = source.config_map_ref {
            let config_map = lookup::find_config_map(config_maps, &config_map_ref.name)
                .context(ConfigMapNotFoundSnafu {
                    name: &config_map_ref.name,
                    index,
                })?;
            env.extend(lookup::config_map_keys(config_map).into_iter().map(|key| {
                env_var_from_config_map(format!("{prefix}{key}"), &config_map_ref.name, key)
            }));
        }

        if let Some(secret_ref) = source.secret_ref {
            let secret = lookup::find_secret(secrets, &secret_ref.name).context(
                SecretNotFoundSnafu {
                    name: &secret_ref.name,
                    index,
                },
            )?;
            env.extend(
                lookup::secret_keys(secret)
                    .into_iter()
                    .map(|key| env_var_from_secret(format!("{prefix}{key}"), &secret_ref.name, key)),
            );
        }
    }

    debug!(
        container = container.container.name,
        expanded = env.len(),
        "expanded envFrom references"
    );
    env.extend(container.container.env.take().unwrap_or_default());
    container.container.env = (!env.is_empty()).then_some(env);
    Ok(container)
}

/// Resolves the probes and `envFrom` references of every container.
///
/// `collection` is the input key of the containers and only used in error messages.
pub fn populate_containers(
    containers: Vec<ContainerSpec>,
    collection: &'static str,
    config_maps: &[ConfigMapMod],
    secrets: &[SecretMod],
) -> Result<Vec<Container>> {
    containers
        .into_iter()
        .enumerate()
        .map(|(index, container)| {
            populate_probes(container)
                .and_then(|container| populate_env_from(container, config_maps, secrets))
                .map(|container| container.container)
                .context(ResolveContainerSnafu { collection, index })
        })
        .collect()
}

/// Returns the pod volumes needed for the volume mounts of `containers` that refer to a
/// volume claim.
///
/// Mounts of already existing pod `volumes` need no new volume. Mounts that match neither
/// are an error, `collection` is the input key of the containers and only used in its message.
pub fn populate_volumes<'a>(
    containers: impl IntoIterator<Item = &'a Container>,
    collection: &'static str,
    claims: &[VolumeClaim],
    volumes: &[Volume],
) -> Result<Vec<Volume>> {
    let mut populated: Vec<Volume> = Vec::new();
    for (container_index, container) in containers.into_iter().enumerate() {
        for (mount_index, mount) in container.volume_mounts.iter().flatten().enumerate() {
            if lookup::is_volume_defined(volumes, &mount.name)
                || lookup::is_volume_defined(&populated, &mount.name)
            {
                continue;
            }
            ensure!(
                lookup::is_volume_claim_defined(claims, &mount.name),
                VolumeNotDefinedSnafu {
                    name: &mount.name,
                    collection,
                    container_index,
                    mount_index,
                }
            );

            debug!(claim = mount.name, "adding pod volume for volume claim");
            populated.push(
                VolumeBuilder::new(&mount.name)
                    .with_persistent_volume_claim(&mount.name)
                    .build(),
            );
        }
    }
    Ok(populated)
}
