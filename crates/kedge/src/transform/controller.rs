use std::collections::BTreeMap;

use k8s_openapi::{
    Resource,
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        batch::v1::{Job, JobSpec},
        core::v1::{PodSpec, PodTemplateSpec},
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta},
};
use snafu::{ResultExt, Snafu, ensure};
use tracing::debug;

use crate::{
    builder::meta::ObjectMetaExt,
    spec::{ControllerFields, DeploymentConfigSpec, PodSpecMod, resolve},
    transform::{DeploymentConfig, Object},
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "the pod spec is given both at the top level and in \"template.spec\", use only one of them"
    ))]
    PodSpecInTwoPlaces,

    #[snafu(display("failed to resolve containers"))]
    ResolveContainers { source: resolve::Error },
}

/// The controller specific part of an application.
pub enum Controller {
    Deployment(DeploymentSpec),
    Job {
        spec: JobSpec,
        active_deadline_seconds: Option<i64>,
    },
    DeploymentConfig(DeploymentConfigSpec),
}

impl Controller {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Deployment(_) => Deployment::KIND,
            Self::Job { .. } => Job::KIND,
            Self::DeploymentConfig(_) => DeploymentConfig::KIND,
        }
    }

    /// Creates the controller object, or `None` when neither a pod spec nor any controller
    /// setting is given.
    pub fn create(self, pod: PodSpecMod, fields: &ControllerFields) -> Result<Option<Object>> {
        let object = match self {
            Self::Deployment(mut spec) => {
                if pod.is_empty() && spec == DeploymentSpec::default() {
                    return Ok(None);
                }
                fill_template(&mut spec.template, pod, fields)?;
                if spec.selector == LabelSelector::default() {
                    spec.selector.match_labels = Some(fields.labels());
                }
                Object::Deployment(Deployment {
                    metadata: fields.metadata.clone(),
                    spec: Some(spec),
                    status: None,
                })
            }
            Self::Job {
                mut spec,
                active_deadline_seconds,
            } => {
                if pod.is_empty() && spec == JobSpec::default() && active_deadline_seconds.is_none()
                {
                    return Ok(None);
                }
                fill_template(&mut spec.template, pod, fields)?;
                // Only the job level deadline is set, the pod keeps its own.
                if active_deadline_seconds.is_some() {
                    spec.active_deadline_seconds = active_deadline_seconds;
                }
                Object::Job(Job {
                    metadata: fields.metadata.clone(),
                    spec: Some(spec),
                    status: None,
                })
            }
            Self::DeploymentConfig(mut spec) => {
                let has_settings = DeploymentConfigSpec {
                    replicas: None,
                    ..spec.clone()
                } != DeploymentConfigSpec::default();
                if pod.is_empty() && !has_settings {
                    return Ok(None);
                }
                fill_template(
                    spec.template.get_or_insert_with(PodTemplateSpec::default),
                    pod,
                    fields,
                )?;
                if spec.selector.as_ref().is_none_or(BTreeMap::is_empty) {
                    spec.selector = Some(fields.labels());
                }
                Object::DeploymentConfig(DeploymentConfig {
                    metadata: fields.metadata.clone(),
                    spec,
                })
            }
        };
        Ok(Some(object))
    }
}

/// Places the resolved top level pod spec into `template`, unless the template already
/// carries one, and names and labels the template.
fn fill_template(
    template: &mut PodTemplateSpec,
    pod: PodSpecMod,
    fields: &ControllerFields,
) -> Result<()> {
    if !pod.is_empty() {
        ensure!(
            template
                .spec
                .as_ref()
                .is_none_or(|spec| spec == &PodSpec::default()),
            PodSpecInTwoPlacesSnafu
        );
        template.spec = Some(resolve_pod(pod, fields)?);
    } else {
        debug!(app_name = fields.name(), "using the pod spec of the controller template");
    }

    let metadata = template.metadata.get_or_insert_with(ObjectMeta::default);
    if metadata.name.is_none() {
        metadata.name = Some(fields.name().to_owned());
    }
    metadata.labels_if_absent(&fields.labels());
    Ok(())
}

/// Resolves the containers of the top level pod spec.
fn resolve_pod(pod: PodSpecMod, fields: &ControllerFields) -> Result<PodSpec> {
    let PodSpecMod {
        containers,
        init_containers,
        mut pod_spec,
    } = pod;

    pod_spec.containers = resolve::populate_containers(
        containers,
        "containers",
        &fields.config_maps,
        &fields.secrets,
    )
    .context(ResolveContainersSnafu)?;

    let init_containers = resolve::populate_containers(
        init_containers,
        "initContainers",
        &fields.config_maps,
        &fields.secrets,
    )
    .context(ResolveContainersSnafu)?;
    if !init_containers.is_empty() {
        pod_spec.init_containers = Some(init_containers);
    }

    Ok(pod_spec)
}
