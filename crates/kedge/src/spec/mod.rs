//! The application input model.
//!
//! Every type layers a few kedge specific keys on top of one or more Kubernetes types,
//! which are embedded with `#[serde(flatten)]`. A key defined directly on a type takes
//! precedence over keys of the embedded types, such keys are marked with
//! `#[schema(overrides)]` and declared after the embedded types, so that they also win in
//! the generated JSON schema. All other keys must be unique across the layers, which is
//! verified by the tests of this module through [`crate::schema::conflicting_keys`].
use std::collections::BTreeMap;

use k8s_openapi::{
    ByteString,
    api::{
        apps::v1::DeploymentSpec,
        batch::v1::JobSpec,
        core::v1::{Container, PersistentVolumeClaimSpec, PodSpec, Probe, ServicePort, ServiceSpec},
        networking::v1::IngressSpec,
    },
    apimachinery::pkg::{apis::meta::v1::ObjectMeta, util::intstr::IntOrString},
};
use schemars::JsonSchema;
use serde::Deserialize;
use strum::{Display, EnumString};

use crate::schema::SchemaFragment;

pub mod fix;
pub mod lookup;
mod openshift;
pub mod port_mapping;
pub mod resolve;
pub mod validate;

pub use openshift::{
    BuildConfigSpec, DeploymentConfigSpec, ImageStreamSpec, RouteSpec, RouteTargetReference,
};

/// A container with an optional `health` probe, which is used as both liveness and
/// readiness probe.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, SchemaFragment)]
#[serde(default, rename_all = "camelCase")]
pub struct ContainerSpec {
    pub health: Option<Probe>,

    #[serde(flatten)]
    pub container: Container,
}

/// A pod spec whose containers accept the `health` shorthand.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, SchemaFragment)]
#[serde(default, rename_all = "camelCase")]
pub struct PodSpecMod {
    #[serde(flatten)]
    pub pod_spec: PodSpec,

    #[schema(overrides)]
    pub containers: Vec<ContainerSpec>,

    #[schema(overrides)]
    pub init_containers: Vec<ContainerSpec>,
}

impl PodSpecMod {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A persistent volume claim that can be sized with the `size` shorthand instead of
/// `resources.requests.storage`.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, SchemaFragment)]
#[serde(default, rename_all = "camelCase")]
pub struct VolumeClaim {
    pub size: Option<String>,

    #[serde(flatten)]
    pub metadata: ObjectMeta,

    #[serde(flatten)]
    pub spec: PersistentVolumeClaimSpec,
}

/// A service port that can be exposed through an ingress with `endpoint: host[/path]`
/// and through an OpenShift route with `routeEndpoint`.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, SchemaFragment)]
#[serde(default, rename_all = "camelCase")]
pub struct ServicePortMod {
    pub endpoint: Option<String>,

    /// The host of the route, or `"true"` to let OpenShift generate one.
    pub route_endpoint: Option<String>,

    #[serde(flatten)]
    pub port: ServicePort,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, SchemaFragment)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceSpecMod {
    /// Additional ports in the `port[:targetPort][/protocol]` notation.
    pub port_mappings: Vec<IntOrString>,

    #[serde(flatten)]
    pub metadata: ObjectMeta,

    #[serde(flatten)]
    pub spec: ServiceSpec,

    #[schema(overrides)]
    pub ports: Vec<ServicePortMod>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, SchemaFragment)]
#[serde(default, rename_all = "camelCase")]
pub struct IngressSpecMod {
    #[serde(flatten)]
    pub metadata: ObjectMeta,

    #[serde(flatten)]
    pub spec: IngressSpec,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, SchemaFragment)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigMapMod {
    pub data: Option<BTreeMap<String, String>>,
    #[schemars(with = "Option<BTreeMap<String, String>>")]
    pub binary_data: Option<BTreeMap<String, ByteString>>,
    pub immutable: Option<bool>,

    #[serde(flatten)]
    pub metadata: ObjectMeta,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, SchemaFragment)]
#[serde(default, rename_all = "camelCase")]
pub struct SecretMod {
    #[schemars(with = "Option<BTreeMap<String, String>>")]
    pub data: Option<BTreeMap<String, ByteString>>,
    pub string_data: Option<BTreeMap<String, String>>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub immutable: Option<bool>,

    #[serde(flatten)]
    pub metadata: ObjectMeta,
}

/// An OpenShift route, emitted as `route.openshift.io/v1` Route.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, SchemaFragment)]
#[serde(default, rename_all = "camelCase")]
pub struct RouteSpecMod {
    #[serde(flatten)]
    pub metadata: ObjectMeta,

    #[serde(flatten)]
    pub spec: RouteSpec,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, SchemaFragment)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageStreamSpecMod {
    #[serde(flatten)]
    pub metadata: ObjectMeta,

    #[serde(flatten)]
    pub spec: ImageStreamSpec,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, SchemaFragment)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildConfigSpecMod {
    #[serde(flatten)]
    pub metadata: ObjectMeta,

    #[serde(flatten)]
    pub spec: BuildConfigSpec,
}

/// Everything an application declares independently of its controller kind.
///
/// The root metadata names the application, its labels and annotations are the
/// defaults for every emitted object.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, SchemaFragment)]
#[serde(default, rename_all = "camelCase")]
pub struct ControllerFields {
    /// Copied into the `appversion` annotation of every emitted object.
    pub appversion: Option<String>,

    /// The controller kind, see [`ControllerKind`].
    pub controller: Option<String>,

    pub volume_claims: Vec<VolumeClaim>,
    pub config_maps: Vec<ConfigMapMod>,
    pub services: Vec<ServiceSpecMod>,
    pub ingresses: Vec<IngressSpecMod>,
    pub routes: Vec<RouteSpecMod>,
    pub secrets: Vec<SecretMod>,
    pub image_streams: Vec<ImageStreamSpecMod>,
    pub build_configs: Vec<BuildConfigSpecMod>,

    /// Files whose content is appended verbatim to the generated manifests.
    pub include_resources: Vec<String>,

    #[serde(flatten)]
    pub metadata: ObjectMeta,

    #[serde(flatten)]
    pub pod: PodSpecMod,
}

impl ControllerFields {
    /// The application name, empty until [`fix`] verified it.
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata.labels.clone().unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, SchemaFragment)]
#[serde(default, rename_all = "camelCase")]
pub struct DeploymentSpecMod {
    #[serde(flatten)]
    pub fields: ControllerFields,

    #[serde(flatten)]
    pub deployment: DeploymentSpec,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, SchemaFragment)]
#[serde(default, rename_all = "camelCase")]
pub struct JobSpecMod {
    #[serde(flatten)]
    pub fields: ControllerFields,

    #[serde(flatten)]
    pub job: JobSpec,

    /// Applies to the job only, it is never copied into the pod template.
    #[schema(overrides)]
    pub active_deadline_seconds: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, SchemaFragment)]
#[serde(default, rename_all = "camelCase")]
pub struct DeploymentConfigSpecMod {
    #[serde(flatten)]
    pub fields: ControllerFields,

    #[serde(flatten)]
    pub deployment_config: DeploymentConfigSpec,
}

/// The value of the `controller` key. An absent or empty key selects a Deployment.
#[derive(Clone, Copy, Debug, Default, Display, EnumString, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum ControllerKind {
    #[default]
    Deployment,
    Job,
    DeploymentConfig,
}

/// A decoded application.
#[derive(Clone, Debug, PartialEq)]
pub enum App {
    Deployment(DeploymentSpecMod),
    Job(JobSpecMod),
    DeploymentConfig(DeploymentConfigSpecMod),
}

impl App {
    pub fn kind(&self) -> ControllerKind {
        match self {
            Self::Deployment(_) => ControllerKind::Deployment,
            Self::Job(_) => ControllerKind::Job,
            Self::DeploymentConfig(_) => ControllerKind::DeploymentConfig,
        }
    }

    pub fn fields(&self) -> &ControllerFields {
        match self {
            Self::Deployment(app) => &app.fields,
            Self::Job(app) => &app.fields,
            Self::DeploymentConfig(app) => &app.fields,
        }
    }

    pub fn fields_mut(&mut self) -> &mut ControllerFields {
        match self {
            Self::Deployment(app) => &mut app.fields,
            Self::Job(app) => &mut app.fields,
            Self::DeploymentConfig(app) => &mut app.fields,
        }
    }
}

/// Input entries that carry an optional name which may be defaulted to the
/// application name.
pub trait Named {
    /// The declared name, `None` if absent or empty.
    fn name(&self) -> Option<&str>;

    fn set_name(&mut self, name: String);
}

fn non_empty(name: Option<&String>) -> Option<&str> {
    name.map(String::as_str).filter(|name| !name.is_empty())
}

impl Named for ContainerSpec {
    fn name(&self) -> Option<&str> {
        Some(self.container.name.as_str()).filter(|name| !name.is_empty())
    }

    fn set_name(&mut self, name: String) {
        self.container.name = name;
    }
}

/// Entries whose name lives in their flattened [`ObjectMeta`].
pub trait HasMetadata {
    fn metadata(&self) -> &ObjectMeta;
    fn metadata_mut(&mut self) -> &mut ObjectMeta;
}

macro_rules! impl_named_by_metadata {
    ($($ty:ty),* $(,)?) => {
        $(
            impl HasMetadata for $ty {
                fn metadata(&self) -> &ObjectMeta {
                    &self.metadata
                }

                fn metadata_mut(&mut self) -> &mut ObjectMeta {
                    &mut self.metadata
                }
            }

            impl Named for $ty {
                fn name(&self) -> Option<&str> {
                    non_empty(self.metadata.name.as_ref())
                }

                fn set_name(&mut self, name: String) {
                    self.metadata.name = Some(name);
                }
            }
        )*
    };
}

impl_named_by_metadata!(
    VolumeClaim,
    ServiceSpecMod,
    IngressSpecMod,
    RouteSpecMod,
    ConfigMapMod,
    SecretMod,
    ImageStreamSpecMod,
    BuildConfigSpecMod,
);
