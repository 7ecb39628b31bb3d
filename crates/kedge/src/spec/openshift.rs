//! Specs of the OpenShift objects an application can declare.
//!
//! Only the fields kedge reads are typed, everything else is passed through as given.
use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::SchemaFragment;

/// The spec of an `apps.openshift.io/v1` DeploymentConfig.
///
/// Strategy and triggers are passed through as given.
#[derive(
    Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize, SchemaFragment,
)]
#[serde(default, rename_all = "camelCase")]
pub struct DeploymentConfigSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PodTemplateSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_ready_seconds: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_history_limit: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<bool>,
}

/// The object a route forwards to, usually a Service.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RouteTargetReference {
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

impl RouteTargetReference {
    pub fn service(name: impl Into<String>) -> Self {
        Self {
            kind: "Service".to_owned(),
            name: name.into(),
            weight: None,
        }
    }
}

/// The spec of a `route.openshift.io/v1` Route.
#[derive(
    Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize, SchemaFragment,
)]
#[serde(default, rename_all = "camelCase")]
pub struct RouteSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<RouteTargetReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_backends: Option<Vec<RouteTargetReference>>,
    /// `targetPort` of the service, a port number or name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wildcard_policy: Option<String>,
}

/// The spec of an `image.openshift.io/v1` ImageStream.
#[derive(
    Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize, SchemaFragment,
)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageStreamSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_image_repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup_policy: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Value>>,
}

/// The spec of a `build.openshift.io/v1` BuildConfig.
#[derive(
    Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize, SchemaFragment,
)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildConfigSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_commit: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_deadline_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successful_builds_history_limit: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_builds_history_limit: Option<i32>,
}
