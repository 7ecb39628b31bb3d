//! Expands concise application definitions into ordered Kubernetes manifests.
//!
//! An application file describes one controller (a Deployment, a Job or an OpenShift
//! DeploymentConfig) together with the volume claims, services, ingresses, config maps
//! and secrets it needs. Processing a file runs four passes:
//!
//! 1. [`decode`] picks the controller kind and deserializes the document.
//! 2. [`spec::validate`] and [`spec::fix`] reject invalid input and fill in names and labels.
//! 3. [`spec::resolve`] expands `envFrom` references, `health` probes and volume mounts.
//! 4. [`transform`] emits the Kubernetes objects in a fixed order.
//!
//! The result is written by [`output`] or piped into a cluster tool through [`cluster`].

// Lets the `SchemaFragment` derive refer to `::kedge::schema` from inside this crate.
extern crate self as kedge;

pub mod builder;
pub mod cli;
pub mod cluster;
pub mod decode;
pub mod logging;
pub mod output;
pub mod schema;
pub mod spec;
pub mod transform;
pub mod validation;
pub mod yaml;

// External re-exports
pub use k8s_openapi;
