//! Builders and helpers for the Kubernetes objects created while expanding an application.
pub mod meta;
pub mod pod;
