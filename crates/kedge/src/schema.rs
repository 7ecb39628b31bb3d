//! Detection of ambiguous keys in layered input types.
//!
//! Input types embed Kubernetes structs through `#[serde(flatten)]`. When two layers of
//! the same type declare a key with an identical name, serde silently hands the value to
//! whichever layer reads it first. Every input type therefore describes its own keys as a
//! [`Fragment`] and [`conflicting_keys`] reports names that are declared more than once.
use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::{
    api::{
        apps::v1::DeploymentSpec,
        batch::v1::JobSpec,
        core::v1::{Container, PersistentVolumeClaimSpec, PodSpec, ServicePort, ServiceSpec},
        networking::v1::IngressSpec,
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
pub use kedge_derive::SchemaFragment;
use schemars::JsonSchema;
use snafu::{OptionExt, Snafu};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{type_name} is not a composite type, it declares no object properties"))]
    NotComposite { type_name: String },
}

/// Describes the input keys of a type, see the [module documentation](self).
///
/// Usually derived, see [`kedge_derive::SchemaFragment`]. Kubernetes types implement it
/// through their JSON schema.
pub trait SchemaFragment {
    fn fragment() -> Result<Fragment>;
}

/// A key declared directly by a type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldKey {
    pub key: String,

    /// The field intentionally shadows the same key of an embedded type.
    pub overrides: bool,
}

impl FieldKey {
    pub fn new(key: impl Into<String>, overrides: bool) -> Self {
        Self {
            key: key.into(),
            overrides,
        }
    }
}

/// The keys of one type, plus the fragments of every type it embeds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    pub name: String,
    pub fields: Vec<FieldKey>,
    pub embedded: Vec<Fragment>,
}

impl Fragment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            embedded: Vec::new(),
        }
    }

    pub fn push_field(&mut self, field: FieldKey) {
        self.fields.push(field);
    }

    pub fn push_embedded(&mut self, fragment: Self) {
        self.embedded.push(fragment);
    }

    /// Builds the fragment of a type from the properties of its JSON schema.
    ///
    /// Fails for types whose schema is not an object with properties, such as strings or lists.
    pub fn from_json_schema<T: JsonSchema>() -> Result<Self> {
        // Kubernetes schemas are named after their OpenAPI definition, e.g.
        // `io.k8s.api.core.v1.Container`.
        let schema_name = T::schema_name();
        let type_name = schema_name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_owned();
        let schema = schemars::schema_for!(T);
        let properties = schema
            .as_object()
            .and_then(|object| object.get("properties"))
            .and_then(serde_json::Value::as_object)
            .context(NotCompositeSnafu {
                type_name: type_name.clone(),
            })?;

        Ok(Self {
            name: type_name,
            fields: properties
                .keys()
                .map(|key| FieldKey::new(key.clone(), false))
                .collect(),
            embedded: Vec::new(),
        })
    }

    /// Whether this fragment itself (not an embedded one) declares `key`.
    pub fn declares(&self, key: &str) -> bool {
        self.fields.iter().any(|field| field.key == key)
    }

    /// This fragment followed by all embedded fragments, depth first.
    pub fn walk(&self) -> Vec<&Self> {
        let mut fragments = vec![self];
        for embedded in &self.embedded {
            fragments.extend(embedded.walk());
        }
        fragments
    }
}

/// Returns every key declared by two or more fragments of `root`, mapped to the names
/// of the declaring fragments.
///
/// Keys that any fragment marks as [`FieldKey::overrides`] are exempt.
pub fn conflicting_keys(root: &Fragment) -> BTreeMap<String, Vec<String>> {
    let fragments = root.walk();
    let overridden: BTreeSet<&str> = fragments
        .iter()
        .flat_map(|fragment| &fragment.fields)
        .filter(|field| field.overrides)
        .map(|field| field.key.as_str())
        .collect();

    let mut declared_by: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for fragment in &fragments {
        for field in &fragment.fields {
            if !overridden.contains(field.key.as_str()) {
                declared_by
                    .entry(field.key.clone())
                    .or_default()
                    .push(fragment.name.clone());
            }
        }
    }

    declared_by.retain(|_, names| names.len() > 1);
    declared_by
}

/// Convenience wrapper around [`conflicting_keys`] for a [`SchemaFragment`] type.
pub fn conflicts_of<T: SchemaFragment>() -> Result<BTreeMap<String, Vec<String>>> {
    Ok(conflicting_keys(&T::fragment()?))
}

macro_rules! impl_schema_fragment_from_json_schema {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SchemaFragment for $ty {
                fn fragment() -> Result<Fragment> {
                    Fragment::from_json_schema::<Self>()
                }
            }
        )*
    };
}

impl_schema_fragment_from_json_schema!(
    Container,
    DeploymentSpec,
    IngressSpec,
    JobSpec,
    ObjectMeta,
    PersistentVolumeClaimSpec,
    PodSpec,
    ServicePort,
    ServiceSpec,
);
