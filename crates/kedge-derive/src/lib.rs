use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod fragment;

/// Derives `SchemaFragment`, describing which input keys a struct declares itself
/// and which structs it embeds through `#[serde(flatten)]`.
///
/// The serde attributes that change the wire name of a field are honoured:
/// `#[serde(rename_all = "...")]` on the struct and `#[serde(rename = "...")]`
/// on fields. Fields marked with `#[serde(skip)]` are not part of the input and
/// are ignored.
///
/// A field that deliberately shadows a key of an embedded struct is marked with
/// `#[schema(overrides)]`, which removes that key from conflict detection.
///
/// # Example
///
/// ```
/// use kedge::schema::{SchemaFragment, conflicting_keys};
/// use kedge::k8s_openapi::api::core::v1::Container;
/// use serde::Deserialize;
///
/// #[derive(Default, Deserialize, SchemaFragment)]
/// #[serde(default, rename_all = "camelCase")]
/// struct Sidecar {
///     #[schema(overrides)]
///     image: Option<String>,
///     restart_on_failure: bool,
///     #[serde(flatten)]
///     container: Container,
/// }
///
/// let fragment = Sidecar::fragment().unwrap();
/// assert_eq!(fragment.name, "Sidecar");
/// assert!(fragment.declares("restartOnFailure"));
/// assert!(conflicting_keys(&fragment).is_empty());
/// ```
///
/// Only structs with named fields can be derived:
///
/// ```compile_fail
/// use kedge::schema::SchemaFragment;
///
/// #[derive(SchemaFragment)]
/// enum Controller {
///     Deployment,
///     Job,
/// }
/// ```
#[proc_macro_derive(SchemaFragment, attributes(schema))]
pub fn derive_schema_fragment(input: TokenStream) -> TokenStream {
    fragment::derive(parse_macro_input!(input as DeriveInput)).into()
}
