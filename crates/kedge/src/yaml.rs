//! Utility functions for writing YAML documents
use std::io::Write;

use serde::ser;
use snafu::{ResultExt, Snafu};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to serialize YAML"))]
    SerializeYaml { source: serde_yaml::Error },

    #[snafu(display("failed to write YAML document"))]
    WriteDocument { source: std::io::Error },
}

/// Serializes the given data structure as an explicit YAML document and writes it to a [`Write`].
///
/// # Example
///
/// ```
/// use k8s_openapi::api::core::v1::ConfigMap;
/// use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
/// use kedge::yaml;
///
/// let config_map = ConfigMap {
///     metadata: ObjectMeta {
///         name: Some("web".to_owned()),
///         ..ObjectMeta::default()
///     },
///     ..ConfigMap::default()
/// };
///
/// let mut buf = Vec::new();
/// yaml::serialize_to_explicit_document(&mut buf, &config_map).unwrap();
/// let actual_yaml = std::str::from_utf8(&buf).unwrap();
///
/// let expected_yaml = "---
/// apiVersion: v1
/// kind: ConfigMap
/// metadata:
///   name: web
/// ";
///
/// assert_eq!(expected_yaml, actual_yaml);
/// ```
///
/// # Errors
///
/// Serialization can fail if `T`'s implementation of `Serialize` decides to return an error.
pub fn serialize_to_explicit_document<T, W>(mut writer: W, value: &T) -> Result<()>
where
    T: ser::Serialize,
    W: Write,
{
    writer.write_all(b"---\n").context(WriteDocumentSnafu)?;
    let mut serializer = serde_yaml::Serializer::new(writer);
    value
        .serialize(&mut serializer)
        .context(SerializeYamlSnafu)?;
    Ok(())
}

/// Writes an already serialized document verbatim as an explicit YAML document.
///
/// A leading `---` of the document itself is not repeated and a missing final newline is added.
pub fn write_raw_document<W: Write>(mut writer: W, document: &str) -> Result<()> {
    let document = document
        .strip_prefix("---\n")
        .unwrap_or(document);
    writer.write_all(b"---\n").context(WriteDocumentSnafu)?;
    writer
        .write_all(document.as_bytes())
        .context(WriteDocumentSnafu)?;
    if !document.ends_with('\n') {
        writer.write_all(b"\n").context(WriteDocumentSnafu)?;
    }
    Ok(())
}
