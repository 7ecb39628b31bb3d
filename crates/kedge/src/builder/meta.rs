use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

/// A builder to build [`ObjectMeta`] objects for generated resources.
#[derive(Clone, Default)]
pub struct ObjectMetaBuilder {
    name: Option<String>,
    labels: Option<BTreeMap<String, String>>,
}

impl ObjectMetaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// This adds multiple labels to the existing labels.
    /// Any existing label with a key that is contained in `labels` will be overwritten
    pub fn with_labels(&mut self, labels: BTreeMap<String, String>) -> &mut Self {
        self.labels.get_or_insert_with(BTreeMap::new).extend(labels);
        self
    }

    pub fn build(&self) -> ObjectMeta {
        ObjectMeta {
            name: self.name.clone(),
            labels: self.labels.clone(),
            ..ObjectMeta::default()
        }
    }
}

/// Write-once defaulting of labels and annotations: values declared by the user always win.
pub trait ObjectMetaExt {
    fn label_if_absent(&mut self, key: &str, value: &str) -> &mut Self;

    fn annotation_if_absent(&mut self, key: &str, value: &str) -> &mut Self;

    fn labels_if_absent(&mut self, labels: &BTreeMap<String, String>) -> &mut Self {
        for (key, value) in labels {
            self.label_if_absent(key, value);
        }
        self
    }

    fn annotations_if_absent(&mut self, annotations: &BTreeMap<String, String>) -> &mut Self {
        for (key, value) in annotations {
            self.annotation_if_absent(key, value);
        }
        self
    }
}

impl ObjectMetaExt for ObjectMeta {
    fn label_if_absent(&mut self, key: &str, value: &str) -> &mut Self {
        insert_if_absent(&mut self.labels, "label", key, value);
        self
    }

    fn annotation_if_absent(&mut self, key: &str, value: &str) -> &mut Self {
        insert_if_absent(&mut self.annotations, "annotation", key, value);
        self
    }
}

fn insert_if_absent(
    map: &mut Option<BTreeMap<String, String>>,
    what: &str,
    key: &str,
    value: &str,
) {
    let map = map.get_or_insert_with(BTreeMap::new);
    match map.get(key) {
        Some(existing) => {
            debug!(key, existing, ignored = value, "keeping user defined {what}");
        }
        None => {
            map.insert(key.to_owned(), value.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_name_and_labels() {
        let meta = ObjectMetaBuilder::new()
            .name("web-8080")
            .with_labels(BTreeMap::from([("app".to_owned(), "web".to_owned())]))
            .with_labels(BTreeMap::from([("tier".to_owned(), "frontend".to_owned())]))
            .build();

        assert_eq!(meta.name.as_deref(), Some("web-8080"));
        let labels = meta.labels.unwrap();
        assert_eq!(labels.get("app").map(String::as_str), Some("web"));
        assert_eq!(labels.get("tier").map(String::as_str), Some("frontend"));
        assert_eq!(meta.annotations, None);
    }

    #[test]
    fn user_defined_values_win() {
        let mut meta = ObjectMeta {
            labels: Some(BTreeMap::from([("app".to_owned(), "custom".to_owned())])),
            ..ObjectMeta::default()
        };
        meta.label_if_absent("app", "web")
            .label_if_absent("tier", "frontend")
            .annotation_if_absent("appversion", "1.0");

        let labels = meta.labels.unwrap();
        assert_eq!(labels.get("app").map(String::as_str), Some("custom"));
        assert_eq!(labels.get("tier").map(String::as_str), Some("frontend"));
        assert_eq!(
            meta.annotations.unwrap().get("appversion").map(String::as_str),
            Some("1.0")
        );
    }
}
