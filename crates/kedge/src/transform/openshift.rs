use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Serialize, ser::SerializeStruct};

use crate::spec::{BuildConfigSpec, DeploymentConfigSpec, ImageStreamSpec, RouteSpec};

/// Defines an OpenShift object with `metadata` and `spec`, serialized with its type
/// information like the objects of `k8s-openapi`.
macro_rules! openshift_object {
    ($(#[$doc:meta])* $name:ident, $api_version:literal, $spec:ty) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Default, PartialEq)]
        pub struct $name {
            pub metadata: ObjectMeta,
            pub spec: $spec,
        }

        impl $name {
            pub const API_VERSION: &'static str = $api_version;
            pub const KIND: &'static str = stringify!($name);
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                let mut state = serializer.serialize_struct(Self::KIND, 4)?;
                state.serialize_field("apiVersion", Self::API_VERSION)?;
                state.serialize_field("kind", Self::KIND)?;
                state.serialize_field("metadata", &self.metadata)?;
                state.serialize_field("spec", &self.spec)?;
                state.end()
            }
        }
    };
}

openshift_object!(
    /// An OpenShift `apps.openshift.io/v1` DeploymentConfig.
    DeploymentConfig,
    "apps.openshift.io/v1",
    DeploymentConfigSpec
);

openshift_object!(Route, "route.openshift.io/v1", RouteSpec);

openshift_object!(ImageStream, "image.openshift.io/v1", ImageStreamSpec);

openshift_object!(BuildConfig, "build.openshift.io/v1", BuildConfigSpec);

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::spec::RouteTargetReference;

    fn metadata(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_owned()),
            ..ObjectMeta::default()
        }
    }

    #[test]
    fn serializes_with_type_information() {
        let deployment_config = DeploymentConfig {
            metadata: metadata("web"),
            spec: DeploymentConfigSpec {
                replicas: Some(1),
                ..DeploymentConfigSpec::default()
            },
        };

        assert_eq!(
            serde_yaml::to_string(&deployment_config).unwrap(),
            indoc! {"
                apiVersion: apps.openshift.io/v1
                kind: DeploymentConfig
                metadata:
                  name: web
                spec:
                  replicas: 1
            "}
        );
    }

    #[test]
    fn route_omits_unset_fields() {
        let route = Route {
            metadata: metadata("web"),
            spec: RouteSpec {
                to: Some(RouteTargetReference::service("web")),
                ..RouteSpec::default()
            },
        };

        assert_eq!(
            serde_yaml::to_string(&route).unwrap(),
            indoc! {"
                apiVersion: route.openshift.io/v1
                kind: Route
                metadata:
                  name: web
                spec:
                  to:
                    kind: Service
                    name: web
            "}
        );
    }
}
