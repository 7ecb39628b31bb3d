//! Expansion of a fixed application into Kubernetes objects.
//!
//! Objects are emitted in a fixed order: volume claims, services (each directly followed
//! by the ingresses and routes generated for its endpoints), ingresses, routes, secrets,
//! image streams, build configs, config maps and finally the controller.
use k8s_openapi::{
    Resource,
    api::{
        apps::v1::Deployment,
        batch::v1::Job,
        core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service},
        networking::v1::Ingress,
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use serde::Serialize;
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, info};

use crate::{
    builder::meta::ObjectMetaExt,
    spec::{App, ControllerFields, fix::APP_VERSION_ANNOTATION},
};

mod controller;
mod openshift;
mod resources;

pub use openshift::{BuildConfig, DeploymentConfig, ImageStream, Route};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to create volume claim {name:?}"))]
    CreateVolumeClaim {
        source: resources::Error,
        name: String,
    },

    #[snafu(display("failed to create service {name:?}"))]
    CreateService {
        source: resources::Error,
        name: String,
    },

    #[snafu(display("failed to create the {kind} of app {app_name:?}"))]
    CreateController {
        source: controller::Error,
        kind: &'static str,
        app_name: String,
    },

    #[snafu(display("app {app_name:?} did not produce any objects, not enough input data"))]
    NoObjects { app_name: String },
}

/// A generated Kubernetes object, serialized with its `apiVersion` and `kind`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Object {
    PersistentVolumeClaim(PersistentVolumeClaim),
    Service(Service),
    Ingress(Ingress),
    Route(Route),
    Secret(Secret),
    ImageStream(ImageStream),
    BuildConfig(BuildConfig),
    ConfigMap(ConfigMap),
    Deployment(Deployment),
    Job(Job),
    DeploymentConfig(DeploymentConfig),
}

impl Object {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PersistentVolumeClaim(_) => PersistentVolumeClaim::KIND,
            Self::Service(_) => Service::KIND,
            Self::Ingress(_) => Ingress::KIND,
            Self::Route(_) => Route::KIND,
            Self::Secret(_) => Secret::KIND,
            Self::ImageStream(_) => ImageStream::KIND,
            Self::BuildConfig(_) => BuildConfig::KIND,
            Self::ConfigMap(_) => ConfigMap::KIND,
            Self::Deployment(_) => Deployment::KIND,
            Self::Job(_) => Job::KIND,
            Self::DeploymentConfig(_) => DeploymentConfig::KIND,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::PersistentVolumeClaim(object) => &object.metadata,
            Self::Service(object) => &object.metadata,
            Self::Ingress(object) => &object.metadata,
            Self::Route(object) => &object.metadata,
            Self::Secret(object) => &object.metadata,
            Self::ImageStream(object) => &object.metadata,
            Self::BuildConfig(object) => &object.metadata,
            Self::ConfigMap(object) => &object.metadata,
            Self::Deployment(object) => &object.metadata,
            Self::Job(object) => &object.metadata,
            Self::DeploymentConfig(object) => &object.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::PersistentVolumeClaim(object) => &mut object.metadata,
            Self::Service(object) => &mut object.metadata,
            Self::Ingress(object) => &mut object.metadata,
            Self::Route(object) => &mut object.metadata,
            Self::Secret(object) => &mut object.metadata,
            Self::ImageStream(object) => &mut object.metadata,
            Self::BuildConfig(object) => &mut object.metadata,
            Self::ConfigMap(object) => &mut object.metadata,
            Self::Deployment(object) => &mut object.metadata,
            Self::Job(object) => &mut object.metadata,
            Self::DeploymentConfig(object) => &mut object.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Whether the object only exists on OpenShift clusters.
    pub fn is_openshift(&self) -> bool {
        matches!(
            self,
            Self::Route(_) | Self::ImageStream(_) | Self::BuildConfig(_) | Self::DeploymentConfig(_)
        )
    }
}

/// The result of expanding one application.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transformed {
    pub objects: Vec<Object>,

    /// Paths of files to append verbatim, as given in `includeResources`.
    pub include_resources: Vec<String>,
}

/// Creates all objects of a validated and fixed application.
pub fn transform(app: App) -> Result<Transformed> {
    let kind = app.kind();
    let (mut fields, controller) = match app {
        App::Deployment(app) => (app.fields, controller::Controller::Deployment(app.deployment)),
        App::Job(app) => (
            app.fields,
            controller::Controller::Job {
                spec: app.job,
                active_deadline_seconds: app.active_deadline_seconds,
            },
        ),
        App::DeploymentConfig(app) => (
            app.fields,
            controller::Controller::DeploymentConfig(app.deployment_config),
        ),
    };
    let app_name = fields.name().to_owned();
    let pod = std::mem::take(&mut fields.pod);

    let mut objects = create_resources(&fields)?;

    let controller_kind = controller.kind();
    match controller
        .create(pod, &fields)
        .context(CreateControllerSnafu {
            kind: controller_kind,
            app_name: &app_name,
        })? {
        Some(object) => objects.push(object),
        None => debug!(app_name, %kind, "no pod spec given, skipping controller"),
    }

    ensure!(!objects.is_empty(), NoObjectsSnafu { app_name });

    if let Some(appversion) = fields.appversion.as_deref().filter(|v| !v.is_empty()) {
        for object in &mut objects {
            object
                .metadata_mut()
                .annotation_if_absent(APP_VERSION_ANNOTATION, appversion);
        }
    }

    info!(
        app_name,
        objects = objects.len(),
        includes = fields.include_resources.len(),
        "transformed application"
    );
    Ok(Transformed {
        objects,
        include_resources: fields.include_resources,
    })
}

/// Creates everything except the controller, in emission order.
fn create_resources(fields: &ControllerFields) -> Result<Vec<Object>> {
    let labels = fields.labels();
    let mut objects = Vec::new();

    for claim in &fields.volume_claims {
        let name = claim.metadata.name.clone().unwrap_or_default();
        let claim = resources::create_volume_claim(claim)
            .context(CreateVolumeClaimSnafu { name })?;
        objects.push(Object::PersistentVolumeClaim(claim));
    }

    for service in &fields.services {
        let name = service.metadata.name.clone().unwrap_or_default();
        let (service, endpoints) = resources::create_service(service, &labels)
            .context(CreateServiceSnafu { name })?;
        objects.push(Object::Service(service));
        objects.extend(endpoints);
    }

    objects.extend(
        fields
            .ingresses
            .iter()
            .map(resources::create_ingress)
            .map(Object::Ingress),
    );
    objects.extend(
        fields
            .routes
            .iter()
            .map(resources::create_route)
            .map(Object::Route),
    );
    objects.extend(
        fields
            .secrets
            .iter()
            .map(resources::create_secret)
            .map(Object::Secret),
    );
    objects.extend(
        fields
            .image_streams
            .iter()
            .map(resources::create_image_stream)
            .map(Object::ImageStream),
    );
    objects.extend(
        fields
            .build_configs
            .iter()
            .map(resources::create_build_config)
            .map(Object::BuildConfig),
    );
    objects.extend(
        fields
            .config_maps
            .iter()
            .map(|config_map| resources::create_config_map(config_map, &labels))
            .map(Object::ConfigMap),
    );

    Ok(objects)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::spec::DeploymentSpecMod;

    fn fixed(input: &str) -> App {
        let mut app = App::Deployment(serde_yaml::from_str::<DeploymentSpecMod>(input).unwrap());
        app.validate().unwrap();
        app.fix().unwrap();
        app
    }

    #[test]
    fn objects_are_emitted_in_order() {
        let transformed = transform(fixed(indoc! {"
            name: web
            containers:
            - image: nginx
            configMaps:
            - data:
                key: value
            secrets:
            - stringData:
                password: hunter2
            ingresses:
            - rules:
              - host: example.com
            services:
            - ports:
              - port: 8080
                endpoint: web.example.com/api
            volumeClaims:
            - size: 1Gi
            includeResources:
            - extra.yaml
        "}))
        .unwrap();

        let kinds: Vec<_> = transformed.objects.iter().map(Object::kind).collect();
        assert_eq!(
            kinds,
            [
                "PersistentVolumeClaim",
                "Service",
                "Ingress",
                "Ingress",
                "Secret",
                "ConfigMap",
                "Deployment"
            ]
        );
        let names: Vec<_> = transformed.objects.iter().map(Object::name).collect();
        assert_eq!(names, ["web", "web", "web-8080", "web", "web", "web", "web"]);
        assert_eq!(transformed.include_resources, ["extra.yaml"]);
    }

    #[test]
    fn openshift_objects_are_emitted_in_order() {
        let transformed = transform(fixed(indoc! {"
            name: web
            containers:
            - image: nginx
            configMaps:
            - data:
                key: value
            buildConfigs:
            - strategy:
                type: Docker
            imageStreams:
            - dockerImageRepository: nginx
            secrets:
            - stringData:
                password: hunter2
            routes:
            - host: web.example.com
            ingresses:
            - rules:
              - host: example.com
            services:
            - ports:
              - port: 8080
                routeEndpoint: shop.example.com
        "}))
        .unwrap();

        let kinds: Vec<_> = transformed.objects.iter().map(Object::kind).collect();
        assert_eq!(
            kinds,
            [
                "Service",
                "Route",
                "Ingress",
                "Route",
                "Secret",
                "ImageStream",
                "BuildConfig",
                "ConfigMap",
                "Deployment"
            ]
        );
        let openshift: Vec<_> = transformed
            .objects
            .iter()
            .filter(|object| object.is_openshift())
            .map(Object::kind)
            .collect();
        assert_eq!(openshift, ["Route", "Route", "ImageStream", "BuildConfig"]);
        for object in &transformed.objects {
            assert_eq!(
                object
                    .metadata()
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get("app"))
                    .map(String::as_str),
                Some("web"),
                "{} is missing the app label",
                object.kind()
            );
        }
    }

    #[test]
    fn appversion_is_annotated_everywhere() {
        let transformed = transform(fixed(indoc! {"
            name: web
            appversion: 0.1.0
            containers:
            - image: nginx
            volumeClaims:
            - size: 1Gi
        "}))
        .unwrap();

        for object in &transformed.objects {
            assert_eq!(
                object
                    .metadata()
                    .annotations
                    .as_ref()
                    .and_then(|annotations| annotations.get("appversion"))
                    .map(String::as_str),
                Some("0.1.0"),
                "{} is missing the appversion annotation",
                object.kind()
            );
        }
    }

    #[test]
    fn empty_application_is_rejected() {
        let err = transform(fixed("name: web")).unwrap_err();
        assert!(matches!(err, Error::NoObjects { .. }));
    }

    #[test]
    fn application_without_pod_has_no_controller() {
        let transformed = transform(fixed(indoc! {"
            name: web
            services:
            - ports:
              - port: 80
        "}))
        .unwrap();
        let kinds: Vec<_> = transformed.objects.iter().map(Object::kind).collect();
        assert_eq!(kinds, ["Service"]);
    }
}
