use std::{collections::BTreeMap, sync::LazyLock};

use k8s_openapi::{
    api::{
        core::v1::{
            ConfigMap, PersistentVolumeClaim, Secret, Service, ServicePort,
            VolumeResourceRequirements,
        },
        networking::v1::{
            HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
            IngressServiceBackend, IngressSpec, ServiceBackendPort,
        },
    },
    apimachinery::pkg::api::resource::Quantity,
};
use regex::Regex;
use serde_json::json;
use snafu::{ResultExt, Snafu, ensure};

use crate::{
    builder::meta::ObjectMetaBuilder,
    spec::{
        BuildConfigSpecMod, ConfigMapMod, ImageStreamSpecMod, IngressSpecMod, RouteSpec,
        RouteSpecMod, RouteTargetReference, SecretMod, ServiceSpecMod, VolumeClaim,
        fix::populate_service_port_names, port_mapping,
    },
    transform::{BuildConfig, ImageStream, Object, Route},
};

const DEFAULT_ACCESS_MODE: &str = "ReadWriteOnce";
const ENDPOINT_PATH_TYPE: &str = "ImplementationSpecific";
/// A `routeEndpoint` with this value leaves choosing the host to OpenShift.
const GENERATED_ROUTE_HOST: &str = "true";

// Decimal numbers with an optional binary, decimal SI or exponent suffix.
static QUANTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+|Ki|Mi|Gi|Ti|Pi|Ei|n|u|m|k|M|G|T|P|E)?$")
        .expect("failed to compile quantity regex")
});

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("\"size\" and \"resources.requests\" cannot be given together"))]
    SizeAndRequests,

    #[snafu(display("one of \"size\" or \"resources.requests\" must be given"))]
    NoSizeOrRequests,

    #[snafu(display("invalid size {size:?}, expected a quantity such as 500Mi or 1Gi"))]
    InvalidSize { size: String },

    #[snafu(display("failed to parse port mapping"))]
    ParsePortMapping { source: port_mapping::Error },

    #[snafu(display("invalid endpoint {endpoint:?}, expected the form host[/path]"))]
    InvalidEndpoint { endpoint: String },
}

pub fn create_volume_claim(claim: &VolumeClaim) -> Result<PersistentVolumeClaim> {
    let mut spec = claim.spec.clone();
    let size = claim.size.as_deref().filter(|size| !size.is_empty());
    let has_requests = spec
        .resources
        .as_ref()
        .is_some_and(|resources| resources.requests.is_some());

    match (size, has_requests) {
        (Some(_), true) => return SizeAndRequestsSnafu.fail(),
        (None, false) => return NoSizeOrRequestsSnafu.fail(),
        (Some(size), false) => {
            ensure!(QUANTITY_REGEX.is_match(size), InvalidSizeSnafu { size });
            spec.resources
                .get_or_insert_with(VolumeResourceRequirements::default)
                .requests = Some(BTreeMap::from([(
                "storage".to_owned(),
                Quantity(size.to_owned()),
            )]));
        }
        (None, true) => {}
    }

    if spec.access_modes.as_ref().is_none_or(Vec::is_empty) {
        spec.access_modes = Some(vec![DEFAULT_ACCESS_MODE.to_owned()]);
    }

    Ok(PersistentVolumeClaim {
        metadata: claim.metadata.clone(),
        spec: Some(spec),
        status: None,
    })
}

/// Creates the service, followed by the ingress and route of every port with an
/// `endpoint` or `routeEndpoint`, in port order.
pub fn create_service(
    service: &ServiceSpecMod,
    labels: &BTreeMap<String, String>,
) -> Result<(Service, Vec<Object>)> {
    let name = service.metadata.name.clone().unwrap_or_default();

    let mut ports: Vec<ServicePort> = service.ports.iter().map(|port| port.port.clone()).collect();
    for mapping in &service.port_mappings {
        ports.push(port_mapping::parse_port_mapping(mapping).context(ParsePortMappingSnafu)?);
    }
    populate_service_port_names(&name, ports.iter_mut());

    let mut endpoints = Vec::new();
    // The declared ports come first, mapped ports have no endpoints.
    for (declared, port) in service.ports.iter().zip(&ports) {
        if let Some(endpoint) = declared.endpoint.as_deref().filter(|e| !e.is_empty()) {
            endpoints.push(Object::Ingress(create_endpoint_ingress(
                &name, port.port, endpoint, labels,
            )?));
        }
        if let Some(route_endpoint) = declared.route_endpoint.as_deref().filter(|e| !e.is_empty())
        {
            endpoints.push(Object::Route(create_endpoint_route(
                &name,
                port,
                route_endpoint,
                labels,
            )));
        }
    }

    let mut spec = service.spec.clone();
    spec.ports = (!ports.is_empty()).then_some(ports);
    if spec.selector.as_ref().is_none_or(BTreeMap::is_empty) {
        spec.selector = Some(labels.clone());
    }

    Ok((
        Service {
            metadata: service.metadata.clone(),
            spec: Some(spec),
            status: None,
        },
        endpoints,
    ))
}

/// Creates the route `<service>-<port>` for a `routeEndpoint`, which is either the host of
/// the route or [`GENERATED_ROUTE_HOST`].
///
/// Named ports are targeted by name, the port of a single port service needs no target.
fn create_endpoint_route(
    service_name: &str,
    port: &ServicePort,
    route_endpoint: &str,
    labels: &BTreeMap<String, String>,
) -> Route {
    Route {
        metadata: ObjectMetaBuilder::new()
            .name(format!("{service_name}-{}", port.port))
            .with_labels(labels.clone())
            .build(),
        spec: RouteSpec {
            host: (route_endpoint != GENERATED_ROUTE_HOST).then(|| route_endpoint.to_owned()),
            to: Some(RouteTargetReference::service(service_name)),
            port: port
                .name
                .as_ref()
                .map(|port_name| json!({ "targetPort": port_name })),
            ..RouteSpec::default()
        },
    }
}

/// Creates the ingress `<service>-<port>` for an endpoint of the form `host[/path]`.
fn create_endpoint_ingress(
    service_name: &str,
    port: i32,
    endpoint: &str,
    labels: &BTreeMap<String, String>,
) -> Result<Ingress> {
    let (host, path) = match endpoint.split_once('/') {
        Some((host, path)) => (host, format!("/{path}")),
        None => (endpoint, "/".to_owned()),
    };
    ensure!(!host.is_empty(), InvalidEndpointSnafu { endpoint });

    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: service_name.to_owned(),
            port: Some(ServiceBackendPort {
                number: Some(port),
                name: None,
            }),
        }),
        resource: None,
    };

    Ok(Ingress {
        metadata: ObjectMetaBuilder::new()
            .name(format!("{service_name}-{port}"))
            .with_labels(labels.clone())
            .build(),
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(host.to_owned()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(path),
                        path_type: ENDPOINT_PATH_TYPE.to_owned(),
                        backend,
                    }],
                }),
            }]),
            ..IngressSpec::default()
        }),
        status: None,
    })
}

pub fn create_ingress(ingress: &IngressSpecMod) -> Ingress {
    Ingress {
        metadata: ingress.metadata.clone(),
        spec: Some(ingress.spec.clone()),
        status: None,
    }
}

pub fn create_route(route: &RouteSpecMod) -> Route {
    Route {
        metadata: route.metadata.clone(),
        spec: route.spec.clone(),
    }
}

pub fn create_image_stream(image_stream: &ImageStreamSpecMod) -> ImageStream {
    ImageStream {
        metadata: image_stream.metadata.clone(),
        spec: image_stream.spec.clone(),
    }
}

pub fn create_build_config(build_config: &BuildConfigSpecMod) -> BuildConfig {
    BuildConfig {
        metadata: build_config.metadata.clone(),
        spec: build_config.spec.clone(),
    }
}

pub fn create_secret(secret: &SecretMod) -> Secret {
    Secret {
        metadata: secret.metadata.clone(),
        data: secret.data.clone(),
        string_data: secret.string_data.clone(),
        type_: secret.type_.clone(),
        immutable: secret.immutable,
    }
}

/// Config maps keep their own labels, falling back to the application labels.
pub fn create_config_map(config_map: &ConfigMapMod, labels: &BTreeMap<String, String>) -> ConfigMap {
    let mut metadata = config_map.metadata.clone();
    if metadata.labels.as_ref().is_none_or(BTreeMap::is_empty) {
        metadata.labels = Some(labels.clone());
    }

    ConfigMap {
        metadata,
        data: config_map.data.clone(),
        binary_data: config_map.binary_data.clone(),
        immutable: config_map.immutable,
    }
}
