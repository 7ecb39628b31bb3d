//! Defaulting of names, labels and annotations the user may omit.
//!
//! Names follow the same rule for every collection: a single unnamed entry takes the
//! application name, while in a collection with two or more entries every entry must be
//! named. Auto-populated labels and annotations never replace user defined values.
use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ServicePort, Volume};
use snafu::{ResultExt, Snafu};
use tracing::debug;

use crate::{
    builder::meta::ObjectMetaExt,
    spec::{
        App, ControllerFields, DeploymentConfigSpecMod, HasMetadata, JobSpecMod, Named,
        ServiceSpecMod, resolve,
    },
};

pub const APP_LABEL: &str = "app";
pub const APP_VERSION_ANNOTATION: &str = "appversion";

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("the application name is missing, please set the root level \"name\""))]
    MissingAppName,

    #[snafu(display(
        "app {app_name:?}: please specify a name for {collection}[{index}], names are required when more than one entry is given"
    ))]
    MissingName {
        app_name: String,
        collection: &'static str,
        index: usize,
    },

    #[snafu(display("app {app_name:?}: failed to populate pod volumes"))]
    PopulateVolumes {
        source: resolve::Error,
        app_name: String,
    },
}

/// Applies the naming rule of the [module documentation](self) to one collection.
///
/// `collection` is the input key of the collection and only used in error messages.
pub fn fix_names<T: Named>(
    mut items: Vec<T>,
    app_name: &str,
    collection: &'static str,
) -> Result<Vec<T>> {
    if let [item] = items.as_mut_slice() {
        if item.name().is_none() {
            debug!(collection, app_name, "defaulting name of the only entry");
            item.set_name(app_name.to_owned());
        }
    }

    if let Some(index) = items.iter().position(|item| item.name().is_none()) {
        return MissingNameSnafu {
            app_name,
            collection,
            index,
        }
        .fail();
    }

    Ok(items)
}

/// Names every unnamed port `<service>-<port>` when the service has more than one port.
pub fn populate_service_port_names<'a, I>(service_name: &str, ports: I)
where
    I: IntoIterator<Item = &'a mut ServicePort>,
    I::IntoIter: ExactSizeIterator,
{
    let ports = ports.into_iter();
    if ports.len() < 2 {
        return;
    }
    for port in ports {
        if port.name.as_deref().is_none_or(str::is_empty) {
            port.name = Some(format!("{service_name}-{}", port.port));
        }
    }
}

/// Defaults names and labels of entries that carry an `app` label, which are volume
/// claims, config maps, secrets, ingresses and the OpenShift routes, image streams and
/// build configs.
fn fix_labelled<T: Named + HasMetadata>(
    items: Vec<T>,
    app_name: &str,
    collection: &'static str,
) -> Result<Vec<T>> {
    let mut items = fix_names(items, app_name, collection)?;
    for item in &mut items {
        item.metadata_mut().label_if_absent(APP_LABEL, app_name);
    }
    Ok(items)
}

fn fix_services(
    services: Vec<ServiceSpecMod>,
    app_name: &str,
    labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
) -> Result<Vec<ServiceSpecMod>> {
    let mut services = fix_names(services, app_name, "services")?;
    for service in &mut services {
        service
            .metadata
            .labels_if_absent(labels)
            .annotations_if_absent(annotations);

        let service_name = service.name().unwrap_or(app_name).to_owned();
        populate_service_port_names(
            &service_name,
            service.ports.iter_mut().map(|port| &mut port.port),
        );
    }
    Ok(services)
}

impl ControllerFields {
    /// Defaulting shared by every controller kind.
    pub fn fix(&mut self) -> Result<()> {
        let app_name = match self.metadata.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => return MissingAppNameSnafu.fail(),
        };

        self.metadata.label_if_absent(APP_LABEL, &app_name);
        if let Some(appversion) = self.appversion.as_deref().filter(|v| !v.is_empty()) {
            self.metadata
                .annotation_if_absent(APP_VERSION_ANNOTATION, appversion);
        }

        let labels = self.labels();
        let annotations = self.metadata.annotations.clone().unwrap_or_default();

        self.services = fix_services(
            std::mem::take(&mut self.services),
            &app_name,
            &labels,
            &annotations,
        )?;
        self.volume_claims =
            fix_labelled(std::mem::take(&mut self.volume_claims), &app_name, "volumeClaims")?;
        self.config_maps =
            fix_labelled(std::mem::take(&mut self.config_maps), &app_name, "configMaps")?;
        self.secrets = fix_labelled(std::mem::take(&mut self.secrets), &app_name, "secrets")?;
        self.ingresses =
            fix_labelled(std::mem::take(&mut self.ingresses), &app_name, "ingresses")?;
        self.routes = fix_labelled(std::mem::take(&mut self.routes), &app_name, "routes")?;
        self.image_streams =
            fix_labelled(std::mem::take(&mut self.image_streams), &app_name, "imageStreams")?;
        self.build_configs =
            fix_labelled(std::mem::take(&mut self.build_configs), &app_name, "buildConfigs")?;

        self.pod.containers =
            fix_names(std::mem::take(&mut self.pod.containers), &app_name, "containers")?;
        self.pod.init_containers = fix_names(
            std::mem::take(&mut self.pod.init_containers),
            &app_name,
            "initContainers",
        )?;

        self.fix_volumes(&app_name)
    }

    /// Adds a claim backed pod volume for every mount that refers to a volume claim.
    fn fix_volumes(&mut self, app_name: &str) -> Result<()> {
        let mut known: Vec<Volume> = self.pod.pod_spec.volumes.clone().unwrap_or_default();
        let mut populated = Vec::new();
        for (collection, containers) in [
            ("containers", &self.pod.containers),
            ("initContainers", &self.pod.init_containers),
        ] {
            let volumes = resolve::populate_volumes(
                containers.iter().map(|container| &container.container),
                collection,
                &self.volume_claims,
                &known,
            )
            .context(PopulateVolumesSnafu { app_name })?;
            known.extend(volumes.iter().cloned());
            populated.extend(volumes);
        }

        if !populated.is_empty() {
            self.pod
                .pod_spec
                .volumes
                .get_or_insert_with(Vec::new)
                .extend(populated);
        }
        Ok(())
    }
}

impl JobSpecMod {
    /// Defaults the restart policy of the pod to `OnFailure`.
    fn fix_restart_policy(&mut self) {
        let pod_spec = if self.fields.pod.is_empty() {
            self.job.template.spec.as_mut()
        } else {
            Some(&mut self.fields.pod.pod_spec)
        };
        if let Some(pod_spec) = pod_spec {
            pod_spec
                .restart_policy
                .get_or_insert_with(|| "OnFailure".to_owned());
        }
    }
}

impl DeploymentConfigSpecMod {
    fn fix_replicas(&mut self) {
        self.deployment_config.replicas.get_or_insert(1);
    }
}

impl App {
    pub fn fix(&mut self) -> Result<()> {
        self.fields_mut().fix()?;
        match self {
            Self::Deployment(_) => {}
            Self::Job(job) => job.fix_restart_policy(),
            Self::DeploymentConfig(deployment_config) => deployment_config.fix_replicas(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use rstest::rstest;

    use super::*;
    use crate::spec::{
        ConfigMapMod, ContainerSpec, DeploymentSpecMod, ServicePortMod, VolumeClaim,
    };

    fn named(name: &str) -> VolumeClaim {
        VolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                ..ObjectMeta::default()
            },
            ..VolumeClaim::default()
        }
    }

    fn decode(input: &str) -> App {
        App::Deployment(serde_yaml::from_str::<DeploymentSpecMod>(input).unwrap())
    }

    #[test]
    fn single_unnamed_entry_takes_the_app_name() {
        let claims = fix_names(vec![VolumeClaim::default()], "web", "volumeClaims").unwrap();
        assert_eq!(claims[0].name(), Some("web"));
    }

    #[rstest]
    #[case::first_unnamed(vec![VolumeClaim::default(), named("b")], 0)]
    #[case::second_unnamed(vec![named("a"), VolumeClaim::default()], 1)]
    #[case::all_unnamed(vec![VolumeClaim::default(), VolumeClaim::default(), VolumeClaim::default()], 0)]
    fn unnamed_entry_among_many_is_ambiguous(
        #[case] claims: Vec<VolumeClaim>,
        #[case] expected_index: usize,
    ) {
        let err = fix_names(claims, "web", "volumeClaims").unwrap_err();
        assert!(matches!(
            err,
            Error::MissingName { index, collection: "volumeClaims", .. } if index == expected_index
        ));
    }

    #[test]
    fn named_entries_are_kept() {
        let claims = fix_names(vec![named("a"), named("b")], "web", "volumeClaims").unwrap();
        let names: Vec<_> = claims.iter().filter_map(Named::name).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(fix_names(Vec::<VolumeClaim>::new(), "web", "volumeClaims")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn containers_use_their_own_name() {
        let err = fix_names(
            vec![ContainerSpec::default(), ContainerSpec::default()],
            "web",
            "containers",
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "app \"web\": please specify a name for containers[0], names are required when more than one entry is given"
        );
    }

    #[test]
    fn multi_port_services_get_port_names() {
        let mut ports = vec![
            ServicePort {
                port: 8080,
                ..ServicePort::default()
            },
            ServicePort {
                name: Some("admin".to_owned()),
                port: 9090,
                ..ServicePort::default()
            },
        ];
        populate_service_port_names("web", ports.iter_mut());

        assert_eq!(ports[0].name.as_deref(), Some("web-8080"));
        assert_eq!(ports[1].name.as_deref(), Some("admin"));
    }

    #[test]
    fn single_port_service_stays_unnamed() {
        let mut ports = vec![ServicePortMod {
            port: ServicePort {
                port: 8080,
                ..ServicePort::default()
            },
            ..ServicePortMod::default()
        }];
        populate_service_port_names("web", ports.iter_mut().map(|port| &mut port.port));
        assert_eq!(ports[0].port.name, None);
    }

    #[test]
    fn missing_app_name_is_rejected() {
        let mut app = decode("containers: [{image: nginx}]");
        assert!(matches!(app.fix(), Err(Error::MissingAppName)));
    }

    #[test]
    fn labels_and_annotations_are_defaulted() {
        let mut app = decode(indoc! {"
            name: web
            appversion: 1.2.3
            containers:
            - image: nginx
            services:
            - ports:
              - port: 8080
            configMaps:
            - data:
                key: value
            volumeClaims:
            - size: 1Gi
              labels:
                app: custom
        "});
        app.fix().unwrap();
        let fields = app.fields();

        let app_label = BTreeMap::from([("app".to_owned(), "web".to_owned())]);
        assert_eq!(fields.metadata.labels.as_ref(), Some(&app_label));
        assert_eq!(
            fields.metadata.annotations.as_ref().and_then(|a| a.get("appversion")),
            Some(&"1.2.3".to_owned())
        );

        let service = &fields.services[0];
        assert_eq!(service.name(), Some("web"));
        assert_eq!(service.metadata.labels.as_ref(), Some(&app_label));
        assert!(service.metadata.annotations.as_ref().unwrap().contains_key("appversion"));

        assert_eq!(fields.config_maps[0].name(), Some("web"));
        assert_eq!(fields.config_maps[0].metadata.labels.as_ref(), Some(&app_label));

        // user defined labels win
        assert_eq!(
            fields.volume_claims[0].metadata.labels.as_ref().and_then(|l| l.get("app")),
            Some(&"custom".to_owned())
        );
        assert_eq!(fields.pod.containers[0].name(), Some("web"));
    }

    #[test]
    fn app_label_is_added_to_declared_labels() {
        let mut app = decode(indoc! {"
            name: web
            labels:
              tier: frontend
            services:
            - ports:
              - port: 80
        "});
        app.fix().unwrap();

        let expected = BTreeMap::from([
            ("app".to_owned(), "web".to_owned()),
            ("tier".to_owned(), "frontend".to_owned()),
        ]);
        assert_eq!(app.fields().labels(), expected);
        assert_eq!(app.fields().services[0].metadata.labels, Some(expected));
    }

    #[test]
    fn declared_app_label_is_kept() {
        let mut app = decode("name: web\nlabels: {app: shop}");
        app.fix().unwrap();
        assert_eq!(
            app.fields().labels(),
            BTreeMap::from([("app".to_owned(), "shop".to_owned())])
        );
    }

    #[rstest]
    #[case::volume_claims("volumeClaims: [{size: 1Gi}]")]
    #[case::config_maps("configMaps: [{data: {key: value}}]")]
    #[case::secrets("secrets: [{stringData: {key: value}}]")]
    #[case::ingresses("ingresses: [{rules: [{host: example.com}]}]")]
    #[case::routes("routes: [{host: example.com}]")]
    #[case::image_streams("imageStreams: [{dockerImageRepository: nginx}]")]
    #[case::build_configs("buildConfigs: [{runPolicy: Serial}]")]
    fn single_entry_is_named_and_labelled_after_the_app(#[case] collection: &str) {
        let mut app = decode(&format!("name: web\n{collection}"));
        app.fix().unwrap();
        let fields = app.fields();

        let metadata: Vec<&ObjectMeta> = fields
            .volume_claims
            .iter()
            .map(HasMetadata::metadata)
            .chain(fields.config_maps.iter().map(HasMetadata::metadata))
            .chain(fields.secrets.iter().map(HasMetadata::metadata))
            .chain(fields.ingresses.iter().map(HasMetadata::metadata))
            .chain(fields.routes.iter().map(HasMetadata::metadata))
            .chain(fields.image_streams.iter().map(HasMetadata::metadata))
            .chain(fields.build_configs.iter().map(HasMetadata::metadata))
            .collect();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata[0].name.as_deref(), Some("web"));
        assert_eq!(
            metadata[0]
                .labels
                .as_ref()
                .and_then(|labels| labels.get("app"))
                .map(String::as_str),
            Some("web")
        );
    }

    #[rstest]
    #[case::secrets("secrets", "secrets: [{stringData: {a: b}}, {name: b}]")]
    #[case::ingresses("ingresses", "ingresses: [{}, {name: b}]")]
    #[case::routes("routes", "routes: [{host: a.example.com}, {name: b}]")]
    #[case::image_streams("imageStreams", "imageStreams: [{}, {name: b}]")]
    #[case::build_configs("buildConfigs", "buildConfigs: [{}, {name: b}]")]
    fn unnamed_entry_among_many_names_its_collection(
        #[case] expected: &str,
        #[case] input: &str,
    ) {
        let mut app = decode(&format!("name: web\n{input}"));
        let err = app.fix().unwrap_err();
        assert!(
            matches!(err, Error::MissingName { collection, index: 0, .. } if collection == expected),
            "unexpected error {err:?}"
        );
    }

    #[test]
    fn claim_mounts_become_pod_volumes() {
        let mut app = decode(indoc! {"
            name: db
            containers:
            - image: postgres
              volumeMounts:
              - name: data
                mountPath: /var/lib/postgresql
              - name: cache
                mountPath: /cache
            volumeClaims:
            - size: 1Gi
              name: data
            volumes:
            - name: cache
              emptyDir: {}
        "});
        app.fix().unwrap();

        let volumes = app.fields().pod.pod_spec.volumes.clone().unwrap();
        let names: Vec<_> = volumes.iter().map(|volume| volume.name.as_str()).collect();
        assert_eq!(names, ["cache", "data"]);
        assert_eq!(
            volumes[1].persistent_volume_claim.as_ref().map(|pvc| pvc.claim_name.as_str()),
            Some("data")
        );
    }

    #[test]
    fn init_container_mounts_are_resolved_on_their_own() {
        let mut app = decode(indoc! {"
            name: web
            containers:
            - image: nginx
            initContainers:
            - name: init
              image: busybox
              volumeMounts:
              - name: missing
                mountPath: /data
        "});
        let err = app.fix().unwrap_err();

        let Error::PopulateVolumes { source, .. } = &err else {
            panic!("expected a volume error, got {err:?}");
        };
        assert_eq!(
            source.to_string(),
            "neither a volume claim nor a pod volume named \"missing\" is defined, referenced in initContainers[0].volumeMounts[0]"
        );
    }

    #[test]
    fn init_containers_share_claim_volumes() {
        let mut app = decode(indoc! {"
            name: db
            containers:
            - image: postgres
              volumeMounts:
              - name: data
                mountPath: /var/lib/postgresql
            initContainers:
            - name: restore
              image: restore
              volumeMounts:
              - name: data
                mountPath: /restore
              - name: logs
                mountPath: /logs
            volumeClaims:
            - name: data
              size: 1Gi
            - name: logs
              size: 100Mi
        "});
        app.fix().unwrap();

        let volumes = app.fields().pod.pod_spec.volumes.clone().unwrap();
        let names: Vec<_> = volumes.iter().map(|volume| volume.name.as_str()).collect();
        assert_eq!(names, ["data", "logs"]);
    }

    #[test]
    fn job_restart_policy_defaults_to_on_failure() {
        let job: JobSpecMod = serde_yaml::from_str(indoc! {"
            name: migrate
            controller: job
            containers:
            - image: migrate
        "})
        .unwrap();
        let mut app = App::Job(job);
        app.fix().unwrap();
        assert_eq!(
            app.fields().pod.pod_spec.restart_policy.as_deref(),
            Some("OnFailure")
        );
    }

    #[test]
    fn deployment_config_replicas_default_to_one() {
        let mut app = App::DeploymentConfig(DeploymentConfigSpecMod {
            fields: ControllerFields {
                metadata: ObjectMeta {
                    name: Some("web".to_owned()),
                    ..ObjectMeta::default()
                },
                config_maps: vec![ConfigMapMod::default()],
                ..ControllerFields::default()
            },
            ..DeploymentConfigSpecMod::default()
        });
        app.fix().unwrap();
        let App::DeploymentConfig(deployment_config) = app else {
            unreachable!()
        };
        assert_eq!(deployment_config.deployment_config.replicas, Some(1));
    }
}
