//! Validation of raw application documents against a JSON schema.
//!
//! Runs before decoding, so that users get a complete list of schema violations instead
//! of the first deserialization error. By default documents are validated against the
//! schema generated from the input model, see [`AppSchemaValidator`].
use std::{fs, path::Path};

use jsonschema::Draft;
use schemars::{
    JsonSchema, Schema,
    generate::SchemaSettings,
    transform::{Transform, transform_subschemas},
};
use serde_json::Value;
use snafu::{ResultExt, Snafu, ensure};
use tracing::debug;

use crate::spec::{ControllerKind, DeploymentConfigSpecMod, DeploymentSpecMod, JobSpecMod};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read schema file {path:?}"))]
    ReadSchema {
        source: std::io::Error,
        path: String,
    },

    #[snafu(display("failed to parse schema file {path:?}"))]
    ParseSchema {
        source: serde_json::Error,
        path: String,
    },

    #[snafu(display("invalid JSON schema: {message}"))]
    BuildValidator { message: String },

    #[snafu(display("failed to convert the document to JSON"))]
    ConvertDocument { source: serde_yaml::Error },

    #[snafu(display("the document violates the schema:\n{}", violations.join("\n")))]
    SchemaViolations { violations: Vec<String> },
}

/// Validates a parsed application document before it is decoded.
pub trait InputValidator {
    fn validate(&self, document: &Value) -> Result<()>;
}

/// Accepts every document, used when validation is skipped.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopValidator;

impl InputValidator for NoopValidator {
    fn validate(&self, _document: &Value) -> Result<()> {
        Ok(())
    }
}

pub struct JsonSchemaValidator {
    validator: jsonschema::Validator,
}

impl JsonSchemaValidator {
    pub fn new(schema: &Value) -> Result<Self> {
        let validator = jsonschema::options()
            .with_draft(Draft::Draft7)
            .build(schema)
            .map_err(|err| Error::BuildValidator {
                message: err.to_string(),
            })?;
        Ok(Self { validator })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display_path = path.display().to_string();
        let schema = fs::read(path).context(ReadSchemaSnafu {
            path: &display_path,
        })?;
        let schema: Value = serde_json::from_slice(&schema).context(ParseSchemaSnafu {
            path: &display_path,
        })?;
        debug!(path = display_path, "loaded input schema");
        Self::new(&schema)
    }
}

impl InputValidator for JsonSchemaValidator {
    fn validate(&self, document: &Value) -> Result<()> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(document)
            .map(|err| err.to_string())
            .collect();
        ensure!(violations.is_empty(), SchemaViolationsSnafu { violations });
        Ok(())
    }
}

/// Validates documents against the schema generated for the controller kind they select.
///
/// Unknown keys are rejected at every level. Keys the Kubernetes API requires are
/// optional, because kedge fills them in.
pub struct AppSchemaValidator {
    deployment: JsonSchemaValidator,
    job: JsonSchemaValidator,
    deployment_config: JsonSchemaValidator,
}

impl AppSchemaValidator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            deployment: JsonSchemaValidator::new(&app_schema::<DeploymentSpecMod>())?,
            job: JsonSchemaValidator::new(&app_schema::<JobSpecMod>())?,
            deployment_config: JsonSchemaValidator::new(
                &app_schema::<DeploymentConfigSpecMod>(),
            )?,
        })
    }
}

impl InputValidator for AppSchemaValidator {
    fn validate(&self, document: &Value) -> Result<()> {
        let kind = match document.get("controller").and_then(Value::as_str) {
            None | Some("") => ControllerKind::default(),
            Some(controller) => match controller.parse() {
                Ok(kind) => kind,
                // Reported by the decoder with the list of supported controllers.
                Err(_) => return Ok(()),
            },
        };

        match kind {
            ControllerKind::Deployment => self.deployment.validate(document),
            ControllerKind::Job => self.job.validate(document),
            ControllerKind::DeploymentConfig => self.deployment_config.validate(document),
        }
    }
}

/// Generates the draft 7 JSON schema of an application type.
pub fn app_schema<T: JsonSchema>() -> Value {
    SchemaSettings::draft07()
        .with_transform(RejectUnknownKeys)
        .into_generator()
        .into_root_schema_for::<T>()
        .to_value()
}

/// Closes every object schema and drops its `required` keys.
#[derive(Clone, Copy, Debug)]
struct RejectUnknownKeys;

impl Transform for RejectUnknownKeys {
    fn transform(&mut self, schema: &mut Schema) {
        if let Some(object) = schema.as_object_mut() {
            if object.get("required").is_some_and(Value::is_array) {
                object.remove("required");
            }
            if object.contains_key("properties") && !object.contains_key("additionalProperties")
            {
                object.insert("additionalProperties".to_owned(), Value::Bool(false));
            }
        }
        transform_subschemas(self, schema);
    }
}

/// Converts a YAML document into the JSON value the validators work on.
pub fn to_json(document: &str) -> Result<Value> {
    serde_yaml::from_str(document).context(ConvertDocumentSnafu)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use indoc::indoc;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": { "type": "string" },
                "replicas": { "type": "integer" }
            }
        })
    }

    #[test]
    fn valid_document_passes() {
        let validator = JsonSchemaValidator::new(&schema()).unwrap();
        let document = to_json("name: web\nreplicas: 2").unwrap();
        validator.validate(&document).unwrap();
    }

    #[test]
    fn all_violations_are_reported() {
        let validator = JsonSchemaValidator::new(&schema()).unwrap();
        let document = to_json("replicas: two").unwrap();

        let Err(Error::SchemaViolations { violations }) = validator.validate(&document) else {
            panic!("expected schema violations");
        };
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn schema_is_loaded_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(schema().to_string().as_bytes()).unwrap();

        let validator = JsonSchemaValidator::from_file(file.path()).unwrap();
        assert!(validator.validate(&json!({})).is_err());
    }

    #[test]
    fn missing_schema_file_is_reported() {
        assert!(matches!(
            JsonSchemaValidator::from_file("/nonexistent/schema.json"),
            Err(Error::ReadSchema { .. })
        ));
    }

    #[test]
    fn noop_accepts_anything() {
        NoopValidator.validate(&json!([1, 2, 3])).unwrap();
    }

    fn violations(validator: &AppSchemaValidator, document: &str) -> Vec<String> {
        match validator.validate(&to_json(document).unwrap()) {
            Ok(()) => Vec::new(),
            Err(Error::SchemaViolations { violations }) => violations,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    #[rstest]
    #[case::minimal(indoc! {"
        name: web
        containers:
        - image: nginx
    "})]
    #[case::services_only(indoc! {"
        name: db
        services:
        - portMappings: [\"5432\"]
    "})]
    #[case::full_deployment(indoc! {"
        name: web
        appversion: 1.0.0
        replicas: 2
        labels:
          tier: frontend
        containers:
        - image: nginx
          health:
            httpGet:
              path: /
              port: 80
          volumeMounts:
          - name: data
            mountPath: /data
          envFrom:
          - configMapRef:
              name: web
        volumeClaims:
        - name: data
          size: 1Gi
        configMaps:
        - data:
            key: value
        secrets:
        - data:
            password: c2VjcmV0
        services:
        - ports:
          - port: 8080
            targetPort: 80
            endpoint: web.example.com/
            routeEndpoint: \"true\"
        ingresses:
        - rules:
          - host: web.example.com
        includeResources:
        - extra.yaml
    "})]
    #[case::job(indoc! {"
        name: migrate
        controller: job
        activeDeadlineSeconds: 60
        restartPolicy: Never
        containers:
        - image: migrate
    "})]
    #[case::deployment_config(indoc! {"
        name: web
        controller: deploymentconfig
        triggers:
        - type: ConfigChange
        containers:
        - image: nginx
        routes:
        - to:
            kind: Service
            name: web
        imageStreams:
        - tags:
          - name: latest
        buildConfigs:
        - strategy:
            type: Docker
    "})]
    fn generated_schema_accepts_valid_apps(#[case] document: &str) {
        let validator = AppSchemaValidator::new().unwrap();
        assert_eq!(violations(&validator, document), Vec::<String>::new());
    }

    #[rstest]
    #[case::unknown_root_key("name: web\ncontainerz:\n- image: nginx", "containerz")]
    #[case::unknown_container_key("name: web\ncontainers:\n- imagee: nginx", "imagee")]
    #[case::unknown_service_key("name: web\nservices:\n- portMapping: [\"80\"]", "portMapping")]
    #[case::mistyped_replicas("name: web\nreplicas: two", "\"two\"")]
    #[case::mistyped_containers("name: web\ncontainers: nginx", "\"nginx\"")]
    #[case::job_key_on_deployment("name: web\nbackoffLimit: 3", "backoffLimit")]
    fn generated_schema_rejects_invalid_apps(#[case] document: &str, #[case] offender: &str) {
        let validator = AppSchemaValidator::new().unwrap();
        let violations = violations(&validator, document);
        assert_eq!(violations.len(), 1, "{violations:?}");
        assert!(violations[0].contains(offender), "{violations:?}");
    }

    #[test]
    fn unknown_controllers_are_left_to_the_decoder() {
        let validator = AppSchemaValidator::new().unwrap();
        assert_eq!(
            violations(&validator, "controller: statefulset\nserviceName: web"),
            Vec::<String>::new()
        );
    }

    #[test]
    fn kubernetes_required_keys_are_optional() {
        let schema = app_schema::<DeploymentSpecMod>();
        let container = &schema["definitions"]["ContainerSpec"];
        assert_eq!(container["additionalProperties"], json!(false));
        assert!(container.get("required").is_none());
        assert!(schema.get("required").is_none());
    }
}
