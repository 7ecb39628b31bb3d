//! Decoding of application documents and the processing pipeline of a single document.
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Deserialize;
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, instrument};

use crate::{
    spec::{self, App, ControllerKind},
    transform::{self, Transformed},
    validation::{self, InputValidator},
};

// `[[ NAME ]]` or `[[ NAME:default ]]`, whitespace around the parts is ignored.
static VARIABLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[\s*(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*(?::\s*(?P<default>[^\]]*?))?\s*\]\]")
        .expect("failed to compile variable regex")
});

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "the variables {names:?} are neither set in the environment nor have a default value"
    ))]
    UndefinedVariables { names: Vec<String> },

    #[snafu(display("failed to parse the application document"))]
    ParseDocument { source: serde_yaml::Error },

    #[snafu(display(
        "unsupported controller {controller:?}, expected one of \"deployment\", \"job\" or \"deploymentconfig\""
    ))]
    UnsupportedController {
        source: strum::ParseError,
        controller: String,
    },

    #[snafu(display("failed to decode the application as {kind}"))]
    DecodeApp {
        source: serde_yaml::Error,
        kind: ControllerKind,
    },

    #[snafu(display("the application document does not match the input schema"))]
    ValidateSchema { source: validation::Error },

    #[snafu(display("the application is invalid"))]
    ValidateApp { source: spec::validate::Error },

    #[snafu(display("failed to set defaults of the application"))]
    FixApp { source: spec::fix::Error },

    #[snafu(display("failed to transform the application"))]
    Transform { source: transform::Error },
}

/// Only the discriminator, every other key is ignored.
#[derive(Deserialize)]
struct ControllerDiscriminator {
    #[serde(default)]
    controller: Option<String>,
}

/// Splits a multi document file at lines consisting of `---`, dropping empty documents.
pub fn split_documents(input: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current = String::new();
    for line in input.lines() {
        if line.trim_end() == "---" {
            documents.push(std::mem::take(&mut current));
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    documents.push(current);

    documents
        .into_iter()
        .filter(|document| {
            document
                .lines()
                .any(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        })
        .collect()
}

/// Replaces every `[[ NAME ]]` in `document` by the value of the environment variable
/// `NAME`. `[[ NAME:default ]]` falls back to `default` when the variable is not set.
pub fn substitute_variables(document: &str) -> Result<String> {
    substitute_variables_with(document, |name| std::env::var(name).ok())
}

/// Like [`substitute_variables`], but looks variables up through `lookup`.
pub fn substitute_variables_with(
    document: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    let mut undefined = Vec::new();
    let substituted = VARIABLE_REGEX.replace_all(document, |captures: &Captures| {
        let name = &captures["name"];
        let value = lookup(name).or_else(|| {
            captures
                .name("default")
                .map(|default| default.as_str().to_owned())
        });
        value.unwrap_or_else(|| {
            undefined.push(name.to_owned());
            String::new()
        })
    });

    ensure!(
        undefined.is_empty(),
        UndefinedVariablesSnafu { names: undefined }
    );
    Ok(substituted.into_owned())
}

/// Reads the controller kind of a document, an absent or empty `controller` selects a Deployment.
pub fn controller_kind(document: &str) -> Result<ControllerKind> {
    let discriminator: ControllerDiscriminator =
        serde_yaml::from_str(document).context(ParseDocumentSnafu)?;
    match discriminator.controller.as_deref() {
        None | Some("") => Ok(ControllerKind::default()),
        Some(controller) => controller
            .parse()
            .context(UnsupportedControllerSnafu { controller }),
    }
}

/// Deserializes a document into the application type selected by its `controller` key.
pub fn decode(document: &str) -> Result<App> {
    let kind = controller_kind(document)?;
    debug!(%kind, "decoding application");

    let app = match kind {
        ControllerKind::Deployment => {
            App::Deployment(serde_yaml::from_str(document).context(DecodeAppSnafu { kind })?)
        }
        ControllerKind::Job => {
            App::Job(serde_yaml::from_str(document).context(DecodeAppSnafu { kind })?)
        }
        ControllerKind::DeploymentConfig => App::DeploymentConfig(
            serde_yaml::from_str(document).context(DecodeAppSnafu { kind })?,
        ),
    };
    Ok(app)
}

/// Decodes, validates and fixes one document.
pub fn decode_fixed(document: &str) -> Result<App> {
    let mut app = decode(document)?;
    app.validate().context(ValidateAppSnafu)?;
    app.fix().context(FixAppSnafu)?;
    Ok(app)
}

/// Runs the whole pipeline for one document: variable substitution, schema validation,
/// decoding, validation, defaulting and transformation.
#[instrument(skip_all)]
pub fn run(document: &str, validator: &dyn InputValidator) -> Result<Transformed> {
    let document = substitute_variables(document)?;
    let value = validation::to_json(&document).context(ValidateSchemaSnafu)?;
    validator.validate(&value).context(ValidateSchemaSnafu)?;

    let app = decode_fixed(&document)?;
    transform::transform(app).context(TransformSnafu)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;
    use crate::validation::NoopValidator;

    #[test]
    fn documents_are_split_at_separators() {
        let documents = split_documents(indoc! {"
            # leading comment
            ---
            name: web
            ---
            name: db
            ---
        "});
        assert_eq!(documents, ["name: web\n", "name: db\n"]);
    }

    #[test]
    fn separators_inside_values_do_not_split() {
        let documents = split_documents("name: web\nannotations:\n  note: a---b\n");
        assert_eq!(documents.len(), 1);
    }

    fn environment(name: &str) -> Option<String> {
        match name {
            "IMAGE_TAG" => Some("1.25".to_owned()),
            "SERVICE_NAME" => Some("shop".to_owned()),
            _ => None,
        }
    }

    #[rstest]
    #[case::set("image: nginx:[[ IMAGE_TAG ]]", "image: nginx:1.25")]
    #[case::no_whitespace("name: [[SERVICE_NAME]]-[[IMAGE_TAG]]", "name: shop-1.25")]
    #[case::set_wins_over_default("image: nginx:[[ IMAGE_TAG:latest ]]", "image: nginx:1.25")]
    #[case::default("image: nginx:[[ TAG:latest ]]", "image: nginx:latest")]
    #[case::default_with_whitespace("image: nginx:[[ TAG: latest]]", "image: nginx:latest")]
    #[case::empty_default("suffix: '[[ SUFFIX: ]]'", "suffix: ''")]
    #[case::no_variables("image: nginx", "image: nginx")]
    fn variables_are_substituted(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(substitute_variables_with(input, environment).unwrap(), expected);
    }

    #[test]
    fn undefined_variables_are_reported_together() {
        let err = substitute_variables_with(
            "name: [[ APP ]]-[[ IMAGE_TAG ]]\nimage: [[ IMAGE ]]",
            environment,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "the variables [\"APP\", \"IMAGE\"] are neither set in the environment nor have a default value"
        );
    }

    #[test]
    fn pipeline_substitutes_before_decoding() {
        let transformed = run(
            indoc! {"
                name: web
                containers:
                - image: nginx:[[ KEDGE_TEST_UNSET_IMAGE_TAG:1.25 ]]
            "},
            &NoopValidator,
        )
        .unwrap();
        let crate::transform::Object::Deployment(deployment) = &transformed.objects[0] else {
            panic!("expected a deployment");
        };
        let containers = &deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers;
        assert_eq!(containers[0].image.as_deref(), Some("nginx:1.25"));

        let err = run("name: [[ KEDGE_TEST_UNSET_NAME ]]", &NoopValidator).unwrap_err();
        assert!(matches!(err, Error::UndefinedVariables { .. }));
    }

    #[rstest]
    #[case::absent("name: web", ControllerKind::Deployment)]
    #[case::empty("name: web\ncontroller: ''", ControllerKind::Deployment)]
    #[case::deployment("controller: deployment", ControllerKind::Deployment)]
    #[case::job("controller: job", ControllerKind::Job)]
    #[case::deployment_config("controller: deploymentconfig", ControllerKind::DeploymentConfig)]
    fn controller_kind_is_detected(#[case] input: &str, #[case] expected: ControllerKind) {
        assert_eq!(controller_kind(input).unwrap(), expected);
    }

    #[test]
    fn unknown_controller_is_rejected() {
        let err = controller_kind("controller: statefulset").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported controller \"statefulset\", expected one of \"deployment\", \"job\" or \"deploymentconfig\""
        );
    }

    #[test]
    fn job_documents_decode_as_jobs() {
        let app = decode(indoc! {"
            name: migrate
            controller: job
            parallelism: 2
            containers:
            - image: migrate
        "})
        .unwrap();
        let App::Job(job) = app else {
            panic!("expected a job");
        };
        assert_eq!(job.job.parallelism, Some(2));
    }

    #[test]
    fn pipeline_reports_the_failing_stage() {
        let err = run(
            indoc! {"
                name: web
                volumeClaims:
                - name: data
                  size: 1Gi
                - name: data
                  size: 1Gi
            "},
            &NoopValidator,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ValidateApp { .. }));

        let err = run("containers: [{image: nginx}]", &NoopValidator).unwrap_err();
        assert!(matches!(err, Error::FixApp { .. }));
    }
}
