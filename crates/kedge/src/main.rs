use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use clap::Parser;
use kedge::{
    cli::{self, Cli},
    cluster::{self, Kubectl},
    decode, logging, output,
    transform::Object,
    validation::{self, InputValidator},
};
use snafu::{ResultExt, Snafu};
use tracing::{debug, info};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize logging"))]
    InitializeLogging { source: logging::Error },

    #[snafu(display("failed to gather input files"))]
    GatherInput { source: cli::Error },

    #[snafu(display("failed to set up schema validation"))]
    LoadSchema { source: validation::Error },

    #[snafu(display("failed to read {path:?}"))]
    ReadInput {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to process application {index} of {path:?}"))]
    ProcessApp {
        source: decode::Error,
        path: PathBuf,
        index: usize,
    },

    #[snafu(display("failed to write the manifests of {path:?}"))]
    WriteManifests {
        source: output::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to print the manifests"))]
    PrintManifests { source: std::io::Error },

    #[snafu(display("failed to run the cluster command"))]
    RunClusterCommand { source: cluster::Error },
}

#[snafu::report]
fn main() -> Result<(), Error> {
    logging::initialize_logging("KEDGE_LOG", "kedge").context(InitializeLoggingSnafu)?;

    let cli = Cli::parse();
    let input = cli.command.input();
    let files = cli::gather_input_files(&input.files).context(GatherInputSnafu)?;
    let validator = input.validator().context(LoadSchemaSnafu)?;

    let mut manifests = Vec::new();
    let mut openshift = false;
    for path in &files {
        openshift |= generate(path, validator.as_ref(), &mut manifests)?;
    }

    match cli.command.cluster_operation() {
        None => io::stdout()
            .lock()
            .write_all(&manifests)
            .context(PrintManifestsSnafu),
        Some((operation, arguments)) => {
            let binary = arguments.cluster_binary(openshift);
            debug!(binary = %binary.display(), openshift, "selected cluster binary");
            let kubectl = Kubectl::new(binary);
            let output = cluster::execute(
                &kubectl,
                operation,
                arguments.namespace.as_deref(),
                &manifests,
            )
            .context(RunClusterCommandSnafu)?;
            io::stdout()
                .lock()
                .write_all(output.as_bytes())
                .context(PrintManifestsSnafu)
        }
    }
}

/// Appends the manifests of every application in `path` to `manifests`, returns whether
/// any of them is an OpenShift object.
fn generate(
    path: &Path,
    validator: &dyn InputValidator,
    manifests: &mut Vec<u8>,
) -> Result<bool, Error> {
    let mut openshift = false;
    let content = fs::read_to_string(path).context(ReadInputSnafu { path })?;
    // Includes resolve against the directory of the file, also when it was given relatively.
    let absolute_path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    for (index, document) in decode::split_documents(&content).iter().enumerate() {
        let transformed =
            decode::run(document, validator).context(ProcessAppSnafu { path, index })?;
        output::write_manifests(&mut *manifests, &transformed, Some(absolute_path.as_path()))
            .context(WriteManifestsSnafu { path })?;
        openshift |= transformed.objects.iter().any(Object::is_openshift);
        info!(
            path = %path.display(),
            index,
            objects = transformed.objects.len(),
            "generated manifests"
        );
    }
    Ok(openshift)
}
