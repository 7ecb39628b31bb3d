//! Handing generated manifests to a cluster command line tool.
use std::{
    io::{ErrorKind, Write},
    panic,
    path::PathBuf,
    process::{Command, ExitStatus, Stdio},
    thread,
};

use snafu::{OptionExt, ResultExt, Snafu, ensure};
use strum::{Display, EnumString};
use tracing::{debug, info};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to spawn {binary:?}"))]
    Spawn {
        source: std::io::Error,
        binary: PathBuf,
    },

    #[snafu(display("failed to open the standard input of {binary:?}"))]
    OpenStdin { binary: PathBuf },

    #[snafu(display("failed to pipe manifests into {binary:?}"))]
    WriteStdin {
        source: std::io::Error,
        binary: PathBuf,
    },

    #[snafu(display("failed to wait for {binary:?}"))]
    Wait {
        source: std::io::Error,
        binary: PathBuf,
    },

    #[snafu(display("\"{operation}\" failed with {status}:\n{output}"))]
    CommandFailed {
        operation: Operation,
        status: ExitStatus,
        output: String,
    },
}

/// The operations that pipe manifests into the cluster tool.
#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum Operation {
    Apply,
    Create,
    Delete,
}

impl Operation {
    /// Arguments for reading manifests from the standard input, optionally scoped to a namespace.
    pub fn arguments(self, namespace: Option<&str>) -> Vec<String> {
        let mut args = vec![self.to_string(), "-f".to_owned(), "-".to_owned()];
        if let Some(namespace) = namespace {
            args.extend(["--namespace".to_owned(), namespace.to_owned()]);
        }
        args
    }
}

/// The outcome of a cluster command, with standard output and standard error combined.
#[derive(Clone, Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub output: String,
}

/// Runs a cluster command that reads manifests from its standard input.
pub trait ClusterCommand {
    fn run(&self, args: &[String], manifests: &[u8]) -> Result<CommandOutput>;
}

/// Runs `kubectl`, or a compatible binary such as `oc`.
#[derive(Clone, Debug)]
pub struct Kubectl {
    binary: PathBuf,
}

impl Kubectl {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl ClusterCommand for Kubectl {
    fn run(&self, args: &[String], manifests: &[u8]) -> Result<CommandOutput> {
        let binary = &self.binary;
        debug!(binary = %binary.display(), ?args, "running cluster command");

        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context(SpawnSnafu { binary })?;

        let mut stdin = child.stdin.take().context(OpenStdinSnafu { binary })?;
        // The output pipes are drained while the manifests are written, a command that
        // answers before it read all of its input blocks on full pipes otherwise.
        let (written, output) = thread::scope(|scope| {
            let writer = scope.spawn(move || stdin.write_all(manifests));
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|payload| panic::resume_unwind(payload));
            (written, output)
        });

        let output = output.context(WaitSnafu { binary })?;
        match written {
            // The command stopped reading, its exit status tells why.
            Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                debug!(binary = %binary.display(), "cluster command closed its standard input");
            }
            written => written.context(WriteStdinSnafu { binary })?,
        }
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            status: output.status,
            output: combined,
        })
    }
}

/// Runs `operation` for the given manifests and fails if the command does not succeed.
pub fn execute(
    command: &dyn ClusterCommand,
    operation: Operation,
    namespace: Option<&str>,
    manifests: &[u8],
) -> Result<String> {
    let args = operation.arguments(namespace);
    let CommandOutput { status, output } = command.run(&args, manifests)?;
    ensure!(
        status.success(),
        CommandFailedSnafu {
            operation,
            status,
            output,
        }
    );

    info!(%operation, "cluster command succeeded");
    Ok(output)
}
