//! Checks of decoded applications that run before any defaulting.
use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::PodSpec;
use snafu::{Snafu, ensure};

use crate::spec::{App, JobSpecMod, Named, VolumeClaim};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("duplicate entry of volume claim {name:?}"))]
    DuplicateVolumeClaim { name: String },

    #[snafu(display(
        "job {name:?} cannot use restartPolicy \"Always\", only \"OnFailure\" and \"Never\" are valid"
    ))]
    JobRestartPolicyAlways { name: String },
}

impl App {
    pub fn validate(&self) -> Result<()> {
        validate_volume_claims(&self.fields().volume_claims)?;
        if let Self::Job(job) = self {
            validate_job(job)?;
        }
        Ok(())
    }
}

/// Claim names must be unique. Unnamed claims are left to defaulting.
pub fn validate_volume_claims(claims: &[VolumeClaim]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in claims.iter().filter_map(Named::name) {
        ensure!(
            seen.insert(name),
            DuplicateVolumeClaimSnafu { name }
        );
    }
    Ok(())
}

fn validate_job(job: &JobSpecMod) -> Result<()> {
    let is_always = |pod: Option<&PodSpec>| {
        pod.and_then(|pod| pod.restart_policy.as_deref()) == Some("Always")
    };
    ensure!(
        !is_always(Some(&job.fields.pod.pod_spec)) && !is_always(job.job.template.spec.as_ref()),
        JobRestartPolicyAlwaysSnafu {
            name: job.fields.name()
        }
    );
    Ok(())
}
