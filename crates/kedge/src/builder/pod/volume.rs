use k8s_openapi::api::core::v1::{PersistentVolumeClaimVolumeSource, Volume};

/// A builder to build [`Volume`] objects. Only the sources needed by generated pods are
/// supported.
#[derive(Clone, Default)]
pub struct VolumeBuilder {
    name: String,
    persistent_volume_claim: Option<PersistentVolumeClaimVolumeSource>,
}

impl VolumeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Mounts the claim `claim_name`, leaving `readOnly` to the cluster default.
    pub fn with_persistent_volume_claim(&mut self, claim_name: impl Into<String>) -> &mut Self {
        self.persistent_volume_claim = Some(PersistentVolumeClaimVolumeSource {
            claim_name: claim_name.into(),
            read_only: None,
        });
        self
    }

    pub fn build(&self) -> Volume {
        Volume {
            name: self.name.clone(),
            persistent_volume_claim: self.persistent_volume_claim.clone(),
            ..Volume::default()
        }
    }
}
