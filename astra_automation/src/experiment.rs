use crate::protocol::{ExperimentData, ExperimentId, ExperimentStatus, SampleInfo};

const TOLERANCE: f64 = 1e-6;

/// Local mirror of one open experiment: the last values read from the host and a working copy
/// that callers edit before applying.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    id: ExperimentId,
    name: String,
    pub(crate) status: ExperimentStatus,
    pub(crate) has_data: bool,
    synchronized: ExperimentData,
    data: ExperimentData,
}

/// One working-copy field that differs from what the host last reported.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingChange {
    Description(String),
    CollectionDuration(f64),
    FlowRate(f64),
    InjectedVolume(f64),
    Sample(SampleInfo),
}

impl Experiment {
    pub(crate) fn new(id: ExperimentId, name: String, status: ExperimentStatus) -> Self {
        Self {
            id,
            name,
            status,
            has_data: false,
            synchronized: ExperimentData::default(),
            data: ExperimentData::default(),
        }
    }

    pub fn id(&self) -> ExperimentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ExperimentStatus {
        self.status
    }

    pub fn has_data(&self) -> bool {
        self.has_data
    }

    pub fn data(&self) -> &ExperimentData {
        &self.data
    }

    pub fn synchronized(&self) -> &ExperimentData {
        &self.synchronized
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.data.description = description.into();
    }

    pub fn set_collection_duration(&mut self, minutes: f64) {
        self.data.collection_duration = minutes;
    }

    pub fn set_flow_rate(&mut self, flow_rate: f64) {
        self.data.flow_rate = flow_rate;
    }

    pub fn set_injected_volume(&mut self, volume: f64) {
        self.data.injected_volume = volume;
    }

    pub fn sample_mut(&mut self) -> &mut SampleInfo {
        &mut self.data.sample
    }

    pub(crate) fn synchronize(&mut self, data: ExperimentData) {
        self.synchronized = data.clone();
        self.data = data;
    }

    /// Discards local edits.
    pub fn reset(&mut self) {
        self.data = self.synchronized.clone();
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending_changes().is_empty()
    }

    pub fn pending_changes(&self) -> Vec<PendingChange> {
        let (old, new) = (&self.synchronized, &self.data);
        let mut changes = Vec::new();
        if old.description != new.description {
            changes.push(PendingChange::Description(new.description.clone()));
        }
        if differs(old.collection_duration, new.collection_duration) {
            changes.push(PendingChange::CollectionDuration(new.collection_duration));
        }
        if differs(old.flow_rate, new.flow_rate) {
            changes.push(PendingChange::FlowRate(new.flow_rate));
        }
        if differs(old.injected_volume, new.injected_volume) {
            changes.push(PendingChange::InjectedVolume(new.injected_volume));
        }
        if sample_differs(&old.sample, &new.sample) {
            changes.push(PendingChange::Sample(new.sample.clone()));
        }
        changes
    }
}

fn differs(a: f64, b: f64) -> bool {
    (a - b).abs() > TOLERANCE
}

fn sample_differs(a: &SampleInfo, b: &SampleInfo) -> bool {
    a.name != b.name
        || a.description != b.description
        || differs(a.dndc, b.dndc)
        || differs(a.a2, b.a2)
        || differs(a.uv_extinction, b.uv_extinction)
        || differs(a.concentration, b.concentration)
}
