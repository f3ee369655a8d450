use super::AstraAdmin;
use crate::astra_api::{AstraApi, HostResult, NumericField, TextField};
use crate::error::{AutomationError, AutomationResult};
use crate::events::WaitFlag;
use crate::experiment::{Experiment, PendingChange};
use crate::guard;
use crate::protocol::{
    ExperimentData, ExperimentId, ExperimentStatus, ExperimentValidation, SampleInfo,
    UvDeviceDetails,
};
use crate::session::Notification;
use tracing::{debug, info, warn};

impl AstraAdmin {
    /// Creates an experiment from a method template and waits until the host has loaded it.
    ///
    /// `None` when the host refused (with errors suppressed) or handed back no experiment.
    pub fn new_experiment_from_template(
        &self,
        template_path: &str,
    ) -> AutomationResult<Option<ExperimentId>> {
        self.load_experiment("NewExperimentFromTemplate", ExperimentStatus::Busy, |host| {
            host.new_experiment_from_template(template_path)
        })
    }

    pub fn open_experiment(&self, path: &str) -> AutomationResult<Option<ExperimentId>> {
        self.load_experiment("OpenExperiment", ExperimentStatus::Ready, |host| {
            host.open_experiment(path)
        })
    }

    fn load_experiment(
        &self,
        operation: &str,
        initial_status: ExperimentStatus,
        create: impl FnOnce(&dyn AstraApi) -> HostResult<ExperimentId>,
    ) -> AutomationResult<Option<ExperimentId>> {
        let experiment_id = {
            let mut registry = self.shared.lock_registry();
            self.shared.bridge.clear(WaitFlag::ExperimentReady);
            self.shared.bridge.clear(WaitFlag::ExperimentRead);
            self.shared.bridge.clear(WaitFlag::ExperimentRun);
            let created = guard::settle(self.config.error_mode, operation, create(self.host.as_ref()))?;
            let Some(experiment_id) = created else {
                return Ok(None);
            };
            if experiment_id <= 0 {
                warn!(operation, experiment_id, "host returned no experiment");
                return Ok(None);
            }
            let name = self.host.experiment_name(experiment_id).unwrap_or_else(|err| {
                warn!(experiment_id, error = %err, "experiment name unavailable");
                String::new()
            });
            let experiment = Experiment::new(experiment_id, name, initial_status);
            self.shared
                .publish(Notification::StatusChanged(experiment.clone()));
            registry.open.insert(experiment_id, experiment);
            experiment_id
        };

        self.wait_experiment_read()?;
        self.wait_experiment_run()?;
        self.refresh_experiment(experiment_id)?;
        info!(experiment_id, operation, "experiment loaded");
        Ok(Some(experiment_id))
    }

    /// Re-reads every mirrored field from the host into both the snapshot and the working copy.
    pub fn refresh_experiment(&self, experiment_id: ExperimentId) -> AutomationResult<()> {
        let mut registry = self.shared.lock_registry();
        if !registry.open.contains_key(&experiment_id) {
            return Err(AutomationError::UnknownExperiment(experiment_id));
        }
        let data = self.read_experiment_data(experiment_id)?;
        let experiment = registry
            .open
            .get_mut(&experiment_id)
            .ok_or(AutomationError::UnknownExperiment(experiment_id))?;
        experiment.synchronize(data);
        self.shared
            .publish(Notification::StatusChanged(experiment.clone()));
        Ok(())
    }

    /// Caller must hold the session lock.
    fn read_experiment_data(&self, experiment_id: ExperimentId) -> AutomationResult<ExperimentData> {
        let mode = self.config.error_mode;
        let host = self.host.as_ref();
        let number = |field: NumericField| {
            guard::get_or_default(mode, field.getter_name(), host.number(experiment_id, field))
        };
        Ok(ExperimentData {
            description: guard::get_or_default(
                mode,
                TextField::ExperimentDescription.getter_name(),
                host.text(experiment_id, TextField::ExperimentDescription),
            )?,
            collection_duration: number(NumericField::CollectionDuration)?,
            flow_rate: number(NumericField::PumpFlowRate)?,
            injected_volume: number(NumericField::InjectedVolume)?,
            sample: guard::get_or_default(mode, "GetSample", host.sample(experiment_id))?,
        })
    }

    pub fn save_experiment(&self, experiment_id: ExperimentId, path: &str) -> AutomationResult<bool> {
        {
            let mut registry = self.shared.lock_registry();
            let experiment = registry
                .open
                .get_mut(&experiment_id)
                .ok_or(AutomationError::UnknownExperiment(experiment_id))?;
            experiment.status = ExperimentStatus::Busy;
            self.shared.bridge.clear(WaitFlag::ExperimentReady);
            self.shared.bridge.clear(WaitFlag::ExperimentWrite);

            let saved = guard::executed(
                self.config.error_mode,
                "SaveExperiment",
                self.host.save_experiment(experiment_id, path),
            );
            if !matches!(saved, Ok(true)) {
                experiment.status = ExperimentStatus::Ready;
            }
            self.shared
                .publish(Notification::StatusChanged(experiment.clone()));
            if !saved? {
                return Ok(false);
            }
        }
        self.wait_experiment_write()?;
        info!(experiment_id, path, "experiment saved");
        Ok(true)
    }

    pub fn close_experiment(&self, experiment_id: ExperimentId) -> AutomationResult<bool> {
        {
            let mut registry = self.shared.lock_registry();
            let experiment = registry
                .open
                .remove(&experiment_id)
                .ok_or(AutomationError::UnknownExperiment(experiment_id))?;
            registry.closing.insert(experiment_id, experiment);
            self.shared.bridge.clear(WaitFlag::ExperimentClosed);

            let closed = guard::executed(
                self.config.error_mode,
                "CloseExperiment",
                self.host.close_experiment(experiment_id),
            );
            if !matches!(closed, Ok(true)) {
                if let Some(experiment) = registry.closing.remove(&experiment_id) {
                    registry.open.insert(experiment_id, experiment);
                }
            }
            if !closed? {
                return Ok(false);
            }
        }
        self.wait_experiment_closed()?;
        info!(experiment_id, "experiment closed");
        Ok(true)
    }

    /// Snapshot of an open experiment's mirror.
    pub fn experiment(&self, experiment_id: ExperimentId) -> Option<Experiment> {
        self.shared.lock_registry().open.get(&experiment_id).cloned()
    }

    pub fn open_experiments(&self) -> Vec<ExperimentId> {
        self.shared.lock_registry().open.keys().copied().collect()
    }

    /// Edits the working copy. Nothing reaches the host until [`apply_experiment`](Self::apply_experiment).
    pub fn update_experiment<R>(
        &self,
        experiment_id: ExperimentId,
        edit: impl FnOnce(&mut Experiment) -> R,
    ) -> AutomationResult<R> {
        let mut registry = self.shared.lock_registry();
        let experiment = registry
            .open
            .get_mut(&experiment_id)
            .ok_or(AutomationError::UnknownExperiment(experiment_id))?;
        Ok(edit(experiment))
    }

    pub fn reset_experiment(&self, experiment_id: ExperimentId) -> AutomationResult<()> {
        self.update_experiment(experiment_id, Experiment::reset)
    }

    /// Pushes working-copy edits to the host one setter at a time, then re-reads everything.
    pub fn apply_experiment(&self, experiment_id: ExperimentId) -> AutomationResult<()> {
        self.wait_experiment_not_running(experiment_id)?;
        let changes = self.update_experiment(experiment_id, |experiment| {
            experiment.pending_changes()
        })?;
        debug!(experiment_id, count = changes.len(), "applying experiment changes");
        for change in changes {
            match change {
                PendingChange::Description(description) => {
                    self.set_experiment_description(experiment_id, &description)?;
                }
                PendingChange::CollectionDuration(minutes) => {
                    self.set_collection_duration(experiment_id, minutes)?;
                }
                PendingChange::FlowRate(flow_rate) => {
                    self.set_pump_flow_rate(experiment_id, flow_rate)?;
                }
                PendingChange::InjectedVolume(volume) => {
                    self.set_injected_volume(experiment_id, volume)?;
                }
                PendingChange::Sample(sample) => {
                    self.set_sample(experiment_id, &sample)?;
                }
            }
        }
        self.wait_experiment_not_running(experiment_id)?;
        self.refresh_experiment(experiment_id)
    }

    pub fn experiment_name(&self, experiment_id: ExperimentId) -> AutomationResult<String> {
        self.try_get("GetExperimentName", |host| host.experiment_name(experiment_id))
    }

    pub fn is_running(&self, experiment_id: ExperimentId) -> AutomationResult<bool> {
        self.try_get("IsExperimentRunning", |host| {
            host.is_experiment_running(experiment_id)
        })
    }

    pub fn validate_experiment(
        &self,
        experiment_id: ExperimentId,
    ) -> AutomationResult<ExperimentValidation> {
        self.try_get("ValidateExperiment", |host| {
            host.validate_experiment(experiment_id)
        })
    }

    pub fn run_experiment(&self, experiment_id: ExperimentId) -> AutomationResult<bool> {
        self.try_execute_and_wait_run("RunExperiment", |host| host.run_experiment(experiment_id))
    }

    pub fn use_instrument_calibration_constant(
        &self,
        experiment_id: ExperimentId,
        use_instrument: bool,
    ) -> AutomationResult<bool> {
        self.try_execute("UseInstrumentCalibrationConstant", |host| {
            host.use_instrument_calibration_constant(experiment_id, use_instrument)
        })
    }

    pub fn start_collection(&self, experiment_id: ExperimentId) -> AutomationResult<bool> {
        let mut registry = self.shared.lock_registry();
        let experiment = registry
            .open
            .get_mut(&experiment_id)
            .ok_or(AutomationError::UnknownExperiment(experiment_id))?;
        for flag in [
            WaitFlag::PreparingForCollection,
            WaitFlag::WaitingForAutoInject,
            WaitFlag::CollectionStarted,
            WaitFlag::CollectionFinished,
        ] {
            self.shared.bridge.clear(flag);
        }
        let started = guard::executed(
            self.config.error_mode,
            "StartCollection",
            self.host.start_collection(experiment_id),
        )?;
        if started {
            experiment.status = ExperimentStatus::Busy;
            self.shared
                .publish(Notification::StatusChanged(experiment.clone()));
            info!(experiment_id, "collection requested");
        }
        Ok(started)
    }

    pub fn stop_collection(&self, experiment_id: ExperimentId) -> AutomationResult<bool> {
        self.try_execute("StopCollection", |host| host.stop_collection(experiment_id))
    }

    pub fn text(&self, experiment_id: ExperimentId, field: TextField) -> AutomationResult<String> {
        self.try_get(field.getter_name(), |host| host.text(experiment_id, field))
    }

    /// Text fields do not trigger a recompute, so nothing is awaited.
    pub fn set_text(
        &self,
        experiment_id: ExperimentId,
        field: TextField,
        value: &str,
    ) -> AutomationResult<bool> {
        self.try_execute(field.setter_name(), |host| {
            host.set_text(experiment_id, field, value)
        })
    }

    pub fn number(&self, experiment_id: ExperimentId, field: NumericField) -> AutomationResult<f64> {
        self.try_get(field.getter_name(), |host| host.number(experiment_id, field))
    }

    /// Every numeric change but the collection duration makes the host recompute, so those
    /// calls also wait for the run event.
    pub fn set_number(
        &self,
        experiment_id: ExperimentId,
        field: NumericField,
        value: f64,
    ) -> AutomationResult<bool> {
        let call = |host: &dyn AstraApi| host.set_number(experiment_id, field, value);
        if field == NumericField::CollectionDuration {
            return self.try_execute(field.setter_name(), call);
        }
        self.try_execute_and_wait_run(field.setter_name(), call)
    }

    pub fn experiment_description(&self, experiment_id: ExperimentId) -> AutomationResult<String> {
        self.text(experiment_id, TextField::ExperimentDescription)
    }

    pub fn set_experiment_description(
        &self,
        experiment_id: ExperimentId,
        description: &str,
    ) -> AutomationResult<bool> {
        self.set_text(experiment_id, TextField::ExperimentDescription, description)
    }

    pub fn collection_duration(&self, experiment_id: ExperimentId) -> AutomationResult<f64> {
        self.number(experiment_id, NumericField::CollectionDuration)
    }

    pub fn set_collection_duration(
        &self,
        experiment_id: ExperimentId,
        minutes: f64,
    ) -> AutomationResult<bool> {
        self.set_number(experiment_id, NumericField::CollectionDuration, minutes)
    }

    pub fn pump_flow_rate(&self, experiment_id: ExperimentId) -> AutomationResult<f64> {
        self.number(experiment_id, NumericField::PumpFlowRate)
    }

    pub fn set_pump_flow_rate(
        &self,
        experiment_id: ExperimentId,
        flow_rate: f64,
    ) -> AutomationResult<bool> {
        self.set_number(experiment_id, NumericField::PumpFlowRate, flow_rate)
    }

    pub fn injected_volume(&self, experiment_id: ExperimentId) -> AutomationResult<f64> {
        self.number(experiment_id, NumericField::InjectedVolume)
    }

    pub fn set_injected_volume(
        &self,
        experiment_id: ExperimentId,
        volume: f64,
    ) -> AutomationResult<bool> {
        self.set_number(experiment_id, NumericField::InjectedVolume, volume)
    }

    pub fn sample(&self, experiment_id: ExperimentId) -> AutomationResult<SampleInfo> {
        self.try_get("GetSample", |host| host.sample(experiment_id))
    }

    pub fn set_sample(&self, experiment_id: ExperimentId, sample: &SampleInfo) -> AutomationResult<bool> {
        self.try_execute_and_wait_run("SetSample", |host| host.set_sample(experiment_id, sample))
    }

    pub fn set_sample_name(&self, experiment_id: ExperimentId, name: &str) -> AutomationResult<bool> {
        self.set_text(experiment_id, TextField::SampleName, name)
    }

    pub fn set_sample_description(
        &self,
        experiment_id: ExperimentId,
        description: &str,
    ) -> AutomationResult<bool> {
        self.set_text(experiment_id, TextField::SampleDescription, description)
    }

    pub fn set_sample_dndc(&self, experiment_id: ExperimentId, dndc: f64) -> AutomationResult<bool> {
        self.set_number(experiment_id, NumericField::SampleDndc, dndc)
    }

    pub fn set_sample_a2(&self, experiment_id: ExperimentId, a2: f64) -> AutomationResult<bool> {
        self.set_number(experiment_id, NumericField::SampleA2, a2)
    }

    pub fn set_sample_uv_extinction(
        &self,
        experiment_id: ExperimentId,
        uv_extinction: f64,
    ) -> AutomationResult<bool> {
        self.set_number(experiment_id, NumericField::SampleUvExtinction, uv_extinction)
    }

    pub fn set_sample_concentration(
        &self,
        experiment_id: ExperimentId,
        concentration: f64,
    ) -> AutomationResult<bool> {
        self.set_number(experiment_id, NumericField::SampleConcentration, concentration)
    }

    pub fn has_vision_uv(&self, experiment_id: ExperimentId) -> AutomationResult<bool> {
        self.try_get("HasVisionUv", |host| host.has_vision_uv(experiment_id))
    }

    pub fn setup_vision_uv(
        &self,
        experiment_id: ExperimentId,
        details: &UvDeviceDetails,
    ) -> AutomationResult<bool> {
        self.try_execute("SetupVisionUv", |host| {
            host.setup_vision_uv(experiment_id, details)
        })
    }
}
