use crate::admin::AstraAdmin;
use crate::error::{AutomationError, AutomationResult};
use crate::protocol::{AstraMethodInfo, ExperimentId};
use crate::version::INDEFINITE_COLLECTION;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// When sample and acquisition parameters are written into the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodInfoTiming {
    /// Before starting; the experiment stays open afterwards.
    BeforeCollection,
    /// After the run, together with the measured duration; the experiment is then saved to
    /// `experiment_path` and closed.
    AfterCollection,
}

impl AstraAdmin {
    /// Creates an experiment from `method_path`, collects one injection and saves it.
    pub fn collect_data(
        &self,
        method_path: &str,
        method_info: &AstraMethodInfo,
        progress: &mut dyn FnMut(&str),
    ) -> AutomationResult<Option<ExperimentId>> {
        progress(&format!("Starting collection using method \"{method_path}\"..."));
        let Some(experiment_id) = self.new_experiment_from_template(method_path)? else {
            return Ok(None);
        };
        self.collect_data_with_method_info(
            experiment_id,
            method_info,
            MethodInfoTiming::AfterCollection,
            progress,
        )?;
        Ok(Some(experiment_id))
    }

    /// Runs one collection on an open experiment, following the host's event sequence:
    /// preparing, waiting for auto-inject, started, finished, run.
    pub fn collect_data_with_method_info(
        &self,
        experiment_id: ExperimentId,
        method_info: &AstraMethodInfo,
        timing: MethodInfoTiming,
        progress: &mut dyn FnMut(&str),
    ) -> AutomationResult<()> {
        if timing == MethodInfoTiming::BeforeCollection {
            self.write_method_info(experiment_id, method_info, method_info.duration)?;
        }

        progress("Collection starting...");
        if !self.start_collection(experiment_id)? {
            return Err(AutomationError::CollectionRejected(experiment_id));
        }
        self.wait_preparing_for_collection()?;
        progress("Preparing for collection...");
        self.wait_waiting_for_auto_inject()?;
        progress("Waiting for auto-inject...");
        self.wait_collection_started()?;
        progress("Starting collecting data...");
        let started = Instant::now();

        if self.host_version() >= INDEFINITE_COLLECTION {
            // Collect until the method (or the operator) stops the run.
            self.set_collection_duration(experiment_id, -1.0)?;
        }

        self.wait_collection_finished()?;
        let minutes = started.elapsed().as_secs_f64() / 60.0;
        progress("Collection finished.");
        info!(experiment_id, minutes, "collection finished");

        progress("Post-collection actions...");
        self.wait_experiment_run()?;

        if timing == MethodInfoTiming::AfterCollection {
            self.write_method_info(experiment_id, method_info, minutes)?;
            progress(&format!(
                "Saving experiment \"{}\"...",
                method_info.experiment_path
            ));
            self.save_experiment(experiment_id, &method_info.experiment_path)?;
            progress("Experiment saved.");
            self.close_experiment(experiment_id)?;
            self.reset_events();
            progress("Collection completed.");
        }
        Ok(())
    }

    /// Stops this client's running collection once it has collected for `limit`.
    ///
    /// Runs beside [`collect_data`](Self::collect_data), which on newer hosts collects until
    /// stopped. Returns `None` without stopping anything if `finished` is set first.
    pub fn stop_collection_after(
        &self,
        limit: Duration,
        finished: &AtomicBool,
    ) -> AutomationResult<Option<ExperimentId>> {
        let poll = self.config().poll_interval;
        let cancel = self.cancel_token();
        let idle = || finished.load(Ordering::Acquire) || cancel.is_cancelled();

        let experiment_id = loop {
            if idle() {
                return Ok(None);
            }
            if let Some(experiment_id) = self.collecting_experiment() {
                break experiment_id;
            }
            thread::sleep(poll);
        };
        info!(experiment_id, ?limit, "collection will be stopped");

        let started = Instant::now();
        while let Some(left) = limit.checked_sub(started.elapsed()) {
            if idle() {
                return Ok(None);
            }
            thread::sleep(poll.min(left));
        }
        if idle() || !self.still_running(experiment_id) {
            return Ok(None);
        }
        self.stop_collection(experiment_id)?;
        info!(experiment_id, "collection stopped");
        Ok(Some(experiment_id))
    }

    fn collecting_experiment(&self) -> Option<ExperimentId> {
        self.open_experiments()
            .into_iter()
            .find(|&experiment_id| self.still_running(experiment_id))
    }

    /// An experiment closed in the meantime is not running.
    fn still_running(&self, experiment_id: ExperimentId) -> bool {
        matches!(self.is_running(experiment_id), Ok(true))
    }

    fn write_method_info(
        &self,
        experiment_id: ExperimentId,
        method_info: &AstraMethodInfo,
        duration: f64,
    ) -> AutomationResult<()> {
        self.set_sample(experiment_id, &method_info.sample)?;
        self.set_collection_duration(experiment_id, duration)?;
        self.set_injected_volume(experiment_id, method_info.injected_volume)?;
        if method_info.flow_rate >= 0.0 {
            self.set_pump_flow_rate(experiment_id, method_info.flow_rate)?;
        }
        Ok(())
    }
}
