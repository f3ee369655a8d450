use super::AstraAdmin;
use crate::error::AutomationResult;
use crate::protocol::{BaselineDetails, ExperimentId, PeakRange};
use crate::version::{AUTOFIND_PEAKS, READ_WRITE_EVENTS};
use tracing::{debug, warn};

impl AstraAdmin {
    pub fn baselines(&self, experiment_id: ExperimentId) -> AutomationResult<Vec<BaselineDetails>> {
        self.try_get("GetBaselines", |host| host.baselines(experiment_id))
    }

    /// An empty list is refused locally; the host would clear every baseline.
    pub fn update_baselines(
        &self,
        experiment_id: ExperimentId,
        baselines: &[BaselineDetails],
    ) -> AutomationResult<bool> {
        if baselines.is_empty() {
            debug!(experiment_id, "no baselines to update");
            return Ok(false);
        }
        self.try_execute("UpdateBaselines", |host| {
            host.update_baselines(experiment_id, baselines)
        })
    }

    pub fn set_auto_autofind_baselines(
        &self,
        experiment_id: ExperimentId,
        enabled: bool,
    ) -> AutomationResult<bool> {
        self.try_execute("SetAutoAutofindBaselines", |host| {
            host.set_auto_autofind_baselines(experiment_id, enabled)
        })
    }

    pub fn peak_ranges(&self, experiment_id: ExperimentId) -> AutomationResult<Vec<PeakRange>> {
        self.try_get("GetPeakRanges", |host| host.peak_ranges(experiment_id))
    }

    pub fn add_peak_range(
        &self,
        experiment_id: ExperimentId,
        start: f64,
        end: f64,
    ) -> AutomationResult<bool> {
        self.try_execute("AddPeakRange", |host| {
            host.add_peak_range(experiment_id, start, end)
        })
    }

    pub fn update_peak_range(
        &self,
        experiment_id: ExperimentId,
        peak: &PeakRange,
    ) -> AutomationResult<bool> {
        self.try_execute("UpdatePeakRange", |host| {
            host.update_peak_range(experiment_id, peak)
        })
    }

    pub fn remove_peak_range(&self, experiment_id: ExperimentId, number: i32) -> AutomationResult<bool> {
        self.try_execute("RemovePeakRange", |host| {
            host.remove_peak_range(experiment_id, number)
        })
    }

    pub fn set_auto_autofind_peaks(
        &self,
        experiment_id: ExperimentId,
        enabled: bool,
    ) -> AutomationResult<bool> {
        let host_version = self.host_version();
        if (READ_WRITE_EVENTS..AUTOFIND_PEAKS).contains(&host_version) {
            warn!(
                %host_version,
                required = %AUTOFIND_PEAKS,
                experiment_id,
                "host ignores automatic peak finding before this version"
            );
        }
        self.try_execute("SetAutoAutofindPeaks", |host| {
            host.set_auto_autofind_peaks(experiment_id, enabled)
        })
    }

    /// Results report as XML, exactly as the host formats it.
    pub fn results(&self, experiment_id: ExperimentId) -> AutomationResult<String> {
        self.try_get("GetResults", |host| host.results(experiment_id))
    }

    pub fn save_results(&self, experiment_id: ExperimentId, path: &str) -> AutomationResult<bool> {
        self.try_execute("SaveResults", |host| host.save_results(experiment_id, path))
    }

    pub fn data_set(
        &self,
        experiment_id: ExperimentId,
        definition_name: &str,
    ) -> AutomationResult<String> {
        self.try_get("GetDataSet", |host| {
            host.data_set(experiment_id, definition_name)
        })
    }

    pub fn data_set_names(&self, experiment_id: ExperimentId) -> AutomationResult<Vec<String>> {
        self.try_get("GetDataSetNames", |host| host.data_set_names(experiment_id))
    }

    pub fn all_data_sets(&self, experiment_id: ExperimentId) -> AutomationResult<String> {
        self.try_get("GetAllDataSets", |host| host.all_data_sets(experiment_id))
    }

    pub fn save_data_set(
        &self,
        experiment_id: ExperimentId,
        definition_name: &str,
        path: &str,
    ) -> AutomationResult<bool> {
        self.try_execute("SaveDataSet", |host| {
            host.save_data_set(experiment_id, definition_name, path)
        })
    }

    pub fn add_fraction_result(
        &self,
        experiment_id: ExperimentId,
        index: f64,
        json: &str,
    ) -> AutomationResult<bool> {
        self.try_execute("AddFractionResult", |host| {
            host.add_fraction_result(experiment_id, index, json)
        })
    }

    pub fn fraction_result(&self, experiment_id: ExperimentId, index: i32) -> AutomationResult<String> {
        self.try_get("GetFractionResult", |host| {
            host.fraction_result(experiment_id, index)
        })
    }
}
