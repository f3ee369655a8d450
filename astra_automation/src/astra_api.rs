use crate::protocol::{
    ActiveUserInfo, AutomationIdentity, BaselineDetails, ExperimentId, ExperimentValidation,
    LogonResult, PeakRange, SampleInfo, SecurityPolicy, UvDeviceDetails,
};
use thiserror::Error;

/// Failure reported by the host application for a single automation call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HostError {
    pub message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type HostResult<T> = Result<T, HostError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericField {
    CollectionDuration,
    PumpFlowRate,
    InjectedVolume,
    SampleDndc,
    SampleA2,
    SampleUvExtinction,
    SampleConcentration,
}

impl NumericField {
    pub fn getter_name(self) -> &'static str {
        match self {
            NumericField::CollectionDuration => "GetCollectionDuration",
            NumericField::PumpFlowRate => "GetPumpFlowRate",
            NumericField::InjectedVolume => "GetInjectedVolume",
            NumericField::SampleDndc => "GetSampleDndc",
            NumericField::SampleA2 => "GetSampleA2",
            NumericField::SampleUvExtinction => "GetSampleUvExtinction",
            NumericField::SampleConcentration => "GetSampleConcentration",
        }
    }

    pub fn setter_name(self) -> &'static str {
        match self {
            NumericField::CollectionDuration => "SetCollectionDuration",
            NumericField::PumpFlowRate => "SetPumpFlowRate",
            NumericField::InjectedVolume => "SetInjectedVolume",
            NumericField::SampleDndc => "SetSampleDndc",
            NumericField::SampleA2 => "SetSampleA2",
            NumericField::SampleUvExtinction => "SetSampleUvExtinction",
            NumericField::SampleConcentration => "SetSampleConcentration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    ExperimentDescription,
    SampleName,
    SampleDescription,
}

impl TextField {
    pub fn getter_name(self) -> &'static str {
        match self {
            TextField::ExperimentDescription => "GetExperimentDescription",
            TextField::SampleName => "GetSampleName",
            TextField::SampleDescription => "GetSampleDescription",
        }
    }

    pub fn setter_name(self) -> &'static str {
        match self {
            TextField::ExperimentDescription => "SetExperimentDescription",
            TextField::SampleName => "SetSampleName",
            TextField::SampleDescription => "SetSampleDescription",
        }
    }
}

/// Automation surface of the main ASTRA application.
///
/// Calls that change an experiment are acknowledged asynchronously through
/// [`HostEvent`](crate::protocol::HostEvent)s delivered on the channel handed to
/// [`AstraAdmin::connect`](crate::AstraAdmin::connect).
pub trait AstraApi: Send + Sync {
    fn set_automation_identity(&self, identity: &AutomationIdentity) -> HostResult<()>;
    fn version(&self) -> HostResult<String>;
    fn instruments_detected(&self) -> HostResult<bool>;
    fn request_quit(&self) -> HostResult<()>;
    fn show(&self, visible: bool) -> HostResult<()>;
    fn set_system_state(&self, state: &str, password: &str) -> HostResult<()>;
    fn experiment_templates(&self) -> HostResult<Vec<String>>;
    fn data_database_directory(&self, root_path: &str) -> HostResult<Vec<String>>;

    fn new_experiment_from_template(&self, template_path: &str) -> HostResult<ExperimentId>;
    fn open_experiment(&self, path: &str) -> HostResult<ExperimentId>;
    fn save_experiment(&self, experiment_id: ExperimentId, path: &str) -> HostResult<()>;
    fn close_experiment(&self, experiment_id: ExperimentId) -> HostResult<()>;
    fn experiment_name(&self, experiment_id: ExperimentId) -> HostResult<String>;
    fn is_experiment_running(&self, experiment_id: ExperimentId) -> HostResult<bool>;
    fn validate_experiment(&self, experiment_id: ExperimentId)
        -> HostResult<ExperimentValidation>;
    fn run_experiment(&self, experiment_id: ExperimentId) -> HostResult<()>;
    fn use_instrument_calibration_constant(
        &self,
        experiment_id: ExperimentId,
        use_instrument: bool,
    ) -> HostResult<()>;
    fn start_collection(&self, experiment_id: ExperimentId) -> HostResult<()>;
    fn stop_collection(&self, experiment_id: ExperimentId) -> HostResult<()>;

    fn text(&self, experiment_id: ExperimentId, field: TextField) -> HostResult<String>;
    fn set_text(&self, experiment_id: ExperimentId, field: TextField, value: &str)
        -> HostResult<()>;
    fn number(&self, experiment_id: ExperimentId, field: NumericField) -> HostResult<f64>;
    fn set_number(
        &self,
        experiment_id: ExperimentId,
        field: NumericField,
        value: f64,
    ) -> HostResult<()>;
    fn sample(&self, experiment_id: ExperimentId) -> HostResult<SampleInfo>;
    fn set_sample(&self, experiment_id: ExperimentId, sample: &SampleInfo) -> HostResult<()>;

    fn has_vision_uv(&self, experiment_id: ExperimentId) -> HostResult<bool>;
    fn setup_vision_uv(
        &self,
        experiment_id: ExperimentId,
        details: &UvDeviceDetails,
    ) -> HostResult<()>;

    fn baselines(&self, experiment_id: ExperimentId) -> HostResult<Vec<BaselineDetails>>;
    fn update_baselines(
        &self,
        experiment_id: ExperimentId,
        baselines: &[BaselineDetails],
    ) -> HostResult<()>;
    fn set_auto_autofind_baselines(
        &self,
        experiment_id: ExperimentId,
        enabled: bool,
    ) -> HostResult<()>;

    fn peak_ranges(&self, experiment_id: ExperimentId) -> HostResult<Vec<PeakRange>>;
    fn add_peak_range(&self, experiment_id: ExperimentId, start: f64, end: f64)
        -> HostResult<()>;
    fn update_peak_range(&self, experiment_id: ExperimentId, peak: &PeakRange) -> HostResult<()>;
    fn remove_peak_range(&self, experiment_id: ExperimentId, number: i32) -> HostResult<()>;
    fn set_auto_autofind_peaks(&self, experiment_id: ExperimentId, enabled: bool)
        -> HostResult<()>;

    fn results(&self, experiment_id: ExperimentId) -> HostResult<String>;
    fn save_results(&self, experiment_id: ExperimentId, path: &str) -> HostResult<()>;
    fn data_set(&self, experiment_id: ExperimentId, definition_name: &str) -> HostResult<String>;
    fn data_set_names(&self, experiment_id: ExperimentId) -> HostResult<Vec<String>>;
    fn all_data_sets(&self, experiment_id: ExperimentId) -> HostResult<String>;
    fn save_data_set(
        &self,
        experiment_id: ExperimentId,
        definition_name: &str,
        path: &str,
    ) -> HostResult<()>;
    fn add_fraction_result(
        &self,
        experiment_id: ExperimentId,
        index: f64,
        json: &str,
    ) -> HostResult<()>;
    fn fraction_result(&self, experiment_id: ExperimentId, index: i32) -> HostResult<String>;

    /// Makes a logon that the security pack already accepted effective in the main application.
    fn validate_logon(&self, user_id: &str, password: &str, domain: &str)
        -> HostResult<LogonResult>;
}

/// Automation surface of the optional security pack application.
pub trait SecurityPackApi: Send + Sync {
    fn set_automation_identity(&self, identity: &AutomationIdentity) -> HostResult<()>;
    fn is_security_pack_active(&self) -> HostResult<bool>;
    fn is_logged_in(&self) -> HostResult<bool>;
    fn validate_logon(
        &self,
        user_id: &str,
        password: &str,
        domain: &str,
    ) -> HostResult<Option<LogonResult>>;
    fn active_user_info(&self) -> HostResult<ActiveUserInfo>;
    fn security_policy(&self) -> HostResult<SecurityPolicy>;
    fn setup_database_connection(
        &self,
        database_name: &str,
        user_id: &str,
        password: &str,
    ) -> HostResult<()>;
    fn enable_security_pack(&self, enabled: bool) -> HostResult<()>;
    fn request_quit(&self) -> HostResult<()>;
}
