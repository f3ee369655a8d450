use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Host-assigned experiment handle. Values `<= 0` never name a live experiment.
pub type ExperimentId = i32;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    #[default]
    Ready,
    WaitingForAutoInject,
    Executing,
    Busy,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SampleInfo {
    pub name: String,
    pub description: String,
    pub dndc: f64,
    pub a2: f64,
    pub uv_extinction: f64,
    pub concentration: f64,
}

/// Scalar settings mirrored from an open experiment.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentData {
    pub description: String,
    pub collection_duration: f64,
    pub flow_rate: f64,
    pub injected_volume: f64,
    pub sample: SampleInfo,
}

/// Parameters of one collection run. A negative `flow_rate` keeps the method's pump setting.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AstraMethodInfo {
    pub experiment_path: String,
    pub sample: SampleInfo,
    pub injected_volume: f64,
    pub flow_rate: f64,
    pub duration: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum BaselineType {
    #[default]
    None,
    Manual,
    SnapY,
    Automatic,
}

impl BaselineType {
    pub fn as_str(self) -> &'static str {
        match self {
            BaselineType::None => "None",
            BaselineType::Manual => "Manual",
            BaselineType::SnapY => "SnapY",
            BaselineType::Automatic => "Automatic",
        }
    }

    pub fn code(self) -> i32 {
        match self {
            BaselineType::None => 0,
            BaselineType::Manual => 1,
            BaselineType::SnapY => 2,
            BaselineType::Automatic => 3,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            1 => BaselineType::Manual,
            2 => BaselineType::SnapY,
            3 => BaselineType::Automatic,
            _ => BaselineType::None,
        }
    }
}

impl fmt::Display for BaselineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised names fall back to `None`, matching how the host reads them.
impl FromStr for BaselineType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "manual" => BaselineType::Manual,
            "snapy" => BaselineType::SnapY,
            "automatic" => BaselineType::Automatic,
            _ => BaselineType::None,
        };
        Ok(kind)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct BaselinePoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BaselineDetails {
    pub series_name: String,
    #[serde(rename = "type")]
    pub kind: BaselineType,
    pub start: BaselinePoint,
    pub end: BaselinePoint,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct PeakRange {
    pub number: i32,
    pub start: f64,
    pub end: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentValidation {
    pub is_valid: bool,
    pub details: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogonResult {
    pub is_valid: bool,
    pub error_message: String,
    pub error_details: String,
}

impl LogonResult {
    pub fn accepted() -> Self {
        Self {
            is_valid: true,
            ..Self::default()
        }
    }

    pub fn rejected(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error_message: message.into(),
            error_details: details.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUserInfo {
    pub user_id: String,
    pub full_user_name: String,
    pub local_domain: String,
}

impl ActiveUserInfo {
    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupName {
    pub use_default: bool,
    pub name: String,
    pub custom_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicy {
    pub default_domain: String,
    pub idle_timeout_minutes: i32,
    pub require_signature_on_save: bool,
    pub groups: Vec<GroupName>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UvChannelDetails {
    pub use_channel: bool,
    pub wave_length: f64,
    pub bandwidth: f64,
    pub use_reference: bool,
    pub ref_wave_length: f64,
    pub ref_bandwidth: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UvDeviceDetails {
    pub device_name: String,
    pub device_model: String,
    pub supports_peak_width: bool,
    pub peak_width: String,
    pub supports_slit_width: bool,
    pub slit_width: String,
    pub supports_require_lamp_uv: bool,
    pub require_lamp_uv: bool,
    pub supports_require_lamp_vis: bool,
    pub require_lamp_vis: bool,
    pub uv_channels: Vec<UvChannelDetails>,
}

/// Who is driving the host. The host refuses every call from a client that has not sent one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AutomationIdentity {
    pub entity_name: String,
    pub entity_version: String,
    pub pid: u32,
    pub entity_guid: String,
    pub enabled: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum HostEvent {
    InstrumentDetectionCompleted,
    ExperimentReady { experiment_id: ExperimentId },
    ExperimentRead { experiment_id: ExperimentId },
    ExperimentWrite { experiment_id: ExperimentId },
    ExperimentRun { experiment_id: ExperimentId },
    ExperimentClosed { experiment_id: ExperimentId },
    PreparingForCollection { experiment_id: ExperimentId },
    WaitingForAutoInject { experiment_id: ExperimentId },
    CollectionStarted { experiment_id: ExperimentId },
    CollectionFinished { experiment_id: ExperimentId },
    CollectionAborted { experiment_id: ExperimentId },
}

impl HostEvent {
    pub fn experiment_id(&self) -> Option<ExperimentId> {
        match self {
            HostEvent::InstrumentDetectionCompleted => None,
            HostEvent::ExperimentReady { experiment_id }
            | HostEvent::ExperimentRead { experiment_id }
            | HostEvent::ExperimentWrite { experiment_id }
            | HostEvent::ExperimentRun { experiment_id }
            | HostEvent::ExperimentClosed { experiment_id }
            | HostEvent::PreparingForCollection { experiment_id }
            | HostEvent::WaitingForAutoInject { experiment_id }
            | HostEvent::CollectionStarted { experiment_id }
            | HostEvent::CollectionFinished { experiment_id }
            | HostEvent::CollectionAborted { experiment_id } => Some(*experiment_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_type_names_parse_case_insensitively() {
        assert_eq!("snapy".parse::<BaselineType>(), Ok(BaselineType::SnapY));
        assert_eq!("AUTOMATIC".parse::<BaselineType>(), Ok(BaselineType::Automatic));
        assert_eq!("Manual".parse::<BaselineType>(), Ok(BaselineType::Manual));
        assert_eq!("bogus".parse::<BaselineType>(), Ok(BaselineType::None));
        assert_eq!(BaselineType::SnapY.to_string(), "SnapY");
    }

    #[test]
    fn baseline_type_codes_match_host_numbering() {
        for kind in [
            BaselineType::None,
            BaselineType::Manual,
            BaselineType::SnapY,
            BaselineType::Automatic,
        ] {
            assert_eq!(BaselineType::from_code(kind.code()), kind);
        }
        assert_eq!(BaselineType::Automatic.code(), 3);
        assert_eq!(BaselineType::from_code(42), BaselineType::None);
    }

    #[test]
    fn host_events_are_tagged_by_name() {
        let json = serde_json::to_string(&HostEvent::CollectionStarted { experiment_id: 7 })
            .expect("serialize");
        assert_eq!(json, r#"{"event":"collection_started","experiment_id":7}"#);

        let parsed: HostEvent =
            serde_json::from_str(r#"{"event":"instrument_detection_completed"}"#).expect("parse");
        assert_eq!(parsed, HostEvent::InstrumentDetectionCompleted);
        assert_eq!(parsed.experiment_id(), None);
    }

    #[test]
    fn baseline_details_use_host_field_names() {
        let details = BaselineDetails {
            series_name: "detector1".to_string(),
            kind: BaselineType::SnapY,
            start: BaselinePoint { x: 0.0, y: 1.5 },
            end: BaselinePoint { x: 40.0, y: 1.5 },
        };
        let json = serde_json::to_value(&details).expect("serialize");
        assert_eq!(json["seriesName"], "detector1");
        assert_eq!(json["type"], "SnapY");
    }
}
