use std::time::Duration;

pub const NOTIFY_CAP: usize = 256;

/// Condvar waits wake at least this often to observe cancellation.
pub const CANCEL_POLL: Duration = Duration::from_millis(50);

pub use astra_protocol::{
    ActiveUserInfo, AstraMethodInfo, AutomationIdentity, BaselineDetails, BaselinePoint,
    BaselineType, ExperimentData, ExperimentId, ExperimentStatus, ExperimentValidation, GroupName,
    HostEvent, LogonResult, PeakRange, SampleInfo, SecurityPolicy, UvChannelDetails,
    UvDeviceDetails,
};
