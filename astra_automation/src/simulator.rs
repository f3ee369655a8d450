//! In-process stand-in for ASTRA and its security pack.
//!
//! It keeps experiments in memory, persists saved experiments as JSON, and raises host events
//! in the order ASTRA does. Peak, baseline and result values are canned, not computed.

use crate::astra_api::{
    AstraApi, HostError, HostResult, NumericField, SecurityPackApi, TextField,
};
use crate::protocol::{
    ActiveUserInfo, AutomationIdentity, BaselineDetails, BaselinePoint, BaselineType,
    ExperimentData, ExperimentId, ExperimentValidation, GroupName, HostEvent, LogonResult,
    PeakRange, SampleInfo, SecurityPolicy, UvChannelDetails, UvDeviceDetails,
};
use crate::version::{AstraVersion, READ_WRITE_EVENTS};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// File name of the bundled polystyrene reference run; opening it from any directory works.
pub const REFERENCE_EXPERIMENT: &str = "30k polystyrene treos + rex.afe7";

pub const TEMPLATES: [&str; 3] = [
    "//dbf/Method Builder/Light Scattering/Batch",
    "//dbf/System/Online/light scattering",
    "//dbf/System/Online/light scattering + UV",
];

pub const DATA_SET_DEFINITIONS: [&str; 3] = [
    "mean square radius vs volume",
    "molar mass vs volume",
    "concentration vs volume",
];

pub const BASELINE_SERIES: [&str; 4] = [
    "detector1",
    "detector2",
    "detector3",
    "differentialrefractiveindexdata",
];

pub const DEMO_DOMAIN: &str = "lab.local";

const FILE_ERROR: &str = "Cannot read file. File name may be incorrect. Otherwise, file is either from a new version of ASTRA or corrupt.";
const UNIDENTIFIED: &str = "Automation client has not called SetAutomationIdentity.";
const NOT_AUTHORIZED: &str = "The active user is not authorized to modify experiments.";
const COLLECTING: &str = "The experiment is collecting data and cannot be modified.";
const SHUTTING_DOWN: &str = "ASTRA is shutting down.";
const TIMER_TICK: Duration = Duration::from_millis(5);
const DATA_SET_STEPS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Guest,
    Technician,
    Researcher,
    Administrator,
}

impl Role {
    fn can_edit(self) -> bool {
        !matches!(self, Role::Guest)
    }

    fn group(self) -> &'static str {
        match self {
            Role::Guest => "ASTRA Guests",
            Role::Technician => "ASTRA Technicians",
            Role::Researcher => "ASTRA Researchers",
            Role::Administrator => "ASTRA Administrators",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedUser {
    pub user_id: String,
    pub full_name: String,
    pub password: String,
    pub domain: String,
    pub role: Role,
}

impl SimulatedUser {
    pub fn new(user_id: &str, full_name: &str, password: &str, role: Role) -> Self {
        Self {
            user_id: user_id.to_string(),
            full_name: full_name.to_string(),
            password: password.to_string(),
            domain: DEMO_DOMAIN.to_string(),
            role,
        }
    }

    fn matches(&self, user_id: &str, password: &str, domain: &str) -> bool {
        self.user_id.eq_ignore_ascii_case(user_id)
            && self.domain.eq_ignore_ascii_case(domain)
            && self.password == password
    }
}

pub fn demo_users() -> Vec<SimulatedUser> {
    vec![
        SimulatedUser::new("guest", "Guest Account", "guest-pass", Role::Guest),
        SimulatedUser::new("tech", "Lab Technician", "tech-pass", Role::Technician),
        SimulatedUser::new("admin", "Lab Administrator", "admin-pass", Role::Administrator),
    ]
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub version: String,
    pub detection_delay: Duration,
    /// Real time that stands in for one minute of collection.
    pub minute: Duration,
    pub security_pack_active: bool,
    pub users: Vec<SimulatedUser>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            version: "8.2.0.117".to_string(),
            detection_delay: Duration::from_millis(20),
            minute: Duration::from_millis(100),
            security_pack_active: false,
            users: demo_users(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimExperiment {
    name: String,
    data: ExperimentData,
    baselines: Vec<BaselineDetails>,
    peaks: Vec<PeakRange>,
    #[serde(default)]
    fractions: BTreeMap<i32, String>,
    has_data: bool,
    run_length: f64,
    #[serde(default)]
    molar_mass: String,
    #[serde(default)]
    use_instrument_calibration: bool,
    #[serde(default)]
    vision_uv: Option<UvDeviceDetails>,
    #[serde(skip)]
    collecting: bool,
    #[serde(skip)]
    generation: u64,
}

impl SimExperiment {
    fn from_template(template: &str) -> Self {
        let vision_uv = template.ends_with("+ UV").then(vision_uv_device);
        Self {
            name: String::new(),
            data: ExperimentData {
                description: String::new(),
                collection_duration: 5.0,
                flow_rate: 1.0,
                injected_volume: 0.1,
                sample: SampleInfo {
                    dndc: 0.185,
                    ..SampleInfo::default()
                },
            },
            baselines: BASELINE_SERIES
                .iter()
                .map(|series| BaselineDetails {
                    series_name: series.to_string(),
                    ..BaselineDetails::default()
                })
                .collect(),
            peaks: Vec::new(),
            fractions: BTreeMap::new(),
            has_data: false,
            run_length: 0.0,
            molar_mass: String::new(),
            use_instrument_calibration: true,
            vision_uv,
            collecting: false,
            generation: 0,
        }
    }

    fn reference() -> Self {
        let offsets = [0.000_912_4, 0.001_037_2, 0.000_884_9, -0.000_021_7];
        Self {
            name: "30k polystyrene treos + rex".to_string(),
            data: ExperimentData {
                description: "30 kDa polystyrene in THF".to_string(),
                collection_duration: 40.0,
                flow_rate: 0.5,
                injected_volume: 0.1,
                sample: SampleInfo {
                    name: "PS 30k".to_string(),
                    description: "polystyrene standard".to_string(),
                    dndc: 0.185,
                    a2: 0.0,
                    uv_extinction: 0.0,
                    concentration: 2.0,
                },
            },
            baselines: BASELINE_SERIES
                .iter()
                .zip(offsets)
                .map(|(series, y)| BaselineDetails {
                    series_name: series.to_string(),
                    kind: BaselineType::SnapY,
                    start: BaselinePoint { x: 1.2, y },
                    end: BaselinePoint { x: 38.5, y },
                })
                .collect(),
            peaks: vec![PeakRange {
                number: 1,
                start: 29.226_289_472_413_5,
                end: 31.176_610_775_345_4,
            }],
            fractions: BTreeMap::new(),
            has_data: true,
            run_length: 39.982_066_666_666_6,
            molar_mass: "3.043288841e+04".to_string(),
            use_instrument_calibration: true,
            vision_uv: None,
            collecting: false,
            generation: 0,
        }
    }

    fn renumber_peaks(&mut self) {
        self.peaks.sort_by(|a, b| a.start.total_cmp(&b.start));
        for (index, peak) in self.peaks.iter_mut().enumerate() {
            peak.number = index as i32 + 1;
        }
    }

    fn peak_mut(&mut self, number: i32) -> HostResult<&mut PeakRange> {
        self.peaks
            .iter_mut()
            .find(|peak| peak.number == number)
            .ok_or_else(|| HostError::new(format!("Peak {number} does not exist.")))
    }

    fn ensure_idle(&self) -> HostResult<()> {
        if self.collecting {
            return Err(HostError::new(COLLECTING));
        }
        Ok(())
    }
}

fn vision_uv_device() -> UvDeviceDetails {
    let channel = |wave_length| UvChannelDetails {
        use_channel: true,
        wave_length,
        bandwidth: 4.0,
        use_reference: false,
        ref_wave_length: 360.0,
        ref_bandwidth: 100.0,
    };
    UvDeviceDetails {
        device_name: "VISION UV".to_string(),
        device_model: "UV-2000".to_string(),
        supports_peak_width: true,
        peak_width: "0.1 min".to_string(),
        supports_slit_width: true,
        slit_width: "4 nm".to_string(),
        supports_require_lamp_uv: true,
        require_lamp_uv: true,
        supports_require_lamp_vis: true,
        require_lamp_vis: false,
        uv_channels: vec![channel(254.0), channel(280.0)],
    }
}

#[derive(Debug, Default)]
struct SecurityState {
    active: bool,
    identified: bool,
    database: Option<String>,
    pending_user: Option<(String, String)>,
    logged_in: Option<String>,
}

#[derive(Debug)]
struct SimState {
    identified: bool,
    quit: bool,
    visible: bool,
    system_state: String,
    instruments_detected: bool,
    next_id: ExperimentId,
    experiments: BTreeMap<ExperimentId, SimExperiment>,
    security: SecurityState,
    users: Vec<SimulatedUser>,
}

impl SimState {
    fn experiment(&mut self, experiment_id: ExperimentId) -> HostResult<&mut SimExperiment> {
        self.experiments
            .get_mut(&experiment_id)
            .ok_or_else(|| HostError::new("Invalid experiment ID."))
    }

    fn active_user(&self) -> Option<&SimulatedUser> {
        let user_id = self.security.logged_in.as_ref()?;
        self.users.iter().find(|user| &user.user_id == user_id)
    }

    fn require_editor(&self) -> HostResult<()> {
        if !self.security.active {
            return Ok(());
        }
        match self.active_user() {
            Some(user) if user.role.can_edit() => Ok(()),
            _ => Err(HostError::new(NOT_AUTHORIZED)),
        }
    }

    /// An experiment the active user may change and that is not collecting.
    fn editable(&mut self, experiment_id: ExperimentId) -> HostResult<&mut SimExperiment> {
        self.require_editor()?;
        let experiment = self.experiment(experiment_id)?;
        experiment.ensure_idle()?;
        Ok(experiment)
    }

    fn insert(&mut self, mut experiment: SimExperiment) -> ExperimentId {
        let experiment_id = self.next_id;
        self.next_id += 1;
        if experiment.name.is_empty() {
            experiment.name = format!("Untitled {experiment_id}");
        }
        self.experiments.insert(experiment_id, experiment);
        experiment_id
    }

    fn find_user(&self, user_id: &str, password: &str, domain: &str) -> Option<&SimulatedUser> {
        self.users
            .iter()
            .find(|user| user.matches(user_id, password, domain))
    }
}

struct SimInner {
    state: Mutex<SimState>,
    events: Sender<HostEvent>,
    config: SimulatorConfig,
    /// Hosts before 8.1.1.0 acknowledge reads, writes and recomputes with a single ready event.
    legacy_events: bool,
}

/// Simulated host; clones share one application instance.
#[derive(Clone)]
pub struct SimulatedAstra {
    inner: Arc<SimInner>,
}

impl SimulatedAstra {
    /// Starts the simulated application. Host events arrive on the returned receiver.
    pub fn new(config: SimulatorConfig) -> (Self, Receiver<HostEvent>) {
        let (tx, rx) = unbounded();
        let legacy_events = config
            .version
            .parse::<AstraVersion>()
            .is_ok_and(|version| version < READ_WRITE_EVENTS);
        let state = SimState {
            identified: false,
            quit: false,
            visible: true,
            system_state: "Ready".to_string(),
            instruments_detected: false,
            next_id: 1,
            experiments: BTreeMap::new(),
            security: SecurityState {
                active: config.security_pack_active,
                database: config
                    .security_pack_active
                    .then(|| "simulated".to_string()),
                ..SecurityState::default()
            },
            users: config.users.clone(),
        };
        let sim = Self {
            inner: Arc::new(SimInner {
                state: Mutex::new(state),
                events: tx,
                config,
                legacy_events,
            }),
        };

        let detector = sim.clone();
        thread::spawn(move || {
            thread::sleep(detector.inner.config.detection_delay);
            detector.lock().instruments_detected = true;
            detector.emit(HostEvent::InstrumentDetectionCompleted);
        });

        (sim, rx)
    }

    pub fn quit_requested(&self) -> bool {
        self.lock().quit
    }

    pub fn is_visible(&self) -> bool {
        self.lock().visible
    }

    pub fn system_state(&self) -> String {
        self.lock().system_state.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// State of an identified, running application.
    fn session(&self) -> HostResult<MutexGuard<'_, SimState>> {
        let state = self.lock();
        if state.quit {
            return Err(HostError::new(SHUTTING_DOWN));
        }
        if !state.identified {
            return Err(HostError::new(UNIDENTIFIED));
        }
        Ok(state)
    }

    fn security_session(&self) -> HostResult<MutexGuard<'_, SimState>> {
        let state = self.lock();
        if !state.security.identified {
            return Err(HostError::new(UNIDENTIFIED));
        }
        Ok(state)
    }

    fn emit(&self, event: HostEvent) {
        if self.inner.events.send(event).is_err() {
            debug!(?event, "no listener for host event");
        }
    }

    /// Raises read, write and run acknowledgements, or one ready event on a legacy host.
    fn acknowledge(&self, events: &[HostEvent]) {
        if !self.inner.legacy_events {
            events.iter().for_each(|event| self.emit(*event));
            return;
        }
        if let Some(experiment_id) = events.first().and_then(HostEvent::experiment_id) {
            self.emit(HostEvent::ExperimentReady { experiment_id });
        }
    }

    fn finish_collection(&self, experiment: &mut SimExperiment, experiment_id: ExperimentId) {
        experiment.collecting = false;
        experiment.has_data = true;
        if experiment.run_length <= 0.0 {
            experiment.run_length = experiment.data.collection_duration.max(1.0);
        }
        self.emit(HostEvent::CollectionFinished { experiment_id });
        self.acknowledge(&[HostEvent::ExperimentRun { experiment_id }]);
    }

    /// Ends the run once `minutes` (the duration in force when it started) have elapsed, the
    /// way a method stops its own acquisition. A duration of -1 runs until stopped.
    fn spawn_collection_timer(&self, experiment_id: ExperimentId, generation: u64, minutes: f64) {
        let sim = self.clone();
        thread::spawn(move || {
            let started = Instant::now();
            loop {
                thread::sleep(TIMER_TICK);
                let mut state = sim.lock();
                let Some(experiment) = state.experiments.get_mut(&experiment_id) else {
                    return;
                };
                if !experiment.collecting || experiment.generation != generation {
                    return;
                }
                if minutes >= 0.0
                    && started.elapsed() >= sim.inner.config.minute.mul_f64(minutes.min(1.0e6))
                {
                    sim.finish_collection(experiment, experiment_id);
                    return;
                }
            }
        });
    }
}

fn load_experiment_file(path: &str) -> HostResult<SimExperiment> {
    let file_name = Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if file_name == REFERENCE_EXPERIMENT {
        return Ok(SimExperiment::reference());
    }
    let text = fs::read_to_string(path).map_err(|_| HostError::new(FILE_ERROR))?;
    let mut experiment: SimExperiment =
        serde_json::from_str(&text).map_err(|_| HostError::new(FILE_ERROR))?;
    if experiment.name.is_empty() {
        experiment.name = Path::new(path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    Ok(experiment)
}

fn write_host_file(path: &str, text: &str) -> HostResult<()> {
    fs::write(path, text.replace('\n', "\r\n"))
        .map_err(|err| HostError::new(format!("Unable to write \"{path}\": {err}")))
}

fn results_xml(experiment: &SimExperiment) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<results>\n");
    let _ = writeln!(
        xml,
        "  <experiment name=\"{}\" hasData=\"{}\" />",
        escape_xml(&experiment.name),
        experiment.has_data
    );
    for peak in &experiment.peaks {
        let _ = writeln!(
            xml,
            "  <peak number=\"{}\" start=\"{}\" end=\"{}\">",
            peak.number, peak.start, peak.end
        );
        if !experiment.molar_mass.is_empty() {
            let _ = writeln!(
                xml,
                "    <molarMass units=\"g/mol\">{}</molarMass>",
                experiment.molar_mass
            );
        }
        xml.push_str("  </peak>\n");
    }
    xml.push_str("</results>\n");
    xml
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn data_set_text(experiment: &SimExperiment, definition_name: &str) -> HostResult<String> {
    let definition = definition_name.trim().to_lowercase();
    let column = match definition.as_str() {
        "mean square radius vs volume" => "rms radius (nm)",
        "molar mass vs volume" => "molar mass (g/mol)",
        "concentration vs volume" => "concentration (g/mL)",
        _ => {
            return Err(HostError::new(format!(
                "Data set definition \"{definition_name}\" was not found."
            )))
        }
    };
    if !experiment.has_data {
        return Err(HostError::new("The experiment contains no collected data."));
    }

    let total_volume = experiment.run_length * experiment.data.flow_rate.max(0.01);
    let center = total_volume * 0.75;
    let mut text = format!("volume (mL),{column}\n");
    for step in 0..=DATA_SET_STEPS {
        let volume = total_volume * step as f64 / DATA_SET_STEPS as f64;
        let value = match definition.as_str() {
            "mean square radius vs volume" => 4.0 + 0.05 * (total_volume - volume),
            "molar mass vs volume" => 3.0e4 * (-(volume - center) * 0.4).exp(),
            _ => {
                experiment.data.sample.concentration.max(0.1)
                    * 1.0e-3
                    * (-(volume - center).powi(2) / 0.5).exp()
            }
        };
        let _ = writeln!(text, "{volume:.4},{value:.6e}");
    }
    Ok(text)
}

impl AstraApi for SimulatedAstra {
    fn set_automation_identity(&self, identity: &AutomationIdentity) -> HostResult<()> {
        if identity.entity_name.is_empty() || identity.entity_guid.is_empty() {
            return Err(HostError::new("Automation identity is incomplete."));
        }
        let mut state = self.lock();
        if state.quit {
            return Err(HostError::new(SHUTTING_DOWN));
        }
        state.identified = true;
        debug!(client = %identity.entity_name, "simulated host identified client");
        Ok(())
    }

    fn version(&self) -> HostResult<String> {
        let _state = self.session()?;
        Ok(self.inner.config.version.clone())
    }

    fn instruments_detected(&self) -> HostResult<bool> {
        Ok(self.session()?.instruments_detected)
    }

    fn request_quit(&self) -> HostResult<()> {
        self.lock().quit = true;
        Ok(())
    }

    fn show(&self, visible: bool) -> HostResult<()> {
        self.session()?.visible = visible;
        Ok(())
    }

    fn set_system_state(&self, state: &str, _password: &str) -> HostResult<()> {
        if state.trim().is_empty() {
            return Err(HostError::new("System state is required."));
        }
        self.session()?.system_state = state.to_string();
        Ok(())
    }

    fn experiment_templates(&self) -> HostResult<Vec<String>> {
        let _state = self.session()?;
        Ok(TEMPLATES.iter().map(|t| t.to_string()).collect())
    }

    fn data_database_directory(&self, root_path: &str) -> HostResult<Vec<String>> {
        let _state = self.session()?;
        let root = root_path.trim_end_matches('/');
        let mut folders: Vec<String> = TEMPLATES
            .iter()
            .filter(|template| template.starts_with(root))
            .filter_map(|template| template.rsplit_once('/').map(|(dir, _)| dir.to_string()))
            .collect();
        folders.dedup();
        Ok(folders)
    }

    fn new_experiment_from_template(&self, template_path: &str) -> HostResult<ExperimentId> {
        let mut state = self.session()?;
        state.require_editor()?;
        let template = TEMPLATES
            .iter()
            .find(|template| template.eq_ignore_ascii_case(template_path))
            .ok_or_else(|| HostError::new(format!("Method \"{template_path}\" was not found.")))?;
        let experiment_id = state.insert(SimExperiment::from_template(template));
        self.acknowledge(&[
            HostEvent::ExperimentRead { experiment_id },
            HostEvent::ExperimentRun { experiment_id },
        ]);
        Ok(experiment_id)
    }

    fn open_experiment(&self, path: &str) -> HostResult<ExperimentId> {
        let mut state = self.session()?;
        let experiment = load_experiment_file(path)?;
        let experiment_id = state.insert(experiment);
        self.acknowledge(&[
            HostEvent::ExperimentRead { experiment_id },
            HostEvent::ExperimentRun { experiment_id },
        ]);
        Ok(experiment_id)
    }

    fn save_experiment(&self, experiment_id: ExperimentId, path: &str) -> HostResult<()> {
        let mut state = self.session()?;
        let experiment = state.editable(experiment_id)?;
        let target = if path.to_lowercase().ends_with(".afe8") {
            path.to_string()
        } else {
            format!("{path}.afe8")
        };
        let json = serde_json::to_string_pretty(&*experiment)
            .map_err(|err| HostError::new(format!("Unable to save experiment: {err}")))?;
        fs::write(&target, json)
            .map_err(|err| HostError::new(format!("Unable to save experiment: {err}")))?;
        if let Some(stem) = Path::new(&target).file_stem() {
            experiment.name = stem.to_string_lossy().into_owned();
        }
        self.acknowledge(&[HostEvent::ExperimentWrite { experiment_id }]);
        Ok(())
    }

    fn close_experiment(&self, experiment_id: ExperimentId) -> HostResult<()> {
        let mut state = self.session()?;
        state
            .experiments
            .remove(&experiment_id)
            .ok_or_else(|| HostError::new("Invalid experiment ID."))?;
        self.emit(HostEvent::ExperimentClosed { experiment_id });
        Ok(())
    }

    fn experiment_name(&self, experiment_id: ExperimentId) -> HostResult<String> {
        Ok(self.session()?.experiment(experiment_id)?.name.clone())
    }

    fn is_experiment_running(&self, experiment_id: ExperimentId) -> HostResult<bool> {
        Ok(self.session()?.experiment(experiment_id)?.collecting)
    }

    fn validate_experiment(&self, experiment_id: ExperimentId) -> HostResult<ExperimentValidation> {
        let mut state = self.session()?;
        let data = &state.experiment(experiment_id)?.data;
        let mut problems = Vec::new();
        if data.collection_duration == 0.0 {
            problems.push("Collection duration must not be zero.");
        }
        if data.flow_rate < 0.0 {
            problems.push("Pump flow rate must not be negative.");
        }
        if data.injected_volume < 0.0 {
            problems.push("Injected volume must not be negative.");
        }
        Ok(ExperimentValidation {
            is_valid: problems.is_empty(),
            details: problems.join("\n"),
        })
    }

    fn run_experiment(&self, experiment_id: ExperimentId) -> HostResult<()> {
        let mut state = self.session()?;
        state.editable(experiment_id)?;
        self.acknowledge(&[HostEvent::ExperimentRun { experiment_id }]);
        Ok(())
    }

    fn use_instrument_calibration_constant(
        &self,
        experiment_id: ExperimentId,
        use_instrument: bool,
    ) -> HostResult<()> {
        let mut state = self.session()?;
        state.editable(experiment_id)?.use_instrument_calibration = use_instrument;
        Ok(())
    }

    fn start_collection(&self, experiment_id: ExperimentId) -> HostResult<()> {
        let mut state = self.session()?;
        let experiment = state.editable(experiment_id)?;
        if experiment.has_data {
            return Err(HostError::new("The experiment already contains collected data."));
        }
        experiment.collecting = true;
        experiment.generation += 1;
        let generation = experiment.generation;
        let minutes = experiment.data.collection_duration;
        self.emit(HostEvent::PreparingForCollection { experiment_id });
        self.emit(HostEvent::WaitingForAutoInject { experiment_id });
        self.emit(HostEvent::CollectionStarted { experiment_id });
        drop(state);
        self.spawn_collection_timer(experiment_id, generation, minutes);
        Ok(())
    }

    fn stop_collection(&self, experiment_id: ExperimentId) -> HostResult<()> {
        let mut state = self.session()?;
        let experiment = state.experiment(experiment_id)?;
        if experiment.collecting {
            self.finish_collection(experiment, experiment_id);
        }
        Ok(())
    }

    fn text(&self, experiment_id: ExperimentId, field: TextField) -> HostResult<String> {
        let mut state = self.session()?;
        let data = &state.experiment(experiment_id)?.data;
        let value = match field {
            TextField::ExperimentDescription => &data.description,
            TextField::SampleName => &data.sample.name,
            TextField::SampleDescription => &data.sample.description,
        };
        Ok(value.clone())
    }

    fn set_text(&self, experiment_id: ExperimentId, field: TextField, value: &str) -> HostResult<()> {
        let mut state = self.session()?;
        let data = &mut state.editable(experiment_id)?.data;
        let slot = match field {
            TextField::ExperimentDescription => &mut data.description,
            TextField::SampleName => &mut data.sample.name,
            TextField::SampleDescription => &mut data.sample.description,
        };
        *slot = value.to_string();
        Ok(())
    }

    fn number(&self, experiment_id: ExperimentId, field: NumericField) -> HostResult<f64> {
        let mut state = self.session()?;
        let data = &state.experiment(experiment_id)?.data;
        Ok(match field {
            NumericField::CollectionDuration => data.collection_duration,
            NumericField::PumpFlowRate => data.flow_rate,
            NumericField::InjectedVolume => data.injected_volume,
            NumericField::SampleDndc => data.sample.dndc,
            NumericField::SampleA2 => data.sample.a2,
            NumericField::SampleUvExtinction => data.sample.uv_extinction,
            NumericField::SampleConcentration => data.sample.concentration,
        })
    }

    /// The duration never triggers a recompute; while collecting it is the only field that may change.
    fn set_number(&self, experiment_id: ExperimentId, field: NumericField, value: f64) -> HostResult<()> {
        let mut state = self.session()?;
        state.require_editor()?;
        let experiment = state.experiment(experiment_id)?;
        if experiment.collecting {
            if field != NumericField::CollectionDuration {
                return Err(HostError::new(COLLECTING));
            }
            experiment.data.collection_duration = value;
            return Ok(());
        }
        let data = &mut experiment.data;
        let slot = match field {
            NumericField::CollectionDuration => &mut data.collection_duration,
            NumericField::PumpFlowRate => &mut data.flow_rate,
            NumericField::InjectedVolume => &mut data.injected_volume,
            NumericField::SampleDndc => &mut data.sample.dndc,
            NumericField::SampleA2 => &mut data.sample.a2,
            NumericField::SampleUvExtinction => &mut data.sample.uv_extinction,
            NumericField::SampleConcentration => &mut data.sample.concentration,
        };
        *slot = value;
        if field != NumericField::CollectionDuration {
            self.acknowledge(&[HostEvent::ExperimentRun { experiment_id }]);
        }
        Ok(())
    }

    fn sample(&self, experiment_id: ExperimentId) -> HostResult<SampleInfo> {
        Ok(self.session()?.experiment(experiment_id)?.data.sample.clone())
    }

    fn set_sample(&self, experiment_id: ExperimentId, sample: &SampleInfo) -> HostResult<()> {
        let mut state = self.session()?;
        state.editable(experiment_id)?.data.sample = sample.clone();
        self.acknowledge(&[HostEvent::ExperimentRun { experiment_id }]);
        Ok(())
    }

    fn has_vision_uv(&self, experiment_id: ExperimentId) -> HostResult<bool> {
        Ok(self.session()?.experiment(experiment_id)?.vision_uv.is_some())
    }

    fn setup_vision_uv(&self, experiment_id: ExperimentId, details: &UvDeviceDetails) -> HostResult<()> {
        let mut state = self.session()?;
        let experiment = state.editable(experiment_id)?;
        let Some(device) = experiment.vision_uv.as_mut() else {
            return Err(HostError::new("The experiment has no VISION UV detector."));
        };
        *device = details.clone();
        Ok(())
    }

    fn baselines(&self, experiment_id: ExperimentId) -> HostResult<Vec<BaselineDetails>> {
        Ok(self.session()?.experiment(experiment_id)?.baselines.clone())
    }

    fn update_baselines(&self, experiment_id: ExperimentId, baselines: &[BaselineDetails]) -> HostResult<()> {
        let mut state = self.session()?;
        let experiment = state.editable(experiment_id)?;
        for update in baselines {
            let existing = experiment
                .baselines
                .iter_mut()
                .find(|b| b.series_name.eq_ignore_ascii_case(&update.series_name))
                .ok_or_else(|| {
                    HostError::new(format!("Unknown baseline series \"{}\".", update.series_name))
                })?;
            existing.kind = update.kind;
            existing.start = update.start;
            existing.end = update.end;
        }
        Ok(())
    }

    fn set_auto_autofind_baselines(&self, experiment_id: ExperimentId, enabled: bool) -> HostResult<()> {
        let mut state = self.session()?;
        let experiment = state.editable(experiment_id)?;
        if enabled && experiment.has_data {
            let run_length = experiment.run_length;
            for baseline in &mut experiment.baselines {
                baseline.kind = BaselineType::Automatic;
                baseline.start.x = 0.0;
                baseline.end.x = run_length;
            }
        }
        Ok(())
    }

    fn peak_ranges(&self, experiment_id: ExperimentId) -> HostResult<Vec<PeakRange>> {
        Ok(self.session()?.experiment(experiment_id)?.peaks.clone())
    }

    fn add_peak_range(&self, experiment_id: ExperimentId, start: f64, end: f64) -> HostResult<()> {
        if start >= end {
            return Err(HostError::new("Peak start must precede peak end."));
        }
        let mut state = self.session()?;
        let experiment = state.editable(experiment_id)?;
        experiment.peaks.push(PeakRange { number: 0, start, end });
        experiment.renumber_peaks();
        Ok(())
    }

    fn update_peak_range(&self, experiment_id: ExperimentId, peak: &PeakRange) -> HostResult<()> {
        if peak.start >= peak.end {
            return Err(HostError::new("Peak start must precede peak end."));
        }
        let mut state = self.session()?;
        let experiment = state.editable(experiment_id)?;
        let existing = experiment.peak_mut(peak.number)?;
        existing.start = peak.start;
        existing.end = peak.end;
        experiment.renumber_peaks();
        Ok(())
    }

    fn remove_peak_range(&self, experiment_id: ExperimentId, number: i32) -> HostResult<()> {
        let mut state = self.session()?;
        let experiment = state.editable(experiment_id)?;
        experiment.peak_mut(number)?;
        experiment.peaks.retain(|peak| peak.number != number);
        experiment.renumber_peaks();
        Ok(())
    }

    fn set_auto_autofind_peaks(&self, experiment_id: ExperimentId, enabled: bool) -> HostResult<()> {
        let mut state = self.session()?;
        let experiment = state.editable(experiment_id)?;
        if enabled && experiment.has_data {
            let end = experiment.run_length;
            experiment.peaks = vec![
                PeakRange { number: 0, start: end * 0.72, end: end * 0.78 },
                PeakRange { number: 0, start: end * 0.82, end: end * 0.87 },
            ];
            experiment.renumber_peaks();
        }
        Ok(())
    }

    fn results(&self, experiment_id: ExperimentId) -> HostResult<String> {
        Ok(results_xml(self.session()?.experiment(experiment_id)?))
    }

    fn save_results(&self, experiment_id: ExperimentId, path: &str) -> HostResult<()> {
        let xml = results_xml(self.session()?.experiment(experiment_id)?);
        write_host_file(path, &xml)
    }

    fn data_set(&self, experiment_id: ExperimentId, definition_name: &str) -> HostResult<String> {
        data_set_text(self.session()?.experiment(experiment_id)?, definition_name)
    }

    fn data_set_names(&self, experiment_id: ExperimentId) -> HostResult<Vec<String>> {
        let mut state = self.session()?;
        let experiment = state.experiment(experiment_id)?;
        if !experiment.has_data {
            return Ok(Vec::new());
        }
        Ok(DATA_SET_DEFINITIONS.iter().map(|d| d.to_string()).collect())
    }

    fn all_data_sets(&self, experiment_id: ExperimentId) -> HostResult<String> {
        let mut state = self.session()?;
        let experiment = state.experiment(experiment_id)?;
        let mut text = String::new();
        for definition in DATA_SET_DEFINITIONS {
            let _ = writeln!(text, "# {definition}");
            text.push_str(&data_set_text(experiment, definition)?);
        }
        Ok(text)
    }

    fn save_data_set(&self, experiment_id: ExperimentId, definition_name: &str, path: &str) -> HostResult<()> {
        let text = data_set_text(self.session()?.experiment(experiment_id)?, definition_name)?;
        write_host_file(path, &text)
    }

    fn add_fraction_result(&self, experiment_id: ExperimentId, index: f64, json: &str) -> HostResult<()> {
        if !(index >= 0.0) {
            return Err(HostError::new("Fraction index must not be negative."));
        }
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| HostError::new(format!("Fraction result is not valid JSON: {err}")))?;
        let mut state = self.session()?;
        let experiment = state.editable(experiment_id)?;
        experiment.fractions.insert(index.round() as i32, json.to_string());
        Ok(())
    }

    fn fraction_result(&self, experiment_id: ExperimentId, index: i32) -> HostResult<String> {
        let mut state = self.session()?;
        state
            .experiment(experiment_id)?
            .fractions
            .get(&index)
            .cloned()
            .ok_or_else(|| HostError::new(format!("No fraction result at index {index}.")))
    }

    fn validate_logon(&self, user_id: &str, password: &str, domain: &str) -> HostResult<LogonResult> {
        let mut state = self.session()?;
        if !state.security.active {
            return Ok(LogonResult::rejected("The security pack is not active.", ""));
        }
        let Some(user) = state.find_user(user_id, password, domain) else {
            return Ok(LogonResult::rejected("The user name or password is incorrect.", ""));
        };
        let user_id = user.user_id.clone();
        state.security.logged_in = Some(user_id);
        Ok(LogonResult::accepted())
    }
}

impl SecurityPackApi for SimulatedAstra {
    fn set_automation_identity(&self, identity: &AutomationIdentity) -> HostResult<()> {
        if identity.entity_guid.is_empty() {
            return Err(HostError::new("Automation identity is incomplete."));
        }
        self.lock().security.identified = true;
        Ok(())
    }

    fn is_security_pack_active(&self) -> HostResult<bool> {
        Ok(self.security_session()?.security.active)
    }

    fn is_logged_in(&self) -> HostResult<bool> {
        let state = self.security_session()?;
        Ok(state.security.active && state.security.logged_in.is_some())
    }

    fn validate_logon(&self, user_id: &str, password: &str, domain: &str) -> HostResult<Option<LogonResult>> {
        let state = self.security_session()?;
        if !state.security.active {
            return Ok(None);
        }
        let result = match state.find_user(user_id, password, domain) {
            Some(_) => LogonResult::accepted(),
            None => LogonResult::rejected(
                "The user name or password is incorrect.",
                format!("Logon failed for {domain}\\{user_id}."),
            ),
        };
        Ok(Some(result))
    }

    fn active_user_info(&self) -> HostResult<ActiveUserInfo> {
        let state = self.security_session()?;
        Ok(state
            .active_user()
            .map(|user| ActiveUserInfo {
                user_id: user.user_id.clone(),
                full_user_name: user.full_name.clone(),
                local_domain: user.domain.clone(),
            })
            .unwrap_or_default())
    }

    fn security_policy(&self) -> HostResult<SecurityPolicy> {
        let _state = self.security_session()?;
        Ok(SecurityPolicy {
            default_domain: DEMO_DOMAIN.to_string(),
            idle_timeout_minutes: 15,
            require_signature_on_save: false,
            groups: [Role::Guest, Role::Technician, Role::Researcher, Role::Administrator]
                .into_iter()
                .map(|role| GroupName {
                    use_default: true,
                    name: role.group().to_string(),
                    custom_name: String::new(),
                })
                .collect(),
        })
    }

    fn setup_database_connection(&self, database_name: &str, user_id: &str, password: &str) -> HostResult<()> {
        if database_name.trim().is_empty() {
            return Err(HostError::new("A security database name is required."));
        }
        let mut state = self.security_session()?;
        state.security.database = Some(database_name.to_string());
        state.security.pending_user = Some((user_id.to_string(), password.to_string()));
        Ok(())
    }

    /// Enabling logs in the account used to configure the database, when it is valid.
    fn enable_security_pack(&self, enabled: bool) -> HostResult<()> {
        let mut state = self.security_session()?;
        if !enabled {
            state.security.active = false;
            state.security.logged_in = None;
            return Ok(());
        }
        if state.security.database.is_none() {
            return Err(HostError::new("The security database connection is not configured."));
        }
        state.security.active = true;
        if let Some((user_id, password)) = state.security.pending_user.take() {
            let configured = state
                .users
                .iter()
                .find(|user| user.user_id.eq_ignore_ascii_case(&user_id) && user.password == password)
                .map(|user| user.user_id.clone());
            state.security.logged_in = configured;
        }
        Ok(())
    }

    fn request_quit(&self) -> HostResult<()> {
        self.lock().security.identified = false;
        Ok(())
    }
}
