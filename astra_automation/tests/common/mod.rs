#![allow(dead_code)]

use astra_automation::simulator::REFERENCE_EXPERIMENT;
use astra_automation::{
    client_identity, AdminConfig, AstraAdmin, AstraApi, ErrorMode, SecurityPackApi,
    SimulatedAstra, SimulatorConfig,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub fn fast_config(error_mode: ErrorMode) -> AdminConfig {
    AdminConfig {
        error_mode,
        wait_timeout: Duration::from_secs(5),
        instrument_timeout: Duration::from_secs(5),
        collection_timeout: Duration::from_secs(10),
        poll_interval: Duration::from_millis(5),
    }
}

pub fn connect_with(sim_config: SimulatorConfig, config: AdminConfig) -> (AstraAdmin, SimulatedAstra) {
    let (sim, events) = SimulatedAstra::new(sim_config);
    let host: Arc<dyn AstraApi> = Arc::new(sim.clone());
    let security: Arc<dyn SecurityPackApi> = Arc::new(sim.clone());
    let admin = AstraAdmin::connect(
        host,
        Some(security),
        events,
        client_identity("integration tests", "1.0"),
        config,
    )
    .expect("connect");
    (admin, sim)
}

pub fn connect(error_mode: ErrorMode) -> (AstraAdmin, SimulatedAstra) {
    connect_with(SimulatorConfig::default(), fast_config(error_mode))
}

pub fn reference_path() -> String {
    format!("/data/standards/{REFERENCE_EXPERIMENT}")
}

/// Fresh per-test directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("astra-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("scratch dir");
    dir
}
