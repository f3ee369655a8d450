mod common;

use astra_automation::simulator::TEMPLATES;
use astra_automation::{
    AdminConfig, AstraAdmin, AstraMethodInfo, ErrorMode, ExperimentStatus, SampleInfo,
    SimulatedAstra, SimulatorConfig,
};
use common::{connect_with, fast_config, reference_path, scratch_dir};
use std::time::{Duration, Instant};

/// Slower than any test should take, so a missed ready event shows up as a failure.
const PATIENT: Duration = Duration::from_secs(30);
const PROMPT: Duration = Duration::from_secs(5);

fn host_at(version: &str) -> (AstraAdmin, SimulatedAstra) {
    let sim_config = SimulatorConfig {
        version: version.to_string(),
        minute: Duration::from_millis(20),
        ..SimulatorConfig::default()
    };
    let config = AdminConfig {
        wait_timeout: PATIENT,
        ..fast_config(ErrorMode::Raise)
    };
    connect_with(sim_config, config)
}

fn bsa() -> SampleInfo {
    SampleInfo {
        name: "BSA".to_string(),
        description: "monomer".to_string(),
        dndc: 0.185,
        a2: 0.0,
        uv_extinction: 0.667,
        concentration: 2.0,
    }
}

#[test]
fn legacy_setters_return_on_the_ready_event() {
    let (admin, _sim) = host_at("8.1.0.50");
    let started = Instant::now();
    let id = admin
        .open_experiment(&reference_path())
        .expect("open")
        .expect("id");
    assert!(admin.set_pump_flow_rate(id, 0.8).expect("flow"));
    assert!(admin.set_injected_volume(id, 0.1).expect("volume"));
    assert!(admin.set_sample(id, &bsa()).expect("sample"));
    assert!(admin.set_collection_duration(id, 12.0).expect("duration"));
    assert!(admin.run_experiment(id).expect("run"));
    assert!(started.elapsed() < PROMPT, "took {:?}", started.elapsed());

    assert_eq!(admin.pump_flow_rate(id).expect("flow"), 0.8);
    assert_eq!(admin.collection_duration(id).expect("duration"), 12.0);
}

#[test]
fn legacy_save_returns_the_experiment_to_ready() {
    let (admin, _sim) = host_at("8.1.0.50");
    let id = admin
        .new_experiment_from_template(TEMPLATES[1])
        .expect("new")
        .expect("id");
    let dir = scratch_dir("legacy-save");
    let path = dir.join("saved");

    let started = Instant::now();
    assert!(admin.save_experiment(id, &path.to_string_lossy()).expect("save"));
    assert!(started.elapsed() < PROMPT, "took {:?}", started.elapsed());
    assert!(dir.join("saved.afe8").exists());
    let experiment = admin.experiment(id).expect("open");
    assert_eq!(experiment.status(), ExperimentStatus::Ready);
}

#[test]
fn legacy_host_collects_until_the_method_ends() {
    let (admin, _sim) = host_at("8.1.0.50");
    let dir = scratch_dir("legacy-collect");
    let info = AstraMethodInfo {
        experiment_path: dir.join("legacy").to_string_lossy().into_owned(),
        sample: bsa(),
        injected_volume: 0.2,
        flow_rate: 0.5,
        duration: 3.0,
    };

    let started = Instant::now();
    let mut messages = Vec::new();
    let id = admin
        .collect_data(TEMPLATES[1], &info, &mut |message: &str| messages.push(message.to_string()))
        .expect("collect")
        .expect("experiment id");
    assert!(started.elapsed() < PROMPT, "took {:?}", started.elapsed());

    let expected = [
        "Collection starting...",
        "Preparing for collection...",
        "Waiting for auto-inject...",
        "Starting collecting data...",
        "Collection finished.",
        "Post-collection actions...",
        "Experiment saved.",
        "Collection completed.",
    ];
    let mut remaining = messages.iter();
    for step in expected {
        assert!(
            remaining.any(|message| message == step),
            "missing or out of order: {step} in {messages:?}"
        );
    }
    assert!(messages[0].starts_with("Starting collection using method"));
    assert!(admin.experiment(id).is_none(), "collected experiment is closed");

    let saved = dir.join("legacy.afe8");
    let reopened = admin
        .open_experiment(&saved.to_string_lossy())
        .expect("reopen")
        .expect("id");
    let experiment = admin.experiment(reopened).expect("open");
    assert_eq!(experiment.data().sample, info.sample);
    assert_eq!(experiment.data().flow_rate, 0.5);
    assert_eq!(experiment.data().injected_volume, 0.2);
}

#[test]
fn autofind_peaks_is_still_sent_to_hosts_that_ignore_it() {
    let (admin, _sim) = host_at("8.1.1.5");
    let id = admin
        .open_experiment(&reference_path())
        .expect("open")
        .expect("id");
    assert!(admin.set_auto_autofind_peaks(id, true).expect("autofind"));
    assert!(admin.set_auto_autofind_peaks(id, false).expect("autofind"));
}
