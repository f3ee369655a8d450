mod common;

use astra_automation::simulator::{BASELINE_SERIES, DATA_SET_DEFINITIONS, TEMPLATES};
use astra_automation::{
    client_identity, AstraAdmin, AstraApi, AutomationError, BaselineType, ErrorMode, HostEvent,
    Notification, SimulatedAstra, SimulatorConfig, WaitError,
};
use common::{connect, fast_config, reference_path, scratch_dir};
use crossbeam_channel::unbounded;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn open_reference(admin: &AstraAdmin) -> i32 {
    admin
        .open_experiment(&reference_path())
        .expect("open")
        .expect("experiment id")
}

#[test]
fn reference_baselines_are_listed_in_detector_order() {
    let (admin, _sim) = connect(ErrorMode::Raise);
    let id = open_reference(&admin);

    let baselines = admin.baselines(id).expect("baselines");
    let names: Vec<&str> = baselines.iter().map(|b| b.series_name.as_str()).collect();
    assert_eq!(names, BASELINE_SERIES);
    assert!(baselines.iter().all(|b| b.kind == BaselineType::SnapY));
}

#[test]
fn baseline_updates_replace_matching_series() {
    let (admin, _sim) = connect(ErrorMode::Raise);
    let id = open_reference(&admin);

    let mut baselines = admin.baselines(id).expect("baselines");
    baselines.truncate(1);
    baselines[0].kind = BaselineType::Manual;
    baselines[0].end.x = 35.0;
    assert!(admin.update_baselines(id, &baselines).expect("update"));
    assert!(!admin.update_baselines(id, &[]).expect("empty update"));

    let after = admin.baselines(id).expect("baselines");
    assert_eq!(after.len(), BASELINE_SERIES.len());
    assert_eq!(after[0].kind, BaselineType::Manual);
    assert_eq!(after[0].end.x, 35.0);
    assert_eq!(after[1].kind, BaselineType::SnapY);
}

#[test]
fn flow_rate_round_trips_through_the_host() {
    let (admin, _sim) = connect(ErrorMode::Raise);
    let id = open_reference(&admin);

    assert!(admin.set_pump_flow_rate(id, 0.11).expect("set"));
    assert_eq!(admin.pump_flow_rate(id).expect("get"), 0.11);
}

#[test]
fn removed_peak_can_be_added_back() {
    let (admin, _sim) = connect(ErrorMode::Raise);
    let id = open_reference(&admin);

    let peaks = admin.peak_ranges(id).expect("peaks");
    assert_eq!(peaks.len(), 1);
    let peak = peaks[0];
    assert_eq!(peak.start, 29.226_289_472_413_5);
    assert_eq!(peak.end, 31.176_610_775_345_4);

    assert!(admin.remove_peak_range(id, peak.number).expect("remove"));
    assert!(admin.peak_ranges(id).expect("peaks").is_empty());

    assert!(admin.add_peak_range(id, peak.start, peak.end).expect("add"));
    assert_eq!(admin.peak_ranges(id).expect("peaks"), vec![peak]);
}

#[test]
fn results_carry_the_reference_molar_mass() {
    let (admin, _sim) = connect(ErrorMode::Raise);
    let id = open_reference(&admin);

    let xml = admin.results(id).expect("results");
    assert!(xml.contains("3.043288841e+04"), "{xml}");

    let dir = scratch_dir("results");
    let path = dir.join("results.xml");
    assert!(admin
        .save_results(id, &path.to_string_lossy())
        .expect("save results"));
    let saved = fs::read_to_string(&path).expect("read results");
    assert_eq!(saved.replace("\r\n", "\n"), xml);
}

#[test]
fn exported_data_set_matches_the_in_memory_copy() {
    let (admin, _sim) = connect(ErrorMode::Raise);
    let id = open_reference(&admin);

    let names = admin.data_set_names(id).expect("names");
    assert_eq!(names, DATA_SET_DEFINITIONS);

    let definition = "mean square radius vs volume";
    let text = admin.data_set(id, definition).expect("data set");
    let dir = scratch_dir("data-set");
    let path = dir.join("radius.csv");
    assert!(admin
        .save_data_set(id, definition, &path.to_string_lossy())
        .expect("save"));

    let saved = fs::read_to_string(&path).expect("read back");
    assert!(saved.contains("\r\n"));
    assert_eq!(saved.replace("\r\n", "\n"), text);
    assert!(admin.all_data_sets(id).expect("all").contains(&text));
}

#[test]
fn fraction_results_are_kept_per_index() {
    let (admin, _sim) = connect(ErrorMode::Suppress);
    let id = open_reference(&admin);

    let json = r#"{"molarMass": 30432.9, "rg": 5.1}"#;
    assert!(admin.add_fraction_result(id, 3.0, json).expect("add"));
    assert!(!admin.add_fraction_result(id, 4.0, "{not json").expect("bad json"));
    assert_eq!(admin.fraction_result(id, 3).expect("get"), json);
    assert_eq!(admin.fraction_result(id, 4).expect("missing"), "");
}

#[test]
fn unknown_file_is_suppressed_by_default() {
    let (admin, _sim) = connect(ErrorMode::Suppress);
    assert_eq!(admin.open_experiment("/data/missing.afe8").expect("suppressed"), None);
    assert!(admin.open_experiments().is_empty());
}

#[test]
fn unknown_file_raises_when_asked() {
    let (admin, _sim) = connect(ErrorMode::Raise);
    match admin.open_experiment("/data/missing.afe8") {
        Err(AutomationError::Host { operation, source }) => {
            assert_eq!(operation, "OpenExperiment");
            assert!(source.message.starts_with("Cannot read file"), "{}", source.message);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unknown_experiment_ids_are_rejected_locally() {
    let (admin, _sim) = connect(ErrorMode::Suppress);
    assert!(matches!(
        admin.close_experiment(42),
        Err(AutomationError::UnknownExperiment(42))
    ));
    assert!(matches!(
        admin.update_experiment(42, |e| e.is_dirty()),
        Err(AutomationError::UnknownExperiment(42))
    ));
}

#[test]
fn subscribers_see_the_experiment_lifecycle() {
    let (admin, _sim) = connect(ErrorMode::Raise);
    let notifications = admin.subscribe();

    let id = open_reference(&admin);
    assert!(admin.close_experiment(id).expect("close"));

    // Taking the session lock waits out the pump's dispatch of the close.
    assert!(admin.experiment(id).is_none());
    let seen: Vec<Notification> = notifications.try_iter().collect();
    assert!(matches!(seen.first(), Some(Notification::StatusChanged(e)) if e.id() == id));
    match seen.last() {
        Some(Notification::Closed(experiment)) => {
            assert_eq!(experiment.id(), id);
            assert_eq!(experiment.name(), "30k polystyrene treos + rex");
        }
        other => panic!("unexpected last notification {other:?}"),
    }
}

#[test]
fn working_copy_is_applied_or_reset() {
    let (admin, _sim) = connect(ErrorMode::Raise);
    let id = open_reference(&admin);

    admin
        .update_experiment(id, |experiment| {
            experiment.set_flow_rate(0.7);
            experiment.sample_mut().concentration = 1.5;
        })
        .expect("edit");
    assert!(admin.experiment(id).expect("open").is_dirty());

    admin.apply_experiment(id).expect("apply");
    let experiment = admin.experiment(id).expect("open");
    assert!(!experiment.is_dirty());
    assert_eq!(experiment.data().flow_rate, 0.7);
    assert_eq!(admin.pump_flow_rate(id).expect("flow"), 0.7);
    assert_eq!(admin.sample(id).expect("sample").concentration, 1.5);

    admin
        .update_experiment(id, |experiment| experiment.set_description("scratch"))
        .expect("edit");
    admin.reset_experiment(id).expect("reset");
    let experiment = admin.experiment(id).expect("open");
    assert!(!experiment.is_dirty());
    assert_eq!(experiment.data().description, "30 kDa polystyrene in THF");
}

#[test]
fn sample_fields_are_written_individually() {
    let (admin, _sim) = connect(ErrorMode::Raise);
    let id = admin
        .new_experiment_from_template(TEMPLATES[1])
        .expect("new")
        .expect("id");

    assert!(admin.set_sample_name(id, "BSA").expect("name"));
    assert!(admin.set_sample_dndc(id, 0.19).expect("dndc"));
    assert!(admin.set_experiment_description(id, "monomer check").expect("description"));

    let sample = admin.sample(id).expect("sample");
    assert_eq!(sample.name, "BSA");
    assert_eq!(sample.dndc, 0.19);
    assert_eq!(admin.experiment_description(id).expect("description"), "monomer check");
    assert!(admin.validate_experiment(id).expect("validate").is_valid);
}

#[test]
fn saved_experiments_can_be_reopened() {
    let (admin, _sim) = connect(ErrorMode::Raise);
    let id = admin
        .new_experiment_from_template(TEMPLATES[1])
        .expect("new")
        .expect("id");
    admin.set_sample_name(id, "lysozyme").expect("name");

    let dir = scratch_dir("reopen");
    let path = dir.join("lysozyme");
    assert!(admin.save_experiment(id, &path.to_string_lossy()).expect("save"));
    assert!(admin.close_experiment(id).expect("close"));

    let reopened = admin
        .open_experiment(&format!("{}.afe8", path.to_string_lossy()))
        .expect("open")
        .expect("id");
    assert_ne!(reopened, id);
    let experiment = admin.experiment(reopened).expect("open");
    assert_eq!(experiment.data().sample.name, "lysozyme");
    assert_eq!(experiment.name(), "lysozyme");
}

#[test]
fn vision_uv_is_only_offered_by_uv_methods() {
    let (admin, _sim) = connect(ErrorMode::Suppress);
    let plain = admin.new_experiment_from_template(TEMPLATES[1]).expect("new").expect("id");
    let uv = admin.new_experiment_from_template(TEMPLATES[2]).expect("new").expect("id");

    assert!(!admin.has_vision_uv(plain).expect("plain"));
    assert!(admin.has_vision_uv(uv).expect("uv"));
    assert!(!admin.setup_vision_uv(plain, &Default::default()).expect("refused"));
}

#[test]
fn host_inventory_is_listed() {
    let (admin, sim) = connect(ErrorMode::Raise);
    assert_eq!(admin.experiment_templates().expect("templates"), TEMPLATES);
    assert_eq!(
        admin.data_database_directory("//dbf/System").expect("folders"),
        vec!["//dbf/System/Online".to_string()]
    );
    assert!(admin.show_window(false).expect("hide"));
    assert!(!sim.is_visible());

    admin.wait_for_instruments().expect("instruments");
    assert!(admin.has_instrument_detection_completed().expect("detected"));
}

#[test]
fn dispose_asks_the_host_to_quit_once() {
    let (admin, sim) = connect(ErrorMode::Suppress);
    admin.dispose();
    admin.dispose();
    assert!(sim.quit_requested());
    assert_eq!(admin.experiment_templates().expect("suppressed"), Vec::<String>::new());
}

fn silent_admin(wait_timeout: Duration) -> (AstraAdmin, crossbeam_channel::Sender<HostEvent>) {
    let (sim, _events) = SimulatedAstra::new(SimulatorConfig::default());
    let (tx, rx) = unbounded();
    let host: Arc<dyn AstraApi> = Arc::new(sim);
    let mut config = fast_config(ErrorMode::Raise);
    config.wait_timeout = wait_timeout;
    let admin = AstraAdmin::connect(host, None, rx, client_identity("silent", "1.0"), config)
        .expect("connect");
    (admin, tx)
}

#[test]
fn waits_time_out_when_the_host_stays_silent() {
    let (admin, _tx) = silent_admin(Duration::from_millis(200));
    let started = Instant::now();
    match admin.new_experiment_from_template(TEMPLATES[1]) {
        Err(AutomationError::Wait(WaitError::Timeout { condition, .. })) => {
            assert_eq!(condition, "experiment read");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[test]
fn cancelling_aborts_a_pending_wait() {
    let (admin, _tx) = silent_admin(Duration::from_secs(30));
    let token = admin.cancel_token();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        token.cancel();
    });

    let started = Instant::now();
    let outcome = admin.wait_experiment_ready();
    canceller.join().expect("canceller");
    assert!(matches!(
        outcome,
        Err(AutomationError::Wait(WaitError::Cancelled { .. }))
    ));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn duration_changes_complete_without_a_run_event() {
    let (sim, events) = SimulatedAstra::new(SimulatorConfig::default());
    let (tx, rx) = unbounded();
    let swallow_runs = Arc::new(AtomicBool::new(false));
    let relay_swallows = Arc::clone(&swallow_runs);
    thread::spawn(move || {
        for event in events {
            let is_run = matches!(event, HostEvent::ExperimentRun { .. });
            if is_run && relay_swallows.load(Ordering::SeqCst) {
                continue;
            }
            if tx.send(event).is_err() {
                return;
            }
        }
    });
    let host: Arc<dyn AstraApi> = Arc::new(sim);
    let mut config = fast_config(ErrorMode::Raise);
    config.wait_timeout = Duration::from_millis(300);
    let admin = AstraAdmin::connect(host, None, rx, client_identity("no runs", "1.0"), config)
        .expect("connect");
    let id = open_reference(&admin);
    swallow_runs.store(true, Ordering::SeqCst);

    assert!(admin.set_collection_duration(id, 5.0).expect("duration"));
    assert_eq!(admin.collection_duration(id).expect("duration"), 5.0);

    // Recomputing setters still depend on the acknowledgement.
    match admin.set_pump_flow_rate(id, 0.8) {
        Err(AutomationError::Wait(WaitError::Timeout { condition, .. })) => {
            assert_eq!(condition, "experiment run");
        }
        other => panic!("unexpected {other:?}"),
    }
}
