use anyhow::{anyhow, bail, Context};
use astra_automation::simulator::DEMO_DOMAIN;
use astra_automation::{
    client_identity, read_sequence, AdminConfig, AstraAdmin, AstraApi, AstraMethodInfo,
    ErrorMode, SampleInfo, SecurityPackApi, SimulatedAstra, SimulatorConfig,
};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "astra_cli", about = "Drive an ASTRA session against the built-in simulator")]
struct Args {
    /// suppress or raise. Overrides ASTRA_ERROR_MODE.
    #[arg(long)]
    error_mode: Option<ErrorMode>,

    /// Overrides ASTRA_WAIT_TIMEOUT_SECS.
    #[arg(long)]
    wait_timeout_secs: Option<u64>,

    #[arg(long, default_value = "8.2.0.117")]
    host_version: String,

    /// Real milliseconds per simulated collection minute.
    #[arg(long, default_value_t = 100)]
    minute_ms: u64,

    /// Start the simulator with its security pack active.
    #[arg(long, default_value_t = false)]
    security: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the method templates ASTRA offers.
    Templates,
    /// Open an experiment and print its processing state as JSON.
    Process { path: String },
    /// Collect one injection and save the experiment.
    Collect {
        #[arg(long, default_value = "//dbf/System/Online/light scattering")]
        method: String,
        #[arg(long, value_name = "PATH")]
        output: PathBuf,
        #[arg(long, default_value = "")]
        sample: String,
        #[arg(long, default_value_t = 0.185)]
        dndc: f64,
        #[arg(long, default_value_t = 1.0)]
        concentration: f64,
        #[arg(long, default_value_t = 0.1)]
        injected_volume: f64,
        /// Negative keeps the method's pump setting.
        #[arg(long, default_value_t = -1.0, allow_hyphen_values = true)]
        flow_rate: f64,
        /// Stop the collection after this many seconds instead of waiting for the method to end.
        #[arg(long)]
        stop_after_secs: Option<u64>,
    },
    /// Run every enabled row of a CSV sequence sheet.
    Sequence {
        sheet: PathBuf,
        #[arg(long, value_name = "DIR")]
        output_dir: PathBuf,
    },
    /// Log on through the security pack and print the active user.
    Logon {
        user: String,
        password: String,
        #[arg(long, default_value = DEMO_DOMAIN)]
        domain: String,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut config = AdminConfig::from_env()?;
    if let Some(mode) = args.error_mode {
        config.error_mode = mode;
    }
    if let Some(secs) = args.wait_timeout_secs {
        config.wait_timeout = Duration::from_secs(secs);
    }

    let (sim, events) = SimulatedAstra::new(SimulatorConfig {
        version: args.host_version.clone(),
        minute: Duration::from_millis(args.minute_ms),
        security_pack_active: args.security,
        ..SimulatorConfig::default()
    });
    let host: Arc<dyn AstraApi> = Arc::new(sim.clone());
    let security: Arc<dyn SecurityPackApi> = Arc::new(sim);
    let admin = AstraAdmin::connect(
        host,
        Some(security),
        events,
        client_identity("astra_cli", env!("CARGO_PKG_VERSION")),
        config,
    )
    .context("failed to connect to ASTRA")?;
    admin.wait_for_instruments()?;

    let outcome = run(&admin, args.command);
    if let Err(err) = admin.shut_down() {
        warn!(error = %err, "shutdown incomplete");
        admin.dispose();
    }
    outcome
}

fn run(admin: &AstraAdmin, command: Command) -> anyhow::Result<()> {
    let mut progress = |message: &str| eprintln!("{message}");
    match command {
        Command::Templates => {
            for template in admin.experiment_templates()? {
                println!("{template}");
            }
        }
        Command::Process { path } => {
            let id = admin
                .open_experiment(&path)?
                .ok_or_else(|| anyhow!("ASTRA could not open {path}"))?;
            let experiment = admin
                .experiment(id)
                .ok_or_else(|| anyhow!("experiment {id} closed unexpectedly"))?;
            let report = json!({
                "name": experiment.name(),
                "data": experiment.data(),
                "baselines": admin.baselines(id)?,
                "peaks": admin.peak_ranges(id)?,
                "dataSets": admin.data_set_names(id)?,
                "results": admin.results(id)?,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            admin.close_experiment(id)?;
        }
        Command::Collect {
            method,
            output,
            sample,
            dndc,
            concentration,
            injected_volume,
            flow_rate,
            stop_after_secs,
        } => {
            let info = AstraMethodInfo {
                experiment_path: output.to_string_lossy().into_owned(),
                sample: SampleInfo {
                    name: sample,
                    dndc,
                    concentration,
                    ..SampleInfo::default()
                },
                injected_volume,
                flow_rate,
                duration: 0.0,
            };
            let finished = AtomicBool::new(false);
            let collected = thread::scope(|scope| {
                let stopper = stop_after_secs.map(|secs| {
                    let finished = &finished;
                    scope.spawn(move || {
                        admin.stop_collection_after(Duration::from_secs(secs), finished)
                    })
                });
                let collected = admin.collect_data(&method, &info, &mut progress);
                finished.store(true, Ordering::Release);
                if let Some(stopper) = stopper {
                    match stopper.join() {
                        Ok(Ok(Some(id))) => info!(experiment_id = id, "collection stopped on timer"),
                        Ok(Ok(None)) => {}
                        Ok(Err(err)) => warn!(error = %err, "could not stop the collection"),
                        Err(_) => warn!("collection timer panicked"),
                    }
                }
                collected
            });
            let Some(id) = collected? else {
                bail!("ASTRA did not create an experiment from {method}");
            };
            info!(experiment_id = id, path = %output.display(), "collection saved");
        }
        Command::Sequence { sheet, output_dir } => {
            let entries = read_sequence(&sheet)
                .with_context(|| format!("failed to read sequence {}", sheet.display()))?;
            fs::create_dir_all(&output_dir)?;
            let collected = admin.run_sequence(&entries, &output_dir, &mut progress)?;
            eprintln!("collected {} experiment(s)", collected.len());
        }
        Command::Logon {
            user,
            password,
            domain,
        } => {
            let result = admin.validate_logon(&user, &password, &domain)?;
            if !result.is_valid {
                bail!(
                    "logon rejected: {} {}",
                    result.error_message,
                    result.error_details
                );
            }
            println!("{}", serde_json::to_string_pretty(&admin.active_user()?)?);
        }
    }
    Ok(())
}
