mod analysis;
mod experiments;
mod security;

use crate::astra_api::{AstraApi, HostResult, SecurityPackApi};
use crate::config::AdminConfig;
use crate::error::{AutomationError, AutomationResult};
use crate::events::{CancelToken, WaitClock, WaitError, WaitFlag};
use crate::guard;
use crate::protocol::{AutomationIdentity, ExperimentId, HostEvent};
use crate::pump::EventPump;
use crate::session::{Notification, Shared};
use crate::version::{AstraVersion, MIN_SUPPORTED, READ_WRITE_EVENTS};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hosts without run events signal readiness instead; they get this long before we move on.
const LEGACY_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Owned automation session with one ASTRA instance and, optionally, its security pack.
///
/// Every host call runs under one session lock, which the event pump also takes while it
/// applies host events. Waits never hold that lock.
pub struct AstraAdmin {
    host: Arc<dyn AstraApi>,
    security: Option<Arc<dyn SecurityPackApi>>,
    shared: Arc<Shared>,
    pump: EventPump,
    config: AdminConfig,
    identity: AutomationIdentity,
    host_version: AstraVersion,
    cancel: CancelToken,
}

impl AstraAdmin {
    /// Starts the event pump and identifies this client to the host (and security pack).
    ///
    /// The handshake is never suppressed: a client the host does not know cannot do anything.
    pub fn connect(
        host: Arc<dyn AstraApi>,
        security: Option<Arc<dyn SecurityPackApi>>,
        events: Receiver<HostEvent>,
        identity: AutomationIdentity,
        config: AdminConfig,
    ) -> AutomationResult<Self> {
        let shared = Arc::new(Shared::new());
        let pump = EventPump::spawn(events, Arc::clone(&shared), config.poll_interval)?;

        let host_version = {
            let _sync = shared.lock_registry();
            host.set_automation_identity(&identity)
                .map_err(|err| AutomationError::host("SetAutomationIdentity", err))?;
            if let Some(security) = &security {
                security
                    .set_automation_identity(&identity)
                    .map_err(|err| AutomationError::host("SetAutomationIdentity", err))?;
            }
            match host.version().map(|raw| raw.parse::<AstraVersion>()) {
                Ok(Ok(version)) => version,
                Ok(Err(err)) => {
                    warn!(error = %err, "unreadable host version");
                    AstraVersion::default()
                }
                Err(err) => {
                    warn!(error = %err, "host did not report a version");
                    AstraVersion::default()
                }
            }
        };
        if host_version < MIN_SUPPORTED {
            warn!(%host_version, minimum = %MIN_SUPPORTED, "host version is older than supported");
        }
        info!(
            client = %identity.entity_name,
            pid = identity.pid,
            %host_version,
            security_pack = security.is_some(),
            "connected to ASTRA"
        );

        Ok(Self {
            host,
            security,
            shared,
            pump,
            config,
            identity,
            host_version,
            cancel: CancelToken::new(),
        })
    }

    pub fn identity(&self) -> &AutomationIdentity {
        &self.identity
    }

    pub fn config(&self) -> &AdminConfig {
        &self.config
    }

    pub fn host_version(&self) -> AstraVersion {
        self.host_version
    }

    /// Cancelling this token aborts every current and future wait of this client.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn subscribe(&self) -> Receiver<Notification> {
        self.shared.subscribe()
    }

    fn host_call<T>(&self, call: impl FnOnce(&dyn AstraApi) -> HostResult<T>) -> HostResult<T> {
        let _sync = self.shared.lock_registry();
        call(self.host.as_ref())
    }

    pub(crate) fn try_get<T: Default>(
        &self,
        operation: &str,
        call: impl FnOnce(&dyn AstraApi) -> HostResult<T>,
    ) -> AutomationResult<T> {
        guard::get_or_default(self.config.error_mode, operation, self.host_call(call))
    }

    pub(crate) fn try_execute(
        &self,
        operation: &str,
        call: impl FnOnce(&dyn AstraApi) -> HostResult<()>,
    ) -> AutomationResult<bool> {
        guard::executed(self.config.error_mode, operation, self.host_call(call))
    }

    /// Executes a call the host acknowledges with a run event, and waits for that event.
    pub(crate) fn try_execute_and_wait_run(
        &self,
        operation: &str,
        call: impl FnOnce(&dyn AstraApi) -> HostResult<()>,
    ) -> AutomationResult<bool> {
        let executed = {
            let _sync = self.shared.lock_registry();
            self.shared.bridge.clear(WaitFlag::ExperimentReady);
            self.shared.bridge.clear(WaitFlag::ExperimentRun);
            guard::executed(self.config.error_mode, operation, call(self.host.as_ref()))?
        };
        if executed {
            self.wait_experiment_run()?;
        }
        Ok(executed)
    }

    fn wait_flag(&self, flag: WaitFlag, timeout: Duration) -> AutomationResult<()> {
        debug!(%flag, ?timeout, "waiting for host");
        self.shared.bridge.wait(flag, timeout, &self.cancel)?;
        Ok(())
    }

    pub fn wait_for_instruments(&self) -> AutomationResult<()> {
        if self.has_instrument_detection_completed()? {
            return Ok(());
        }
        info!("waiting for instrument detection");
        self.wait_flag(WaitFlag::InstrumentsDetected, self.config.instrument_timeout)
    }

    pub fn wait_experiment_ready(&self) -> AutomationResult<()> {
        self.wait_flag(WaitFlag::ExperimentReady, self.config.wait_timeout)
    }

    pub fn wait_experiment_read(&self) -> AutomationResult<()> {
        if self.host_version < READ_WRITE_EVENTS {
            return Ok(());
        }
        self.wait_flag(WaitFlag::ExperimentRead, self.config.wait_timeout)
    }

    pub fn wait_experiment_write(&self) -> AutomationResult<()> {
        if self.host_version < READ_WRITE_EVENTS {
            return self.wait_legacy_ready();
        }
        self.wait_flag(WaitFlag::ExperimentWrite, self.config.wait_timeout)
    }

    pub fn wait_experiment_run(&self) -> AutomationResult<()> {
        if self.host_version < READ_WRITE_EVENTS {
            return self.wait_legacy_ready();
        }
        self.wait_flag(WaitFlag::ExperimentRun, self.config.wait_timeout)
    }

    /// A missing ready event is not an error on legacy hosts.
    fn wait_legacy_ready(&self) -> AutomationResult<()> {
        let timeout = self.config.wait_timeout.min(LEGACY_READY_TIMEOUT);
        match self.wait_flag(WaitFlag::ExperimentReady, timeout) {
            Err(AutomationError::Wait(WaitError::Timeout { .. })) => {
                debug!("no ready event from legacy host; continuing");
                Ok(())
            }
            other => other,
        }
    }

    pub fn wait_experiment_closed(&self) -> AutomationResult<()> {
        self.wait_flag(WaitFlag::ExperimentClosed, self.config.wait_timeout)
    }

    pub fn wait_preparing_for_collection(&self) -> AutomationResult<()> {
        self.wait_flag(WaitFlag::PreparingForCollection, self.config.wait_timeout)
    }

    /// Bounded by the collection timeout: the operator may take a while to inject.
    pub fn wait_waiting_for_auto_inject(&self) -> AutomationResult<()> {
        self.wait_flag(WaitFlag::WaitingForAutoInject, self.config.collection_timeout)
    }

    pub fn wait_collection_started(&self) -> AutomationResult<()> {
        self.wait_flag(WaitFlag::CollectionStarted, self.config.collection_timeout)
    }

    pub fn wait_collection_finished(&self) -> AutomationResult<()> {
        self.wait_flag(WaitFlag::CollectionFinished, self.config.collection_timeout)
    }

    /// Polls the host until the experiment stops running.
    pub fn wait_experiment_not_running(&self, experiment_id: ExperimentId) -> AutomationResult<()> {
        let clock = WaitClock::start("experiment not running", self.config.wait_timeout);
        loop {
            if !self.is_running(experiment_id)? {
                return Ok(());
            }
            let remaining = clock.remaining(&self.cancel)?;
            thread::sleep(self.config.poll_interval.min(remaining));
        }
    }

    /// Forgets every pending acknowledgement except instrument detection.
    pub fn reset_events(&self) {
        self.shared.bridge.reset();
    }

    pub fn has_instrument_detection_completed(&self) -> AutomationResult<bool> {
        self.try_get("HasInstrumentDetectionCompleted", |host| {
            host.instruments_detected()
        })
    }

    pub fn show_window(&self, visible: bool) -> AutomationResult<bool> {
        self.try_execute("Show", |host| host.show(visible))
    }

    pub fn set_system_state(&self, state: &str, password: &str) -> AutomationResult<bool> {
        self.try_execute("SetSystemState", |host| host.set_system_state(state, password))
    }

    pub fn experiment_templates(&self) -> AutomationResult<Vec<String>> {
        self.try_get("GetExperimentTemplates", |host| host.experiment_templates())
    }

    pub fn data_database_directory(&self, root_path: &str) -> AutomationResult<Vec<String>> {
        self.try_get("GetDataDatabaseDirectory", |host| {
            host.data_database_directory(root_path)
        })
    }

    /// Closes every open experiment, then disposes the session.
    pub fn shut_down(&self) -> AutomationResult<()> {
        let open: Vec<ExperimentId> = self.shared.lock_registry().open.keys().copied().collect();
        for experiment_id in open {
            self.close_experiment(experiment_id)?;
        }
        self.dispose();
        Ok(())
    }

    /// Asks both applications to quit and stops the event pump. Safe to call more than once.
    pub fn dispose(&self) {
        if !self.shared.mark_disposed() {
            return;
        }
        {
            let _sync = self.shared.lock_registry();
            if let Err(err) = self.host.request_quit() {
                debug!(error = %err, "host quit request failed");
            }
            if let Some(security) = &self.security {
                if let Err(err) = security.request_quit() {
                    debug!(error = %err, "security pack quit request failed");
                }
            }
        }
        self.pump.shutdown();
        info!("automation session disposed");
    }
}
