//! Client-side automation of the ASTRA light-scattering application.
//!
//! [`AstraAdmin`] owns a session with one host (anything implementing [`AstraApi`], plus an
//! optional [`SecurityPackApi`]) and turns its asynchronous acknowledgements into blocking,
//! timeout-bounded operations. [`SimulatedAstra`] stands in for the host in tests and demos.

mod admin;
mod astra_api;
mod collection;
mod config;
mod error;
mod events;
mod experiment;
mod guard;
mod protocol;
mod pump;
mod sequence;
mod session;
pub mod simulator;
mod version;

pub use crate::admin::AstraAdmin;
pub use crate::astra_api::{
    AstraApi, HostError, HostResult, NumericField, SecurityPackApi, TextField,
};
pub use crate::collection::MethodInfoTiming;
pub use crate::config::{
    client_identity, AdminConfig, DEFAULT_COLLECTION_TIMEOUT, DEFAULT_INSTRUMENT_TIMEOUT,
    DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT,
};
pub use crate::error::{AutomationError, AutomationResult};
pub use crate::events::{CancelToken, EventBridge, WaitError, WaitFlag};
pub use crate::experiment::{Experiment, PendingChange};
pub use crate::guard::ErrorMode;
pub use crate::protocol::*;
pub use crate::sequence::{read_sequence, read_sequence_from, SequenceEntry};
pub use crate::session::Notification;
pub use crate::simulator::{SimulatedAstra, SimulatorConfig};
pub use crate::version::{
    AstraVersion, AUTOFIND_PEAKS, INDEFINITE_COLLECTION, MIN_SUPPORTED, READ_WRITE_EVENTS,
};
