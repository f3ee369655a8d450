use crate::astra_api::HostError;
use crate::events::WaitError;
use crate::protocol::ExperimentId;
use thiserror::Error;

pub type AutomationResult<T> = Result<T, AutomationError>;

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("{operation} failed: {source}")]
    Host {
        operation: String,
        #[source]
        source: HostError,
    },
    #[error(transparent)]
    Wait(#[from] WaitError),
    #[error("experiment {0} is not open in this session")]
    UnknownExperiment(ExperimentId),
    #[error("host did not start collection for experiment {0}")]
    CollectionRejected(ExperimentId),
    #[error("security pack application is not connected")]
    SecurityPackUnavailable,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("sequence line {line}: {message}")]
    Sequence { line: u64, message: String },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AutomationError {
    pub(crate) fn host(operation: &str, source: HostError) -> Self {
        AutomationError::Host {
            operation: operation.to_string(),
            source,
        }
    }
}
