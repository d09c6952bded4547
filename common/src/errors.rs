// Error handling framework for the ticket monitor

use thiserror::Error;

/// Configuration and secret loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable must be set")]
    MissingSecret(String),

    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Page retrieval errors
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(String),

    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to read response body from {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("Giving up on {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

/// Availability detection errors
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Invalid detection pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to save page artifact to {path}: {reason}")]
    ArtifactWrite { path: String, reason: String },
}

/// Errors raised while delivering a notification
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(String),

    #[error("{channel} request failed: {reason}")]
    Request { channel: String, reason: String },

    #[error("{channel} rejected the notification with status {status}: {body}")]
    Rejected {
        channel: String,
        status: u16,
        body: String,
    },

    #[error("No notifier registered for channel {0}")]
    NoNotifier(String),
}

/// Schedule-related errors
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("No next fire time available for '{0}'")]
    NoNextFireTime(String),
}

/// CI workflow definition errors
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Workflow is not valid YAML: {0}")]
    Parse(String),

    #[error("Workflow must declare exactly one schedule trigger, found {0}")]
    ScheduleCount(usize),

    #[error("Workflow schedule is invalid: {0}")]
    InvalidSchedule(#[from] ScheduleError),

    #[error("Workflow must declare a workflow_dispatch trigger")]
    MissingManualTrigger,

    #[error("Workflow must invoke exactly one command, found {0}")]
    CommandCount(usize),

    #[error("Workflow command must receive exactly the secrets {expected:?}, found {found:?}")]
    SecretMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Environment variable {name} must come from secrets.{name}, found '{value}'")]
    SecretSource { name: String, value: String },
}

/// Manual dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Invalid dispatch signature")]
    InvalidSignature,

    #[error("Invalid dispatch secret: {0}")]
    InvalidSecret(String),

    #[error("A monitor run is already in progress")]
    Busy,

    #[error("Scheduler is shutting down")]
    Closed,
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

impl From<serde_yaml::Error> for WorkflowError {
    fn from(err: serde_yaml::Error) -> Self {
        WorkflowError::Parse(err.to_string())
    }
}
