// CI workflow definition and its validity checks
//
// A valid monitor workflow has one cron schedule, a manual dispatch trigger
// and exactly one command step, which receives exactly the two alert secrets
// from the CI secret store.

use crate::config::{PAGERDUTY_ROUTING_KEY_ENV, SLACK_WEBHOOK_ENV};
use crate::errors::WorkflowError;
use crate::schedule::Cadence;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Secrets the monitor command must receive, in sorted order
pub const REQUIRED_SECRETS: [&str; 2] = [PAGERDUTY_ROUTING_KEY_ENV, SLACK_WEBHOOK_ENV];

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub name: Option<String>,
    /// Trigger block; kept as raw YAML because GitHub accepts a string, a
    /// list or a mapping here
    #[serde(rename = "on")]
    pub triggers: Value,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub jobs: BTreeMap<String, Job>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    #[serde(rename = "runs-on", default)]
    pub runs_on: Option<Value>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub uses: Option<String>,
    #[serde(default)]
    pub run: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// The single command step of a validated workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorInvocation {
    pub job: String,
    pub step_name: Option<String>,
    pub command: String,
    /// Environment variable name to secret name
    pub secrets: BTreeMap<String, String>,
}

/// Summary of a workflow that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedWorkflow {
    pub cadence: Cadence,
    pub invocation: MonitorInvocation,
}

impl WorkflowDefinition {
    pub fn parse(yaml: &str) -> Result<Self, WorkflowError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Cron expressions of all `schedule` entries
    pub fn schedules(&self) -> Vec<String> {
        let Some(entries) = self.trigger("schedule").and_then(Value::as_sequence) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| entry.get("cron").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    pub fn has_manual_trigger(&self) -> bool {
        match &self.triggers {
            Value::String(name) => name == "workflow_dispatch",
            Value::Sequence(names) => names
                .iter()
                .any(|n| n.as_str() == Some("workflow_dispatch")),
            Value::Mapping(map) => map.contains_key("workflow_dispatch"),
            _ => false,
        }
    }

    fn trigger(&self, name: &str) -> Option<&Value> {
        self.triggers.as_mapping().and_then(|m| m.get(name))
    }

    /// Check the workflow against the monitor's invocation contract
    pub fn validate(&self) -> Result<ValidatedWorkflow, WorkflowError> {
        let schedules = self.schedules();
        if schedules.len() != 1 {
            return Err(WorkflowError::ScheduleCount(schedules.len()));
        }
        let cadence = Cadence::new(&schedules[0], "UTC")?;

        if !self.has_manual_trigger() {
            return Err(WorkflowError::MissingManualTrigger);
        }

        let commands: Vec<(&String, &Job, &Step)> = self
            .jobs
            .iter()
            .flat_map(|(name, job)| job.steps.iter().map(move |step| (name, job, step)))
            .filter(|(_, _, step)| step.run.is_some())
            .collect();
        if commands.len() != 1 {
            return Err(WorkflowError::CommandCount(commands.len()));
        }
        let (job_name, job, step) = commands[0];

        // Step env overrides job env, which overrides workflow env
        let mut env = self.env.clone();
        env.extend(job.env.clone());
        env.extend(step.env.clone());

        let secrets = secret_env(&env)?;
        let found: Vec<String> = secrets.keys().cloned().collect();
        if found != REQUIRED_SECRETS {
            return Err(WorkflowError::SecretMismatch {
                expected: REQUIRED_SECRETS.iter().map(|s| s.to_string()).collect(),
                found,
            });
        }

        let invocation = MonitorInvocation {
            job: job_name.clone(),
            step_name: step.name.clone(),
            command: step.run.clone().unwrap_or_default().trim().to_string(),
            secrets,
        };
        debug!(
            cron = %cadence.expression(),
            job = %invocation.job,
            command = %invocation.command,
            "Workflow is valid"
        );

        Ok(ValidatedWorkflow {
            cadence,
            invocation,
        })
    }
}

/// Environment entries that reference a secret, keyed by variable name
///
/// A required variable must come from the secret of the same name.
fn secret_env(env: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>, WorkflowError> {
    let mut secrets = BTreeMap::new();
    for (name, value) in env {
        match secret_reference(value) {
            Some(secret) if REQUIRED_SECRETS.contains(&name.as_str()) && secret != name => {
                return Err(WorkflowError::SecretSource {
                    name: name.clone(),
                    value: value.clone(),
                });
            }
            Some(secret) => {
                secrets.insert(name.clone(), secret.to_string());
            }
            None if REQUIRED_SECRETS.contains(&name.as_str()) => {
                return Err(WorkflowError::SecretSource {
                    name: name.clone(),
                    value: value.clone(),
                });
            }
            None => {}
        }
    }
    Ok(secrets)
}

/// `${{ secrets.NAME }}` → `NAME`
pub fn secret_reference(value: &str) -> Option<&str> {
    let inner = value
        .trim()
        .strip_prefix("${{")?
        .strip_suffix("}}")?
        .trim();
    let name = inner.strip_prefix("secrets.")?;
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    valid.then_some(name)
}
