//! Static job definitions.
//!
//! The set of jobs is fixed when the supervisor is constructed; there is no
//! runtime registration.

use std::time::Duration;

use serde::Serialize;

use crate::process::ProcessOptions;

const HOUR: u64 = 60 * 60;

/// Crawl jobs shipped with the supervisor, with their default timeouts.
const BUILTIN_JOBS: &[(&str, u64)] = &[
    ("resources", 2 * HOUR),
    ("events", HOUR),
    ("news", HOUR),
    ("opportunities", 2 * HOUR),
];

/// How to launch one named job.
#[derive(Debug, Clone, Serialize)]
pub struct JobDefinition {
    /// Unique job name.
    pub name: String,
    /// Program to execute.
    pub program: String,
    /// Arguments placed before the timeout flag.
    pub args: Vec<String>,
    /// Job-specific timeout; the supervisor default applies when absent.
    #[serde(with = "optional_secs")]
    pub timeout: Option<Duration>,
    /// Substring expected in the worker's name or command line.
    pub identity: String,
}

impl JobDefinition {
    /// Create a definition that runs `program` with no extra arguments.
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            identity: name.clone(),
            name,
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// A job that runs `script` under `sh -c`, with the job name as `$0`.
    pub fn shell(name: impl Into<String>, script: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), "sh").arg("-c").arg(script).arg(name)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Build the spawn options, passing `timeout` to the worker in seconds.
    pub fn process_options(&self, timeout: Duration) -> ProcessOptions {
        ProcessOptions::new(&self.program)
            .args(self.args.iter().cloned())
            .arg("--timeout")
            .arg(timeout_secs(timeout).to_string())
    }
}

/// Whole seconds, rounded up, never zero.
fn timeout_secs(timeout: Duration) -> u64 {
    let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
    secs.max(1)
}

/// The fixed set of jobs a supervisor manages.
#[derive(Debug, Clone, Default)]
pub struct JobCatalog {
    jobs: Vec<JobDefinition>,
}

impl JobCatalog {
    /// Create a catalog. Later definitions with a duplicate name are dropped.
    pub fn new(definitions: Vec<JobDefinition>) -> Self {
        let mut jobs: Vec<JobDefinition> = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if jobs.iter().any(|job| job.name == definition.name) {
                tracing::warn!(job = %definition.name, "duplicate job definition ignored");
                continue;
            }
            jobs.push(definition);
        }
        Self { jobs }
    }

    /// The compiled-in crawl jobs, each run as `<worker> <name> --timeout N`.
    pub fn builtin(worker_program: &str) -> Self {
        Self::new(
            BUILTIN_JOBS
                .iter()
                .map(|&(name, secs)| {
                    JobDefinition::new(name, worker_program)
                        .arg(name)
                        .timeout(Duration::from_secs(secs))
                })
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|job| job.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|job| job.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobDefinition> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

mod optional_secs {
    use std::time::Duration;

    use serde::Serializer;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }
}
