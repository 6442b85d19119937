//! Job description domain types
//!
//! The backend-agnostic resource and IO manifest of a job, and its rendering
//! into the clause document handed to the execution backend.

use serde::{Deserialize, Serialize};

/// Whether the backend may reuse a cached copy of a fetched input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    Yes,
    No,
}

impl CachePolicy {
    fn as_str(self) -> &'static str {
        match self {
            CachePolicy::Yes => "cache=yes",
            CachePolicy::No => "cache=no",
        }
    }
}

/// A file placed in the job's session directory before it starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    pub name: String,
    /// Local path or URL
    pub source: String,
    /// Set for files fetched from remote storage
    pub cache: Option<CachePolicy>,
}

impl InputFile {
    pub fn staged(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            cache: None,
        }
    }

    pub fn fetched(name: impl Into<String>, url: impl Into<String>, cache: CachePolicy) -> Self {
        Self {
            name: name.into(),
            source: url.into(),
            cache: Some(cache),
        }
    }
}

/// A file collected from the session directory when the job ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub name: String,
    /// Upload destination, empty to keep the file with the job
    pub destination: String,
}

/// Resource and IO manifest of one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescription {
    pub memory_mb: u64,
    pub walltime_minutes: u64,
    pub cputime_minutes: u64,
    /// Ordered; the job-specific environment precedes the base one
    pub runtime_environments: Vec<String>,
    pub output_files: Vec<OutputFile>,
    pub executable: String,
    pub input_files: Vec<InputFile>,
    pub stdout: String,
    pub gmlog: String,
    pub join: bool,
    pub rerun: u32,
    pub count: u32,
    pub queue: Option<String>,
    pub job_name: String,
}

impl JobDescription {
    /// Renders the manifest as an ordered clause document
    pub fn render(&self) -> String {
        let mut clauses = vec![
            format!("(memory = {})", self.memory_mb),
            format!("(walltime = {})", self.walltime_minutes),
            format!("(cputime = {})", self.cputime_minutes),
        ];

        clauses.push(
            self.runtime_environments
                .iter()
                .map(|rte| format!("(runtimeenvironment = {rte})"))
                .collect(),
        );

        let outputs: String = self
            .output_files
            .iter()
            .map(|f| format!("(\"{}\" \"{}\")", f.name, f.destination))
            .collect();
        clauses.push(format!("(outputfiles = {outputs})"));

        clauses.push(format!("(executable = {})", self.executable));

        let inputs: String = self
            .input_files
            .iter()
            .map(|f| match f.cache {
                Some(cache) => format!("(\"{}\" \"{}\" \"{}\")", f.name, f.source, cache.as_str()),
                None => format!("(\"{}\" \"{}\")", f.name, f.source),
            })
            .collect();
        clauses.push(format!("(inputfiles = {inputs})"));

        clauses.push(format!("(stdout = {})", self.stdout));
        clauses.push(format!("(gmlog = {})", self.gmlog));
        clauses.push(format!(
            "(join = {})",
            if self.join { "yes" } else { "no" }
        ));
        clauses.push(format!("(rerun = {})", self.rerun));
        clauses.push(format!("(count = {})", self.count));
        if let Some(queue) = &self.queue {
            clauses.push(format!("(queue = \"{queue}\")"));
        }
        clauses.push(format!("(jobname = \"{}\")", self.job_name));

        format!("&{}", clauses.join("\n"))
    }
}
