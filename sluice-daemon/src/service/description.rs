//! Job description building
//!
//! Two halves: rendering the job template for a variant (at ingest), and
//! building the resource and IO manifest handed to the backend (at dispatch).

use sluice_core::domain::description::{CachePolicy, InputFile, JobDescription, OutputFile};
use sluice_core::domain::request::keys;
use sluice_core::domain::variant::JobVariant;
use sluice_core::{PipelineError, Result};
use std::str::FromStr;

use crate::snapshot::{ConfigSnapshot, SiteConfig};

const DEFAULT_MEMORY_GB: f64 = 2.0;
const DEFAULT_WALLTIME_MINUTES: u64 = 240;

const WRAPPER_NAME: &str = "ldmxsim.sh";
const CONFIG_NAME: &str = "ldmxproduction.config";
const TEMPLATE_NAME: &str = "ldmxjob.py";
const HELPER_NAME: &str = "ldmx-simprod-rte-helper.py";
const METADATA_NAME: &str = "rucio.metadata";
const OUTPUT_LIST: &str = "@output.files";
const JOB_NAME: &str = "LDMX Prod Simulation";
const RERUN: u32 = 2;

/// Template lines rewritten per variant, matched by prefix
#[derive(Debug, Clone, Copy)]
enum Directive {
    RunNumber,
    ProcessRun,
    InputFiles,
    RandomSeeds,
}

const DIRECTIVES: [(&str, Directive); 4] = [
    ("sim.runNumber", Directive::RunNumber),
    ("p.run", Directive::ProcessRun),
    ("p.inputFiles", Directive::InputFiles),
    ("sim.randomSeeds", Directive::RandomSeeds),
];

/// Renders a job template for one variant
///
/// Lines starting with a directive are replaced; every other line, blank ones
/// included, is copied verbatim and in order.
pub fn render_template(template: &str, variant: &JobVariant) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());

    for line in template.split_inclusive('\n') {
        let directive = DIRECTIVES
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix))
            .map(|(_, directive)| *directive);

        match directive {
            Some(directive) => {
                rendered.push_str(&render_directive(directive, variant)?);
                rendered.push('\n');
            }
            None => rendered.push_str(line),
        }
    }

    Ok(rendered)
}

fn render_directive(directive: Directive, variant: &JobVariant) -> Result<String> {
    Ok(match directive {
        Directive::RunNumber => format!("sim.runNumber = {}", variant.run_number),
        Directive::ProcessRun => format!("p.run = {}", variant.run_number),
        Directive::InputFiles => {
            let name = variant.input_name().ok_or_else(|| {
                PipelineError::TemplateRenderError(
                    "template reads input files but the job has none".to_string(),
                )
            })?;
            format!("p.inputFiles = [ \"{name}\" ]")
        }
        Directive::RandomSeeds => {
            let (seed1, seed2) = variant.random_seeds.unwrap_or((0, 0));
            format!("sim.randomSeeds = [ {seed1}, {seed2} ]")
        }
    })
}

/// Staged files of a job, as recorded in the store
#[derive(Debug, Clone, Copy)]
pub struct StagedFiles<'a> {
    pub config_path: &'a str,
    pub template_path: &'a str,
}

pub struct DescriptionBuilder<'a> {
    snapshot: &'a ConfigSnapshot,
}

impl<'a> DescriptionBuilder<'a> {
    pub fn new(snapshot: &'a ConfigSnapshot) -> Self {
        Self { snapshot }
    }

    /// Builds the manifest of a variant bound for `site`
    pub fn build(
        &self,
        variant: &JobVariant,
        staged: StagedFiles<'_>,
        site: Option<&SiteConfig>,
    ) -> Result<JobDescription> {
        let memory_gb = optional_number(variant, keys::JOB_MEMORY)?.unwrap_or(DEFAULT_MEMORY_GB);
        let walltime =
            optional_number(variant, keys::JOB_WALL_TIME)?.unwrap_or(DEFAULT_WALLTIME_MINUTES);
        let cputime = optional_number(variant, keys::JOB_CPU_TIME)?.unwrap_or(walltime);

        if !memory_gb.is_finite() || memory_gb <= 0.0 {
            return Err(PipelineError::TemplateRenderError(format!(
                "{}={} is not a positive amount",
                keys::JOB_MEMORY,
                memory_gb
            )));
        }

        let executable = &self.snapshot.executable;

        let mut runtime_environments = Vec::with_capacity(2);
        if let Some(rte) = variant.get(keys::RUNTIME_ENVIRONMENT) {
            runtime_environments.push(format!("APPS/{rte}"));
        }
        runtime_environments.push(format!("APPS/{}", executable.base_rte));

        let mut output_files = vec![OutputFile {
            name: METADATA_NAME.to_string(),
            destination: String::new(),
        }];
        if variant.get(keys::FINAL_OUTPUT_DESTINATION).is_some() {
            output_files.push(OutputFile {
                name: OUTPUT_LIST.to_string(),
                destination: String::new(),
            });
        }

        let mut input_files = vec![
            InputFile::staged(WRAPPER_NAME, &executable.wrapper),
            InputFile::staged(CONFIG_NAME, staged.config_path),
            InputFile::staged(TEMPLATE_NAME, staged.template_path),
            InputFile::staged(HELPER_NAME, &executable.rucio_helper),
        ];

        if let (Some(name), None) = (variant.input_name(), &variant.input.local) {
            let remote = variant.input.remote.as_ref().ok_or_else(|| {
                PipelineError::TemplateRenderError(format!("no readable location for {name}"))
            })?;
            input_files.push(InputFile::fetched(name, &remote.url, CachePolicy::No));
        }

        if let Some(pileup) = &variant.pileup {
            input_files.push(InputFile::fetched(
                pileup.file_name(),
                &pileup.url,
                CachePolicy::Yes,
            ));
        }

        Ok(JobDescription {
            memory_mb: (memory_gb * 1000.0).round() as u64,
            walltime_minutes: walltime,
            cputime_minutes: cputime,
            runtime_environments,
            output_files,
            executable: WRAPPER_NAME.to_string(),
            input_files,
            stdout: "stdout".to_string(),
            gmlog: "gmlog".to_string(),
            join: true,
            rerun: RERUN,
            count: site.map_or(1, |site| site.core_count.max(1)),
            queue: site.and_then(|site| site.queue.clone()),
            job_name: JOB_NAME.to_string(),
        })
    }
}

fn optional_number<T: FromStr>(variant: &JobVariant, key: &str) -> Result<Option<T>> {
    variant
        .get(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|_| {
                PipelineError::TemplateRenderError(format!("{key}={raw} is not a number"))
            })
        })
        .transpose()
}
