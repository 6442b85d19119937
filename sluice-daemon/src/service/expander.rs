//! Job expansion
//!
//! Splits one request into independent variants: one per input file when the
//! request names a dataset, otherwise `NumberofJobs` variants with sequential
//! random seeds.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::json;
use sluice_core::domain::request::{JobRequest, keys};
use sluice_core::domain::variant::{JobVariant, PileupInput};
use sluice_core::{PipelineError, Result};

use super::replica::ReplicaResolver;

/// Upper bound of `NumberofJobs` in seed-sequence mode
const MAX_JOBS_PER_REQUEST: i64 = 100_000;

pub struct JobExpander<'a> {
    resolver: &'a ReplicaResolver,
}

impl<'a> JobExpander<'a> {
    pub fn new(resolver: &'a ReplicaResolver) -> Self {
        Self { resolver }
    }

    /// Expands a request into its variants
    ///
    /// `rng` drives the pileup shuffle only. Any resolution failure aborts
    /// the whole request.
    pub async fn expand(&self, request: &JobRequest, rng: &mut StdRng) -> Result<Vec<JobVariant>> {
        match request.input_dataset() {
            Some(dataset) => self.expand_files(request, dataset, rng).await,
            None => expand_seeds(request),
        }
    }

    async fn expand_files(
        &self,
        request: &JobRequest,
        dataset: &str,
        rng: &mut StdRng,
    ) -> Result<Vec<JobVariant>> {
        let files = self.resolver.resolve(dataset).await?;

        let pileup = match request.pileup_dataset() {
            Some(pileup_dataset) => {
                let pileup = self.resolver.resolve_pileup(pileup_dataset).await?;
                Some(pair_pileup(pileup, files.len(), rng))
            }
            None => None,
        };

        let mut variants = Vec::with_capacity(files.len());

        for (index, file) in files.into_iter().enumerate() {
            let metadata = self.resolver.metadata(&file.did).await?;

            let mut variant = JobVariant::new(request, index as u64 + 1);
            variant.input_file = Some(file.did.to_string());
            variant.input = file.location;
            variant.pileup = pileup.as_ref().map(|pileup| pileup[index].clone());
            variant.input_metadata = Some(json!({ "inputMeta": metadata }).to_string());
            variants.push(variant);
        }

        tracing::info!(
            "Expanded dataset {} into {} job(s){}",
            dataset,
            variants.len(),
            if pileup.is_some() { " with pileup" } else { "" }
        );

        Ok(variants)
    }
}

/// Emits `NumberofJobs` variants with seeds counting up from the given starts
fn expand_seeds(request: &JobRequest) -> Result<Vec<JobVariant>> {
    let count = request.integer(keys::NUMBER_OF_JOBS)?;
    let seed1 = request.integer(keys::RANDOM_SEED1_START)?;
    let seed2 = request.integer(keys::RANDOM_SEED2_START)?;

    if !(0..=MAX_JOBS_PER_REQUEST).contains(&count) {
        return Err(PipelineError::ConfigMissing(format!(
            "{}={} is outside 0..={}",
            keys::NUMBER_OF_JOBS,
            count,
            MAX_JOBS_PER_REQUEST
        )));
    }

    (0..count)
        .map(|n| {
            let seeds = seed1.checked_add(n).zip(seed2.checked_add(n)).ok_or_else(|| {
                PipelineError::ConfigMissing(format!(
                    "random seed sequence starting at ({seed1}, {seed2}) overflows"
                ))
            })?;
            let mut variant = JobVariant::new(request, n as u64 + 1);
            variant.random_seeds = Some(seeds);
            Ok(variant)
        })
        .collect()
}

/// Repeats pileup cyclically to cover `needed` main files, then shuffles it
fn pair_pileup(pileup: Vec<PileupInput>, needed: usize, rng: &mut StdRng) -> Vec<PileupInput> {
    let mut pileup = if !pileup.is_empty() && pileup.len() < needed {
        let copies = needed.div_ceil(pileup.len());
        pileup
            .iter()
            .cycle()
            .take(pileup.len() * copies)
            .cloned()
            .collect()
    } else {
        pileup
    };

    pileup.shuffle(rng);
    pileup
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StaticCatalog, logical_file};
    use rand::SeedableRng;
    use sluice_core::domain::replica::LogicalFile;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    fn main_files(count: usize) -> Vec<LogicalFile> {
        (1..=count)
            .map(|n| {
                let url = format!("gsiftp://slac/evts_{n}.root");
                logical_file(&format!("mc:evts_{n}.root"), &[("SLAC_GRIDFTP", url.as_str())])
            })
            .collect()
    }

    fn pileup_files(count: usize) -> Vec<LogicalFile> {
        (1..=count)
            .map(|n| {
                let url = format!("root://slac/pu_{n}.root");
                logical_file(&format!("mc:pu_{n}.root"), &[("SLAC_XROOTD", url.as_str())])
            })
            .collect()
    }

    fn resolver(catalog: StaticCatalog) -> ReplicaResolver {
        ReplicaResolver::new(Arc::new(catalog), HashSet::new())
    }

    #[tokio::test]
    async fn test_one_variant_per_file() {
        let resolver =
            resolver(StaticCatalog::default().with_dataset("mc:sample", main_files(3)));
        let request = JobRequest::parse("JobTemplate=sim.py\nInputDataset=mc:sample\n");
        let mut rng = StdRng::seed_from_u64(7);

        let variants = JobExpander::new(&resolver)
            .expand(&request, &mut rng)
            .await
            .unwrap();

        assert_eq!(variants.len(), 3);
        let runs: Vec<u64> = variants.iter().map(|v| v.run_number).collect();
        assert_eq!(runs, vec![1, 2, 3]);
        assert_eq!(variants[1].input_file.as_deref(), Some("mc:evts_2.root"));
        assert_eq!(
            variants[1].local_input_path().as_deref(),
            Some("./evts_2.root")
        );
        assert!(variants.iter().all(|v| v.pileup.is_none()));

        let metadata: serde_json::Value =
            serde_json::from_str(variants[0].input_metadata.as_ref().unwrap()).unwrap();
        assert_eq!(metadata["inputMeta"]["name"], "evts_1.root");
    }

    #[tokio::test]
    async fn test_short_pileup_covers_every_file() {
        let resolver = resolver(
            StaticCatalog::default()
                .with_dataset("mc:sample", main_files(5))
                .with_dataset("mc:pileup", pileup_files(2)),
        );
        let request = JobRequest::parse(
            "JobTemplate=sim.py\nInputDataset=mc:sample\nPileupDataset=mc:pileup\n",
        );
        let mut rng = StdRng::seed_from_u64(11);

        let variants = JobExpander::new(&resolver)
            .expand(&request, &mut rng)
            .await
            .unwrap();

        assert_eq!(variants.len(), 5);
        let mut uses: HashMap<String, usize> = HashMap::new();
        for variant in &variants {
            let pileup = variant.pileup.as_ref().expect("every variant gets pileup");
            *uses.entry(pileup.url.clone()).or_default() += 1;
        }
        assert_eq!(uses.len(), 2);
        assert!(uses.values().all(|&n| n >= 2));
    }

    #[tokio::test]
    async fn test_shuffle_is_reproducible_with_seed() {
        let resolver = resolver(
            StaticCatalog::default()
                .with_dataset("mc:sample", main_files(6))
                .with_dataset("mc:pileup", pileup_files(6)),
        );
        let request = JobRequest::parse(
            "JobTemplate=sim.py\nInputDataset=mc:sample\nPileupDataset=mc:pileup\n",
        );
        let expander = JobExpander::new(&resolver);

        let first = expander
            .expand(&request, &mut StdRng::seed_from_u64(3))
            .await
            .unwrap();
        let second = expander
            .expand(&request, &mut StdRng::seed_from_u64(3))
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_metadata_failure_aborts_request() {
        let resolver = resolver(
            StaticCatalog::default()
                .with_dataset("mc:sample", main_files(2))
                .with_failing_metadata("mc:evts_2.root"),
        );
        let request = JobRequest::parse("JobTemplate=sim.py\nInputDataset=mc:sample\n");

        let result = JobExpander::new(&resolver)
            .expand(&request, &mut StdRng::seed_from_u64(1))
            .await;

        assert!(matches!(
            result,
            Err(PipelineError::MetadataLookupFailed { .. })
        ));
    }

    #[test]
    fn test_seed_mode() {
        let request = JobRequest::parse(
            "JobTemplate=sim.py\nNumberofJobs=3\nRandomSeed1SequenceStart=100\nRandomSeed2SequenceStart=200\n",
        );

        let variants = expand_seeds(&request).unwrap();

        assert_eq!(variants.len(), 3);
        assert_eq!(variants[0].random_seeds, Some((100, 200)));
        assert_eq!(variants[2].random_seeds, Some((102, 202)));
        assert_eq!(variants[2].run_number, 3);
        assert!(variants.iter().all(|v| v.input_file.is_none()));
    }

    #[test]
    fn test_seed_mode_requires_counts() {
        let request = JobRequest::parse("JobTemplate=sim.py\nNumberofJobs=3\n");
        assert!(matches!(
            expand_seeds(&request),
            Err(PipelineError::ConfigMissing(_))
        ));

        let request = JobRequest::parse(
            "NumberofJobs=-1\nRandomSeed1SequenceStart=1\nRandomSeed2SequenceStart=2\n",
        );
        assert!(matches!(
            expand_seeds(&request),
            Err(PipelineError::ConfigMissing(_))
        ));
    }

    #[test]
    fn test_seed_mode_rejects_overflowing_sequences() {
        let request = JobRequest::parse(&format!(
            "NumberofJobs=2\nRandomSeed1SequenceStart={}\nRandomSeed2SequenceStart=1\n",
            i64::MAX
        ));
        assert!(matches!(
            expand_seeds(&request),
            Err(PipelineError::ConfigMissing(_))
        ));

        let request = JobRequest::parse(
            "NumberofJobs=100000000\nRandomSeed1SequenceStart=1\nRandomSeed2SequenceStart=2\n",
        );
        assert!(matches!(
            expand_seeds(&request),
            Err(PipelineError::ConfigMissing(_))
        ));
    }

    #[test]
    fn test_pair_pileup_keeps_long_lists() {
        let pileup: Vec<PileupInput> = (0..4)
            .map(|n| PileupInput::new(format!("root://pu/{n}.root"), &format!("{n}.root")))
            .collect();

        let paired = pair_pileup(pileup, 2, &mut StdRng::seed_from_u64(5));
        assert_eq!(paired.len(), 4);
    }
}
