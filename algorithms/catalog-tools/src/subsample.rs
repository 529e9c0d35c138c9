//! Seeded random subsampling across CSV shards.

use crate::{failed, persist, staged_writer};
use railyard_libs::{Result, Subsample, Subsampler};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const NAME: &str = "RandomSubsampler";

/// Draws `num_objects` rows without replacement, keeping input order.
///
/// Inputs may be files or directories; directories contribute every
/// `.csv` file below them. All shards must share one header.
#[derive(Debug, Clone)]
pub struct RandomSubsampler {
    seed: u64,
    num_objects: usize,
}

impl RandomSubsampler {
    pub fn new(subsample: &Subsample) -> Result<Self> {
        let seed = u64::try_from(subsample.seed)
            .map_err(|_| failed(NAME, format!("seed must not be negative, got {}", subsample.seed)))?;
        let num_objects = usize::try_from(subsample.num_objects).map_err(|_| {
            failed(
                NAME,
                format!("num_objects must not be negative, got {}", subsample.num_objects),
            )
        })?;
        Ok(Self { seed, num_objects })
    }
}

pub fn make_random_subsampler(subsample: &Subsample) -> Result<Box<dyn Subsampler>> {
    Ok(Box::new(RandomSubsampler::new(subsample)?))
}

/// Every CSV shard named by `inputs`, directories expanded in sorted order.
fn shards(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = WalkDir::new(input)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
            .collect();
        found.sort();
        files.extend(found);
    }
    files
}

impl Subsampler for RandomSubsampler {
    fn subsample(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let mut headers: Option<csv::StringRecord> = None;
        let mut rows = Vec::new();

        for shard in shards(inputs) {
            let mut reader = csv::Reader::from_path(&shard).map_err(|e| failed(NAME, e))?;
            let shard_headers = reader.headers().map_err(|e| failed(NAME, e))?.clone();
            match &headers {
                Some(expected) if *expected != shard_headers => {
                    return Err(failed(
                        NAME,
                        format!("{:?} does not share the header of the first shard", shard),
                    ));
                }
                Some(_) => {}
                None => headers = Some(shard_headers),
            }
            for record in reader.records() {
                rows.push(record.map_err(|e| failed(NAME, e))?);
            }
        }

        let headers = headers.ok_or_else(|| failed(NAME, "no input shards"))?;
        let amount = self.num_objects.min(rows.len());
        if amount < self.num_objects {
            warn!(
                "Asked for {} objects but only {} are available",
                self.num_objects,
                rows.len()
            );
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut picked = rand::seq::index::sample(&mut rng, rows.len(), amount).into_vec();
        picked.sort_unstable();

        let mut writer = staged_writer(NAME, output)?;
        writer.write_record(&headers).map_err(|e| failed(NAME, e))?;
        for index in &picked {
            writer.write_record(&rows[*index]).map_err(|e| failed(NAME, e))?;
        }
        persist(NAME, writer, output)?;

        info!("Picked {} of {} objects into {:?}", picked.len(), rows.len(), output);
        Ok(())
    }
}
