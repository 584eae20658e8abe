//! On-disk spool of a generated dataset.
//!
//! A spool directory holds `manifest.json` and one `<region>.jsonl` per
//! region, one tagged entity per line in partition order. `load --input`
//! reads it back without regenerating.

use anyhow::{bail, Context};
use geo_core::{Dataset, DatasetMeta, Entity, EntityKind, RegionPartition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpoolManifest {
    pub meta: DatasetMeta,
    /// Entity counts per region and kind.
    pub counts: BTreeMap<String, BTreeMap<EntityKind, usize>>,
}

impl SpoolManifest {
    pub fn for_dataset(dataset: &Dataset) -> Self {
        let counts = dataset
            .partitions()
            .iter()
            .map(|p| {
                let per_kind = EntityKind::LOAD_ORDER
                    .into_iter()
                    .map(|kind| (kind, p.count(kind)))
                    .collect();
                (p.region().to_string(), per_kind)
            })
            .collect();
        Self {
            meta: dataset.meta().clone(),
            counts,
        }
    }
}

fn partition_file(dir: &Path, region: &str) -> std::path::PathBuf {
    dir.join(format!("{region}.jsonl"))
}

/// Write `dataset` to `dir`, creating it if needed.
pub fn write_spool(dir: &Path, dataset: &Dataset) -> anyhow::Result<SpoolManifest> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create spool directory {}", dir.display()))?;

    for partition in dataset.partitions() {
        let path = partition_file(dir, partition.region());
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        for entity in partition.entities() {
            serde_json::to_writer(&mut writer, entity)?;
            writer.write_all(b"\n")?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let manifest = SpoolManifest::for_dataset(dataset);
    let path = dir.join(MANIFEST_FILE);
    let file =
        File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &manifest)?;

    info!(
        "Spooled {} entities across {} regions to {}",
        dataset.total(),
        dataset.partitions().len(),
        dir.display()
    );
    Ok(manifest)
}

/// Read a spooled dataset back. Counts are checked against the manifest;
/// validation against a catalog is left to the caller.
pub fn read_spool(dir: &Path) -> anyhow::Result<Dataset> {
    let path = dir.join(MANIFEST_FILE);
    let file = File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
    let manifest: SpoolManifest = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let mut partitions = Vec::with_capacity(manifest.meta.regions.len());
    for region in &manifest.meta.regions {
        let path = partition_file(dir, region);
        let file =
            File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;

        let mut entities = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entity: Entity = serde_json::from_str(&line).with_context(|| {
                format!("Invalid entity at {}:{}", path.display(), line_no + 1)
            })?;
            entities.push(entity);
        }

        let partition = RegionPartition::new(region.clone(), entities);
        if let Some(expected) = manifest.counts.get(region) {
            for (kind, count) in expected {
                if partition.count(*kind) != *count {
                    bail!(
                        "Spool for region '{}' has {} {} rows, manifest says {}",
                        region,
                        partition.count(*kind),
                        kind,
                        count
                    );
                }
            }
        }
        partitions.push(partition);
    }

    Ok(Dataset::new(manifest.meta, partitions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_core::{CatalogFile, Endpoint, RegionCatalog, ScaleCounts};
    use rideshare_generator::{DataGenerator, GeneratorConfig};

    fn dataset() -> (RegionCatalog, Dataset) {
        let catalog = RegionCatalog::from_specs(CatalogFile::default_layout().regions, |spec| {
            Ok(Endpoint::new("localhost", spec.local_port.unwrap_or(26257)))
        })
        .unwrap();
        let config = GeneratorConfig {
            scale: ScaleCounts::new(5, 4, 8),
            ..GeneratorConfig::default()
        };
        let dataset = DataGenerator::new(&catalog, config)
            .unwrap()
            .generate()
            .unwrap();
        (catalog, dataset)
    }

    #[test]
    fn test_spool_round_trip() {
        let (catalog, dataset) = dataset();
        let dir = tempfile::tempdir().unwrap();

        let manifest = write_spool(dir.path(), &dataset).unwrap();
        assert_eq!(manifest.counts["us-east"][&EntityKind::Ride], 8);
        assert!(dir.path().join("eu-central.jsonl").exists());

        let restored = read_spool(dir.path()).unwrap();
        assert_eq!(restored, dataset);
        restored.validate(&catalog).unwrap();
    }

    #[test]
    fn test_truncated_spool_is_rejected() {
        let (_, dataset) = dataset();
        let dir = tempfile::tempdir().unwrap();
        write_spool(dir.path(), &dataset).unwrap();

        let path = dir.path().join("us-west.jsonl");
        let content = fs::read_to_string(&path).unwrap();
        let truncated: Vec<&str> = content.lines().take(3).collect();
        fs::write(&path, truncated.join("\n")).unwrap();

        let err = read_spool(dir.path()).unwrap_err();
        assert!(err.to_string().contains("us-west"));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_spool(dir.path()).is_err());
    }
}
