//! Checkpoint and restore of simulation snapshots.

use petri_core::{Error, Result};
use petri_world::Snapshot;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

const CHECKPOINT_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    /// Unix time in milliseconds
    pub timestamp: i64,
    pub snapshot: Snapshot,
}

pub struct CheckpointManager {
    checkpoint_dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// Write `snapshot` as `checkpoint_<generation>.bin`.
    pub async fn create_checkpoint(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        fs::create_dir_all(&self.checkpoint_dir).await?;

        let checkpoint = Checkpoint {
            version: CHECKPOINT_VERSION,
            timestamp: chrono::Utc::now().timestamp_millis(),
            snapshot: snapshot.clone(),
        };
        let bytes = bincode::serialize(&checkpoint)?;

        // write to a partial file, then rename into place
        let path = self
            .checkpoint_dir
            .join(format!("checkpoint_{}.bin", snapshot.generation));
        let partial = path.with_extension("bin.partial");
        fs::write(&partial, &bytes).await?;
        fs::rename(&partial, &path).await?;

        info!(
            generation = snapshot.generation,
            bytes = bytes.len(),
            "Checkpoint created at {:?}",
            path
        );
        Ok(path)
    }

    /// Load the checkpoint with the highest generation.
    pub async fn restore_latest(&self) -> Result<Checkpoint> {
        let latest = self
            .list()
            .await?
            .into_iter()
            .max_by_key(|(_, generation)| *generation);

        let Some((path, _)) = latest else {
            return Err(Error::NotFound("No checkpoint files found".to_string()));
        };

        let bytes = fs::read(&path).await?;
        let checkpoint: Checkpoint = bincode::deserialize(&bytes)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(Error::Validation(format!(
                "Unsupported checkpoint version {}",
                checkpoint.version
            )));
        }

        info!(
            generation = checkpoint.snapshot.generation,
            timestamp = checkpoint.timestamp,
            "Restored from checkpoint: {:?}",
            path
        );
        Ok(checkpoint)
    }

    /// Clean up old checkpoints, keeping only the most recent N
    pub async fn cleanup_old_checkpoints(&self, keep_count: usize) -> Result<()> {
        let mut checkpoints = self.list().await?;
        if checkpoints.len() <= keep_count {
            return Ok(());
        }

        checkpoints.sort_by(|a, b| b.1.cmp(&a.1));

        for (path, _) in checkpoints.iter().skip(keep_count) {
            if let Err(e) = fs::remove_file(path).await {
                warn!("Failed to remove old checkpoint {:?}: {}", path, e);
            } else {
                info!("Removed old checkpoint: {:?}", path);
            }
        }

        Ok(())
    }

    async fn list(&self) -> Result<Vec<(PathBuf, u64)>> {
        if !fs::try_exists(&self.checkpoint_dir).await? {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&self.checkpoint_dir).await?;
        let mut checkpoints = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let generation = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("checkpoint_"))
                .and_then(|n| n.strip_suffix(".bin"))
                .and_then(|n| n.parse::<u64>().ok());
            if let Some(generation) = generation {
                checkpoints.push((path, generation));
            }
        }

        Ok(checkpoints)
    }
}
