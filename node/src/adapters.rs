//! # Node-Side Adapters
//!
//! The custody core reaches its collaborators through traits; this module
//! supplies the node's implementations and the snapshot persistence the
//! daemon uses between sweeps.
//!
//! [`FileOracle`] re-reads the attestation feed on every call, so an
//! operator (or the attestation pipeline) can update the file without
//! restarting the node. Parse or IO failures surface as downstream errors
//! and set the reserve's failure flag through the engine's normal path —
//! the adapter never invents a figure.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use basalt_protocol::{DownstreamError, EngineState, Oracle};

/// One attestation entry in the feed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationEntry {
    /// Attested reserve balance, in sats.
    pub balance_sats: u64,
    /// Whether the attestation pipeline considers this figure stale.
    #[serde(default)]
    pub stale: bool,
}

/// An [`Oracle`] backed by a JSON file mapping reserve address to
/// [`AttestationEntry`]. The file is read fresh on every call.
#[derive(Debug, Clone)]
pub struct FileOracle {
    path: PathBuf,
}

impl FileOracle {
    /// Oracle over the attestation feed at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<HashMap<String, AttestationEntry>, DownstreamError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            DownstreamError::new(format!(
                "attestation feed unreadable at {}: {e}",
                self.path.display()
            ))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| DownstreamError::new(format!("attestation feed malformed: {e}")))
    }
}

impl Oracle for FileOracle {
    fn balance_and_staleness(&self, reserve: &str) -> Result<(u64, bool), DownstreamError> {
        let feed = self.load()?;
        feed.get(reserve)
            .map(|entry| (entry.balance_sats, entry.stale))
            .ok_or_else(|| DownstreamError::new(format!("no attestation for reserve {reserve}")))
    }
}

// ---------------------------------------------------------------------------
// Snapshot persistence
// ---------------------------------------------------------------------------

/// Snapshot file name inside the data directory.
pub const SNAPSHOT_FILE: &str = "state.json";

/// Wrapper persisted to disk: the engine state plus node metadata.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    /// Custody-engine generation that wrote this snapshot.
    pub fingerprint: String,
    /// Network label from `init`.
    pub network: String,
    /// The serializable engine state.
    pub state: EngineState,
}

/// Loads the snapshot from `data_dir`.
pub fn load_snapshot(data_dir: &Path) -> Result<Snapshot> {
    let path = data_dir.join(SNAPSHOT_FILE);
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read snapshot at {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse snapshot at {}", path.display()))
}

/// Persists the snapshot atomically: write to a temp file in the same
/// directory, then rename over the target. A crash mid-write leaves the
/// previous snapshot intact.
pub fn save_snapshot(data_dir: &Path, snapshot: &Snapshot) -> Result<()> {
    let path = data_dir.join(SNAPSHOT_FILE);
    let tmp = data_dir.join(format!("{SNAPSHOT_FILE}.tmp"));
    let raw = serde_json::to_string_pretty(snapshot).context("failed to serialize snapshot")?;
    std::fs::write(&tmp, raw)
        .with_context(|| format!("failed to write snapshot to {}", tmp.display()))?;
    std::fs::rename(&tmp, &path)
        .with_context(|| format!("failed to move snapshot into place at {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_protocol::config::ProtocolParams;

    #[test]
    fn file_oracle_reads_the_feed_fresh_each_call() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("attestations.json");
        let oracle = FileOracle::new(&feed);

        // Missing file: downstream error, not a panic.
        assert!(oracle.balance_and_staleness("qc-1").is_err());

        std::fs::write(
            &feed,
            r#"{"qc-1": {"balance_sats": 750000, "stale": false}}"#,
        )
        .unwrap();
        assert_eq!(oracle.balance_and_staleness("qc-1").unwrap(), (750_000, false));

        // Feed update lands without any oracle restart.
        std::fs::write(&feed, r#"{"qc-1": {"balance_sats": 900000, "stale": true}}"#).unwrap();
        assert_eq!(oracle.balance_and_staleness("qc-1").unwrap(), (900_000, true));

        assert!(oracle.balance_and_staleness("qc-unknown").is_err());
    }

    #[test]
    fn snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot {
            fingerprint: basalt_protocol::config::PROTOCOL_FINGERPRINT.to_string(),
            network: "devnet".to_string(),
            state: EngineState::new(ProtocolParams::default()),
        };
        save_snapshot(dir.path(), &snapshot).unwrap();

        let back = load_snapshot(dir.path()).unwrap();
        assert_eq!(back.network, "devnet");
        assert!(back.state.ledger.is_empty());
    }
}
