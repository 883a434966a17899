//! Stamp-based artifact store

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::graph::TaskGraph;
use crate::oracle::{OracleError, Validity, ValidityOracle};
use crate::task::{TaskDefinition, TaskId};

/// Directory name used for the default namespace
const DEFAULT_NAMESPACE_DIR: &str = "default";

/// SHA-256 fingerprint of a task definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(pub String);

impl Signature {
    /// Compute the signature of a task's Real-form definition
    pub fn compute(id: &TaskId, definition: &TaskDefinition) -> Self {
        let mut hasher = Sha256::new();

        hasher.update(id.to_string().as_bytes());
        hasher.update(b"\0");

        if let Some(cmd) = &definition.command {
            hasher.update(cmd.as_bytes());
        }
        hasher.update(b"\0");

        // Sorted for determinism
        let sorted_env: BTreeMap<_, _> = definition.env.iter().collect();
        for (k, v) in sorted_env {
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
            hasher.update(b"\0");
        }

        Signature(format!("{:x}", hasher.finalize()))
    }
}

/// Contents of a stamp file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stamp {
    /// Task the stamp belongs to
    pub task: String,
    /// Signature of the definition that produced the artifact
    pub signature: Signature,
    /// When the stamp was written
    pub created_at: String,
}

/// Directory of per-task stamps recording which artifacts are current.
///
/// Doubles as a validity oracle: a task is valid iff its stamp exists and
/// records the signature of the task's current definition.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    signatures: HashMap<TaskId, Signature>,
}

impl ArtifactStore {
    /// Create a store rooted at `dir`
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            signatures: HashMap::new(),
        }
    }

    /// Register the current signature of every coverable task
    pub fn with_graph(mut self, graph: &TaskGraph) -> Self {
        for node in graph.nodes().iter().filter(|n| n.coverable) {
            self.signatures.insert(
                node.id.clone(),
                Signature::compute(&node.id, &node.definition),
            );
        }
        self
    }

    /// Path of a task's stamp file
    pub fn stamp_path(&self, id: &TaskId) -> PathBuf {
        let namespace = if id.is_default_namespace() {
            DEFAULT_NAMESPACE_DIR
        } else {
            id.namespace.as_str()
        };
        self.dir
            .join(namespace)
            .join(&id.recipe)
            .join(format!("{}.json", id.task_name))
    }

    /// Record a fresh artifact for a task
    pub fn record(&self, id: &TaskId, definition: &TaskDefinition) -> Result<Signature, CacheError> {
        let signature = Signature::compute(id, definition);
        let path = self.stamp_path(id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let stamp = Stamp {
            task: id.to_string(),
            signature: signature.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&stamp)?;
        let mut file = fs::File::create(&path)?;
        file.write_all(json.as_bytes())?;

        debug!(task = %id, path = %path.display(), "stamp written");
        Ok(signature)
    }

    /// Read a task's stamp, if present
    pub fn lookup(&self, id: &TaskId) -> Result<Option<Stamp>, CacheError> {
        let path = self.stamp_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Remove stamps older than `max_age`
    pub fn prune(&self, max_age: Duration) -> Result<PruneStats, CacheError> {
        info!(max_age_secs = max_age.as_secs(), "pruning stamps");
        let mut stats = PruneStats::default();

        // An age too large to represent keeps everything
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| chrono::Utc::now().checked_sub_signed(age));

        for path in self.stamp_files() {
            stats.total += 1;

            let created = fs::read_to_string(&path)
                .ok()
                .and_then(|contents| serde_json::from_str::<Stamp>(&contents).ok())
                .and_then(|stamp| chrono::DateTime::parse_from_rfc3339(&stamp.created_at).ok());

            match (created, cutoff) {
                (Some(created), Some(cutoff)) if created < cutoff => {
                    if fs::remove_file(&path).is_ok() {
                        stats.removed += 1;
                    }
                }
                _ => stats.kept += 1,
            }
        }

        info!(total = stats.total, removed = stats.removed, kept = stats.kept, "stamp prune complete");
        Ok(stats)
    }

    /// Get store statistics
    pub fn status(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();
        for path in self.stamp_files() {
            stats.entries += 1;
            stats.total_size += fs::metadata(&path)?.len();
        }
        Ok(stats)
    }

    /// Delete every stamp
    pub fn clean(&self) -> Result<(), CacheError> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }

    /// Get the store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stamp_files(&self) -> Vec<PathBuf> {
        if !self.dir.exists() {
            return Vec::new();
        }
        WalkDir::new(&self.dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
            .map(|entry| entry.into_path())
            .collect()
    }
}

#[async_trait]
impl ValidityOracle for ArtifactStore {
    async fn query(&self, id: &TaskId) -> Result<Validity, OracleError> {
        let Some(expected) = self.signatures.get(id) else {
            return Ok(Validity::Invalid);
        };

        let path = self.stamp_path(id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Validity::Invalid),
            Err(e) => {
                return Err(OracleError::Stamp {
                    id: id.to_string(),
                    message: e.to_string(),
                })
            }
        };

        let stamp: Stamp = serde_json::from_str(&contents).map_err(|e| OracleError::Stamp {
            id: id.to_string(),
            message: e.to_string(),
        })?;

        if &stamp.signature == expected {
            Ok(Validity::Valid)
        } else {
            debug!(task = %id, "stamp signature is stale");
            Ok(Validity::Invalid)
        }
    }
}

/// Statistics from a prune operation
#[derive(Debug, Default)]
pub struct PruneStats {
    /// Total stamps found
    pub total: usize,
    /// Stamps removed
    pub removed: usize,
    /// Stamps kept
    pub kept: usize,
}

/// Store statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of stamps
    pub entries: usize,
    /// Total size in bytes
    pub total_size: u64,
}

impl CacheStats {
    /// Format total size in human-readable form
    pub fn formatted_size(&self) -> String {
        if self.total_size < 1024 {
            format!("{} B", self.total_size)
        } else if self.total_size < 1024 * 1024 {
            format!("{:.1} KB", self.total_size as f64 / 1024.0)
        } else {
            format!("{:.1} MB", self.total_size as f64 / (1024.0 * 1024.0))
        }
    }
}

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// IO error
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
