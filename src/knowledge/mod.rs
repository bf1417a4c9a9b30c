//! Durable fingerprint → verdict store backed by redb
//!
//! Every accepted store runs in its own write transaction: the existing
//! record is read, compared under the confidence ordering and replaced in
//! the same transaction before `commit()`. redb commits are durable and
//! atomic, so an interrupted run never leaves a half-written record.

mod record;

pub use record::{KnowledgeRecord, RECORD_VERSION};

use crate::cache;
use crate::complexity::{ComplexityVerdict, Provenance};
use crate::error::KnowledgeBaseError;
use crate::fingerprint::Fingerprint;
use chrono::Utc;
use redb::{ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const VERDICTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("verdicts");

/// Result of a store attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted,
    Updated,
    /// The existing record ranks higher; nothing was written.
    Rejected,
    /// The verdict's provenance is never persisted.
    Skipped,
}

/// Record counts reported by `kb stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgeStats {
    pub total: usize,
    pub formal: usize,
    pub oracle: usize,
    pub stale: usize,
}

pub struct KnowledgeBase {
    db: redb::Database,
    path: PathBuf,
}

impl KnowledgeBase {
    /// Open (or create) the store at `path`. Failure here is fatal for a batch.
    pub fn open(path: &Path) -> Result<Self, KnowledgeBaseError> {
        cache::ensure_parent_dir(path).map_err(|e| KnowledgeBaseError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let db = redb::Database::create(path).map_err(|e| KnowledgeBaseError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        // Create the table up front so readers never see TableDoesNotExist.
        let init = || -> Result<(), redb::Error> {
            let txn = db.begin_write()?;
            txn.open_table(VERDICTS_TABLE)?;
            txn.commit()?;
            Ok(())
        };
        init().map_err(|e| KnowledgeBaseError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        info!("Opened knowledge base at {}", path.display());
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored record for `fp`, if any. Records written by an older schema are misses.
    pub fn lookup(&self, fp: &Fingerprint) -> Result<Option<KnowledgeRecord>, KnowledgeBaseError> {
        let bytes = self.read_raw(fp.as_str())?;
        let Some(bytes) = bytes else {
            return Ok(None);
        };
        let record: KnowledgeRecord =
            serde_json::from_slice(&bytes).map_err(|source| KnowledgeBaseError::Corrupt {
                key: fp.to_string(),
                source,
            })?;
        if record.version != RECORD_VERSION {
            debug!(
                "Ignoring stale record {} (version {}, expected {})",
                fp.short(),
                record.version,
                RECORD_VERSION
            );
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// The stored verdict for `fp`, relabelled as memoized.
    pub fn lookup_verdict(&self, fp: &Fingerprint) -> Result<Option<ComplexityVerdict>, KnowledgeBaseError> {
        Ok(self.lookup(fp)?.map(|r| r.to_verdict()))
    }

    fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>, KnowledgeBaseError> {
        let txn = self.db.begin_read().map_err(redb::Error::from)?;
        let table = txn.open_table(VERDICTS_TABLE).map_err(redb::Error::from)?;
        let value = table.get(key).map_err(redb::Error::from)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    /// Write-through store under the confidence ordering. A failed write is
    /// retried once before the error is returned.
    pub fn store(
        &self,
        fp: &Fingerprint,
        verdict: &ComplexityVerdict,
    ) -> Result<StoreOutcome, KnowledgeBaseError> {
        let Some(record) = KnowledgeRecord::from_verdict(verdict, Utc::now()) else {
            debug!("Not storing {} verdict for {}", verdict.provenance, fp.short());
            return Ok(StoreOutcome::Skipped);
        };
        match self.store_record(fp, &record) {
            Ok(outcome) => Ok(outcome),
            Err(first) => {
                warn!("Knowledge base write for {} failed ({}), retrying", fp.short(), first);
                self.store_record(fp, &record)
            }
        }
    }

    fn store_record(
        &self,
        fp: &Fingerprint,
        record: &KnowledgeRecord,
    ) -> Result<StoreOutcome, KnowledgeBaseError> {
        let value = serde_json::to_vec(record).map_err(KnowledgeBaseError::Encode)?;
        let txn = self.db.begin_write().map_err(redb::Error::from)?;
        let outcome = {
            let mut table = txn.open_table(VERDICTS_TABLE).map_err(redb::Error::from)?;
            let existing = table
                .get(fp.as_str())
                .map_err(redb::Error::from)?
                .map(|v| v.value().to_vec());
            let existing: Option<KnowledgeRecord> = match existing {
                Some(bytes) => match serde_json::from_slice::<KnowledgeRecord>(&bytes) {
                    Ok(r) if r.version == RECORD_VERSION => Some(r),
                    Ok(_) => None,
                    Err(e) => {
                        warn!("Replacing unreadable record {}: {}", fp.short(), e);
                        None
                    }
                },
                None => None,
            };
            match existing {
                Some(old) if !record.supersedes(&old) => StoreOutcome::Rejected,
                Some(_) => {
                    table
                        .insert(fp.as_str(), value.as_slice())
                        .map_err(redb::Error::from)?;
                    StoreOutcome::Updated
                }
                None => {
                    table
                        .insert(fp.as_str(), value.as_slice())
                        .map_err(redb::Error::from)?;
                    StoreOutcome::Inserted
                }
            }
        };
        match outcome {
            StoreOutcome::Rejected => {
                txn.abort().map_err(redb::Error::from)?;
                debug!(
                    "Rejected {} record for {} (lower rank than stored)",
                    record.provenance,
                    fp.short()
                );
            }
            _ => {
                txn.commit().map_err(redb::Error::from)?;
                debug!("Stored {} record for {} ({:?})", record.provenance, fp.short(), outcome);
            }
        }
        Ok(outcome)
    }

    /// Every stored record in key order.
    pub fn list(&self) -> Result<Vec<(Fingerprint, KnowledgeRecord)>, KnowledgeBaseError> {
        let txn = self.db.begin_read().map_err(redb::Error::from)?;
        let table = txn.open_table(VERDICTS_TABLE).map_err(redb::Error::from)?;
        let mut out = Vec::new();
        for item in table.range::<&str>(..).map_err(redb::Error::from)? {
            let (key, value) = item.map_err(redb::Error::from)?;
            match serde_json::from_slice::<KnowledgeRecord>(value.value()) {
                Ok(record) => out.push((Fingerprint::from_hex(key.value()), record)),
                Err(e) => warn!("Skipping unreadable record {}: {}", key.value(), e),
            }
        }
        Ok(out)
    }

    pub fn stats(&self) -> Result<KnowledgeStats, KnowledgeBaseError> {
        let mut stats = KnowledgeStats::default();
        for (_, record) in self.list()? {
            stats.total += 1;
            if record.version != RECORD_VERSION {
                stats.stale += 1;
                continue;
            }
            match record.provenance {
                Provenance::Formal => stats.formal += 1,
                Provenance::Oracle => stats.oracle += 1,
                Provenance::Memoized | Provenance::Error => {}
            }
        }
        Ok(stats)
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize, KnowledgeBaseError> {
        let txn = self.db.begin_read().map_err(redb::Error::from)?;
        let table = txn.open_table(VERDICTS_TABLE).map_err(redb::Error::from)?;
        let n = table.len().map_err(redb::Error::from)?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool, KnowledgeBaseError> {
        Ok(self.len()? == 0)
    }

    /// Drop every record. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, KnowledgeBaseError> {
        let removed = self.len()?;
        let txn = self.db.begin_write().map_err(redb::Error::from)?;
        txn.delete_table(VERDICTS_TABLE).map_err(redb::Error::from)?;
        txn.open_table(VERDICTS_TABLE).map_err(redb::Error::from)?;
        txn.commit().map_err(redb::Error::from)?;
        info!("Cleared {} records from {}", removed, self.path.display());
        Ok(removed)
    }
}
