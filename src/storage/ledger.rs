//! Trade ledger.
//!
//! Append-only record of engine-placed orders. The set of `(ticker, side)`
//! keys it contains is what stops the executor from entering the same
//! market side twice across runs.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use fs2::FileExt;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::types::{LedgerKey, PropEdgeError, TradeLedgerEntry};

/// Durable store of engine entries.
pub trait TradeLedger: Send {
    /// Keys of every recorded entry.
    fn load_keys(&self) -> Result<HashSet<LedgerKey>>;

    /// Record one placed order. Must be durable when it returns `Ok`.
    fn append(&mut self, entry: &TradeLedgerEntry) -> Result<()>;
}

// ---------------------------------------------------------------------------
// CSV ledger
// ---------------------------------------------------------------------------

/// CSV-backed ledger, exclusively locked for as long as it is open.
///
/// The lock lives on a sibling `.lock` file so the ledger itself can be
/// read by other tools while a run is in progress.
#[derive(Debug)]
pub struct CsvTradeLedger {
    path: PathBuf,
    _lock: File,
}

impl CsvTradeLedger {
    /// Open (creating the directory if needed) and take the run lock.
    /// Fails with [`PropEdgeError::LedgerLocked`] if another run holds it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let lock_path = lock_path(&path);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open {}", lock_path.display()))?;

        if lock.try_lock_exclusive().is_err() {
            return Err(PropEdgeError::LedgerLocked {
                path: path.display().to_string(),
            }
            .into());
        }

        debug!(path = %path.display(), "Trade ledger opened");
        Ok(Self { path, _lock: lock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every entry, in file order.
    ///
    /// Any row that fails to parse is an error: its key can't be recovered
    /// reliably, and dropping it would let the market be entered again.
    pub fn entries(&self) -> Result<Vec<TradeLedgerEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let mut entries = Vec::new();
        for result in reader.deserialize::<TradeLedgerEntry>() {
            let entry = result.map_err(|e| PropEdgeError::LedgerCorrupt {
                path: self.path.display().to_string(),
                line: e.position().map(|p| p.line()).unwrap_or(0),
                reason: e.to_string(),
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

impl TradeLedger for CsvTradeLedger {
    fn load_keys(&self) -> Result<HashSet<LedgerKey>> {
        Ok(self.entries()?.iter().map(TradeLedgerEntry::key).collect())
    }

    fn append(&mut self, entry: &TradeLedgerEntry) -> Result<()> {
        let file_has_data = fs::metadata(&self.path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let mut writer = WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file);
        writer.serialize(entry)?;
        writer.flush()?;

        let file = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush {}: {}", self.path.display(), e.error()))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync {}", self.path.display()))?;

        debug!(ticker = %entry.ticker, side = %entry.side, "Ledger entry appended");
        Ok(())
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// In-memory ledger
// ---------------------------------------------------------------------------

/// Ledger kept in memory, for tests and evaluation runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    entries: Vec<TradeLedgerEntry>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<TradeLedgerEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[TradeLedgerEntry] {
        &self.entries
    }
}

impl TradeLedger for MemoryLedger {
    fn load_keys(&self) -> Result<HashSet<LedgerKey>> {
        Ok(self.entries.iter().map(TradeLedgerEntry::key).collect())
    }

    fn append(&mut self, entry: &TradeLedgerEntry) -> Result<()> {
        self.entries.push(entry.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
