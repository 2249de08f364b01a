use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::domain::{PendingPurchase, ReceiptStore, StoreError};

/// JSON file holding payments that still await finalization.
///
/// Every change is written through to disk, so a receipt survives the console
/// being closed between the transfer and the finalize step.
#[derive(Debug)]
pub struct ReceiptJournal {
    path: PathBuf,
    entries: Vec<PendingPurchase>,
}

impl ReceiptJournal {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.entries).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, json).map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&staging, &self.path).map_err(|e| StoreError::Io(e.to_string()))
    }
}

impl ReceiptStore for ReceiptJournal {
    fn record(&mut self, pending: &PendingPurchase) -> Result<(), StoreError> {
        self.entries.retain(|entry| entry.attempt_id != pending.attempt_id);
        self.entries.push(pending.clone());
        self.flush()
    }

    fn settle(&mut self, attempt_id: Uuid) -> Result<(), StoreError> {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.attempt_id != attempt_id);
        if self.entries.len() == before {
            return Ok(());
        }
        self.flush()
    }

    fn pending(&self) -> Vec<PendingPurchase> {
        self.entries.clone()
    }
}

pub struct CsvExporter;

impl CsvExporter {
    /// Writes pending payments to `filename` for manual reconciliation.
    pub fn export_pending(entries: &[PendingPurchase], filename: &str) -> Result<String, String> {
        let mut writer = csv::Writer::from_path(filename).map_err(|e| e.to_string())?;

        writer
            .write_record([
                "attempt_id",
                "startup_id",
                "investor_id",
                "quantity",
                "total_amount",
                "block_index",
                "recorded_at",
            ])
            .map_err(|e| e.to_string())?;

        for entry in entries {
            writer
                .write_record([
                    entry.attempt_id.to_string(),
                    entry.request.startup_id().to_string(),
                    entry.request.investor_id().to_string(),
                    entry.request.quantity().to_string(),
                    entry.total_amount.to_string(),
                    entry.receipt.block_index.to_string(),
                    entry.recorded_at.to_string(),
                ])
                .map_err(|e| e.to_string())?;
        }

        writer.flush().map_err(|e| e.to_string())?;
        Ok(filename.to_string())
    }
}
