//! Application-state container.
//!
//! The ledger is loaded once at startup and owns the in-memory copy of every
//! persisted list. A mutation is written to the store first and only then
//! replaces the in-memory copy, so the two never diverge. All mutations go
//! through one lock, which makes this process the single writer.

use chrono::Utc;
use tokio::sync::Mutex;

use crate::db::{keys, DocumentWrite, Repository};
use crate::errors::AppError;
use crate::models::{
    CreateWorkerRequest, NotesOverviewEntry, PendingInvoice, Settings, StoredNote, Worker,
    WorkerNote,
};
use crate::wallet::CreatedInvoice;

#[derive(Debug, Clone, Default)]
struct LedgerState {
    settings: Settings,
    workers: Vec<Worker>,
    invoices: Vec<PendingInvoice>,
    /// Highest id ever handed out
    id_watermark: i64,
}

impl LedgerState {
    /// Timestamp id that is strictly greater than any id issued before.
    fn next_id(&self) -> i64 {
        Utc::now().timestamp_millis().max(self.id_watermark + 1)
    }
}

/// Persisted application state.
pub struct Ledger {
    repo: Repository,
    state: Mutex<LedgerState>,
}

impl Ledger {
    /// Load every document from the store.
    pub async fn load(repo: Repository) -> Result<Self, AppError> {
        let settings = repo
            .get_document::<Settings>(keys::SETTINGS)
            .await?
            .unwrap_or_default();
        let workers = repo
            .get_document::<Vec<Worker>>(keys::WORKERS)
            .await?
            .unwrap_or_default();
        let invoices = repo
            .get_document::<Vec<PendingInvoice>>(keys::INVOICES)
            .await?
            .unwrap_or_default();
        let stored_watermark = repo
            .get_document::<i64>(keys::ID_WATERMARK)
            .await?
            .unwrap_or(0);

        let id_watermark = workers
            .iter()
            .map(|w| w.id)
            .chain(invoices.iter().map(|i| i.id))
            .fold(stored_watermark, i64::max);

        tracing::info!(
            workers = workers.len(),
            invoices = invoices.len(),
            configured = settings.is_configured(),
            "Ledger loaded"
        );

        Ok(Self {
            repo,
            state: Mutex::new(LedgerState {
                settings,
                workers,
                invoices,
                id_watermark,
            }),
        })
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Current revision ID, or zero when it cannot be read.
    pub async fn revision_id(&self) -> i64 {
        self.repo.get_revision_id().await.unwrap_or(0)
    }

    // ==================== SETTINGS ====================

    pub async fn settings(&self) -> Settings {
        self.state.lock().await.settings.clone()
    }

    /// Replace the settings record.
    pub async fn save_settings(&self, settings: Settings) -> Result<(Settings, i64), AppError> {
        let mut state = self.state.lock().await;
        let revision = self
            .repo
            .write_documents(&[DocumentWrite::put(keys::SETTINGS, &settings)?])
            .await?;
        state.settings = settings.clone();
        tracing::info!(url = %settings.url, "Settings saved");
        Ok((settings, revision))
    }

    // ==================== WORKERS ====================

    /// Workers in insertion order.
    pub async fn workers(&self) -> Vec<Worker> {
        self.state.lock().await.workers.clone()
    }

    pub async fn worker(&self, id: i64) -> Option<Worker> {
        let state = self.state.lock().await;
        state.workers.iter().find(|w| w.id == id).cloned()
    }

    /// Append a worker and return it with the updated list.
    pub async fn add_worker(
        &self,
        request: &CreateWorkerRequest,
    ) -> Result<(Worker, Vec<Worker>, i64), AppError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Worker name is required".to_string()));
        }

        let mut state = self.state.lock().await;
        let worker = Worker {
            id: state.next_id(),
            name: name.to_string(),
            role: non_blank(request.role.as_deref()),
            salary: request.salary,
            address: non_blank(request.address.as_deref()),
        };

        let mut workers = state.workers.clone();
        workers.push(worker.clone());

        let revision = self
            .repo
            .write_documents(&[
                DocumentWrite::put(keys::WORKERS, &workers)?,
                DocumentWrite::put(keys::ID_WATERMARK, &worker.id)?,
            ])
            .await?;

        state.workers = workers.clone();
        state.id_watermark = worker.id;
        tracing::info!(worker_id = worker.id, name = %worker.name, "Worker added");
        Ok((worker, workers, revision))
    }

    /// Remove a worker and its note. Unknown ids leave everything untouched.
    pub async fn delete_worker(&self, id: i64) -> Result<(bool, Vec<Worker>, i64), AppError> {
        let mut state = self.state.lock().await;

        if !state.workers.iter().any(|w| w.id == id) {
            let revision = self.revision_id().await;
            return Ok((false, state.workers.clone(), revision));
        }

        let workers: Vec<Worker> = state
            .workers
            .iter()
            .filter(|w| w.id != id)
            .cloned()
            .collect();

        let revision = self
            .repo
            .write_documents(&[
                DocumentWrite::put(keys::WORKERS, &workers)?,
                DocumentWrite::delete(keys::note(id)),
            ])
            .await?;

        state.workers = workers.clone();
        tracing::info!(worker_id = id, "Worker deleted");
        Ok((true, workers, revision))
    }

    // ==================== NOTES ====================

    /// Note of a known worker; empty when none was saved yet.
    pub async fn note(&self, worker_id: i64) -> Result<WorkerNote, AppError> {
        let worker = self.require_worker(worker_id).await?;
        let stored = self
            .repo
            .get_document::<StoredNote>(&keys::note(worker_id))
            .await?
            .unwrap_or_default();

        Ok(WorkerNote {
            worker_id,
            worker_name: worker.name,
            text: stored.text,
            updated_at: stored.updated_at,
        })
    }

    /// Overwrite a worker's note.
    pub async fn save_note(&self, worker_id: i64, text: String) -> Result<(WorkerNote, i64), AppError> {
        // Holding the lock keeps a concurrent delete from orphaning the note.
        let state = self.state.lock().await;
        let worker = state
            .workers
            .iter()
            .find(|w| w.id == worker_id)
            .cloned()
            .ok_or_else(|| worker_not_found(worker_id))?;

        let stored = StoredNote {
            text,
            updated_at: Some(Utc::now().to_rfc3339()),
        };
        let revision = self
            .repo
            .write_documents(&[DocumentWrite::put(keys::note(worker_id), &stored)?])
            .await?;
        drop(state);

        tracing::debug!(worker_id, "Note saved");
        Ok((
            WorkerNote {
                worker_id,
                worker_name: worker.name,
                text: stored.text,
                updated_at: stored.updated_at,
            },
            revision,
        ))
    }

    /// Every worker with its summary line and whether a note exists.
    pub async fn notes_overview(&self) -> Result<Vec<NotesOverviewEntry>, AppError> {
        let workers = self.workers().await;
        let mut entries = Vec::with_capacity(workers.len());
        for worker in workers {
            let has_note = self.repo.has_document(&keys::note(worker.id)).await?;
            entries.push(NotesOverviewEntry {
                worker_id: worker.id,
                summary: worker.summary(),
                name: worker.name,
                has_note,
            });
        }
        Ok(entries)
    }

    async fn require_worker(&self, id: i64) -> Result<Worker, AppError> {
        self.worker(id).await.ok_or_else(|| worker_not_found(id))
    }

    // ==================== INVOICES ====================

    /// Pending invoices, newest first.
    pub async fn invoices(&self) -> Vec<PendingInvoice> {
        let mut invoices = self.state.lock().await.invoices.clone();
        invoices.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        invoices
    }

    pub async fn invoice(&self, id: i64) -> Option<PendingInvoice> {
        let state = self.state.lock().await;
        state.invoices.iter().find(|i| i.id == id).cloned()
    }

    /// Attach local metadata to a freshly created remote invoice and persist it.
    pub async fn record_invoice(
        &self,
        created: CreatedInvoice,
        amount: u64,
        memo: String,
    ) -> Result<(PendingInvoice, i64), AppError> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let invoice = PendingInvoice {
            id,
            bolt11: created.bolt11,
            payment_hash: created.payment_hash,
            memo,
            amount,
            paid: false,
            timestamp: id,
        };

        let mut invoices = state.invoices.clone();
        invoices.push(invoice.clone());

        let revision = self
            .repo
            .write_documents(&[
                DocumentWrite::put(keys::INVOICES, &invoices)?,
                DocumentWrite::put(keys::ID_WATERMARK, &id)?,
            ])
            .await?;

        state.invoices = invoices;
        state.id_watermark = id;
        tracing::info!(invoice_id = id, amount, "Invoice recorded");
        Ok((invoice, revision))
    }

    /// Flip an invoice to paid. Already-paid invoices are left as they are.
    pub async fn mark_invoice_paid(&self, id: i64) -> Result<Option<PendingInvoice>, AppError> {
        let mut state = self.state.lock().await;
        let Some(index) = state.invoices.iter().position(|i| i.id == id) else {
            return Ok(None);
        };

        if state.invoices[index].paid {
            return Ok(Some(state.invoices[index].clone()));
        }

        let mut invoices = state.invoices.clone();
        invoices[index].paid = true;

        self.repo
            .write_documents(&[DocumentWrite::put(keys::INVOICES, &invoices)?])
            .await?;

        let paid = invoices[index].clone();
        state.invoices = invoices;
        tracing::info!(invoice_id = id, "Invoice marked paid");
        Ok(Some(paid))
    }

    /// Remove an unpaid invoice.
    pub async fn delete_invoice(&self, id: i64) -> Result<(PendingInvoice, i64), AppError> {
        let mut state = self.state.lock().await;
        let invoice = state
            .invoices
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Invoice {} not found", id)))?;

        if invoice.paid {
            return Err(AppError::Conflict(
                "Paid invoices cannot be deleted".to_string(),
            ));
        }

        let invoices: Vec<PendingInvoice> = state
            .invoices
            .iter()
            .filter(|i| i.id != id)
            .cloned()
            .collect();

        let revision = self
            .repo
            .write_documents(&[DocumentWrite::put(keys::INVOICES, &invoices)?])
            .await?;

        state.invoices = invoices;
        tracing::info!(invoice_id = id, "Invoice deleted");
        Ok((invoice, revision))
    }
}

fn worker_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Worker {} not found", id))
}

/// Trimmed copy of an optional text field, dropping blank values.
fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
