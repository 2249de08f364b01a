//! Purchase saga coordinator.
//!
//! Buying NFTs spans two independent services: the business backend, which
//! prices and issues the NFTs, and the token ledger, which moves the funds.
//! There is no shared transaction between them, so the coordinator sequences
//! the purchase itself:
//!
//! 1. `GettingInfo` - eligibility, platform account and unit price are
//!    fetched concurrently; any failure stops the purchase before money moves.
//! 2. `Transferring` - exactly one ledger transfer of `unit price x quantity`
//!    to the platform account.
//! 3. `Completing` - the block index returned by the ledger is handed to the
//!    backend, which issues the NFTs.
//!
//! Every failure ends in the `Error` phase with a [`SagaError`]; no entry point
//! returns an error to its caller. Once a transfer receipt exists it is never
//! dropped silently: retrying resumes at `Completing` with the same block index
//! and the receipt is journaled through a [`ReceiptStore`] until the backend
//! confirms it.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{
    Account, BackendClient, DomainError, Eligibility, LedgerClient, PendingPurchase, PlatformAccount, PriceQuote,
    PurchaseConfirmation, PurchaseRequest, ReceiptStore, RemoteError, TransferArgs, TransferReceipt,
    DEFAULT_MEMO_MAX_BYTES,
};

/// Phase of a purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaPhase {
    Idle,
    GettingInfo,
    Transferring,
    Completing,
    Success,
    Error,
}

impl SagaPhase {
    /// Whether an attempt is currently running in this phase.
    pub fn is_in_flight(self) -> bool {
        matches!(self, SagaPhase::GettingInfo | SagaPhase::Transferring | SagaPhase::Completing)
    }

    pub fn label(self) -> &'static str {
        match self {
            SagaPhase::Idle => "Idle",
            SagaPhase::GettingInfo => "Getting purchase info",
            SagaPhase::Transferring => "Transferring tokens",
            SagaPhase::Completing => "Completing purchase",
            SagaPhase::Success => "Success",
            SagaPhase::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaError {
    #[error("Invalid purchase: {0}")]
    Invalid(DomainError),
    #[error("Purchase not permitted: {0}")]
    Ineligible(String),
    #[error("Failed to load purchase details: {0}")]
    Lookup(RemoteError),
    #[error("Cannot prepare transfer: {0}")]
    Quote(DomainError),
    #[error("Insufficient balance: {available} available, {required} required")]
    InsufficientBalance { available: u128, required: u128 },
    #[error("Transfer failed: {0}")]
    Transfer(RemoteError),
    #[error("Payment recorded at block {block_index} but the purchase was not completed: {source}")]
    Finalize { block_index: u64, source: RemoteError },
    #[error("A purchase is already in progress ({})", .0.label())]
    InFlight(SagaPhase),
    #[error("Payment at block {block_index} has not been finalized")]
    Unreconciled { block_index: u64 },
}

impl SagaError {
    /// Phase the attempt was in when this error occurred.
    pub fn failed_phase(&self) -> SagaPhase {
        match self {
            SagaError::Invalid(_) => SagaPhase::Idle,
            SagaError::Ineligible(_)
            | SagaError::Lookup(_)
            | SagaError::Quote(_)
            | SagaError::InsufficientBalance { .. } => SagaPhase::GettingInfo,
            SagaError::Transfer(_) => SagaPhase::Transferring,
            SagaError::Finalize { .. } | SagaError::Unreconciled { .. } => SagaPhase::Completing,
            SagaError::InFlight(phase) => *phase,
        }
    }

    /// Block index of a payment that already left the payer's account.
    pub fn block_index(&self) -> Option<u64> {
        match self {
            SagaError::Finalize { block_index, .. } | SagaError::Unreconciled { block_index } => Some(*block_index),
            _ => None,
        }
    }
}

/// Transient state of the current purchase attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SagaState {
    pub attempt_id: Uuid,
    pub phase: SagaPhase,
    pub platform_account: Option<PlatformAccount>,
    pub price_quote: Option<PriceQuote>,
    pub total_amount: Option<u128>,
    pub transfer_receipt: Option<TransferReceipt>,
    pub confirmation: Option<PurchaseConfirmation>,
    pub error: Option<SagaError>,
}

impl Default for SagaState {
    fn default() -> Self {
        Self {
            attempt_id: Uuid::nil(),
            phase: SagaPhase::Idle,
            platform_account: None,
            price_quote: None,
            total_amount: None,
            transfer_receipt: None,
            confirmation: None,
            error: None,
        }
    }
}

impl SagaState {
    fn new_attempt() -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            ..Self::default()
        }
    }

    /// Block index of a payment the backend has not yet confirmed.
    pub fn unfinalized_block_index(&self) -> Option<u64> {
        match (self.phase, self.transfer_receipt) {
            (SagaPhase::Success, _) | (_, None) => None,
            (_, Some(receipt)) => Some(receipt.block_index),
        }
    }
}

/// Tunables of the purchase flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaOptions {
    pub memo_max_bytes: usize,
    /// Fee passed to the ledger; `None` lets the ledger apply its default.
    pub transfer_fee: Option<u128>,
    /// When set, the payer's balance is checked before any transfer is submitted.
    pub payer: Option<Account>,
}

impl Default for SagaOptions {
    fn default() -> Self {
        Self {
            memo_max_bytes: DEFAULT_MEMO_MAX_BYTES,
            transfer_fee: None,
            payer: None,
        }
    }
}

/// Drives one NFT purchase at a time against a backend and a ledger.
///
/// Entry points take `&mut self`, so a coordinator can only ever run one
/// attempt; calls made while an attempt is in flight, or while a payment is
/// still unfinalized, are refused and leave the state untouched.
pub struct PurchaseSaga {
    backend: Arc<dyn BackendClient>,
    ledger: Arc<dyn LedgerClient>,
    store: Option<Box<dyn ReceiptStore>>,
    options: SagaOptions,
    request: Option<PurchaseRequest>,
    /// Arguments of the last submitted transfer, kept so an unknown outcome is resent unchanged.
    last_transfer: Option<TransferArgs>,
    state: SagaState,
    progress: watch::Sender<SagaState>,
}

impl PurchaseSaga {
    pub fn new(backend: Arc<dyn BackendClient>, ledger: Arc<dyn LedgerClient>) -> Self {
        let (progress, _) = watch::channel(SagaState::default());
        Self {
            backend,
            ledger,
            store: None,
            options: SagaOptions::default(),
            request: None,
            last_transfer: None,
            state: SagaState::default(),
            progress,
        }
    }

    pub fn with_options(mut self, options: SagaOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_store(mut self, store: impl ReceiptStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn state(&self) -> &SagaState {
        &self.state
    }

    pub fn request(&self) -> Option<&PurchaseRequest> {
        self.request.as_ref()
    }

    /// Receives a snapshot of the state at every phase boundary.
    pub fn subscribe(&self) -> watch::Receiver<SagaState> {
        self.progress.subscribe()
    }

    /// Payments journaled by the store that still await finalization.
    pub fn pending_receipts(&self) -> Vec<PendingPurchase> {
        self.store.as_ref().map(|store| store.pending()).unwrap_or_default()
    }

    /// Starts a new purchase attempt and runs it to `Success` or `Error`.
    pub async fn purchase(&mut self, request: PurchaseRequest) -> &SagaState {
        if let Some(refusal) = self.refusal() {
            warn!(attempt = %self.state.attempt_id, reason = %refusal, "purchase refused");
            return &self.state;
        }

        self.begin_attempt(request);
        self.run_attempt().await;
        &self.state
    }

    /// Recovers from the `Error` phase.
    ///
    /// A payment that was already made is never repeated: if the failed
    /// attempt holds a transfer receipt, only the finalize step is retried,
    /// with the same block index. A transfer whose outcome is unknown is resent
    /// with its original arguments, without a new quote. Otherwise the whole
    /// purchase starts over.
    pub async fn retry(&mut self) -> &SagaState {
        if self.state.phase != SagaPhase::Error {
            warn!(phase = ?self.state.phase, "retry ignored outside the error phase");
            return &self.state;
        }
        let Some(request) = self.request.clone() else {
            warn!("retry ignored, no purchase to retry");
            return &self.state;
        };

        if let Some(receipt) = self.state.transfer_receipt {
            info!(
                attempt = %self.state.attempt_id,
                block_index = receipt.block_index,
                "retrying purchase completion"
            );
            self.state.error = None;
            if let Err(err) = self.complete(&request, receipt).await {
                self.fail(err);
            }
            return &self.state;
        }

        // The transfer may have been committed. Resending identical arguments lets the
        // ledger report it as a duplicate instead of charging the payer again.
        let resend = match &self.state.error {
            Some(SagaError::Transfer(err)) if err.is_ambiguous() => self.last_transfer.clone(),
            _ => None,
        };
        if let Some(args) = resend {
            info!(
                attempt = %self.state.attempt_id,
                created_at_time = ?args.created_at_time,
                "resending transfer with unknown outcome"
            );
            self.state.error = None;
            if let Err(err) = self.resend(&request, args).await {
                self.fail(err);
            }
            return &self.state;
        }

        self.begin_attempt(request);
        self.run_attempt().await;
        &self.state
    }

    /// Finalizes a journaled payment, typically one left over from a previous session.
    pub async fn resume(&mut self, pending: PendingPurchase) -> &SagaState {
        if let Some(refusal) = self.refusal() {
            warn!(attempt = %self.state.attempt_id, reason = %refusal, "resume refused");
            return &self.state;
        }

        info!(
            attempt = %pending.attempt_id,
            block_index = pending.receipt.block_index,
            "resuming journaled purchase"
        );
        self.request = Some(pending.request.clone());
        self.last_transfer = None;
        self.state = SagaState {
            attempt_id: pending.attempt_id,
            total_amount: Some(pending.total_amount),
            transfer_receipt: Some(pending.receipt),
            ..SagaState::default()
        };
        if let Err(err) = self.complete(&pending.request, pending.receipt).await {
            self.fail(err);
        }
        &self.state
    }

    /// Returns to `Idle`.
    ///
    /// Dropping an unfinalized payment requires `confirm_unfinalized`; its
    /// journal entry is kept either way so it can still be reconciled.
    pub fn discard(&mut self, confirm_unfinalized: bool) -> Result<(), SagaError> {
        if self.state.phase.is_in_flight() {
            return Err(SagaError::InFlight(self.state.phase));
        }
        if let Some(block_index) = self.state.unfinalized_block_index() {
            if !confirm_unfinalized {
                return Err(SagaError::Unreconciled { block_index });
            }
            warn!(
                attempt = %self.state.attempt_id,
                block_index,
                "discarding unfinalized payment, journal entry kept"
            );
        }

        self.request = None;
        self.last_transfer = None;
        self.state = SagaState::default();
        self.publish();
        Ok(())
    }

    fn refusal(&self) -> Option<SagaError> {
        if self.state.phase.is_in_flight() {
            return Some(SagaError::InFlight(self.state.phase));
        }
        self.state
            .unfinalized_block_index()
            .map(|block_index| SagaError::Unreconciled { block_index })
    }

    fn begin_attempt(&mut self, request: PurchaseRequest) {
        self.request = Some(request);
        self.last_transfer = None;
        self.state = SagaState::new_attempt();
    }

    async fn run_attempt(&mut self) {
        let Some(request) = self.request.clone() else {
            return;
        };
        if let Err(err) = self.execute(&request).await {
            self.fail(err);
        }
    }

    async fn execute(&mut self, request: &PurchaseRequest) -> Result<(), SagaError> {
        let memo = request
            .transfer_memo(self.options.memo_max_bytes)
            .map_err(SagaError::Invalid)?;

        let (destination, total) = self.gather_info(request).await?;
        let receipt = self.transfer(request, destination, total, memo).await?;
        self.complete(request, receipt).await
    }

    async fn gather_info(&mut self, request: &PurchaseRequest) -> Result<(Account, u128), SagaError> {
        self.enter(SagaPhase::GettingInfo);

        let backend = &self.backend;
        let ledger = &self.ledger;
        let payer = self.options.payer.as_ref();

        let eligibility = async {
            match backend
                .check_purchase_eligibility(request.startup_id(), request.investor_id(), request.quantity())
                .await
            {
                Ok(Eligibility::Eligible) => Ok(()),
                Ok(Eligibility::Ineligible(reason)) => Err(SagaError::Ineligible(reason)),
                Err(err) => Err(SagaError::Lookup(err)),
            }
        };
        let platform_account = async { backend.platform_account().await.map_err(SagaError::Lookup) };
        let price = async { backend.nft_price(request.startup_id()).await.map_err(SagaError::Lookup) };
        let balance = async {
            match payer {
                Some(account) => ledger.balance(account).await.map(Some).map_err(SagaError::Lookup),
                None => Ok(None),
            }
        };

        let ((), platform_account, quote, balance) = tokio::try_join!(eligibility, platform_account, price, balance)?;

        self.state.platform_account = Some(platform_account.clone());
        self.state.price_quote = Some(quote);

        let destination = platform_account.resolve().map_err(SagaError::Quote)?;
        let total = quote.total_for(request.quantity()).map_err(SagaError::Quote)?;
        self.state.total_amount = Some(total);

        if let Some(available) = balance {
            let required = total.saturating_add(self.options.transfer_fee.unwrap_or(0));
            if available < required {
                return Err(SagaError::InsufficientBalance { available, required });
            }
        }

        info!(
            attempt = %self.state.attempt_id,
            startup = request.startup_id(),
            unit_price = quote.nft_price,
            total,
            destination = %destination,
            "purchase info gathered"
        );
        Ok((destination, total))
    }

    async fn transfer(
        &mut self,
        request: &PurchaseRequest,
        destination: Account,
        total: u128,
        memo: Vec<u8>,
    ) -> Result<TransferReceipt, SagaError> {
        let args = TransferArgs {
            to: destination,
            amount: total,
            fee: self.options.transfer_fee,
            memo,
            created_at_time: Some(unix_time().as_nanos() as u64),
        };
        self.submit_transfer(request, args).await
    }

    async fn submit_transfer(
        &mut self,
        request: &PurchaseRequest,
        args: TransferArgs,
    ) -> Result<TransferReceipt, SagaError> {
        self.enter(SagaPhase::Transferring);
        self.last_transfer = Some(args.clone());

        let total = args.amount;
        let block_index = self.ledger.transfer(args).await.map_err(SagaError::Transfer)?;

        let receipt = TransferReceipt { block_index };
        self.state.transfer_receipt = Some(receipt);
        info!(attempt = %self.state.attempt_id, block_index, amount = total, "transfer committed");
        self.journal(request, receipt, total);
        Ok(receipt)
    }

    /// Retries an ambiguous transfer with its original arguments, then finalizes.
    async fn resend(&mut self, request: &PurchaseRequest, args: TransferArgs) -> Result<(), SagaError> {
        let receipt = self.submit_transfer(request, args).await?;
        self.complete(request, receipt).await
    }

    async fn complete(&mut self, request: &PurchaseRequest, receipt: TransferReceipt) -> Result<(), SagaError> {
        self.enter(SagaPhase::Completing);

        let confirmation = self
            .backend
            .finalize_purchase(request, receipt.block_index)
            .await
            .map_err(|source| SagaError::Finalize {
                block_index: receipt.block_index,
                source,
            })?;

        if let Some(quote) = self.state.price_quote {
            if quote.nft_price != confirmation.unit_price {
                warn!(
                    attempt = %self.state.attempt_id,
                    quoted = quote.nft_price,
                    confirmed = confirmation.unit_price,
                    "unit price changed between quote and finalization"
                );
            }
        }

        self.settle();
        info!(
            attempt = %self.state.attempt_id,
            transaction = %confirmation.transaction_id,
            tokens = ?confirmation.token_ids,
            "purchase completed"
        );
        self.state.confirmation = Some(confirmation);
        self.enter(SagaPhase::Success);
        Ok(())
    }

    fn journal(&mut self, request: &PurchaseRequest, receipt: TransferReceipt, total_amount: u128) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let pending = PendingPurchase {
            attempt_id: self.state.attempt_id,
            request: request.clone(),
            receipt,
            total_amount,
            recorded_at: unix_time().as_secs(),
        };
        if let Err(err) = store.record(&pending) {
            error!(
                attempt = %pending.attempt_id,
                block_index = receipt.block_index,
                error = %err,
                "failed to journal transfer receipt"
            );
        }
    }

    fn settle(&mut self) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        if let Err(err) = store.settle(self.state.attempt_id) {
            error!(attempt = %self.state.attempt_id, error = %err, "failed to settle journaled receipt");
        }
    }

    fn enter(&mut self, phase: SagaPhase) {
        self.state.phase = phase;
        info!(attempt = %self.state.attempt_id, phase = phase.label(), "purchase phase");
        self.publish();
    }

    fn fail(&mut self, err: SagaError) {
        match err.block_index() {
            Some(block_index) => error!(
                attempt = %self.state.attempt_id,
                block_index,
                error = %err,
                "purchase failed after payment, manual reconciliation may be needed"
            ),
            None => warn!(
                attempt = %self.state.attempt_id,
                phase = err.failed_phase().label(),
                error = %err,
                "purchase failed"
            ),
        }
        self.state.error = Some(err);
        self.state.phase = SagaPhase::Error;
        self.publish();
    }

    fn publish(&self) {
        self.progress.send_replace(self.state.clone());
    }
}

fn unix_time() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}
