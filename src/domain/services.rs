//! Contracts of the remote services a purchase depends on.
//!
//! The business backend and the token ledger are independent services with no
//! shared transaction context. Both are reached through these traits so the
//! purchase coordinator can be driven against real RPC clients or in-memory
//! fakes alike.

use async_trait::async_trait;
use uuid::Uuid;

use super::errors::{RemoteResult, StoreError};
use super::models::{
    Account, Eligibility, PendingPurchase, PlatformAccount, PriceQuote, PurchaseConfirmation, PurchaseRequest,
    TransferArgs,
};

/// Business backend operations used by the purchase flow.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Read-only pre-flight check that the purchase is currently permitted.
    async fn check_purchase_eligibility(
        &self,
        startup_id: &str,
        investor_id: &str,
        quantity: u64,
    ) -> RemoteResult<Eligibility>;

    /// Account that receives payment for NFT purchases.
    async fn platform_account(&self) -> RemoteResult<PlatformAccount>;

    /// Current unit price of one NFT of `startup_id`.
    async fn nft_price(&self, startup_id: &str) -> RemoteResult<PriceQuote>;

    /// Issues the NFTs once the backend has verified the payment at `block_index`.
    async fn finalize_purchase(&self, request: &PurchaseRequest, block_index: u64)
    -> RemoteResult<PurchaseConfirmation>;
}

/// Token ledger operations used by the purchase flow.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn balance(&self, account: &Account) -> RemoteResult<u128>;

    /// Submits a transfer and returns the block index the ledger assigned to it.
    async fn transfer(&self, args: TransferArgs) -> RemoteResult<u64>;
}

/// Durable record of payments that still await finalization.
pub trait ReceiptStore: Send + Sync {
    fn record(&mut self, pending: &PendingPurchase) -> Result<(), StoreError>;

    fn settle(&mut self, attempt_id: Uuid) -> Result<(), StoreError>;

    fn pending(&self) -> Vec<PendingPurchase>;
}
