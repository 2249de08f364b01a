use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::rpc::RpcTransport;
use crate::domain::{Account, LedgerClient, RemoteError, RemoteResult, TransferArgs};

/// ICRC-1 transfer argument as sent on the wire.
#[derive(Debug, Serialize)]
struct TransferArg<'a> {
    to: &'a Account,
    amount: u128,
    fee: Option<u128>,
    memo: Option<&'a [u8]>,
    created_at_time: Option<u64>,
}

impl<'a> From<&'a TransferArgs> for TransferArg<'a> {
    fn from(args: &'a TransferArgs) -> Self {
        Self {
            to: &args.to,
            amount: args.amount,
            fee: args.fee,
            memo: (!args.memo.is_empty()).then_some(args.memo.as_slice()),
            created_at_time: args.created_at_time,
        }
    }
}

/// ICRC-1 transfer rejections.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Error)]
pub enum TransferError {
    #[error("bad fee, the ledger expects {expected_fee}")]
    BadFee { expected_fee: u128 },
    #[error("bad burn, the minimum is {min_burn_amount}")]
    BadBurn { min_burn_amount: u128 },
    #[error("insufficient funds (balance {balance})")]
    InsufficientFunds { balance: u128 },
    #[error("transaction too old")]
    TooOld,
    #[error("transaction created in the future (ledger time {ledger_time})")]
    CreatedInFuture { ledger_time: u64 },
    #[error("duplicate of block {duplicate_of}")]
    Duplicate { duplicate_of: u64 },
    #[error("ledger temporarily unavailable")]
    TemporarilyUnavailable,
    #[error("ledger error {error_code}: {message}")]
    GenericError { error_code: u128, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum TransferResult {
    Ok(u64),
    Err(TransferError),
}

/// ICRC-1 token ledger reached over the JSON RPC gateway.
#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    transport: RpcTransport,
}

impl HttpLedgerClient {
    pub fn new(transport: RpcTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn balance(&self, account: &Account) -> RemoteResult<u128> {
        self.transport.call("icrc1_balance_of", &(account,)).await
    }

    async fn transfer(&self, args: TransferArgs) -> RemoteResult<u64> {
        let result: TransferResult = self
            .transport
            .call("icrc1_transfer", &(TransferArg::from(&args),))
            .await?;
        block_index_from(result)
    }
}

/// A `Duplicate` rejection means the ledger already committed this exact
/// transfer, so its block index is the receipt.
fn block_index_from(result: TransferResult) -> RemoteResult<u64> {
    match result {
        TransferResult::Ok(block_index) => Ok(block_index),
        TransferResult::Err(TransferError::Duplicate { duplicate_of }) => {
            info!(block_index = duplicate_of, "ledger reported a duplicate transfer, reusing its block");
            Ok(duplicate_of)
        }
        TransferResult::Err(err) => Err(RemoteError::Rejected(err.to_string())),
    }
}
