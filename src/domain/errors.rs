use thiserror::Error;

/// Errors raised by purchase data validation, before any remote call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("A startup must be selected")]
    MissingStartup,
    #[error("An investor must be selected")]
    MissingInvestor,
    #[error("Quantity must be a positive whole number, got {0}")]
    InvalidQuantity(String),
    #[error("Invalid ledger account: {0}")]
    InvalidAccount(String),
    #[error("Transfer memo is {len} bytes, the ledger accepts at most {max}")]
    MemoTooLong { len: usize, max: usize },
    #[error("Total amount overflows: {unit_price} x {quantity}")]
    AmountOverflow { unit_price: u128, quantity: u64 },
}

pub type DomainResult<T> = Result<T, DomainError>;

/// Failure of a call to the backend or the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The service answered and refused the request.
    #[error("{0}")]
    Rejected(String),
    /// The request may or may not have reached the service.
    #[error("transport error: {0}")]
    Transport(String),
    /// The service answered with something we could not read.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether the call may have taken effect even though no usable answer came back.
    ///
    /// ```
    /// use plantify_admin::domain::RemoteError;
    ///
    /// assert!(RemoteError::Transport("timed out".into()).is_ambiguous());
    /// assert!(RemoteError::Decode("truncated body".into()).is_ambiguous());
    /// assert!(!RemoteError::Rejected("insufficient funds".into()).is_ambiguous());
    /// ```
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, RemoteError::Transport(_) | RemoteError::Decode(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("receipt journal I/O failed: {0}")]
    Io(String),
    #[error("receipt journal is corrupt: {0}")]
    Corrupt(String),
}
