use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{DomainError, DomainResult};

/// Maximum memo size accepted by ICRC-1 ledgers.
pub const DEFAULT_MEMO_MAX_BYTES: usize = 32;

/// An operator's intent to buy NFTs of a startup on behalf of an investor.
///
/// Fields are private so a request cannot change once it has been validated.
///
/// # Examples
///
/// ```
/// use plantify_admin::domain::PurchaseRequest;
///
/// let request = PurchaseRequest::new("S1", "I1", 2).unwrap();
/// assert_eq!(request.quantity(), 2);
/// assert!(PurchaseRequest::new("S1", "I1", 0).is_err());
/// assert!(PurchaseRequest::new("  ", "I1", 1).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    startup_id: String,
    investor_id: String,
    quantity: u64,
    memo: Option<String>,
}

impl PurchaseRequest {
    pub fn new(startup_id: impl Into<String>, investor_id: impl Into<String>, quantity: u64) -> DomainResult<Self> {
        let startup_id = startup_id.into().trim().to_string();
        let investor_id = investor_id.into().trim().to_string();

        if startup_id.is_empty() {
            return Err(DomainError::MissingStartup);
        }
        if investor_id.is_empty() {
            return Err(DomainError::MissingInvestor);
        }
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity(quantity.to_string()));
        }

        Ok(Self {
            startup_id,
            investor_id,
            quantity,
            memo: None,
        })
    }

    /// Attaches a free-text annotation. Blank memos are dropped.
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        let memo = memo.into();
        self.memo = if memo.trim().is_empty() { None } else { Some(memo) };
        self
    }

    pub fn startup_id(&self) -> &str {
        &self.startup_id
    }

    pub fn investor_id(&self) -> &str {
        &self.investor_id
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn memo(&self) -> Option<&str> {
        self.memo.as_deref()
    }

    /// Ledger memo tagging a transfer with the startup it pays for.
    pub fn transfer_memo(&self, max_bytes: usize) -> DomainResult<Vec<u8>> {
        let memo = self.startup_id.as_bytes().to_vec();
        if memo.len() > max_bytes {
            return Err(DomainError::MemoTooLong {
                len: memo.len(),
                max: max_bytes,
            });
        }
        Ok(memo)
    }
}

/// Unit price of one NFT in the smallest token unit, as asserted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub nft_price: u128,
}

impl PriceQuote {
    pub fn new(nft_price: u128) -> Self {
        Self { nft_price }
    }

    /// Exact total for `quantity` NFTs.
    ///
    /// ```
    /// use plantify_admin::domain::PriceQuote;
    ///
    /// assert_eq!(PriceQuote::new(500).total_for(2).unwrap(), 1000);
    /// assert!(PriceQuote::new(u128::MAX).total_for(2).is_err());
    /// ```
    pub fn total_for(&self, quantity: u64) -> DomainResult<u128> {
        self.nft_price
            .checked_mul(u128::from(quantity))
            .ok_or(DomainError::AmountOverflow {
                unit_price: self.nft_price,
                quantity,
            })
    }
}

/// Payment destination designated by the backend, in its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformAccount(pub String);

impl PlatformAccount {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resolve(&self) -> DomainResult<Account> {
        self.0.parse()
    }
}

impl fmt::Display for PlatformAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A ledger account: an owner principal plus an optional 32-byte subaccount.
///
/// The textual form is `owner` or `owner.<hex subaccount>`.
///
/// ```
/// use plantify_admin::domain::Account;
///
/// let account: Account = "aaaa-bbbb".parse().unwrap();
/// assert_eq!(account.owner(), "aaaa-bbbb");
/// assert!(account.subaccount().is_none());
///
/// let with_sub: Account = "aaaa-bbbb.1f".parse().unwrap();
/// assert_eq!(with_sub.subaccount().unwrap()[31], 0x1f);
/// assert_eq!(with_sub.to_string(), "aaaa-bbbb.1f");
///
/// assert!("Not A Principal".parse::<Account>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    owner: String,
    subaccount: Option<[u8; 32]>,
}

impl Account {
    pub fn new(owner: impl Into<String>, subaccount: Option<[u8; 32]>) -> DomainResult<Self> {
        let owner = owner.into();
        if !is_principal_text(&owner) {
            return Err(DomainError::InvalidAccount(owner));
        }
        Ok(Self { owner, subaccount })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn subaccount(&self) -> Option<&[u8; 32]> {
        self.subaccount.as_ref()
    }
}

impl FromStr for Account {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('.') {
            None => Account::new(s, None),
            Some((owner, hex)) => {
                let subaccount = parse_subaccount(hex).ok_or_else(|| DomainError::InvalidAccount(s.to_string()))?;
                Account::new(owner, Some(subaccount))
            }
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.owner)?;
        if let Some(sub) = self.subaccount.as_ref().filter(|sub| sub.iter().any(|b| *b != 0)) {
            let hex: String = sub.iter().map(|b| format!("{b:02x}")).collect();
            write!(f, ".{}", hex.trim_start_matches('0'))?;
        }
        Ok(())
    }
}

fn is_principal_text(text: &str) -> bool {
    !text.is_empty()
        && text
            .split('-')
            .all(|group| !group.is_empty() && group.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
}

fn parse_subaccount(hex: &str) -> Option<[u8; 32]> {
    if hex.is_empty() || hex.len() > 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let padded = format!("{hex:0>64}");
    let mut bytes = [0u8; 32];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&padded[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(bytes)
}

/// Outcome of the backend's pre-flight purchase check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Ineligible(String),
}

/// Arguments of a single ledger transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferArgs {
    pub to: Account,
    pub amount: u128,
    pub fee: Option<u128>,
    pub memo: Vec<u8>,
    /// Nanoseconds since the Unix epoch; lets the ledger deduplicate resubmissions.
    pub created_at_time: Option<u64>,
}

/// Proof that the ledger committed a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub block_index: u64,
}

/// What the backend issued once it accepted a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseConfirmation {
    pub startup_id: String,
    pub token_ids: Vec<u64>,
    pub investor_id: String,
    pub total_amount: u128,
    pub quantity: u64,
    #[serde(rename = "nftPrice")]
    pub unit_price: u128,
    pub transaction_id: String,
}

/// A paid purchase the backend has not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPurchase {
    pub attempt_id: Uuid,
    pub request: PurchaseRequest,
    pub receipt: TransferReceipt,
    pub total_amount: u128,
    /// Seconds since the Unix epoch.
    pub recorded_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_trims_identifiers() {
        let request = PurchaseRequest::new(" S1 ", "\tI1", 3).unwrap();
        assert_eq!(request.startup_id(), "S1");
        assert_eq!(request.investor_id(), "I1");
        assert!(request.memo().is_none());
    }

    #[test]
    fn test_request_validation_errors() {
        assert_eq!(PurchaseRequest::new("", "I1", 1), Err(DomainError::MissingStartup));
        assert_eq!(PurchaseRequest::new("S1", " ", 1), Err(DomainError::MissingInvestor));
        assert_eq!(
            PurchaseRequest::new("S1", "I1", 0),
            Err(DomainError::InvalidQuantity("0".to_string()))
        );
    }

    #[test]
    fn test_blank_memo_is_dropped() {
        let request = PurchaseRequest::new("S1", "I1", 1).unwrap().with_memo("   ");
        assert!(request.memo().is_none());

        let request = request.with_memo("for the Q3 round");
        assert_eq!(request.memo(), Some("for the Q3 round"));
    }

    #[test]
    fn test_request_wire_format() {
        let request = PurchaseRequest::new("S1", "I1", 2).unwrap().with_memo("note");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["startupId"], "S1");
        assert_eq!(json["investorId"], "I1");
        assert_eq!(json["quantity"], 2);
        assert_eq!(json["memo"], "note");
    }

    #[test]
    fn test_transfer_memo_limit() {
        let request = PurchaseRequest::new("S1", "I1", 1).unwrap();
        assert_eq!(request.transfer_memo(DEFAULT_MEMO_MAX_BYTES).unwrap(), b"S1".to_vec());

        let long = PurchaseRequest::new("x".repeat(33), "I1", 1).unwrap();
        assert_eq!(
            long.transfer_memo(DEFAULT_MEMO_MAX_BYTES),
            Err(DomainError::MemoTooLong { len: 33, max: 32 })
        );
    }

    #[test]
    fn test_total_is_exact_integer_product() {
        let quote = PriceQuote::new(1_000_000_007);
        for quantity in [1u64, 2, 7, 1_000, u64::MAX] {
            assert_eq!(
                quote.total_for(quantity).unwrap(),
                1_000_000_007u128 * u128::from(quantity)
            );
        }
        assert_eq!(PriceQuote::new(0).total_for(9).unwrap(), 0);
    }

    #[test]
    fn test_account_parsing() {
        let account: Account = "oncwy-yqaaa-aaaae-qfzja-cai".parse().unwrap();
        assert_eq!(account.owner(), "oncwy-yqaaa-aaaae-qfzja-cai");
        assert_eq!(account.to_string(), "oncwy-yqaaa-aaaae-qfzja-cai");

        assert!("".parse::<Account>().is_err());
        assert!("aaaa--bbbb".parse::<Account>().is_err());
        assert!("aaaa-".parse::<Account>().is_err());
        assert!("aaaa.".parse::<Account>().is_err());
        assert!("aaaa.zz".parse::<Account>().is_err());
        assert!(format!("aaaa.{}", "1".repeat(65)).parse::<Account>().is_err());
    }

    #[test]
    fn test_account_zero_subaccount_displays_as_owner() {
        let account = Account::new("aaaa", Some([0u8; 32])).unwrap();
        assert_eq!(account.to_string(), "aaaa");
    }

    #[test]
    fn test_platform_account_resolves() {
        let platform = PlatformAccount::new("aaaa-bbbb");
        assert_eq!(platform.resolve().unwrap().owner(), "aaaa-bbbb");
        assert!(PlatformAccount::new("AAAA").resolve().is_err());
    }

    #[test]
    fn test_confirmation_wire_names() {
        let json = r#"{
            "startupId": "S1",
            "tokenIds": [101, 102],
            "investorId": "I1",
            "totalAmount": 1000,
            "quantity": 2,
            "nftPrice": 500,
            "transactionId": "tx-1"
        }"#;
        let confirmation: PurchaseConfirmation = serde_json::from_str(json).unwrap();
        assert_eq!(confirmation.token_ids, vec![101, 102]);
        assert_eq!(confirmation.unit_price, 500);
    }
}
