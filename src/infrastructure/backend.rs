use async_trait::async_trait;
use serde::Deserialize;

use super::rpc::{CallResult, NO_ARGS, RpcTransport};
use crate::domain::{
    BackendClient, Eligibility, PlatformAccount, PriceQuote, PurchaseConfirmation, PurchaseRequest, RemoteError,
    RemoteResult,
};

/// Reply of the backend's finalize call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum PurchaseResponse {
    Success(PurchaseConfirmation),
    Error(String),
}

/// Business backend reached over the JSON RPC gateway.
#[derive(Debug, Clone)]
pub struct HttpBackendClient {
    transport: RpcTransport,
}

impl HttpBackendClient {
    pub fn new(transport: RpcTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn check_purchase_eligibility(
        &self,
        startup_id: &str,
        investor_id: &str,
        quantity: u64,
    ) -> RemoteResult<Eligibility> {
        let result: CallResult<bool> = self
            .transport
            .call("checkPurchaseEligibility", &(startup_id, investor_id, quantity))
            .await?;
        Ok(eligibility_from(result))
    }

    async fn platform_account(&self) -> RemoteResult<PlatformAccount> {
        let principal: String = self.transport.call("getPlantifyCanisterPrincipal", &NO_ARGS).await?;
        Ok(PlatformAccount::new(principal))
    }

    async fn nft_price(&self, startup_id: &str) -> RemoteResult<PriceQuote> {
        let result: CallResult<u128> = self.transport.call("getNFTPrice", &(startup_id,)).await?;
        result.into_remote().map(PriceQuote::new)
    }

    async fn finalize_purchase(
        &self,
        request: &PurchaseRequest,
        block_index: u64,
    ) -> RemoteResult<PurchaseConfirmation> {
        let response: PurchaseResponse = self
            .transport
            .call("completeNFTPurchase", &(request, block_index))
            .await?;
        match response {
            PurchaseResponse::Success(confirmation) => Ok(confirmation),
            PurchaseResponse::Error(message) => Err(RemoteError::Rejected(message)),
        }
    }
}

/// The backend answers `ok(false)` for a refused purchase and `err(reason)`
/// for unknown startups or investors; both stop the purchase.
fn eligibility_from(result: CallResult<bool>) -> Eligibility {
    match result {
        CallResult::Ok(true) => Eligibility::Eligible,
        CallResult::Ok(false) => Eligibility::Ineligible("investor is not allowed to purchase NFTs of this startup".to_string()),
        CallResult::Err(reason) => Eligibility::Ineligible(reason),
    }
}
