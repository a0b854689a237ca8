use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
}

/// `{userId, planId}` correlation carried through the hosted checkout and
/// echoed back on retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub user_id: String,
    pub plan_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionRequest {
    pub line_item_name: String,
    /// Exact price in minor units (cents); the gateway owns display formatting.
    pub unit_amount_minor: i64,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: SessionMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub session_id: String,
    pub redirect_url: String,
    pub payment_status: PaymentStatus,
    pub metadata: SessionMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
}

/// External payment processor boundary. The hosted card UI and the actual
/// charging happen on the other side; this crate only opens sessions and reads
/// their state back.
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_session(&self, req: CheckoutSessionRequest) -> Result<CheckoutSession>;
    async fn retrieve_session(&self, session_id: &str) -> Result<Option<CheckoutSession>>;
    /// Used only to acknowledge webhook deliveries, never for entitlement
    /// decisions.
    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<Option<PaymentIntent>>;
}

pub struct HttpCheckoutGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: Option<String>,
}

impl HttpCheckoutGateway {
    pub fn new(base_url: impl Into<String>, secret_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            secret_key,
        }
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.secret_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

#[async_trait]
impl CheckoutGateway for HttpCheckoutGateway {
    async fn create_session(&self, req: CheckoutSessionRequest) -> Result<CheckoutSession> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);
        let response = self
            .authorized(self.client.post(&url).json(&req))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<Option<CheckoutSession>> {
        let url = format!("{}/v1/checkout/sessions/{}", self.base_url, session_id);
        let response = self.authorized(self.client.get(&url)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        Ok(Some(response.json().await?))
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<Option<PaymentIntent>> {
        let url = format!("{}/v1/payment_intents/{}", self.base_url, intent_id);
        let response = self.authorized(self.client.get(&url)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        Ok(Some(response.json().await?))
    }
}
