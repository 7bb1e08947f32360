//! Payment gateway seam and the Stripe Checkout implementation.

use std::future::Future;
use std::time::Duration;

use hmac::{Hmac, KeyInit, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::config::PaymentsConfig;
use crate::error::IntegrationError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: i64,
}

/// What the gateway needs to open a hosted payment page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub order_id: i64,
    pub user_id: i64,
    pub amount_cents: i64,
    pub currency: String,
    pub customer_email: Option<String>,
    pub line_items: Vec<LineItem>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub id: String,
    pub redirect_url: String,
}

pub trait PaymentGateway: Send + Sync {
    fn create_session(
        &self,
        request: &SessionRequest,
    ) -> impl Future<Output = Result<PaymentSession, IntegrationError>> + Send;
}

/// Stripe Checkout over its form-encoded REST API.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

#[derive(Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(config: &PaymentsConfig) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            secret_key: config.stripe_secret_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn form(request: &SessionRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            ("client_reference_id".to_string(), request.order_id.to_string()),
            ("metadata[order_id]".to_string(), request.order_id.to_string()),
            ("metadata[user_id]".to_string(), request.user_id.to_string()),
        ];
        if let Some(email) = &request.customer_email {
            form.push(("customer_email".to_string(), email.clone()));
        }
        for (i, item) in request.line_items.iter().enumerate() {
            let p = format!("line_items[{i}]");
            form.push((format!("{p}[price_data][currency]"), request.currency.clone()));
            form.push((format!("{p}[price_data][product_data][name]"), item.name.clone()));
            form.push((format!("{p}[price_data][unit_amount]"), item.unit_amount.to_string()));
            form.push((format!("{p}[quantity]"), item.quantity.to_string()));
        }
        form
    }
}

impl PaymentGateway for StripeGateway {
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<PaymentSession, IntegrationError> {
        if self.secret_key.is_empty() {
            return Err(IntegrationError::Payment(
                "payments.stripe_secret_key is not configured".to_string(),
            ));
        }
        let resp = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&Self::form(request))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| status.to_string());
            return Err(IntegrationError::Payment(message));
        }

        let session: StripeSession = resp.json().await?;
        let redirect_url = session.url.ok_or_else(|| {
            IntegrationError::Payment(format!("session {} has no checkout url", session.id))
        })?;
        Ok(PaymentSession {
            id: session.id,
            redirect_url,
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("webhook secret is not configured")]
    MissingSecret,
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("no matching signature")]
    Mismatch,
    #[error("invalid payload: {0}")]
    Payload(String),
}

/// Check a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`) against
/// the raw request body.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), WebhookError> {
    if secret.is_empty() {
        return Err(WebhookError::MissingSecret);
    }
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }
    if now.abs_diff(timestamp) > tolerance_secs.unsigned_abs() {
        return Err(WebhookError::Expired);
    }

    for sig in signatures {
        let Ok(expected) = hex::decode(sig) else {
            continue;
        };
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }
    Err(WebhookError::Mismatch)
}

/// Build a header [`verify_signature`] accepts. Used to sign test payloads.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

/// Outcome reported by the gateway for a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentResult {
    Paid { payment_intent_id: Option<String> },
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub session_id: String,
    pub result: PaymentResult,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: RawSession,
}

#[derive(Deserialize)]
struct RawSession {
    id: String,
    payment_intent: Option<String>,
    payment_status: Option<String>,
}

/// Parse a webhook body. `Ok(None)` for events that do not change an order.
pub fn parse_event(payload: &[u8]) -> Result<Option<PaymentEvent>, WebhookError> {
    let event: RawEvent =
        serde_json::from_slice(payload).map_err(|e| WebhookError::Payload(e.to_string()))?;
    let session = event.data.object;
    let result = match event.kind.as_str() {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            if session.payment_status.as_deref().is_some_and(|s| s != "paid") {
                return Ok(None);
            }
            PaymentResult::Paid {
                payment_intent_id: session.payment_intent,
            }
        }
        "checkout.session.expired" => PaymentResult::Expired,
        _ => return Ok(None),
    };
    Ok(Some(PaymentEvent {
        session_id: session.id,
        result,
    }))
}
