//! Checkout-to-order reconciliation.
//!
//! Consumes provider webhook events and performs the order-creation, stock
//! decrement, and notification sequence exactly once per payment event.
//! The provider delivers at-least-once; this module is the retry-tolerant
//! receiving end.

use crate::{
    errors::ServiceError,
    services::{
        catalog::CatalogService,
        checkout::{CartItem, CART_METADATA_KEY},
        notifications::NotificationSink,
        orders::{CreateOutcome, NewOrder, OrderAddress, OrderLine, OrderService},
    },
};
use hmac::{Hmac, Mac};
use rust_decimal::{prelude::FromPrimitive, Decimal};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// The only actionable event type; everything else is acknowledged and
/// ignored.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Provider event envelope. Optionality mirrors the wire format: every
/// nested field the reconciler touches is validated here, before any side
/// effect.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

/// The `object` stays raw until the event type is known: only completed
/// checkout sessions have the shape this module cares about.
#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<CustomerAddress>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerAddress {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Terminal states of one reconciliation run. All of these acknowledge the
/// event with a success response; failures that warrant provider redelivery
/// surface as `Err(ServiceError)` instead.
#[derive(Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Order persisted, stock and notifications attempted.
    Completed { order_id: Uuid },
    /// An order for this session already existed; no side effects.
    AlreadyReconciled,
    /// Event type is not actionable; no side effects.
    Ignored,
    /// Cart metadata was unparseable. Logged and acknowledged: redelivery
    /// of a malformed event cannot self-heal.
    DroppedMalformedCart,
}

/// Webhook reconciler with explicitly injected collaborators.
pub struct WebhookReconciler {
    orders: OrderService,
    catalog: CatalogService,
    notifier: Arc<dyn NotificationSink>,
    signing_secret: String,
    tolerance_secs: u64,
}

impl WebhookReconciler {
    pub fn new(
        orders: OrderService,
        catalog: CatalogService,
        notifier: Arc<dyn NotificationSink>,
        signing_secret: String,
        tolerance_secs: u64,
    ) -> Self {
        Self {
            orders,
            catalog,
            notifier,
            signing_secret,
            tolerance_secs,
        }
    }

    /// Runs the full reconciliation sequence for one inbound event.
    ///
    /// Step order is load-bearing: the order row is persisted before any
    /// stock decrement, so a crash mid-sequence can leave stock
    /// uncorrected but never stock decremented without an order.
    #[instrument(skip(self, payload, signature_header))]
    pub async fn process(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<ReconcileOutcome, ServiceError> {
        // Step 1: authenticity. Reject before touching anything else.
        let signature = signature_header
            .ok_or_else(|| ServiceError::InvalidSignature("missing signature header".into()))?;
        verify_signature(
            payload,
            signature,
            &self.signing_secret,
            self.tolerance_secs,
        )?;

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::BadRequest(format!("invalid event payload: {e}")))?;

        // Step 2: only completed checkouts are actionable.
        if event.event_type != CHECKOUT_COMPLETED {
            info!(event_type = %event.event_type, "Ignoring non-actionable webhook event");
            return Ok(ReconcileOutcome::Ignored);
        }

        let session: CheckoutSessionObject = serde_json::from_value(event.data.object)
            .map_err(|e| ServiceError::BadRequest(format!("invalid checkout session object: {e}")))?;
        info!(session_id = %session.id, "Processing completed checkout");

        // Step 3: idempotency guard. Providers redeliver; one order per
        // session, ever.
        if self.orders.find_by_session(&session.id).await?.is_some() {
            info!(session_id = %session.id, "Session already reconciled; acknowledging");
            return Ok(ReconcileOutcome::AlreadyReconciled);
        }

        // Step 4: rebuild the cart from session metadata.
        let cart = match parse_cart_metadata(&session.metadata) {
            Ok(cart) => cart,
            Err(e) => {
                error!(
                    session_id = %session.id,
                    error = %e,
                    "Cart metadata unparseable; dropping event after acknowledgement"
                );
                return Ok(ReconcileOutcome::DroppedMalformedCart);
            }
        };

        // Step 5: persist the order. The event's amount_total is
        // authoritative; line items are snapshots, not recomputation input.
        let new_order = build_order(&session, &cart);
        let order = match self.orders.create_from_checkout(new_order).await? {
            CreateOutcome::Created(order) => order,
            CreateOutcome::AlreadyReconciled(_) => {
                return Ok(ReconcileOutcome::AlreadyReconciled);
            }
        };
        let order_id = order.id;

        // Step 6: decrement stock per line item. Tolerant: a missing or
        // unparseable product never rolls back the committed order.
        for item in &cart {
            match Uuid::parse_str(&item.id) {
                Ok(product_id) => {
                    match self
                        .catalog
                        .decrement_stock(product_id, item.quantity as i32)
                        .await
                    {
                        Ok(0) => warn!(
                            product_id = %item.id,
                            "Product missing during stock decrement; skipped"
                        ),
                        Ok(_) => {}
                        Err(e) => warn!(
                            product_id = %item.id,
                            error = %e,
                            "Stock decrement failed; order remains recorded"
                        ),
                    }
                }
                Err(_) => warn!(
                    product_id = %item.id,
                    "Cart line does not reference a catalog product; skipped"
                ),
            }
        }

        // Step 7: best-effort notifications.
        match self.orders.order_with_items(order).await {
            Ok(view) => {
                if let Err(e) = self.notifier.send_sale_alert(&view).await {
                    warn!(order_id = %order_id, error = %e, "Failed to send sale alert");
                }
                if let Some(email) = view.customer_email.clone() {
                    if let Err(e) = self.notifier.send_receipt(&view, &email).await {
                        warn!(order_id = %order_id, error = %e, "Failed to send customer receipt");
                    }
                }
            }
            Err(e) => warn!(
                order_id = %order_id,
                error = %e,
                "Failed to load order view for notifications"
            ),
        }

        info!(order_id = %order_id, "Checkout reconciled");
        Ok(ReconcileOutcome::Completed { order_id })
    }
}

/// Verifies a `t=<unix>,v1=<hex>` signature header over the raw payload.
///
/// The signed message is `"{t}.{payload}"`, MACed with HMAC-SHA256 under the
/// endpoint secret. The timestamp must be within `tolerance_secs` of now.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: u64,
) -> Result<(), ServiceError> {
    let mut timestamp = "";
    let mut v1 = "";
    for part in header.split(',') {
        let mut it = part.trim().splitn(2, '=');
        match (it.next(), it.next()) {
            (Some("t"), Some(val)) => timestamp = val,
            (Some("v1"), Some(val)) => v1 = val,
            _ => {}
        }
    }

    if timestamp.is_empty() || v1.is_empty() {
        return Err(ServiceError::InvalidSignature(
            "malformed signature header".into(),
        ));
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| ServiceError::InvalidSignature("malformed signature timestamp".into()))?;
    let now = chrono::Utc::now().timestamp();
    if (now - ts).unsigned_abs() > tolerance_secs {
        return Err(ServiceError::InvalidSignature(
            "signature timestamp outside tolerance".into(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ServiceError::InternalError("invalid webhook signing secret".into()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    if constant_time_eq(&expected, v1) {
        Ok(())
    } else {
        Err(ServiceError::InvalidSignature(
            "signature does not match payload".into(),
        ))
    }
}

/// Computes the signature header value for a payload. Used by tooling and
/// tests to produce valid deliveries.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Extracts the serialized cart from session metadata. Missing metadata is
/// an empty cart; present-but-unparseable metadata is an error the caller
/// turns into the acknowledge-and-drop path.
pub fn parse_cart_metadata(
    metadata: &HashMap<String, String>,
) -> Result<Vec<CartItem>, serde_json::Error> {
    match metadata.get(CART_METADATA_KEY) {
        Some(raw) => serde_json::from_str(raw),
        None => Ok(Vec::new()),
    }
}

fn build_order(session: &CheckoutSessionObject, cart: &[CartItem]) -> NewOrder {
    let details = session.customer_details.as_ref();

    let customer_email = details
        .and_then(|d| d.email.clone())
        .or_else(|| session.customer_email.clone());
    let customer_name = details.and_then(|d| d.name.clone());

    let address = details
        .and_then(|d| d.address.as_ref())
        .map(|a| OrderAddress {
            line1: a.line1.clone().unwrap_or_default(),
            line2: a.line2.clone().unwrap_or_default(),
            city: a.city.clone().unwrap_or_default(),
            state: a.state.clone().unwrap_or_default(),
            postal_code: a.postal_code.clone().unwrap_or_default(),
            country: a.country.clone().unwrap_or_default(),
        })
        .unwrap_or_default();

    let items = cart
        .iter()
        .map(|item| OrderLine {
            product_id: item.id.clone(),
            name: item.name.clone(),
            unit_price: decimal_price(item.price),
            quantity: item.quantity as i32,
        })
        .collect();

    NewOrder {
        checkout_session_id: session.id.clone(),
        amount_total: session.amount_total.unwrap_or(0),
        customer_email,
        customer_name,
        address,
        items,
    }
}

fn decimal_price(price: f64) -> Decimal {
    Decimal::from_f64(price).unwrap_or_else(|| {
        warn!(price = price, "Cart price not representable; storing zero");
        Decimal::ZERO
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    #[test]
    fn valid_signature_round_trips() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign_payload(payload, SECRET, now());
        assert!(verify_signature(payload, &header, SECRET, 300).is_ok());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = b"{}";
        let header = sign_payload(payload, "whsec_other", now());
        assert!(matches!(
            verify_signature(payload, &header, SECRET, 300),
            Err(ServiceError::InvalidSignature(_))
        ));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let header = sign_payload(b"original", SECRET, now());
        assert!(verify_signature(b"tampered", &header, SECRET, 300).is_err());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = b"{}";
        let header = sign_payload(payload, SECRET, now() - 10_000);
        assert!(matches!(
            verify_signature(payload, &header, SECRET, 300),
            Err(ServiceError::InvalidSignature(_))
        ));
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(verify_signature(b"{}", "v1=abc", SECRET, 300).is_err());
        assert!(verify_signature(b"{}", "t=123", SECRET, 300).is_err());
        assert!(verify_signature(b"{}", "nonsense", SECRET, 300).is_err());
        assert!(verify_signature(b"{}", "t=notanumber,v1=abc", SECRET, 300).is_err());
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
    }

    #[test]
    fn missing_metadata_means_empty_cart() {
        let metadata = HashMap::new();
        assert!(parse_cart_metadata(&metadata).unwrap().is_empty());
    }

    #[test]
    fn valid_metadata_parses() {
        let mut metadata = HashMap::new();
        metadata.insert(
            CART_METADATA_KEY.to_string(),
            r#"[{"id":"P1","name":"Lavender Oil","price":14.99,"quantity":2}]"#.to_string(),
        );
        let cart = parse_cart_metadata(&metadata).unwrap();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].id, "P1");
        assert_eq!(cart[0].quantity, 2);
    }

    #[test]
    fn malformed_metadata_is_an_error() {
        let mut metadata = HashMap::new();
        metadata.insert(CART_METADATA_KEY.to_string(), "{not json".to_string());
        assert!(parse_cart_metadata(&metadata).is_err());
    }

    #[test]
    fn build_order_defaults_missing_address_fields() {
        let session = CheckoutSessionObject {
            id: "sess_1".into(),
            amount_total: Some(2998),
            customer_email: Some("fallback@example.com".into()),
            customer_details: Some(CustomerDetails {
                email: None,
                name: Some("Jo".into()),
                address: Some(CustomerAddress {
                    line1: Some("1 Main St".into()),
                    ..Default::default()
                }),
            }),
            metadata: HashMap::new(),
        };

        let order = build_order(&session, &[]);
        assert_eq!(order.checkout_session_id, "sess_1");
        assert_eq!(order.amount_total, 2998);
        // Falls back to the session-level email when details carry none
        assert_eq!(order.customer_email.as_deref(), Some("fallback@example.com"));
        assert_eq!(order.customer_name.as_deref(), Some("Jo"));
        assert_eq!(order.address.line1, "1 Main St");
        assert_eq!(order.address.line2, "");
        assert_eq!(order.address.country, "");
    }
}
