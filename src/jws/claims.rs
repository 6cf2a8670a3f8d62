//! Claim shapes carried by App Store signed payloads.
//!
//! Only the fields used to tell the shapes apart, and the commonly read ones,
//! are typed. Everything else the server sends is kept in `extra`, so newly
//! added fields survive a decode.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Decoded payload of a signed transaction (`JWSTransaction`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionClaims {
    /// Unique identifier of the transaction.
    pub transaction_id: String,
    /// Transaction identifier of the original purchase.
    #[serde(default)]
    pub original_transaction_id: Option<String>,
    /// Bundle identifier of the app.
    #[serde(default)]
    pub bundle_id: Option<String>,
    /// Product identifier of the in-app purchase.
    #[serde(default)]
    pub product_id: Option<String>,
    /// Purchase time, in milliseconds since the Unix epoch.
    #[serde(default)]
    pub purchase_date: Option<i64>,
    /// Subscription expiry, in milliseconds since the Unix epoch.
    #[serde(default)]
    pub expires_date: Option<i64>,
    /// `Sandbox` or `Production`.
    #[serde(default)]
    pub environment: Option<String>,
    /// Time the payload was signed, in milliseconds since the Unix epoch.
    #[serde(default)]
    pub signed_date: Option<i64>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decoded payload of signed subscription renewal information (`JWSRenewalInfo`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalInfoClaims {
    /// Next renewal time, in milliseconds since the Unix epoch.
    pub renewal_date: i64,
    /// Transaction identifier of the original purchase.
    #[serde(default)]
    pub original_transaction_id: Option<String>,
    /// Product the subscription renews to.
    #[serde(default)]
    pub auto_renew_product_id: Option<String>,
    /// `1` if auto-renew is on, `0` if off.
    #[serde(default)]
    pub auto_renew_status: Option<i32>,
    /// `Sandbox` or `Production`.
    #[serde(default)]
    pub environment: Option<String>,
    /// Time the payload was signed, in milliseconds since the Unix epoch.
    #[serde(default)]
    pub signed_date: Option<i64>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decoded payload of a version 2 server notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationClaims {
    /// Notification type, e.g. `DID_RENEW` or `TEST`.
    pub notification_type: String,
    /// Optional detail for the notification type.
    #[serde(default)]
    pub subtype: Option<String>,
    /// Unique identifier of the notification, stable across retries.
    #[serde(rename = "notificationUUID", default)]
    pub notification_uuid: Option<String>,
    /// Notification version, `2.0`.
    #[serde(default)]
    pub version: Option<String>,
    /// Time the payload was signed, in milliseconds since the Unix epoch.
    #[serde(default)]
    pub signed_date: Option<i64>,
    /// App and transaction data for app-level notifications.
    #[serde(default)]
    pub data: Option<NotificationData>,
    /// Summary for renewal-extension notifications.
    #[serde(default)]
    pub summary: Option<NotificationSummary>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `data` object of a server notification.
///
/// `signed_transaction_info` and `signed_renewal_info` are themselves signed
/// payloads and must be decoded separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Apple ID of the app.
    #[serde(default)]
    pub app_apple_id: Option<i64>,
    /// Bundle identifier of the app.
    #[serde(default)]
    pub bundle_id: Option<String>,
    /// `Sandbox` or `Production`.
    #[serde(default)]
    pub environment: Option<String>,
    /// Signed transaction (`JWSTransaction`).
    #[serde(default)]
    pub signed_transaction_info: Option<String>,
    /// Signed renewal information (`JWSRenewalInfo`).
    #[serde(default)]
    pub signed_renewal_info: Option<String>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `summary` object of a renewal-extension server notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSummary {
    /// Identifier of the renewal-extension request.
    #[serde(default)]
    pub request_identifier: Option<String>,
    /// Product the extension applies to.
    #[serde(default)]
    pub product_id: Option<String>,
    /// Subscriptions that were extended.
    #[serde(default)]
    pub succeeded_count: Option<i64>,
    /// Subscriptions that could not be extended.
    #[serde(default)]
    pub failed_count: Option<i64>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A verified payload whose shape was chosen by [`crate::jws::PayloadDecoder::decode_auto`].
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SignedPayload {
    /// The payload carried a `transactionId`.
    Transaction(Box<TransactionClaims>),
    /// The payload carried a `renewalDate`.
    RenewalInfo(Box<RenewalInfoClaims>),
    /// The payload carried a `notificationType`.
    Notification(Box<NotificationClaims>),
}

/// Payload shapes in the order they are probed.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum Shape {
    Transaction,
    RenewalInfo,
    Notification,
}

impl Shape {
    const PROBE_ORDER: [(&'static str, Self); 3] = [
        ("transactionId", Self::Transaction),
        ("renewalDate", Self::RenewalInfo),
        ("notificationType", Self::Notification),
    ];

    /// Picks a shape from the top-level keys of unverified claims.
    pub(crate) fn sniff(claims: &Map<String, Value>) -> Option<Self> {
        Self::PROBE_ORDER
            .iter()
            .find(|(field, _)| claims.contains_key(*field))
            .map(|(_, shape)| *shape)
    }
}
