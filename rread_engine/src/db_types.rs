//! Data types for orders, products, license keys and queued fulfilment jobs.
//!
//! These are the rows as they are stored by the backend. The `New*` variants are the inputs used to create them.
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::{DateTime, Utc};
pub use rread_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

//--------------------------------------        PaymentId       --------------------------------------------------------
/// The gateway's payment identifier. Gateways send it either as a JSON number or a string, so it is normalised to a
/// string here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<i64> for PaymentId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for PaymentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl FromStr for PaymentId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Self::new(s);
        if id.is_empty() {
            return Err(ConversionError("Empty payment id".into()));
        }
        Ok(id)
    }
}

impl Display for PaymentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//--------------------------------------       OrderStatus      --------------------------------------------------------
/// Order status as stored in the `orders` table.
///
/// The order-creation side stores whatever status the gateway reported when the payment was created, so anything that
/// isn't a well-known label is kept verbatim in `Other`. Only the fulfilment pipeline ever writes `Delivered`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Pending,
    Approved,
    InProcess,
    Rejected,
    Cancelled,
    Delivered,
    Other(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Approved => "approved",
            OrderStatus::InProcess => "in_process",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Other(s) => s.as_str(),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" => OrderStatus::Pending,
            "approved" => OrderStatus::Approved,
            "in_process" => OrderStatus::InProcess,
            "rejected" => OrderStatus::Rejected,
            "cancelled" => OrderStatus::Cancelled,
            "delivered" => OrderStatus::Delivered,
            _ => OrderStatus::Other(value),
        }
    }
}

impl From<OrderStatus> for String {
    fn from(value: OrderStatus) -> Self {
        value.as_str().to_string()
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//--------------------------------------          Order         --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    /// The gateway's payment id, or `<subject>:<payment id>` for orders routed to another ledger. Never changes.
    pub external_reference: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub amount: Money,
    /// The price before any coupon was applied
    pub original_amount: Money,
    #[sqlx(try_from = "String")]
    pub status: OrderStatus,
    pub product_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub coupon_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        NewOrder        --------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub external_reference: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub amount: Money,
    pub original_amount: Money,
    /// The status the gateway reported when the payment was created. Stored verbatim.
    pub status: OrderStatus,
    pub product_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub coupon_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new<R, N, E>(external_reference: R, customer_name: N, customer_email: E, amount: Money) -> Self
    where
        R: Into<String>,
        N: Into<String>,
        E: Into<String>,
    {
        Self {
            external_reference: external_reference.into(),
            customer_name: customer_name.into(),
            customer_email: customer_email.into(),
            customer_phone: None,
            amount,
            original_amount: amount,
            status: OrderStatus::Pending,
            product_id: None,
            vendor_id: None,
            coupon_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_product(mut self, product_id: i64) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn with_phone<S: Into<String>>(mut self, phone: S) -> Self {
        self.customer_phone = Some(phone.into());
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_discount(mut self, original_amount: Money, coupon_id: i64) -> Self {
        self.original_amount = original_amount;
        self.coupon_id = Some(coupon_id);
        self
    }

    pub fn with_vendor(mut self, vendor_id: i64) -> Self {
        self.vendor_id = Some(vendor_id);
        self
    }
}

//--------------------------------------       ProductKind      --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductKind {
    /// Delivered as a download link
    DigitalDownload,
    /// Delivered as a unique serial from the product's key pool, plus the installer link
    KeyedLicense,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::DigitalDownload => "digital-download",
            ProductKind::KeyedLicense => "keyed-license",
        }
    }
}

impl FromStr for ProductKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "digital-download" | "ebook" => Ok(Self::DigitalDownload),
            "keyed-license" | "game" | "app" => Ok(Self::KeyedLicense),
            s => Err(ConversionError(format!("Invalid product kind: {s}"))),
        }
    }
}

impl TryFrom<String> for ProductKind {
    type Error = ConversionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for ProductKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//--------------------------------------         Product        --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Money,
    /// The download link, or the installer link for keyed products
    pub download_url: String,
    #[sqlx(try_from = "String")]
    pub kind: ProductKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub download_url: String,
    pub kind: ProductKind,
}

impl NewProduct {
    pub fn new<N: Into<String>, U: Into<String>>(name: N, price: Money, download_url: U, kind: ProductKind) -> Self {
        Self { name: name.into(), price, download_url: download_url.into(), kind }
    }
}

//--------------------------------------        LicenseKey      --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct LicenseKey {
    pub id: i64,
    pub product_id: i64,
    pub serial: String,
    pub sold: bool,
    pub sold_at: Option<DateTime<Utc>>,
    pub order_id: Option<i64>,
    pub buyer_email: Option<String>,
    /// Persisted for the licensing server. Not interpreted here.
    pub activated: bool,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------         JobStatus      --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for `run_at` to pass
    Queued,
    /// Claimed by a worker. Requeued if the lease runs out.
    Running,
    Done,
    /// Dead-lettered after a permanent error or too many attempts
    Dead,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Dead => write!(f, "dead"),
        }
    }
}

//--------------------------------------      FulfillmentJob    --------------------------------------------------------
/// A queued unit of work. The payload is only the payment id; all order state is re-read on every attempt.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct FulfillmentJob {
    pub id: i64,
    pub payment_id: PaymentId,
    pub status: JobStatus,
    pub attempts: i64,
    pub max_attempts: i64,
    pub run_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FulfillmentJob {
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: i64,
    pub running: i64,
    pub done: i64,
    pub dead: i64,
}
