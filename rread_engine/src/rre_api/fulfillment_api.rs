use std::{fmt::Debug, time::Duration};

use log::*;

use crate::{
    db_types::{LicenseKey, Order, OrderStatus, PaymentId, Product, ProductKind},
    events::{EventProducers, KeysExhaustedEvent, OrderDeliveredEvent},
    rre_api::errors::FulfillmentError,
    traits::{
        DeliveryContent,
        DeliveryMessage,
        DeliveryNotifier,
        FulfillmentDatabase,
        GatewayStatus,
        PaymentGateway,
        StoreError,
    },
};

/// How hard to look for an order that isn't visible yet before handing the job back to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for LookupPolicy {
    fn default() -> Self {
        Self { attempts: 3, delay: Duration::from_millis(250) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentOutcome {
    /// The gateway hasn't approved the payment. Its status was recorded on the order, if the order exists.
    NotApproved { status: GatewayStatus },
    /// The order had already been delivered. Nothing was done.
    AlreadyDelivered { order_id: i64 },
    Delivered { order: Order, license_key: Option<LicenseKey> },
}

/// `FulfillmentApi` takes a confirmed payment through to a delivered order.
///
/// Every call re-derives everything from the gateway and the order store, so running it any number of times for the
/// same payment delivers at most once (barring a crash between sending and committing).
pub struct FulfillmentApi<B, G, N> {
    db: B,
    gateway: G,
    notifier: N,
    producers: EventProducers,
    lookup: LookupPolicy,
}

impl<B, G, N> Debug for FulfillmentApi<B, G, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FulfillmentApi")
    }
}

impl<B, G, N> FulfillmentApi<B, G, N> {
    pub fn new(db: B, gateway: G, notifier: N, producers: EventProducers) -> Self {
        Self { db, gateway, notifier, producers, lookup: LookupPolicy::default() }
    }

    pub fn with_lookup_policy(mut self, lookup: LookupPolicy) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, G, N> FulfillmentApi<B, G, N>
where
    B: FulfillmentDatabase,
    G: PaymentGateway,
    N: DeliveryNotifier,
{
    /// Runs the whole pipeline for one payment:
    /// 1. Ask the gateway for the payment's status. Anything but `approved` is copied onto the order and ends here.
    /// 2. Find the order (tolerating a short visibility lag).
    /// 3. Stop if it has already been delivered.
    /// 4. Reserve a license key for keyed products.
    /// 5. Send the delivery message. If that fails, this attempt gives up its hold on the key, which goes back to the
    ///    pool unless a concurrent attempt for the same order still holds it.
    /// 6. Mark the order as delivered.
    pub async fn process_payment(&self, payment_id: &PaymentId) -> Result<FulfillmentOutcome, FulfillmentError> {
        let payment = self.gateway.fetch_payment(payment_id).await?;
        if !payment.status.is_approved() {
            info!("🔄️ Payment {payment_id} is {}. Nothing to fulfil yet.", payment.status);
            self.record_interim_status(payment_id, &payment.status).await?;
            return Ok(FulfillmentOutcome::NotApproved { status: payment.status });
        }
        debug!("🔄️ Payment {payment_id} is approved");
        let order = self.find_order(payment_id).await?;
        if order.status.is_delivered() {
            info!("🔄️ Order #{} for payment {payment_id} was already delivered. Skipping.", order.id);
            return Ok(FulfillmentOutcome::AlreadyDelivered { order_id: order.id });
        }
        let product = self.product_for(&order).await?;
        let license_key = match product.kind {
            ProductKind::KeyedLicense => Some(self.reserve_key(&order, &product).await?),
            ProductKind::DigitalDownload => None,
        };
        let message = delivery_message(&order, &product, license_key.as_ref());
        if let Err(e) = self.notifier.deliver(&message).await {
            warn!("🔄️ Delivery of order #{} failed: {e}", order.id);
            if let Some(key) = &license_key {
                self.release_key(&order, key).await;
            }
            return Err(FulfillmentError::Delivery { order_id: order.id, source: e });
        }
        let key_id = license_key.as_ref().map(|k| k.id);
        match self.db.mark_order_delivered(order.id, key_id).await? {
            Some(order) => {
                info!("🔄️ Order #{} ({}) delivered to {}", order.id, product.name, order.customer_email);
                self.producers.order_delivered(OrderDeliveredEvent::new(order.clone(), license_key.clone())).await;
                Ok(FulfillmentOutcome::Delivered { order, license_key })
            },
            None => {
                warn!("🔄️ Order #{} was delivered by a concurrent job while this one was sending.", order.id);
                Ok(FulfillmentOutcome::AlreadyDelivered { order_id: order.id })
            },
        }
    }

    /// Looks the order up, retrying in-process a bounded number of times. If it still isn't visible, the error is
    /// retryable and the queue redelivers the job later.
    pub async fn find_order(&self, payment_id: &PaymentId) -> Result<Order, FulfillmentError> {
        let attempts = self.lookup.attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(order) = self.db.fetch_order_by_payment_id(payment_id).await? {
                return Ok(order);
            }
            if attempt < attempts {
                trace!("🔄️ Order for payment {payment_id} not visible (lookup {attempt}/{attempts}). Retrying.");
                tokio::time::sleep(self.lookup.delay).await;
            }
        }
        warn!("🔄️ No order for payment {payment_id} after {attempts} lookups. Handing the job back to the queue.");
        Err(FulfillmentError::OrderNotVisible { payment_id: payment_id.clone(), attempts })
    }

    /// Copies a non-approved gateway status onto the order. An order that isn't visible yet is left for a later
    /// notification; there is nothing to retry.
    async fn record_interim_status(&self, payment_id: &PaymentId, status: &GatewayStatus) -> Result<(), StoreError> {
        let Some(order) = self.db.fetch_order_by_payment_id(payment_id).await? else {
            debug!("🔄️ No order for payment {payment_id} yet. Status {status} not recorded.");
            return Ok(());
        };
        let status = OrderStatus::from(status.to_string());
        if order.status.is_delivered() || order.status == status {
            return Ok(());
        }
        self.db.update_order_status(order.id, &status).await?;
        Ok(())
    }

    async fn product_for(&self, order: &Order) -> Result<Product, FulfillmentError> {
        let product_id = order.product_id.ok_or_else(|| {
            error!("🔄️ Order #{} is approved but has no product. This needs manual attention.", order.id);
            FulfillmentError::NoProductLinked { order_id: order.id }
        })?;
        self.db.fetch_product(product_id).await?.ok_or_else(|| {
            error!("🔄️ Order #{} refers to missing product {product_id}. This needs manual attention.", order.id);
            FulfillmentError::ProductNotFound { order_id: order.id, product_id }
        })
    }

    async fn reserve_key(&self, order: &Order, product: &Product) -> Result<LicenseKey, FulfillmentError> {
        match self.db.reserve_license_key(order, product.id).await {
            Ok(key) => Ok(key),
            Err(StoreError::KeysExhausted(product_id)) => {
                error!(
                    "🔑️ OUT OF STOCK: no license keys left for product {product_id} ({}). Order #{} is waiting for a \
                     restock.",
                    product.name, order.id
                );
                self.producers.keys_exhausted(KeysExhaustedEvent::new(order.clone(), product_id)).await;
                Err(FulfillmentError::KeysExhausted { order_id: order.id, product_id })
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn release_key(&self, order: &Order, key: &LicenseKey) {
        match self.db.release_license_key(order.id, key.id).await {
            Ok(true) => info!("🔑️ Key #{} returned to the pool after failed delivery of order #{}", key.id, order.id),
            Ok(false) => {
                info!("🔑️ Key #{} stays with order #{}. Another attempt still holds it.", key.id, order.id)
            },
            Err(e) => error!(
                "🔑️ Could not release key #{} for order #{}: {e}. It stays reserved and will be reused on retry.",
                key.id, order.id
            ),
        }
    }
}

fn delivery_message(order: &Order, product: &Product, key: Option<&LicenseKey>) -> DeliveryMessage {
    let content = match key {
        Some(key) => {
            DeliveryContent::LicenseKey { serial: key.serial.clone(), installer_url: product.download_url.clone() }
        },
        None => DeliveryContent::Download { url: product.download_url.clone() },
    };
    DeliveryMessage {
        order_id: order.id,
        recipient: order.customer_email.clone(),
        customer_name: order.customer_name.clone(),
        product_name: product.name.clone(),
        amount: order.amount,
        content,
    }
}
