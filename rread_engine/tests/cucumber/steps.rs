use cucumber::{given, then, when};
use rread_engine::{
    db_types::{Money, NewOrder, NewProduct, OrderStatus, PaymentId, ProductKind},
    DeliveryContent,
    FulfillmentDatabase,
    JobQueue,
    JobQueueApi,
    JobResolution,
    OrderManagement,
};

use crate::cucumber::StoreWorld;

#[given(expr = "a downloadable product {string} costing {int} cents")]
async fn download_product(world: &mut StoreWorld, name: String, price: i64) {
    let sys = world.system_mut();
    let url = format!("https://downloads.example.com/{}.pdf", name.to_lowercase().replace(' ', "-"));
    let product = NewProduct::new(name.clone(), Money::from_cents(price), url, ProductKind::DigitalDownload);
    let product = sys.db.insert_product(product).await.expect("Error creating product");
    sys.products.insert(name, product);
}

#[given(expr = "a licensed product {string} costing {int} cents with {int} keys")]
async fn keyed_product(world: &mut StoreWorld, name: String, price: i64, keys: usize) {
    let sys = world.system_mut();
    let url = "https://downloads.example.com/setup.exe";
    let product = NewProduct::new(name.clone(), Money::from_cents(price), url, ProductKind::KeyedLicense);
    let product = sys.db.insert_product(product).await.expect("Error creating product");
    let serials = (1..=keys).map(|i| format!("KEY-{}-{i:03}", product.id)).collect::<Vec<_>>();
    sys.db.add_license_keys(product.id, &serials).await.expect("Error adding keys");
    sys.products.insert(name, product);
}

#[given(expr = "an order {word} from {string} for {string}")]
async fn new_order(world: &mut StoreWorld, reference: String, email: String, product: String) {
    let sys = world.system_mut();
    let product = sys.product(&product).clone();
    let order = NewOrder::new(reference.clone(), "Cliente", email, product.price).with_product(product.id);
    let order = sys.db.insert_order(order).await.expect("Error inserting order");
    sys.orders.insert(reference, order);
}

#[given(expr = "the gateway reports payment {word} as {word}")]
async fn gateway_status(world: &mut StoreWorld, payment_id: String, status: String) {
    world.system().gateway.set_status(&payment_id, &status);
}

#[when(expr = "the gateway changes payment {word} to {word}")]
async fn gateway_status_change(world: &mut StoreWorld, payment_id: String, status: String) {
    world.system().gateway.set_status(&payment_id, &status);
}

#[when(expr = "a notification for payment {word} arrives")]
async fn notification(world: &mut StoreWorld, payment_id: String) {
    notifications(world, payment_id, 1).await;
}

#[when(expr = "{int} notifications for payment {word} arrive")]
async fn repeated_notifications(world: &mut StoreWorld, count: usize, payment_id: String) {
    notifications(world, payment_id, count).await;
}

async fn notifications(world: &mut StoreWorld, payment_id: String, count: usize) {
    let queue = JobQueueApi::new(world.system().db.clone());
    let payment_id = PaymentId::new(payment_id);
    for _ in 0..count {
        queue.submit_payment(&payment_id).await.expect("Error queueing payment");
    }
}

#[when(expr = "the mail relay fails {int} time(s)")]
async fn mail_failures(world: &mut StoreWorld, count: usize) {
    world.system().notifier.fail_next(count);
}

#[when("the worker drains the queue")]
async fn drain(world: &mut StoreWorld) {
    let sys = world.system_mut();
    let worker = sys.worker();
    // each job has at most 8 attempts, so this bound is never the reason the loop ends
    for _ in 0..100 {
        match worker.run_once().await.expect("Job queue error") {
            Some((_, resolution)) => sys.resolutions.push(resolution),
            None => break,
        }
    }
}

#[when(expr = "{int} license keys are added to {string}")]
async fn restock(world: &mut StoreWorld, count: usize, product: String) {
    let sys = world.system();
    let product = sys.product(&product);
    let serials = (1..=count).map(|i| format!("RESTOCK-{}-{i:03}", product.id)).collect::<Vec<_>>();
    sys.db.add_license_keys(product.id, &serials).await.expect("Error adding keys");
}

#[when("the dead jobs are revived")]
async fn revive(world: &mut StoreWorld) {
    let sys = world.system();
    let queue = JobQueueApi::new(sys.db.clone());
    for job in queue.dead_letters().await.expect("Error fetching dead jobs") {
        queue.revive(job.id).await.expect("Error reviving job");
    }
}

#[then(expr = "order {word} is {word}")]
async fn order_status(world: &mut StoreWorld, reference: String, status: String) {
    let sys = world.system();
    let id = sys.order(&reference).id;
    let order = sys.db.fetch_order(id).await.expect("Error fetching order").expect("Order has gone");
    assert_eq!(order.status, OrderStatus::from(status));
}

#[then(expr = "{int} email(s) was/were sent to {string}")]
async fn emails_sent(world: &mut StoreWorld, count: usize, recipient: String) {
    let sent = world.system().notifier.sent();
    let received = sent.iter().filter(|m| m.recipient == recipient).count();
    assert_eq!(received, count, "Unexpected number of emails for {recipient}");
}

#[then(expr = "{string} received a download link")]
async fn received_link(world: &mut StoreWorld, recipient: String) {
    let sent = world.system().notifier.sent();
    let message = sent.iter().find(|m| m.recipient == recipient).expect("No email was sent");
    assert!(matches!(message.content, DeliveryContent::Download { .. }), "Expected a download link");
}

#[then(expr = "{string} received a license key for {string}")]
async fn received_key(world: &mut StoreWorld, recipient: String, product: String) {
    let sys = world.system();
    let sent = sys.notifier.sent();
    let message = sent.iter().find(|m| m.recipient == recipient).expect("No email was sent");
    let DeliveryContent::LicenseKey { serial, .. } = &message.content else {
        panic!("Expected a license key, got {:?}", message.content);
    };
    let keys = sys.db.fetch_license_keys_for_product(sys.product(&product).id).await.expect("Error fetching keys");
    let key = keys.iter().find(|k| &k.serial == serial).expect("The key does not belong to the product");
    assert!(key.sold);
    assert_eq!(key.buyer_email.as_deref(), Some(recipient.as_str()));
}

#[then(expr = "order {word} holds a license key")]
async fn order_holds_key(world: &mut StoreWorld, reference: String) {
    let sys = world.system();
    let key = sys.db.fetch_license_key_for_order(sys.order(&reference).id).await.expect("Error fetching key");
    assert!(key.is_some(), "Order {reference} has no key");
}

#[then(expr = "{string} has {int} keys left")]
async fn keys_left(world: &mut StoreWorld, product: String, count: i64) {
    let sys = world.system();
    let left = sys.db.count_available_keys(sys.product(&product).id).await.expect("Error counting keys");
    assert_eq!(left, count);
}

#[then(expr = "the dead-letter queue holds {int} job(s)")]
async fn dead_jobs(world: &mut StoreWorld, count: usize) {
    let dead = world.system().db.dead_jobs().await.expect("Error fetching dead jobs");
    assert_eq!(dead.len(), count);
}

#[then(expr = "{int} job(s) was/were rescheduled")]
async fn rescheduled(world: &mut StoreWorld, count: usize) {
    let n = world.system().resolutions.iter().filter(|r| matches!(r, JobResolution::Rescheduled { .. })).count();
    assert_eq!(n, count);
}
