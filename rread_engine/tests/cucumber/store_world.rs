use std::{collections::HashMap, time::Duration};

use cucumber::World;
use log::*;
use rread_engine::{
    db_types::{Order, Product},
    BackoffPolicy,
    FulfillmentDatabase,
    FulfillmentWorker,
    JobResolution,
    LookupPolicy,
    SqliteDatabase,
    WorkerConfig,
};

use crate::support::{
    fakes::{FakeGateway, RecordingNotifier},
    prepare_env::prepare_test_env,
};

#[derive(Default, Debug, World)]
pub struct StoreWorld {
    pub system: Option<StoreSystem>,
}

#[derive(Debug)]
pub struct StoreSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub gateway: FakeGateway,
    pub notifier: RecordingNotifier,
    pub products: HashMap<String, Product>,
    pub orders: HashMap<String, Order>,
    pub resolutions: Vec<JobResolution>,
}

impl StoreWorld {
    pub fn system(&self) -> &StoreSystem {
        self.system.as_ref().expect("Store not initialised")
    }

    pub fn system_mut(&mut self) -> &mut StoreSystem {
        self.system.as_mut().expect("Store not initialised")
    }
}

impl StoreSystem {
    pub async fn new() -> Self {
        let db = prepare_test_env().await;
        let db_path = db.url().to_string();
        debug!("Created database: {db_path}");
        Self {
            db_path,
            db,
            gateway: FakeGateway::default(),
            notifier: RecordingNotifier::default(),
            products: HashMap::new(),
            orders: HashMap::new(),
            resolutions: Vec::new(),
        }
    }

    pub fn product(&self, name: &str) -> &Product {
        self.products.get(name).unwrap_or_else(|| panic!("Product {name} does not exist"))
    }

    pub fn order(&self, reference: &str) -> &Order {
        self.orders.get(reference).unwrap_or_else(|| panic!("Order {reference} does not exist"))
    }

    /// A worker with no back-off, so rescheduled jobs are immediately claimable again.
    pub fn worker(&self) -> FulfillmentWorker<SqliteDatabase, FakeGateway, RecordingNotifier> {
        let config = WorkerConfig {
            poll_interval: Duration::from_millis(10),
            lease: Duration::from_secs(300),
            backoff: BackoffPolicy { base_delay: Duration::ZERO, max_delay: Duration::ZERO },
            lookup: LookupPolicy { attempts: 2, delay: Duration::from_millis(1) },
        };
        FulfillmentWorker::new(
            "cucumber",
            self.db.clone(),
            self.gateway.clone(),
            self.notifier.clone(),
            Default::default(),
            config,
        )
    }
}
