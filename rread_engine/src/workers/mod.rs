mod fulfillment_worker;

pub use fulfillment_worker::{BackoffPolicy, FulfillmentWorker, JobResolution, WorkerConfig};
