use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, JobDeadEvent, KeysExhaustedEvent, OrderDeliveredEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_delivered_producer: Vec<EventProducer<OrderDeliveredEvent>>,
    pub keys_exhausted_producer: Vec<EventProducer<KeysExhaustedEvent>>,
    pub job_dead_producer: Vec<EventProducer<JobDeadEvent>>,
}

impl EventProducers {
    pub async fn order_delivered(&self, event: OrderDeliveredEvent) {
        for emitter in &self.order_delivered_producer {
            emitter.publish_event(event.clone()).await;
        }
    }

    pub async fn keys_exhausted(&self, event: KeysExhaustedEvent) {
        for emitter in &self.keys_exhausted_producer {
            emitter.publish_event(event.clone()).await;
        }
    }

    pub async fn job_dead(&self, event: JobDeadEvent) {
        for emitter in &self.job_dead_producer {
            emitter.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_delivered: Option<EventHandler<OrderDeliveredEvent>>,
    pub on_keys_exhausted: Option<EventHandler<KeysExhaustedEvent>>,
    pub on_job_dead: Option<EventHandler<JobDeadEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_delivered = hooks.on_order_delivered.map(|f| EventHandler::new(buffer_size, f));
        let on_keys_exhausted = hooks.on_keys_exhausted.map(|f| EventHandler::new(buffer_size, f));
        let on_job_dead = hooks.on_job_dead.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_delivered, on_keys_exhausted, on_job_dead }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_delivered {
            result.order_delivered_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_keys_exhausted {
            result.keys_exhausted_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_job_dead {
            result.job_dead_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_delivered {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_keys_exhausted {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_job_dead {
            tokio::spawn(handler.start_handler());
        }
    }
}

type BoxedHook = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_delivered: Option<Handler<OrderDeliveredEvent>>,
    pub on_keys_exhausted: Option<Handler<KeysExhaustedEvent>>,
    pub on_job_dead: Option<Handler<JobDeadEvent>>,
}

impl EventHooks {
    pub fn on_order_delivered<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderDeliveredEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_order_delivered = Some(Arc::new(f));
        self
    }

    pub fn on_keys_exhausted<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(KeysExhaustedEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_keys_exhausted = Some(Arc::new(f));
        self
    }

    pub fn on_job_dead<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(JobDeadEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_job_dead = Some(Arc::new(f));
        self
    }
}
