//! Shared test harness: service + dispatcher on in-memory backends

use event_bus::InMemoryBus;
use event_store::InMemoryEventStore;
use std::sync::Arc;
use std::time::Duration;
use vehicles_rs::dispatcher::{Dispatcher, Invoker, RequestEnvelope};
use vehicles_rs::store::InMemoryVehicleStore;
use vehicles_rs::VehicleService;

pub const SERVICE_KEY: &str = "vehicles";

pub struct TestHarness {
    pub store: Arc<InMemoryVehicleStore>,
    pub events: Arc<InMemoryEventStore>,
    pub bus: Arc<InMemoryBus>,
    pub service: Arc<VehicleService>,
    pub dispatcher: Dispatcher,
}

pub fn harness() -> TestHarness {
    harness_with_period(Duration::from_millis(10))
}

pub fn harness_with_period(generation_period: Duration) -> TestHarness {
    let store = Arc::new(InMemoryVehicleStore::new());
    let events = Arc::new(InMemoryEventStore::new());
    let bus = Arc::new(InMemoryBus::new());
    let service = Arc::new(VehicleService::new(
        store.clone(),
        events.clone(),
        bus.clone(),
        SERVICE_KEY.to_string(),
        generation_period,
    ));
    let dispatcher = Dispatcher::new(service.clone());

    TestHarness {
        store,
        events,
        bus,
        service,
        dispatcher,
    }
}

pub fn envelope(operation: &str, args: serde_json::Value, roles: &[&str]) -> RequestEnvelope {
    RequestEnvelope {
        operation_name: operation.to_string(),
        args,
        invoker: Invoker {
            username: "tester".to_string(),
            roles: roles.iter().map(|role| role.to_string()).collect(),
        },
    }
}
