//! Continuous synthetic vehicle generation
//!
//! One controller instance owns the only allowed generation session. The
//! session is an explicit object behind a mutex: two concurrent `start`
//! calls cannot both observe an idle controller, and `stop` works exactly
//! once per session. The tick loop runs on a fixed period; tick side
//! effects run on spawned tasks so a slow log or broadcast never delays the
//! timer. In-flight ticks are bounded by a semaphore and shed (not queued)
//! when the bound is hit, which keeps the cadence observable.

use crate::events::{
    SYSTEM_USER, VEHICLE_AGGREGATE, VEHICLE_GENERATED_EVENT, VEHICLE_GENERATED_MESSAGE,
    VEHICLE_GENERATED_TOPIC,
};
use crate::identity::derive_identity;
use crate::models::GeneratedVehicle;
use crate::store::{StoreError, VehicleStore};
use event_bus::{BusError, EventBus};
use event_store::{Event, EventStore, EventStoreError};
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Tick period of the generation loop
pub const DEFAULT_GENERATION_PERIOD: Duration = Duration::from_millis(50);

/// Upper bound on concurrently in-flight tick side effects
const MAX_IN_FLIGHT_TICKS: usize = 32;

// Synthesis vocabulary and ranges. Configuration constants, not protocol.
const VEHICLE_TYPES: [&str; 5] = ["SUV", "Sedan", "Hatchback", "Truck", "Van"];
const POWER_SOURCES: [&str; 4] = ["Electric", "Gasoline", "Hybrid", "Diesel"];
const HP_RANGE: std::ops::Range<u32> = 100..500;
const YEAR_RANGE: std::ops::Range<u32> = 2015..2025;
const TOP_SPEED_RANGE: std::ops::Range<u32> = 120..300;

/// Domain rejections of the start/stop lifecycle
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Vehicle generation is already in progress")]
    AlreadyRunning,

    #[error("No vehicle generation is currently running")]
    NotRunning,
}

/// Failure of one tick's side effects; fatal to the session
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error(transparent)]
    Log(#[from] EventStoreError),

    #[error(transparent)]
    Broadcast(#[from] BusError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

struct ActiveSession {
    cancel: watch::Sender<bool>,
    epoch: u64,
}

struct SessionSlot {
    active: Option<ActiveSession>,
    next_epoch: u64,
}

struct GeneratorInner {
    slot: Mutex<SessionSlot>,
    store: Arc<dyn VehicleStore>,
    event_store: Arc<dyn EventStore>,
    bus: Arc<dyn EventBus>,
    period: Duration,
}

impl GeneratorInner {
    /// Flip back to idle, but only for the session that asked
    fn clear_session(&self, epoch: u64) {
        let mut slot = self.slot.lock().expect("generation state lock poisoned");
        if slot.active.as_ref().map(|s| s.epoch) == Some(epoch) {
            slot.active = None;
        }
    }
}

/// Owner of the process-wide generation session
#[derive(Clone)]
pub struct GenerationController {
    inner: Arc<GeneratorInner>,
}

impl GenerationController {
    pub fn new(
        store: Arc<dyn VehicleStore>,
        event_store: Arc<dyn EventStore>,
        bus: Arc<dyn EventBus>,
        period: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(GeneratorInner {
                slot: Mutex::new(SessionSlot {
                    active: None,
                    next_epoch: 0,
                }),
                store,
                event_store,
                bus,
                period,
            }),
        }
    }

    /// Start the generation session
    ///
    /// Rejected while a session is already running. The check-and-flip
    /// happens under the slot mutex, so concurrent starts race for one slot.
    pub fn start(&self) -> Result<(), GenerationError> {
        let epoch;
        let cancel_tx;
        let cancel_rx;
        {
            let mut slot = self.inner.slot.lock().expect("generation state lock poisoned");
            if slot.active.is_some() {
                return Err(GenerationError::AlreadyRunning);
            }
            let (tx, rx) = watch::channel(false);
            epoch = slot.next_epoch;
            slot.next_epoch += 1;
            slot.active = Some(ActiveSession {
                cancel: tx.clone(),
                epoch,
            });
            cancel_tx = tx;
            cancel_rx = rx;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(generation_loop(inner, cancel_tx, cancel_rx, epoch));

        tracing::info!(epoch, "vehicle generation started");
        Ok(())
    }

    /// Stop the generation session
    ///
    /// Fires the cancellation signal and returns immediately; in-flight tick
    /// side effects are not awaited. Rejected while idle.
    pub fn stop(&self) -> Result<(), GenerationError> {
        let session = {
            let mut slot = self.inner.slot.lock().expect("generation state lock poisoned");
            slot.active.take().ok_or(GenerationError::NotRunning)?
        };

        // The loop may have already exited on a fatal tick; the signal send
        // is then a no-op
        let _ = session.cancel.send(true);

        tracing::info!(epoch = session.epoch, "vehicle generation stopped");
        Ok(())
    }

    /// True while a session is running
    pub fn is_running(&self) -> bool {
        self.inner
            .slot
            .lock()
            .expect("generation state lock poisoned")
            .active
            .is_some()
    }
}

async fn generation_loop(
    inner: Arc<GeneratorInner>,
    cancel_tx: watch::Sender<bool>,
    mut cancel_rx: watch::Receiver<bool>,
    epoch: u64,
) {
    let mut ticker = interval_at(Instant::now() + inner.period, inner.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let in_flight = Arc::new(Semaphore::new(MAX_IN_FLIGHT_TICKS));

    loop {
        tokio::select! {
            _ = cancel_rx.changed() => break,
            _ = ticker.tick() => {
                let permit = match Arc::clone(&in_flight).try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!(epoch, "in-flight tick limit reached, shedding tick");
                        continue;
                    }
                };

                let vehicle = synthesize_vehicle();
                let inner = Arc::clone(&inner);
                let cancel_tx = cancel_tx.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let result = emit_generated_vehicle(
                        inner.store.as_ref(),
                        inner.event_store.as_ref(),
                        inner.bus.as_ref(),
                        &vehicle,
                    )
                    .await;

                    if let Err(e) = result {
                        tracing::error!(epoch, error = %e, "generation tick failed, stopping session");
                        inner.clear_session(epoch);
                        let _ = cancel_tx.send(true);
                    }
                });
            }
        }
    }

    inner.clear_session(epoch);
    tracing::info!(epoch, "vehicle generation loop ended");
}

/// Synthesize field values by independent uniform choice
fn synthesize_vehicle() -> GeneratedVehicle {
    let mut rng = rand::thread_rng();
    GeneratedVehicle {
        vehicle_type: VEHICLE_TYPES[rng.gen_range(0..VEHICLE_TYPES.len())].to_string(),
        power_source: POWER_SOURCES[rng.gen_range(0..POWER_SOURCES.len())].to_string(),
        hp: rng.gen_range(HP_RANGE),
        year: rng.gen_range(YEAR_RANGE),
        top_speed: rng.gen_range(TOP_SPEED_RANGE),
    }
}

/// Run one tick's side effects for an already-synthesized vehicle
///
/// Order matters: durable append first, broadcast only after the append
/// succeeded, then a best-effort view insert where an existing identity
/// means an identical vehicle was already stored and counts as success.
pub(crate) async fn emit_generated_vehicle(
    store: &dyn VehicleStore,
    event_store: &dyn EventStore,
    bus: &dyn EventBus,
    vehicle: &GeneratedVehicle,
) -> Result<String, TickError> {
    let fields = serde_json::to_value(vehicle)
        .map_err(|e| TickError::Serialization(e.to_string()))?;
    let aggregate_id = derive_identity(&fields);

    let event = Event::new(
        VEHICLE_AGGREGATE,
        &aggregate_id,
        VEHICLE_GENERATED_EVENT,
        1,
        SYSTEM_USER,
        fields.clone(),
    );
    event_store.append(&event, None).await?;

    let notification = serde_json::json!({
        "at": VEHICLE_AGGREGATE,
        "et": VEHICLE_GENERATED_EVENT,
        "aid": aggregate_id,
        "timestamp": event.timestamp,
        "data": fields,
    });
    let payload = serde_json::to_vec(&notification)
        .map_err(|e| TickError::Serialization(e.to_string()))?;
    bus.publish(VEHICLE_GENERATED_TOPIC, VEHICLE_GENERATED_MESSAGE, payload)
        .await?;

    let doc = fields
        .as_object()
        .cloned()
        .ok_or_else(|| TickError::Serialization("vehicle fields are not an object".to_string()))?;
    match store.create(&aggregate_id, &doc, SYSTEM_USER).await {
        Ok(_) => {}
        Err(StoreError::Duplicate(_)) => {
            tracing::debug!(aggregate_id = %aggregate_id, "generated vehicle already stored");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(aggregate_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryVehicleStore;
    use event_bus::InMemoryBus;
    use event_store::InMemoryEventStore;
    use futures::StreamExt;

    fn sample_vehicle() -> GeneratedVehicle {
        GeneratedVehicle {
            vehicle_type: "Truck".to_string(),
            power_source: "Diesel".to_string(),
            hp: 410,
            year: 2022,
            top_speed: 180,
        }
    }

    #[test]
    fn test_synthesize_vehicle_stays_in_vocabulary() {
        for _ in 0..100 {
            let vehicle = synthesize_vehicle();
            assert!(VEHICLE_TYPES.contains(&vehicle.vehicle_type.as_str()));
            assert!(POWER_SOURCES.contains(&vehicle.power_source.as_str()));
            assert!(HP_RANGE.contains(&vehicle.hp));
            assert!(YEAR_RANGE.contains(&vehicle.year));
            assert!(TOP_SPEED_RANGE.contains(&vehicle.top_speed));
        }
    }

    #[tokio::test]
    async fn test_emit_appends_then_broadcasts_then_stores() {
        let store = InMemoryVehicleStore::new();
        let events = InMemoryEventStore::new();
        let bus = InMemoryBus::new();
        let mut subscriber = bus.subscribe(VEHICLE_GENERATED_TOPIC).await.unwrap();

        let aid = emit_generated_vehicle(&store, &events, &bus, &sample_vehicle())
            .await
            .unwrap();

        let logged = events.events();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].aggregate_type, "Vehicle");
        assert_eq!(logged[0].aggregate_id, aid);
        assert_eq!(logged[0].event_type, "Generated");
        assert_eq!(logged[0].user, "SYSTEM");

        let msg = tokio::time::timeout(Duration::from_secs(1), subscriber.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        assert_eq!(msg.message_type, VEHICLE_GENERATED_MESSAGE);
        let notification: serde_json::Value = serde_json::from_slice(&msg.payload).unwrap();
        assert_eq!(notification["at"], "Vehicle");
        assert_eq!(notification["et"], "Generated");
        assert_eq!(notification["aid"], serde_json::json!(aid));

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_identical_vehicles_collapse_to_one_entity() {
        let store = InMemoryVehicleStore::new();
        let events = InMemoryEventStore::new();
        let bus = InMemoryBus::new();
        let vehicle = sample_vehicle();

        let first = emit_generated_vehicle(&store, &events, &bus, &vehicle)
            .await
            .unwrap();
        let second = emit_generated_vehicle(&store, &events, &bus, &vehicle)
            .await
            .unwrap();

        // Same identity, one stored entity, two logged events
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        assert_eq!(events.len(), 2);
    }
}
