//! Event stream for auditing and replay
//!
//! Every significant state change in a session produces an event. Events
//! enable:
//! - Auditing (verify conservation across commits)
//! - Debugging (understand what an arbitration round decided and why)
//! - Analysis (extract contention and burn patterns)
//!
//! Events carry a monotone wall-clock timestamp and a stable string type
//! code; consumers treat unknown codes as ignorable.

use crate::models::resource::ResourceType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

/// How many events the replay buffer retains unless overridden.
pub const DEFAULT_EVENT_CAPACITY: usize = 4_096;

/// A state change observed by the session.
///
/// All variants carry `timestamp_ms` (milliseconds since the Unix epoch,
/// monotone within one session) for temporal ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// An agent submitted a resource request into the embargo queue.
    ResourceRequest {
        timestamp_ms: u64,
        request_id: String,
        agent_id: String,
        burn_mc: i64,
    },

    /// A resource is over-subscribed: aggregate ideal demand exceeds
    /// capacity.
    ContentionDetected {
        timestamp_ms: u64,
        resource: ResourceType,
        competitors: Vec<String>,
        available: u64,
        total_demand: u64,
    },

    /// An arbitration solve finished (successfully or not).
    ArbitrationComplete {
        timestamp_ms: u64,
        mechanism: String,
        solver: String,
        agent_ids: Vec<String>,
        allocations: BTreeMap<String, BTreeMap<ResourceType, u64>>,
        burns_mc: BTreeMap<String, i64>,
        objective: f64,
        elapsed_ms: u64,
        success: bool,
        failure: Option<String>,
    },

    /// A result passed the transaction manager's checks and was applied.
    AllocationEnforced {
        timestamp_ms: u64,
        agent_ids: Vec<String>,
        total_units: BTreeMap<ResourceType, u64>,
        total_burned_mc: i64,
    },

    /// An agent returned held units to the pool.
    ResourceRelease {
        timestamp_ms: u64,
        agent_id: String,
        resource: ResourceType,
        quantity: u64,
        earnings_mc: i64,
    },

    /// Currency entered the economy.
    CurrencyMinted {
        timestamp_ms: u64,
        agent_id: String,
        amount_mc: i64,
    },

    /// Currency left the economy.
    CurrencyBurned {
        timestamp_ms: u64,
        agent_id: String,
        amount_mc: i64,
    },

    /// The emergence monitor produced an advisory for an agent.
    EmergenceAdvisory {
        timestamp_ms: u64,
        agent_id: String,
        risk: String,
        intervention: String,
        details: serde_json::Value,
    },

    /// An arbitration round completed.
    SimulationTick {
        timestamp_ms: u64,
        round: u64,
    },
}

impl Event {
    /// Event timestamp (ms since Unix epoch).
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            Event::ResourceRequest { timestamp_ms, .. }
            | Event::ContentionDetected { timestamp_ms, .. }
            | Event::ArbitrationComplete { timestamp_ms, .. }
            | Event::AllocationEnforced { timestamp_ms, .. }
            | Event::ResourceRelease { timestamp_ms, .. }
            | Event::CurrencyMinted { timestamp_ms, .. }
            | Event::CurrencyBurned { timestamp_ms, .. }
            | Event::EmergenceAdvisory { timestamp_ms, .. }
            | Event::SimulationTick { timestamp_ms, .. } => *timestamp_ms,
        }
    }

    /// Stable type code for sink consumers.
    pub fn type_code(&self) -> &'static str {
        match self {
            Event::ResourceRequest { .. } => "resource_request",
            Event::ContentionDetected { .. } => "contention_detected",
            Event::ArbitrationComplete { .. } => "arbitration_complete",
            Event::AllocationEnforced { .. } => "allocation_enforced",
            Event::ResourceRelease { .. } => "resource_release",
            Event::CurrencyMinted { .. } => "currency_minted",
            Event::CurrencyBurned { .. } => "currency_burned",
            Event::EmergenceAdvisory { .. } => "emergence_advisory",
            Event::SimulationTick { .. } => "simulation_tick",
        }
    }
}

/// Consumer of the session's event stream.
///
/// Implementers may forward to channels, log files, or in-memory buffers.
/// Emission order within a session is the order of the operations that
/// produced the events.
pub trait EventSink {
    fn emit(&mut self, event: &Event);
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &Event) {}
}

/// Monotone wall-clock source.
///
/// Wall clocks can step backwards (NTP); event timestamps must not, so
/// the clock clamps to the last value it handed out.
#[derive(Debug, Clone, Default)]
pub struct EventClock {
    last_ms: u64,
}

impl EventClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time in ms, never earlier than a previously returned value.
    pub fn now_ms(&mut self) -> u64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last_ms = wall.max(self.last_ms);
        self.last_ms
    }
}

/// Capped in-memory event log with per-type counts.
///
/// The replay buffer is a ring: it keeps the most recent `capacity`
/// events and evicts the oldest once full. The per-type counts are
/// cumulative since creation, so statistics survive eviction even when
/// the buffered window does not.
///
/// # Example
/// ```
/// use arbitration_core::{Event, EventLog};
///
/// let mut log = EventLog::with_capacity(2);
/// for round in 0..3 {
///     log.log(Event::SimulationTick { timestamp_ms: round, round });
/// }
/// // Only the two most recent events are buffered...
/// assert_eq!(log.len(), 2);
/// assert_eq!(log.events()[0].timestamp_ms(), 1);
/// // ...but the counts remember everything logged.
/// assert_eq!(log.count_of("simulation_tick"), 3);
/// ```
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<Event>,
    counts: BTreeMap<&'static str, u64>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventLog {
    /// Log retaining [`DEFAULT_EVENT_CAPACITY`] events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log retaining at most `capacity` events.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_CAPACITY)),
            counts: BTreeMap::new(),
            capacity,
        }
    }

    /// Append an event, evicting the oldest buffered event when full.
    pub fn log(&mut self, event: Event) {
        *self.counts.entry(event.type_code()).or_insert(0) += 1;
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// The buffered events, oldest first.
    pub fn events(&self) -> &VecDeque<Event> {
        &self.events
    }

    /// Maximum number of buffered events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// How many events of the given type code have been logged since
    /// creation (eviction does not decrement this).
    pub fn count_of(&self, type_code: &str) -> u64 {
        self.counts.get(type_code).copied().unwrap_or(0)
    }

    /// Drop all buffered events and reset the counts.
    pub fn clear(&mut self) {
        self.events.clear();
        self.counts.clear();
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: &Event) {
        self.log(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotone() {
        let mut clock = EventClock::new();
        let mut last = 0;
        for _ in 0..100 {
            let now = clock.now_ms();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_type_codes_are_stable() {
        let event = Event::ContentionDetected {
            timestamp_ms: 0,
            resource: ResourceType::Compute,
            competitors: vec!["a".to_string(), "b".to_string()],
            available: 10,
            total_demand: 25,
        };
        assert_eq!(event.type_code(), "contention_detected");
        assert_eq!(event.timestamp_ms(), 0);
    }

    #[test]
    fn test_log_counts_by_type() {
        let mut log = EventLog::new();
        log.log(Event::SimulationTick {
            timestamp_ms: 1,
            round: 0,
        });
        log.log(Event::SimulationTick {
            timestamp_ms: 2,
            round: 1,
        });
        assert_eq!(log.count_of("simulation_tick"), 2);
        assert_eq!(log.count_of("currency_minted"), 0);
    }

    #[test]
    fn test_full_buffer_evicts_oldest() {
        let mut log = EventLog::with_capacity(3);
        for round in 0..10u64 {
            log.log(Event::SimulationTick {
                timestamp_ms: round,
                round,
            });
        }
        assert_eq!(log.len(), 3);
        // The window holds the newest events in order.
        let rounds: Vec<u64> = log
            .events()
            .iter()
            .map(|e| match e {
                Event::SimulationTick { round, .. } => *round,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(rounds, vec![7, 8, 9]);
        // Cumulative counts are untouched by eviction.
        assert_eq!(log.count_of("simulation_tick"), 10);
    }

    #[test]
    #[should_panic(expected = "capacity must be positive")]
    fn test_zero_capacity_panics() {
        EventLog::with_capacity(0);
    }

    #[test]
    fn test_event_serde_round_trip() {
        let event = Event::CurrencyBurned {
            timestamp_ms: 7,
            agent_id: "a1".to_string(),
            amount_mc: 2_500,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
