//! In-process collaborators
//!
//! `MockSession` stands in for the remote API (it fabricates map responses
//! with a random number of entities), `EntityCountParser` ingests them by
//! counting, and `MemorySpawnStore` answers spawn point queries from a list
//! loaded from a schedule file.

use super::{MapParser, MapResponse, MapSession, SessionCredentials, SessionFactory, SpawnStore};
use crate::clock::Clock;
use crate::error::{ScheduleResult, SessionError, SessionResult};
use crate::geo::{BoundingBox, Location};
use crate::schedule::{load_schedule, SpawnPoint};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Lifetime of a mock auth ticket
const MOCK_TICKET_SECS: i64 = 30 * 60;

/// Grid step used to size the hex area of a spawn query (km)
const HEX_STEP_KM: f64 = 0.07;

/// Fake remote session
#[derive(Debug)]
pub struct MockSession {
    clock: Arc<dyn Clock>,
    position: Option<Location>,
    ticket_expiry: Option<DateTime<Utc>>,
    failure_rate: f64,
    max_entities: usize,
}

impl MockSession {
    pub fn new(clock: Arc<dyn Clock>, failure_rate: f64, max_entities: usize) -> Self {
        Self {
            clock,
            position: None,
            ticket_expiry: None,
            failure_rate,
            max_entities,
        }
    }

    /// Last position reported via `set_position`
    pub fn position(&self) -> Option<Location> {
        self.position
    }
}

impl MapSession for MockSession {
    fn set_position(&mut self, location: Location) {
        self.position = Some(location);
    }

    fn ticket_expiry(&self) -> Option<DateTime<Utc>> {
        self.ticket_expiry
    }

    fn authenticate(&mut self, credentials: &SessionCredentials, proxy: Option<&str>) -> SessionResult<()> {
        debug!(
            username = %credentials.username,
            provider = %credentials.provider,
            proxy = proxy.unwrap_or("none"),
            "Mock login"
        );
        self.ticket_expiry = Some(self.clock.now() + chrono::Duration::seconds(MOCK_TICKET_SECS));
        Ok(())
    }

    fn fetch_map_objects(&mut self, location: Location) -> SessionResult<MapResponse> {
        let mut rng = rand::thread_rng();
        if rng.gen::<f64>() < self.failure_rate {
            return Err(SessionError::Fetch {
                reason: "mock transport failure".into(),
            });
        }

        let count = rng.gen_range(0..=self.max_entities);
        let entities: Vec<_> = (0..count)
            .map(|i| {
                json!({
                    "id": i,
                    "lat": location.lat + rng.gen_range(-0.0005..0.0005),
                    "lng": location.lng + rng.gen_range(-0.0005..0.0005),
                })
            })
            .collect();

        Ok(MapResponse::new(json!({
            "timestamp_ms": self.clock.now().timestamp_millis(),
            "entities": entities,
        })))
    }
}

/// Builds a `MockSession` for every worker (re)start
#[derive(Debug, Clone)]
pub struct MockSessionFactory {
    clock: Arc<dyn Clock>,
    failure_rate: f64,
    max_entities: usize,
}

impl MockSessionFactory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            failure_rate: 0.05,
            max_entities: 5,
        }
    }

    /// Probability that a fetch fails in transport
    pub fn failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate;
        self
    }

    /// Upper bound on fabricated entities per response
    pub fn max_entities(mut self, max: usize) -> Self {
        self.max_entities = max;
        self
    }
}

impl SessionFactory for MockSessionFactory {
    fn create(&self, _worker: usize) -> SessionResult<Box<dyn MapSession>> {
        Ok(Box::new(MockSession::new(
            Arc::clone(&self.clock),
            self.failure_rate,
            self.max_entities,
        )))
    }
}

/// Counts the `entities` array of each response
#[derive(Debug, Default)]
pub struct EntityCountParser {
    ingested: AtomicU64,
}

impl EntityCountParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total entities seen across all parses
    pub fn ingested(&self) -> u64 {
        self.ingested.load(Ordering::Relaxed)
    }
}

impl MapParser for EntityCountParser {
    fn parse_map(&self, response: &MapResponse, _location: Location) -> SessionResult<usize> {
        let entities = response
            .payload
            .get("entities")
            .and_then(|e| e.as_array())
            .ok_or_else(|| SessionError::Malformed {
                reason: "response has no entities array".into(),
            })?;

        self.ingested.fetch_add(entities.len() as u64, Ordering::Relaxed);
        Ok(entities.len())
    }
}

/// Spawn point store held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySpawnStore {
    spawns: Vec<SpawnPoint>,
}

impl MemorySpawnStore {
    pub fn new(spawns: Vec<SpawnPoint>) -> Self {
        Self { spawns }
    }

    /// Load the store from a schedule-format file
    pub fn from_file(path: &Path) -> ScheduleResult<Self> {
        Ok(Self::new(load_schedule(path)?))
    }

    pub fn len(&self) -> usize {
        self.spawns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spawns.is_empty()
    }
}

/// Radius of the area covered by `ring_count` hex rings (km)
fn hex_radius_km(ring_count: usize) -> f64 {
    HEX_STEP_KM * (1.0 + 3f64.sqrt() * ring_count.saturating_sub(1) as f64)
}

impl SpawnStore for MemorySpawnStore {
    fn spawn_points_in_bbox(&self, bbox: BoundingBox) -> SessionResult<Vec<(f64, f64)>> {
        Ok(self
            .spawns
            .iter()
            .filter(|sp| bbox.contains(sp.lat, sp.lng))
            .map(|sp| (sp.lat, sp.lng))
            .collect())
    }

    fn spawn_points_in_hex(&self, center: Location, ring_count: usize) -> SessionResult<Vec<SpawnPoint>> {
        let radius_m = hex_radius_km(ring_count) * 1000.0;
        Ok(self
            .spawns
            .iter()
            .filter(|sp| center.distance_to(&sp.location(0.0)) <= radius_m)
            .map(|sp| SpawnPoint::new(sp.lat, sp.lng, sp.time))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::AuthProvider;
    use chrono::TimeZone;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()))
    }

    #[test]
    fn test_mock_session_login_sets_ticket() {
        let clock = clock();
        let mut session = MockSession::new(clock.clone(), 0.0, 3);
        assert!(session.ticket_expiry().is_none());

        let creds = SessionCredentials {
            provider: AuthProvider::Ptc,
            username: "ash".into(),
            password: "pw".into(),
        };
        session.authenticate(&creds, None).unwrap();

        let expiry = session.ticket_expiry().unwrap();
        assert_eq!((expiry - clock.now()).num_seconds(), MOCK_TICKET_SECS);
    }

    #[test]
    fn test_mock_session_response_parses() {
        let mut session = MockSession::new(clock(), 0.0, 4);
        let location = Location::new(1.0, 2.0, 0.0);
        session.set_position(location);
        assert_eq!(session.position(), Some(location));

        let parser = EntityCountParser::new();
        let response = session.fetch_map_objects(location).unwrap();
        let found = parser.parse_map(&response, location).unwrap();
        assert!(found <= 4);
        assert_eq!(parser.ingested(), found as u64);
    }

    #[test]
    fn test_mock_session_always_failing() {
        let mut session = MockSession::new(clock(), 1.0, 4);
        let result = session.fetch_map_objects(Location::new(0.0, 0.0, 0.0));
        assert!(matches!(result, Err(SessionError::Fetch { .. })));
    }

    #[test]
    fn test_parser_rejects_missing_entities() {
        let parser = EntityCountParser::new();
        let response = MapResponse::new(json!({"cells": []}));
        let err = parser.parse_map(&response, Location::new(0.0, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, SessionError::Malformed { .. }));
    }

    #[test]
    fn test_memory_store_queries() {
        let store = MemorySpawnStore::new(vec![
            SpawnPoint::new(0.0, 0.0, 10.0),
            SpawnPoint::new(0.0005, 0.0, 20.0),
            SpawnPoint::new(1.0, 1.0, 30.0),
        ]);

        let center = Location::new(0.0, 0.0, 0.0);
        let bbox = BoundingBox::around(center, 0.5);
        assert_eq!(store.spawn_points_in_bbox(bbox).unwrap().len(), 2);

        let hex = store.spawn_points_in_hex(center, 2).unwrap();
        assert_eq!(hex.len(), 2);
        assert!(hex.iter().all(|sp| sp.worker.is_none()));
    }
}
