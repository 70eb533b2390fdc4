//! Collaborator contracts
//!
//! The scheduling core never speaks the remote API itself. It drives these
//! traits, which an embedding application implements:
//!
//! ```text
//! ┌──────────────┐  authenticate / set_position / fetch   ┌──────────────┐
//! │ WorkerSession├───────────────────────────────────────▶│  MapSession  │
//! │              │                                        └──────────────┘
//! │              │  parse_map (under the shared lock)     ┌──────────────┐
//! │              ├───────────────────────────────────────▶│  MapParser   │
//! └──────────────┘                                        └──────────────┘
//! ┌──────────────┐  spawn_points_in_bbox / _in_hex        ┌──────────────┐
//! │  Overseers   ├───────────────────────────────────────▶│  SpawnStore  │
//! └──────────────┘                                        └──────────────┘
//! ```
//!
//! [`mock`] holds in-process implementations used by `--mock` and tests.

pub mod mock;

use crate::error::{ConfigError, SessionResult};
use crate::geo::{BoundingBox, Location};
use crate::schedule::SpawnPoint;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

pub use mock::{EntityCountParser, MemorySpawnStore, MockSession, MockSessionFactory};

/// Identity provider used to log an account in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProvider {
    Google,
    Ptc,
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthProvider::Google => write!(f, "google"),
            AuthProvider::Ptc => write!(f, "ptc"),
        }
    }
}

impl FromStr for AuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(AuthProvider::Google),
            "ptc" => Ok(AuthProvider::Ptc),
            other => Err(format!("unknown auth provider '{}'", other)),
        }
    }
}

/// Login identity for one worker
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub provider: AuthProvider,
    pub username: String,
    pub password: String,
}

impl SessionCredentials {
    /// Parse `PROVIDER:USERNAME:PASSWORD`; the password may contain ':'
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidAccount {
            value: redact(spec),
            reason: reason.to_string(),
        };

        let mut parts = spec.splitn(3, ':');
        let provider = parts.next().unwrap_or_default();
        let username = parts.next().ok_or_else(|| invalid("missing username"))?;
        let password = parts.next().ok_or_else(|| invalid("missing password"))?;

        if username.is_empty() {
            return Err(invalid("empty username"));
        }

        let provider = provider.parse::<AuthProvider>().map_err(|e| invalid(&e))?;

        Ok(Self {
            provider,
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("provider", &self.provider)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Keep the provider and username of an account spec, hide the password
fn redact(spec: &str) -> String {
    match spec.rsplit_once(':') {
        Some((head, _)) if head.contains(':') => format!("{}:***", head),
        _ => spec.to_string(),
    }
}

/// Opaque payload returned by a map fetch
#[derive(Debug, Clone, PartialEq)]
pub struct MapResponse {
    pub payload: serde_json::Value,
}

impl MapResponse {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload }
    }

    /// An empty response counts as a failed fetch
    pub fn is_empty(&self) -> bool {
        match &self.payload {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }
}

/// One authenticated connection to the remote map API
///
/// A session is owned by exactly one worker; it is `Send` but never shared.
pub trait MapSession: Send {
    /// Tell the remote side where the player is
    fn set_position(&mut self, location: Location);

    /// When the current auth ticket expires, if logged in
    fn ticket_expiry(&self) -> Option<DateTime<Utc>>;

    /// Log in; fails with `SessionError::Auth` when rejected
    fn authenticate(&mut self, credentials: &SessionCredentials, proxy: Option<&str>) -> SessionResult<()>;

    /// Fetch the map objects around `location`
    fn fetch_map_objects(&mut self, location: Location) -> SessionResult<MapResponse>;
}

/// Creates fresh sessions for workers (initially and after every restart)
pub trait SessionFactory: Send + Sync {
    fn create(&self, worker: usize) -> SessionResult<Box<dyn MapSession>>;
}

/// Turns a map response into persisted entities
pub trait MapParser: Send + Sync {
    /// Parse and ingest `response`, returning how many entities were found
    ///
    /// `SessionError::Malformed` marks the scan for a retry.
    fn parse_map(&self, response: &MapResponse, location: Location) -> SessionResult<usize>;
}

/// Query side of the spawn point persistence
pub trait SpawnStore: Send + Sync {
    /// Known spawn locations inside a box
    fn spawn_points_in_bbox(&self, bbox: BoundingBox) -> SessionResult<Vec<(f64, f64)>>;

    /// Known spawn points covered by `ring_count` hex rings around `center`
    fn spawn_points_in_hex(&self, center: Location, ring_count: usize) -> SessionResult<Vec<SpawnPoint>>;
}
