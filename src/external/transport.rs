//! Liveness and chat seam used by match supervisors.

use crate::models::PlayerId;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

/// The liveness or chat service could not answer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transport unavailable: {}", self.0)
    }
}

impl std::error::Error for TransportError {}

pub trait Transport: Send + Sync {
    fn is_present(&self, participant: PlayerId, venue: &str) -> Result<bool, TransportError>;

    fn notify(&self, participant: PlayerId, message: &str);

    fn broadcast(&self, venue: &str, message: &str);

    /// Whether either side has declared a battle against the other.
    fn battle_declared(&self, _a: PlayerId, _b: PlayerId) -> Result<bool, TransportError> {
        Ok(false)
    }
}

/// A message handed to the transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Sent {
    Notify(PlayerId, String),
    Broadcast(String, String),
}

/// Messages kept by `MemoryTransport`; older ones are dropped first.
pub const SENT_HISTORY_LIMIT: usize = 1024;

#[derive(Debug, Default)]
struct MemoryState {
    present: HashSet<PlayerId>,
    declared: HashSet<(PlayerId, PlayerId)>,
    unavailable: bool,
    sent: VecDeque<Sent>,
}

impl MemoryState {
    fn record(&mut self, message: Sent) {
        if self.sent.len() >= SENT_HISTORY_LIMIT {
            self.sent.pop_front();
        }
        self.sent.push_back(message);
    }
}

/// In-process transport: presence and battle declarations are pushed in by the host,
/// outgoing messages are logged and the most recent ones kept.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn set_present(&self, participant: PlayerId, present: bool) {
        self.with_state(|s| {
            if present {
                s.present.insert(participant);
            } else {
                s.present.remove(&participant);
            }
        });
    }

    pub fn declare_battle(&self, a: PlayerId, b: PlayerId) {
        self.with_state(|s| {
            s.declared.insert((a, b));
        });
    }

    /// Make presence and declaration checks fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.with_state(|s| s.unavailable = unavailable);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.with_state(|s| s.sent.iter().cloned().collect())
    }

    pub fn notifications_for(&self, participant: PlayerId) -> Vec<String> {
        self.with_state(|s| {
            s.sent
                .iter()
                .filter_map(|m| match m {
                    Sent::Notify(p, text) if *p == participant => Some(text.clone()),
                    _ => None,
                })
                .collect()
        })
    }
}

impl Transport for MemoryTransport {
    fn is_present(&self, participant: PlayerId, _venue: &str) -> Result<bool, TransportError> {
        self.with_state(|s| {
            if s.unavailable {
                Err(TransportError("presence check failed".into()))
            } else {
                Ok(s.present.contains(&participant))
            }
        })
    }

    fn notify(&self, participant: PlayerId, message: &str) {
        log::debug!("notify {}: {}", participant, message);
        self.with_state(|s| s.record(Sent::Notify(participant, message.to_string())));
    }

    fn broadcast(&self, venue: &str, message: &str) {
        log::debug!("broadcast {}: {}", venue, message);
        self.with_state(|s| s.record(Sent::Broadcast(venue.to_string(), message.to_string())));
    }

    fn battle_declared(&self, a: PlayerId, b: PlayerId) -> Result<bool, TransportError> {
        self.with_state(|s| {
            if s.unavailable {
                Err(TransportError("battle lookup failed".into()))
            } else {
                Ok(s.declared.contains(&(a, b)) || s.declared.contains(&(b, a)))
            }
        })
    }
}
