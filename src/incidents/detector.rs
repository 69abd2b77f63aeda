//! Status transition detection between consecutive snapshots.

use crate::types::{Incident, IncidentId, Status, Viewer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An observed status change of one incident.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// The incident as of the snapshot that revealed the change.
    pub incident: Incident,
    pub old_status: Status,
    pub new_status: Status,
}

impl TransitionEvent {
    /// Whether `viewer` asked to be notified about this incident's category.
    pub fn is_relevant_to(&self, viewer: &Viewer) -> bool {
        viewer.wants_notifications_for(self.incident.category)
    }
}

/// Remembers the last status seen for every incident in this process.
///
/// The first sighting of an incident only records a baseline. Every later
/// change, in any direction, yields exactly one event.
#[derive(Debug, Default)]
pub struct StatusTransitionDetector {
    last_seen: HashMap<IncidentId, Status>,
}

impl StatusTransitionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare a snapshot against the side-table, then record it.
    pub fn observe(&mut self, incidents: &[Incident]) -> Vec<TransitionEvent> {
        let mut events = Vec::new();
        for incident in incidents {
            let previous = self.last_seen.insert(incident.id, incident.status);
            if let Some(old_status) = previous {
                if old_status != incident.status {
                    events.push(TransitionEvent {
                        incident: incident.clone(),
                        old_status,
                        new_status: incident.status,
                    });
                }
            }
        }
        events
    }

    /// Last status seen for `id` (None = not yet observed).
    pub fn last_status(&self, id: IncidentId) -> Option<Status> {
        self.last_seen.get(&id).copied()
    }

    /// Number of incidents with a baseline.
    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }
}
