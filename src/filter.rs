//! On-demand filtering of the incident list.
//!
//! Pure: no state, no I/O. All criteria combine with AND, and the input
//! order (already the feed's order) is kept as-is.

use crate::types::{Category, Incident, Status, Viewer};
use serde::{Deserialize, Serialize};

/// What the viewer asked to see.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Case-insensitive substring of title or description. Empty matches all.
    pub search_text: String,

    /// Exact category (None = all categories).
    pub category: Option<Category>,

    /// Only incidents still open.
    pub active_only: bool,

    /// Only incidents the viewer follows. Matches nothing without a viewer.
    pub followed_only: bool,
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search_text = text.into();
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn active_only(mut self, on: bool) -> Self {
        self.active_only = on;
        self
    }

    pub fn followed_only(mut self, on: bool) -> Self {
        self.followed_only = on;
        self
    }

    /// True when no criterion narrows the result.
    pub fn is_unfiltered(&self) -> bool {
        *self == Self::default()
    }

    /// Whether a single incident passes every criterion.
    pub fn matches(&self, incident: &Incident, viewer: Option<&Viewer>) -> bool {
        self.passes(&self.search_text.to_lowercase(), incident, viewer)
    }

    /// `needle` is the already-lowercased search text.
    fn passes(&self, needle: &str, incident: &Incident, viewer: Option<&Viewer>) -> bool {
        (needle.is_empty()
            || incident.title.to_lowercase().contains(needle)
            || incident.description.to_lowercase().contains(needle))
            && self.category.map_or(true, |c| incident.category == c)
            && (!self.active_only || incident.status == Status::Open)
            && (!self.followed_only || viewer.is_some_and(|v| v.follows(incident.id)))
    }
}

/// The subset of `incidents` visible under `criteria`, in input order.
pub fn visible(
    incidents: &[Incident],
    criteria: &FilterCriteria,
    viewer: Option<&Viewer>,
) -> Vec<Incident> {
    if criteria.is_unfiltered() {
        return incidents.to_vec();
    }

    let needle = criteria.search_text.to_lowercase();
    incidents
        .iter()
        .filter(|incident| criteria.passes(&needle, incident, viewer))
        .cloned()
        .collect()
}
