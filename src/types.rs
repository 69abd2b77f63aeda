//! Core domain types for the feed engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time. A clock before the epoch reads as the epoch.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }

    pub fn from_secs(secs: i64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    /// Time elapsed between `self` and `now`. Timestamps in the future have
    /// zero age.
    pub fn age_at(self, now: Timestamp) -> Duration {
        let delta = now.0.saturating_sub(self.0);
        if delta <= 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(delta as u64)
        }
    }

    pub fn plus(self, d: Duration) -> Self {
        Timestamp(self.0.saturating_add(d.as_micros() as i64))
    }

    pub fn minus(self, d: Duration) -> Self {
        Timestamp(self.0.saturating_sub(d.as_micros() as i64))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Unique identifier for an incident.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IncidentId(pub Uuid);

impl IncidentId {
    /// Fresh random identifier.
    pub fn new() -> Self {
        IncidentId(Uuid::new_v4())
    }

    /// Parse from the canonical hyphenated form. Returns `None` for anything
    /// that is not a valid UUID.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(IncidentId)
    }
}

impl Default for IncidentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IncidentId({})", self.0)
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Incident category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Health,
    Security,
    Technical,
    Environmental,
    LostFound,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Health,
        Category::Security,
        Category::Technical,
        Category::Environmental,
        Category::LostFound,
    ];

    /// Canonical wire key.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Health => "health",
            Category::Security => "security",
            Category::Technical => "technical",
            Category::Environmental => "environmental",
            Category::LostFound => "lost_found",
        }
    }

    /// Display label written by older clients.
    pub fn legacy_label(self) -> &'static str {
        match self {
            Category::Health => "Sağlık",
            Category::Security => "Güvenlik",
            Category::Technical => "Teknik Arıza",
            Category::Environmental => "Çevre",
            Category::LostFound => "Kayıp/Buluntu",
        }
    }

    /// Parse a wire value, accepting the canonical key or the legacy label.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s || c.legacy_label() == s)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incident lifecycle status.
///
/// Ordered Open → Investigating → Resolved in intended usage; nothing in the
/// engine enforces that order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Open,
    Investigating,
    Resolved,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Open, Status::Investigating, Status::Resolved];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Open => "open",
            Status::Investigating => "investigating",
            Status::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    pub fn is_active(self) -> bool {
        self == Status::Open
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization role of a viewer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Member,
    Administrator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Administrator => "administrator",
        }
    }

    /// Case-insensitive parse. Anything unrecognised is a plain member.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "admin" | "administrator" => Role::Administrator,
            _ => Role::Member,
        }
    }
}

/// Geographic coordinate in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A reported incident, as reconciled from the incidents feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Stable, globally unique identifier.
    pub id: IncidentId,

    pub category: Category,

    pub title: String,

    pub description: String,

    pub status: Status,

    /// When the incident was reported (immutable).
    pub created_at: Timestamp,

    /// Bumped on every mutation.
    pub updated_at: Timestamp,

    /// Where the incident was reported (immutable).
    pub location: Coordinate,

    /// Viewer id of the reporter. Never dereferenced.
    pub reporter_id: String,

    /// Optional attached image reference.
    pub image_url: Option<String>,
}

/// Input for reporting a new incident (before id and timestamps are assigned).
#[derive(Clone, Debug)]
pub struct NewIncident {
    pub category: Category,
    pub title: String,
    pub description: String,
    pub location: Coordinate,
    pub image_url: Option<String>,
}

impl NewIncident {
    pub fn new(
        category: Category,
        title: impl Into<String>,
        description: impl Into<String>,
        location: Coordinate,
    ) -> Self {
        Self {
            category,
            title: title.into(),
            description: description.into(),
            location,
            image_url: None,
        }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }
}

/// A broadcast announcement. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    pub id: String,
    pub message: String,
    pub created_at: Timestamp,
}

/// The signed-in user as seen by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewer {
    pub id: String,
    pub display_name: String,
    pub department: Option<String>,
    pub role: Role,
    /// Ordered, duplicate-free.
    pub followed_incident_ids: Vec<IncidentId>,
    pub notification_categories: BTreeSet<Category>,
}

impl Viewer {
    /// A member with no follows, subscribed to every category.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            department: None,
            role: Role::Member,
            followed_incident_ids: Vec::new(),
            notification_categories: Category::ALL.into_iter().collect(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_followed(mut self, ids: Vec<IncidentId>) -> Self {
        self.followed_incident_ids = Vec::new();
        for id in ids {
            if !self.followed_incident_ids.contains(&id) {
                self.followed_incident_ids.push(id);
            }
        }
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator
    }

    pub fn follows(&self, id: IncidentId) -> bool {
        self.followed_incident_ids.contains(&id)
    }

    pub fn wants_notifications_for(&self, category: Category) -> bool {
        self.notification_categories.contains(&category)
    }
}
