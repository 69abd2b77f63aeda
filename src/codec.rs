//! Mapping between remote documents and domain entities.
//!
//! Decoding is per document: a document that is missing a required field or
//! carries an unknown enumerated value fails on its own and never takes the
//! rest of a snapshot down with it.

use crate::document::{Document, FieldValue, Fields};
use crate::error::DecodeError;
use crate::types::{
    Broadcast, Category, Coordinate, Incident, IncidentId, Role, Status, Timestamp, Viewer,
};

/// Field names of the storage contract.
pub mod fields {
    pub const CATEGORY: &str = "category";
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const STATUS: &str = "status";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
    pub const REPORTER_ID: &str = "reporter_id";
    pub const IMAGE_URL: &str = "image_url";

    pub const MESSAGE: &str = "message";

    pub const NAME: &str = "name";
    pub const DEPARTMENT: &str = "department";
    pub const ROLE: &str = "role";
    pub const FOLLOWED_INCIDENT_IDS: &str = "followed_incident_ids";
    pub const NOTIFICATION_CATEGORIES: &str = "notification_categories";
}

fn required_str<'a>(doc: &'a Document, field: &'static str) -> Result<&'a str, DecodeError> {
    doc.get_str(field).ok_or(DecodeError::MissingField(field))
}

fn required_f64(doc: &Document, field: &'static str) -> Result<f64, DecodeError> {
    doc.get_f64(field).ok_or(DecodeError::MissingField(field))
}

fn required_timestamp(doc: &Document, field: &'static str) -> Result<Timestamp, DecodeError> {
    doc.get_timestamp(field).ok_or(DecodeError::MissingField(field))
}

// --- Incidents ---

/// Decode an incident document.
pub fn decode_incident(doc: &Document) -> Result<Incident, DecodeError> {
    let id = IncidentId::parse(&doc.id).ok_or_else(|| DecodeError::InvalidId(doc.id.clone()))?;

    let category_raw = required_str(doc, fields::CATEGORY)?;
    let category = Category::parse(category_raw).ok_or_else(|| DecodeError::InvalidValue {
        field: fields::CATEGORY,
        value: category_raw.to_string(),
    })?;

    let status_raw = required_str(doc, fields::STATUS)?;
    let status = Status::parse(status_raw).ok_or_else(|| DecodeError::InvalidValue {
        field: fields::STATUS,
        value: status_raw.to_string(),
    })?;

    let created_at = required_timestamp(doc, fields::CREATED_AT)?;
    let updated_at = doc.get_timestamp(fields::UPDATED_AT).unwrap_or(created_at);

    let image_url = doc
        .get_str(fields::IMAGE_URL)
        .filter(|url| !url.is_empty())
        .map(str::to_string);

    Ok(Incident {
        id,
        category,
        title: required_str(doc, fields::TITLE)?.to_string(),
        description: required_str(doc, fields::DESCRIPTION)?.to_string(),
        status,
        created_at,
        updated_at,
        location: Coordinate::new(
            required_f64(doc, fields::LATITUDE)?,
            required_f64(doc, fields::LONGITUDE)?,
        ),
        reporter_id: required_str(doc, fields::REPORTER_ID)?.to_string(),
        image_url,
    })
}

/// Full field set for create-or-replace of an incident.
pub fn encode_incident(incident: &Incident) -> Fields {
    let mut out = Fields::new();
    out.insert(fields::CATEGORY.into(), incident.category.as_str().into());
    out.insert(fields::TITLE.into(), incident.title.clone().into());
    out.insert(fields::DESCRIPTION.into(), incident.description.clone().into());
    out.insert(fields::STATUS.into(), incident.status.as_str().into());
    out.insert(fields::CREATED_AT.into(), incident.created_at.into());
    out.insert(fields::UPDATED_AT.into(), incident.updated_at.into());
    out.insert(fields::LATITUDE.into(), incident.location.latitude.into());
    out.insert(fields::LONGITUDE.into(), incident.location.longitude.into());
    out.insert(fields::REPORTER_ID.into(), incident.reporter_id.clone().into());
    if let Some(url) = &incident.image_url {
        out.insert(fields::IMAGE_URL.into(), url.clone().into());
    }
    out
}

/// Partial update for a status change.
pub fn status_update(status: Status, now: Timestamp) -> Fields {
    let mut out = Fields::new();
    out.insert(fields::STATUS.into(), status.as_str().into());
    out.insert(fields::UPDATED_AT.into(), now.into());
    out
}

/// Partial update for a description edit.
pub fn description_update(description: &str, now: Timestamp) -> Fields {
    let mut out = Fields::new();
    out.insert(fields::DESCRIPTION.into(), description.into());
    out.insert(fields::UPDATED_AT.into(), now.into());
    out
}

// --- Broadcasts ---

pub fn decode_broadcast(doc: &Document) -> Result<Broadcast, DecodeError> {
    Ok(Broadcast {
        id: doc.id.clone(),
        message: required_str(doc, fields::MESSAGE)?.to_string(),
        created_at: required_timestamp(doc, fields::CREATED_AT)?,
    })
}

pub fn encode_broadcast(broadcast: &Broadcast) -> Fields {
    let mut out = Fields::new();
    out.insert(fields::MESSAGE.into(), broadcast.message.clone().into());
    out.insert(fields::CREATED_AT.into(), broadcast.created_at.into());
    out
}

// --- Viewers ---

/// Decode a viewer document.
///
/// Never fails: absent fields take defaults, and individual follow ids or
/// categories that do not parse are skipped.
pub fn decode_viewer(doc: &Document) -> Viewer {
    let followed = doc
        .get_string_array(fields::FOLLOWED_INCIDENT_IDS)
        .map(|ids| ids.iter().filter_map(|s| IncidentId::parse(s)).collect())
        .unwrap_or_default();

    let notification_categories = match doc.get_string_array(fields::NOTIFICATION_CATEGORIES) {
        Some(raw) => raw.iter().filter_map(|s| Category::parse(s)).collect(),
        None => Category::ALL.into_iter().collect(),
    };

    let mut viewer = Viewer::new(
        doc.id.clone(),
        doc.get_str(fields::NAME).unwrap_or("Unknown"),
    )
    .with_role(Role::parse_lenient(doc.get_str(fields::ROLE).unwrap_or_default()))
    .with_followed(followed);

    viewer.department = doc
        .get_str(fields::DEPARTMENT)
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    viewer.notification_categories = notification_categories;
    viewer
}

/// Full-set replacement of the follow list.
pub fn follow_set_update(ids: &[IncidentId]) -> Fields {
    let mut out = Fields::new();
    out.insert(
        fields::FOLLOWED_INCIDENT_IDS.into(),
        FieldValue::StringArray(ids.iter().map(|id| id.to_string()).collect()),
    );
    out
}

/// Full-set replacement of the notification categories.
pub fn notification_set_update<'a>(categories: impl IntoIterator<Item = &'a Category>) -> Fields {
    let mut out = Fields::new();
    out.insert(
        fields::NOTIFICATION_CATEGORIES.into(),
        FieldValue::StringArray(
            categories
                .into_iter()
                .map(|c| c.as_str().to_string())
                .collect(),
        ),
    );
    out
}

pub fn encode_viewer(viewer: &Viewer) -> Fields {
    let mut out = Fields::new();
    out.insert(fields::NAME.into(), viewer.display_name.clone().into());
    out.insert(fields::ROLE.into(), viewer.role.as_str().into());
    if let Some(department) = &viewer.department {
        out.insert(fields::DEPARTMENT.into(), department.clone().into());
    }
    out.extend(follow_set_update(&viewer.followed_incident_ids));
    out.extend(notification_set_update(&viewer.notification_categories));
    out
}
