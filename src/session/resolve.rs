//! Identity resolution against the roster and registration registries

use serde::Serialize;

use crate::registry::{RegistrationRecord, Registry, Role, RosterRecord};

/// Position shown for people who only exist in the registration registry
pub const REGISTERED_MEMBER: &str = "Registered Member";

/// Trim and uppercase a raw payload
pub fn normalize(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Which registry a subject came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Roster,
    Registration,
}

/// Resolved identity for a single scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub position: String,
    pub role: Role,
    pub bio: String,
    pub photo: Option<String>,
    pub origin: Origin,
}

impl From<&RosterRecord> for Subject {
    fn from(record: &RosterRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            position: record.position.clone(),
            role: record.role,
            bio: record.bio.clone(),
            photo: record.photo.clone(),
            origin: Origin::Roster,
        }
    }
}

impl From<&RegistrationRecord> for Subject {
    fn from(record: &RegistrationRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            position: REGISTERED_MEMBER.to_string(),
            role: Role::Member,
            bio: String::new(),
            photo: None,
            origin: Origin::Registration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Valid,
    Invalid,
}

fn matches(payload: &str, id: &str, reg_number: Option<&str>) -> bool {
    normalize(id) == payload || reg_number.is_some_and(|reg| normalize(reg) == payload)
}

/// Look up an already normalized payload. Roster wins over registrations.
pub fn resolve(registry: &Registry, payload: &str) -> (Option<Subject>, Outcome) {
    let subject = registry
        .roster
        .iter()
        .find(|r| matches(payload, &r.id, r.reg_number.as_deref()))
        .map(Subject::from)
        .or_else(|| {
            registry
                .registrations
                .iter()
                .find(|r| matches(payload, &r.id, Some(&r.reg_number)))
                .map(Subject::from)
        });

    let outcome = if subject.is_some() {
        Outcome::Valid
    } else {
        Outcome::Invalid
    };
    (subject, outcome)
}
