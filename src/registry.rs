//! Roster and registration records supplied by the external record store
//!
//! Both registries are fetched once when a session starts and stay immutable
//! until it ends. The terminal never writes back.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Role of a person on the club roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Faculty,
    Lead,
    Core,
    #[default]
    Volunteer,
    /// Signed up through the registration form, no full profile
    Member,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Faculty => "Faculty",
            Role::Lead => "Lead",
            Role::Core => "Core",
            Role::Volunteer => "Volunteer",
            Role::Member => "Member",
        }
    }
}

/// Full profile entry for club personnel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub reg_number: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub photo: Option<String>,
}

/// Lightweight standalone signup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub id: String,
    pub name: String,
    pub reg_number: String,
    pub created_at: DateTime<Utc>,
}

/// Read side of the remote record store
pub trait RecordStore {
    fn fetch_roster(&self) -> Result<Vec<RosterRecord>, ScanError>;
    fn fetch_registrations(&self) -> Result<Vec<RegistrationRecord>, ScanError>;
}

/// Record store backed by `roster.json` and `registrations.json` in one directory
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub const ROSTER_FILE: &'static str = "roster.json";
    pub const REGISTRATIONS_FILE: &'static str = "registrations.json";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read_array<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, ScanError> {
        let path = self.dir.join(file);
        if !path.exists() {
            log::info!("{} not found, treating as empty", path.display());
            return Ok(Vec::new());
        }
        read_json(&path).map_err(|source| ScanError::Records { path, source })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(records)
}

impl RecordStore for JsonStore {
    fn fetch_roster(&self) -> Result<Vec<RosterRecord>, ScanError> {
        self.read_array(Self::ROSTER_FILE)
    }

    fn fetch_registrations(&self) -> Result<Vec<RegistrationRecord>, ScanError> {
        self.read_array(Self::REGISTRATIONS_FILE)
    }
}

/// Both registries as loaded for one session
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub roster: Vec<RosterRecord>,
    pub registrations: Vec<RegistrationRecord>,
}

impl Registry {
    pub fn new(roster: Vec<RosterRecord>, registrations: Vec<RegistrationRecord>) -> Self {
        Self {
            roster,
            registrations,
        }
    }

    /// Fetch everything from the store
    pub fn load(store: &impl RecordStore) -> Result<Self, ScanError> {
        let roster = store.fetch_roster()?;
        let registrations = store.fetch_registrations()?;
        log::info!(
            "Loaded {} roster records and {} registrations",
            roster.len(),
            registrations.len()
        );
        Ok(Self::new(roster, registrations))
    }
}
