//! Verified caller identities and the authentication seam
use crate::error::{MarketResult, MarketplaceError};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    #[n(0)]
    Clinic,
    #[n(1)]
    Laboratory,
    #[n(2)]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Clinic => "clinic",
            Role::Laboratory => "laboratory",
            Role::Admin => "admin",
        }
    }

    /// Clinics and laboratories trade with each other, never with their own kind.
    pub fn is_counterpart_of(&self, other: Role) -> bool {
        matches!(
            (self, other),
            (Role::Clinic, Role::Laboratory) | (Role::Laboratory, Role::Clinic)
        )
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
    pub fn clinic(id: impl Into<String>) -> Self {
        Self::new(id, Role::Clinic)
    }
    pub fn laboratory(id: impl Into<String>) -> Self {
        Self::new(id, Role::Laboratory)
    }
    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn require_role(&self, role: Role, action: &str) -> MarketResult<()> {
        if self.role != role {
            return Err(MarketplaceError::forbidden(format!(
                "only a {role} may {action}"
            )));
        }
        Ok(())
    }
}

/// Session verification lives outside this crate; this is the narrow seam to it.
pub trait IdentityProvider: Send + Sync {
    fn authenticate(&self, credential: &str) -> Option<Identity>;
}

/// Token table for demos and tests.
#[derive(Default)]
pub struct StaticIdentityProvider {
    sessions: RwLock<HashMap<String, Identity>>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking writer cannot leave the map half-updated, so poisoning is ignored
    pub fn register(&self, credential: impl Into<String>, identity: Identity) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(credential.into(), identity);
    }

    pub fn revoke(&self, credential: &str) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(credential);
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn authenticate(&self, credential: &str) -> Option<Identity> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(credential)
            .cloned()
    }
}

/// Public profile of a laboratory user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaboratoryProfile {
    pub id: String,
    pub name: String,
    pub city: Option<String>,
}

impl LaboratoryProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            city: None,
        }
    }

    pub fn in_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }
}

/// User profiles live with the identity system; clinics browse laboratories
/// through this seam.
pub trait LaboratoryDirectory: Send + Sync {
    fn laboratories(&self) -> Vec<LaboratoryProfile>;
}

#[derive(Default)]
pub struct StaticLaboratoryDirectory {
    profiles: RwLock<Vec<LaboratoryProfile>>,
}

impl StaticLaboratoryDirectory {
    pub fn new(profiles: Vec<LaboratoryProfile>) -> Self {
        Self {
            profiles: RwLock::new(profiles),
        }
    }

    /// Adds or replaces the profile with the same id.
    pub fn register(&self, profile: LaboratoryProfile) {
        let mut profiles = self.profiles.write().unwrap_or_else(PoisonError::into_inner);
        profiles.retain(|existing| existing.id != profile.id);
        profiles.push(profile);
    }
}

impl LaboratoryDirectory for StaticLaboratoryDirectory {
    fn laboratories(&self) -> Vec<LaboratoryProfile> {
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
