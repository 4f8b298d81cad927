//! User directory: identity records and tutor profile access
//!
//! Thin registry over `UserRecord`. The engine resolves tutors through
//! `tutor_profile`, which also enforces that the user actually carries the
//! tutor role payload; students and admins surface as `TutorNotFound` at
//! this boundary.

use crate::types::user::{TutorProfile, UserId, UserRecord};
use crate::types::EngineError;
use dashmap::DashMap;

/// Registry of platform users
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: DashMap<UserId, UserRecord>,
}

impl UserDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a user record
    pub fn register(&self, user: UserRecord) {
        self.users.insert(user.id, user);
    }

    /// Fetch any user record
    pub fn get(&self, id: UserId) -> Option<UserRecord> {
        self.users.get(&id).map(|entry| entry.clone())
    }

    /// Fetch a tutor's profile
    ///
    /// Fails with `TutorNotFound` if the user is missing or not a tutor.
    pub fn tutor_profile(&self, id: UserId) -> Result<TutorProfile, EngineError> {
        self.users
            .get(&id)
            .and_then(|entry| entry.tutor().cloned())
            .ok_or_else(|| EngineError::tutor_not_found(id))
    }

    /// Mutate a tutor's profile under the entry lock
    pub fn update_tutor<F>(&self, id: UserId, f: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut TutorProfile),
    {
        let mut entry = self
            .users
            .get_mut(&id)
            .ok_or_else(|| EngineError::tutor_not_found(id))?;
        let profile = entry
            .tutor_mut()
            .ok_or_else(|| EngineError::tutor_not_found(id))?;
        f(profile);
        Ok(())
    }

    /// All approved tutors, for the daily ranking refresh
    pub fn approved_tutors(&self) -> Vec<(UserId, TutorProfile)> {
        self.users
            .iter()
            .filter_map(|entry| {
                entry
                    .tutor()
                    .filter(|profile| profile.approved)
                    .map(|profile| (entry.id, profile.clone()))
            })
            .collect()
    }
}
