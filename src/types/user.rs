//! User identity types
//!
//! The platform has three kinds of users sharing one identity record. Role
//! payloads are modelled as a sum type rather than schema discrimination:
//! the engine only ever operates on the tutor payload, and mismatched roles
//! surface as `TutorNotFound` at the directory boundary.

use super::lead::TeachingMode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// User identifier shared by tutors, students, and admins
pub type UserId = u64;

/// Common identity record with a role-specific payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique user identifier
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Contact phone
    pub phone: String,
    /// Role-specific payload
    pub role: Role,
}

/// Role payloads for the three user kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A tutor who unlocks leads with credits
    Tutor(TutorProfile),
    /// A student who submits tutoring requirements
    Student(StudentProfile),
    /// A platform administrator
    Admin,
}

/// Tutor-specific profile data
///
/// Carries the matching attributes (`city`, `subjects`, `teaching_modes`,
/// `hourly_rate`), the approval gate checked before any unlock, and the
/// performance metrics the daily ranking refresh recomputes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorProfile {
    /// City the tutor operates in
    pub city: String,
    /// Subjects the tutor teaches
    pub subjects: Vec<String>,
    /// Teaching modes the tutor offers
    pub teaching_modes: Vec<TeachingMode>,
    /// Hourly rate, if the tutor has set pricing
    pub hourly_rate: Option<Decimal>,
    /// Whether an admin has approved this tutor for lead access
    pub approved: bool,
    /// Whether the account is active
    pub active: bool,
    /// Whether the tutor currently has a featured placement
    pub featured: bool,
    /// Average rating on a 0-5 scale
    pub rating_average: Decimal,
    /// Profile completeness percentage (0-100)
    pub profile_completion: u8,
    /// Performance counters and derived rates
    pub metrics: TutorMetrics,
}

/// Tutor performance metrics
///
/// Counters are bumped best-effort by the engine; the derived
/// `ranking_score` is refreshed by the daily maintenance sweep.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TutorMetrics {
    /// Leads this tutor was matched against
    pub total_leads: u64,
    /// Leads this tutor has unlocked
    pub unlocked_leads: u64,
    /// Leads this tutor converted to engagements
    pub converted_leads: u64,
    /// Response rate percentage (0-100)
    pub response_rate: Decimal,
    /// Conversion rate percentage (0-100)
    pub conversion_rate: Decimal,
    /// Derived ranking score, recomputed daily
    pub ranking_score: Decimal,
}

/// Student-specific profile data
///
/// The engine only needs enough to snapshot contact details onto a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    /// City the student is in
    pub city: String,
}

impl UserRecord {
    /// Borrow the tutor payload, if this user is a tutor
    pub fn tutor(&self) -> Option<&TutorProfile> {
        match &self.role {
            Role::Tutor(profile) => Some(profile),
            _ => None,
        }
    }

    /// Mutably borrow the tutor payload, if this user is a tutor
    pub fn tutor_mut(&mut self) -> Option<&mut TutorProfile> {
        match &mut self.role {
            Role::Tutor(profile) => Some(profile),
            _ => None,
        }
    }
}

impl TutorProfile {
    /// Recompute the derived ranking score
    ///
    /// Weighted blend: rating 30%, conversion rate 25%, response rate 20%,
    /// profile completeness 15%, featured placement 10%. All inputs are
    /// normalized to a 0-100 scale before weighting.
    pub fn recompute_ranking(&mut self) {
        let rating_score = self.rating_average / Decimal::from(5) * Decimal::from(100);
        let featured_score = if self.featured {
            Decimal::from(100)
        } else {
            Decimal::ZERO
        };

        self.metrics.ranking_score = rating_score * Decimal::new(30, 2)
            + self.metrics.conversion_rate * Decimal::new(25, 2)
            + self.metrics.response_rate * Decimal::new(20, 2)
            + Decimal::from(self.profile_completion) * Decimal::new(15, 2)
            + featured_score * Decimal::new(10, 2);
    }
}
