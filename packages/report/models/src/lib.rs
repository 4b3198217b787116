#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Report data model for the clean592 violation reporting app.
//!
//! A [`Report`] is one citizen submission about an environmental
//! violation. Reports are created from a validated [`ReportDraft`], start
//! out as [`ReportStatus::PendingUpload`] and only ever move forward
//! through the lifecycle. Points earned per report, and the derived
//! [`UserProfile`], are governed by a [`ScoringPolicy`].

pub mod profile;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

pub use profile::{InvalidPolicyError, ScoringPolicy, UserProfile};

/// Kind of violation being reported.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ReportType {
    /// Waste dumped from a vehicle (license plate is usually captured)
    VehicleDumping,
    /// Litter left in a public space
    Littering,
    /// Open burning of waste
    Burning,
    /// Anything that does not fit the other categories
    Other,
}

impl ReportType {
    /// Short human-readable heading for this report type.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::VehicleDumping => "Vehicle Report",
            Self::Littering => "Litter Report",
            Self::Burning => "Burning Report",
            Self::Other => "Other Report",
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::VehicleDumping,
            Self::Littering,
            Self::Burning,
            Self::Other,
        ]
    }
}

/// Lifecycle status of a report.
///
/// Variants are declared in lifecycle order, so the derived [`Ord`] is the
/// order in which a report may progress.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum ReportStatus {
    /// Created offline, waiting in the pending queue
    #[serde(rename = "Pending Upload")]
    #[strum(to_string = "Pending Upload", serialize = "pending_upload")]
    PendingUpload,
    /// Acknowledged by the submission endpoint
    #[serde(rename = "Received")]
    #[strum(to_string = "Received", serialize = "received")]
    Received,
    /// Under investigation by the authority
    #[serde(rename = "Investigation")]
    #[strum(to_string = "Investigation", serialize = "investigation")]
    Investigation,
    /// Resolved; the reporter earns the resolution bonus
    #[serde(rename = "Action Taken")]
    #[strum(to_string = "Action Taken", serialize = "action_taken")]
    ActionTaken,
}

impl ReportStatus {
    /// Whether a report in this status may move to `next`.
    ///
    /// Status only moves forward, and never back to
    /// [`Self::PendingUpload`].
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        next > self
    }

    /// Whether the report has been acknowledged by the submission endpoint.
    #[must_use]
    pub const fn is_acknowledged(self) -> bool {
        !matches!(self, Self::PendingUpload)
    }
}

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

/// Errors raised when a draft is not complete enough to submit.
///
/// These are recovered locally: the draft stays editable and nothing is
/// queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// No violation type was selected.
    #[error("report type is required")]
    MissingType,

    /// Neither coordinates nor an address were given.
    #[error("a location or an address is required")]
    MissingLocation,
}

/// The editable form state of a report before submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportDraft {
    /// Selected violation type.
    #[serde(rename = "type")]
    pub report_type: Option<ReportType>,
    /// Opaque reference to the captured photo.
    pub image: Option<String>,
    /// Inline preview of the captured photo.
    pub image_preview: Option<String>,
    /// Coordinates of the violation, if known.
    pub location: Option<Location>,
    /// Display address of the violation.
    pub address: String,
    /// Free text description.
    pub description: String,
    /// License plate of the offending vehicle.
    pub license_plate: Option<String>,
    /// Whether the reporter wants to stay anonymous.
    pub anonymous: bool,
}

impl ReportDraft {
    /// Creates an empty draft for the given violation type.
    #[must_use]
    pub fn new(report_type: ReportType) -> Self {
        Self {
            report_type: Some(report_type),
            ..Self::default()
        }
    }

    /// Sets the display address.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Sets the coordinates.
    #[must_use]
    pub fn with_location(mut self, lat: f64, lng: f64) -> Self {
        self.location = Some(Location { lat, lng });
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the license plate.
    #[must_use]
    pub fn with_license_plate(mut self, plate: impl Into<String>) -> Self {
        self.license_plate = Some(plate.into());
        self
    }

    /// Checks that the draft has enough information to become a report.
    ///
    /// Returns the selected report type on success.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::MissingType`] if no type was selected
    /// * [`ValidationError::MissingLocation`] if there are no coordinates and
    ///   the address is blank
    pub fn validate(&self) -> Result<ReportType, ValidationError> {
        let report_type = self.report_type.ok_or(ValidationError::MissingType)?;
        if self.location.is_none() && self.address.trim().is_empty() {
            return Err(ValidationError::MissingLocation);
        }
        Ok(report_type)
    }
}

/// One citizen submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Locally unique id, derived from the creation time in milliseconds.
    pub id: i64,
    /// Client-generated idempotency key for the submission endpoint.
    pub correlation_id: Uuid,
    /// Violation type.
    #[serde(rename = "type")]
    pub report_type: ReportType,
    /// Opaque reference to the captured photo.
    #[serde(default)]
    pub image: Option<String>,
    /// Inline preview of the captured photo.
    #[serde(default)]
    pub image_preview: Option<String>,
    /// Coordinates of the violation.
    #[serde(default)]
    pub location: Option<Location>,
    /// Display address.
    #[serde(default)]
    pub address: String,
    /// Free text description.
    #[serde(default)]
    pub description: String,
    /// License plate of the offending vehicle.
    #[serde(default)]
    pub license_plate: Option<String>,
    /// Whether the reporter stays anonymous.
    #[serde(default)]
    pub anonymous: bool,
    /// When the report was created.
    pub timestamp: DateTime<Utc>,
    /// Lifecycle status.
    pub status: ReportStatus,
    /// Points earned by this report so far.
    #[serde(default)]
    pub points_awarded: u32,
    /// When the report was moved from the pending queue into history.
    #[serde(default)]
    pub sync_time: Option<DateTime<Utc>>,
    /// Id assigned by the submission endpoint.
    #[serde(default)]
    pub server_id: Option<String>,
    /// Failed upload attempts while pending.
    #[serde(default)]
    pub retry_count: u32,
    /// Error from the most recent failed upload.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Report {
    /// Builds a pending report from a draft.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the draft is incomplete.
    pub fn from_draft(
        draft: ReportDraft,
        id: i64,
        correlation_id: Uuid,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let report_type = draft.validate()?;

        Ok(Self {
            id,
            correlation_id,
            report_type,
            image: draft.image,
            image_preview: draft.image_preview,
            location: draft.location,
            address: draft.address.trim().to_string(),
            description: draft.description,
            license_plate: draft
                .license_plate
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            anonymous: draft.anonymous,
            timestamp,
            status: ReportStatus::PendingUpload,
            points_awarded: 0,
            sync_time: None,
            server_id: None,
            retry_count: 0,
            last_error: None,
        })
    }

    /// Marks the report as acknowledged by the submission endpoint.
    ///
    /// Points are raised to the policy's receipt award but never lowered.
    pub fn mark_received(&mut self, policy: &ScoringPolicy, server_id: String) {
        self.status = ReportStatus::Received;
        self.points_awarded = self.points_awarded.max(policy.received_points);
        self.server_id = Some(server_id);
        self.retry_count = 0;
        self.last_error = None;
    }

    /// Records a failed upload attempt.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(error.into());
    }

    /// Moves the report to `next`, adding the resolution bonus when it
    /// reaches [`ReportStatus::ActionTaken`].
    ///
    /// Returns `false` (leaving the report untouched) if the transition
    /// would move backwards.
    pub fn advance_status(&mut self, next: ReportStatus, policy: &ScoringPolicy) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        if next == ReportStatus::ActionTaken {
            self.points_awarded = self
                .points_awarded
                .max(policy.received_points)
                .saturating_add(policy.resolution_bonus);
        }
        self.status = next;
        true
    }
}

/// Criteria for filtering a list of reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportFilter {
    /// Only reports of this type.
    pub report_type: Option<ReportType>,
    /// Only reports in this status.
    pub status: Option<ReportStatus>,
}

impl ReportFilter {
    /// Whether `report` satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, report: &Report) -> bool {
        self.report_type.is_none_or(|t| t == report.report_type)
            && self.status.is_none_or(|s| s == report.status)
    }

    /// Returns references to the matching reports, preserving order.
    #[must_use]
    pub fn apply<'a>(&self, reports: impl IntoIterator<Item = &'a Report>) -> Vec<&'a Report> {
        reports.into_iter().filter(|r| self.matches(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn draft() -> ReportDraft {
        ReportDraft::new(ReportType::Littering).with_address("Seawall Road")
    }

    fn report(report_type: ReportType, status: ReportStatus) -> Report {
        let mut r = Report::from_draft(
            ReportDraft::new(report_type).with_address("Sheriff St"),
            1,
            Uuid::new_v4(),
            Utc::now(),
        )
        .unwrap();
        r.status = status;
        r
    }

    #[test]
    fn draft_without_type_is_rejected() {
        let d = ReportDraft {
            address: "Camp St".to_string(),
            ..ReportDraft::default()
        };
        assert_eq!(d.validate(), Err(ValidationError::MissingType));
    }

    #[test]
    fn draft_with_blank_address_and_no_location_is_rejected() {
        let d = ReportDraft::new(ReportType::Littering).with_address("   ");
        assert_eq!(d.validate(), Err(ValidationError::MissingLocation));
    }

    #[test]
    fn draft_with_location_only_is_valid() {
        let d = ReportDraft::new(ReportType::VehicleDumping).with_location(6.8013, -58.1551);
        assert_eq!(d.validate(), Ok(ReportType::VehicleDumping));
    }

    #[test]
    fn from_draft_starts_pending_with_no_points() {
        let r = Report::from_draft(draft(), 42, Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(r.id, 42);
        assert_eq!(r.status, ReportStatus::PendingUpload);
        assert_eq!(r.points_awarded, 0);
        assert_eq!(r.retry_count, 0);
    }

    #[test]
    fn blank_license_plate_is_dropped() {
        let d = draft().with_license_plate("  ");
        let r = Report::from_draft(d, 1, Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(r.license_plate, None);
    }

    #[test]
    fn status_serializes_as_display_strings() {
        let json = serde_json::to_string(&ReportStatus::PendingUpload).unwrap();
        assert_eq!(json, "\"Pending Upload\"");
        assert_eq!(ReportStatus::ActionTaken.to_string(), "Action Taken");
        assert_eq!(
            ReportStatus::from_str("action_taken").unwrap(),
            ReportStatus::ActionTaken
        );
        assert_eq!(
            ReportStatus::from_str("Investigation").unwrap(),
            ReportStatus::Investigation
        );
    }

    #[test]
    fn report_json_uses_camel_case_keys() {
        let r = Report::from_draft(draft(), 7, Uuid::new_v4(), Utc::now()).unwrap();
        let value = serde_json::to_value(&r).unwrap();
        assert_eq!(value["type"], "littering");
        assert_eq!(value["pointsAwarded"], 0);
        assert_eq!(value["status"], "Pending Upload");
    }

    #[test]
    fn status_never_moves_backwards() {
        let policy = ScoringPolicy::default();
        let mut r = report(ReportType::Littering, ReportStatus::Investigation);
        r.points_awarded = 20;
        assert!(!r.advance_status(ReportStatus::Received, &policy));
        assert_eq!(r.status, ReportStatus::Investigation);
        assert!(!r.advance_status(ReportStatus::Investigation, &policy));
    }

    #[test]
    fn action_taken_adds_resolution_bonus_once() {
        let policy = ScoringPolicy::default();
        let mut r = report(ReportType::VehicleDumping, ReportStatus::Received);
        r.points_awarded = 20;
        assert!(r.advance_status(ReportStatus::ActionTaken, &policy));
        assert_eq!(r.points_awarded, 30);
        assert!(!r.advance_status(ReportStatus::ActionTaken, &policy));
        assert_eq!(r.points_awarded, 30);
    }

    #[test]
    fn mark_received_never_lowers_points() {
        let policy = ScoringPolicy::default();
        let mut r = report(ReportType::Littering, ReportStatus::PendingUpload);
        r.points_awarded = 25;
        r.record_failure("timeout");
        r.mark_received(&policy, "srv-1".to_string());
        assert_eq!(r.points_awarded, 25);
        assert_eq!(r.retry_count, 0);
        assert_eq!(r.last_error, None);
        assert_eq!(r.server_id.as_deref(), Some("srv-1"));
    }

    #[test]
    fn filter_matches_type_and_status() {
        let reports = vec![
            report(ReportType::Littering, ReportStatus::Received),
            report(ReportType::VehicleDumping, ReportStatus::Received),
            report(ReportType::Littering, ReportStatus::ActionTaken),
        ];

        let littering = ReportFilter {
            report_type: Some(ReportType::Littering),
            ..ReportFilter::default()
        };
        assert_eq!(littering.apply(&reports).len(), 2);

        let resolved_litter = ReportFilter {
            report_type: Some(ReportType::Littering),
            status: Some(ReportStatus::ActionTaken),
        };
        assert_eq!(resolved_litter.apply(&reports).len(), 1);

        assert_eq!(ReportFilter::default().apply(&reports).len(), 3);
    }
}
