//! Feedback report model captured from the in-app feedback form.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AppError, Result};

/// Lowest accepted satisfaction rating.
pub const MIN_RATING: u8 = 1;
/// Highest accepted satisfaction rating.
pub const MAX_RATING: u8 = 5;

/// What kind of feedback the reporter is leaving.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCategory {
    /// Something is broken.
    Bug,
    /// Request for new functionality.
    Feature,
    /// Suggestion to change existing functionality.
    Improvement,
    /// The reporter needs help or clarification.
    Question,
    /// Positive feedback.
    Praise,
    /// Anything else.
    Other,
}

impl FeedbackCategory {
    /// Wire name of the category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Improvement => "improvement",
            Self::Question => "question",
            Self::Praise => "praise",
            Self::Other => "other",
        }
    }
}

impl Display for FeedbackCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bug" => Ok(Self::Bug),
            "feature" => Ok(Self::Feature),
            "improvement" => Ok(Self::Improvement),
            "question" => Ok(Self::Question),
            "praise" => Ok(Self::Praise),
            "other" => Ok(Self::Other),
            other => Err(AppError::Validation(format!(
                "unknown feedback category: {other}"
            ))),
        }
    }
}

/// Identity of the person leaving feedback, when signed in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reporter {
    /// Backend user id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Contact e-mail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Device the report was filed from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Operating system family (`ios`, `android`, ...).
    pub platform: String,
    /// Operating system version.
    pub os_version: String,
    /// Application version string.
    pub app_version: String,
    /// Hardware model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Application build number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_number: Option<String>,
}

/// A feedback report as entered by the user.
///
/// Serialized into the opaque payload of a
/// [`QueuedFeedbackItem`](crate::models::QueuedFeedbackItem).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackReport {
    /// Feedback kind.
    pub category: FeedbackCategory,
    /// Short summary.
    pub title: String,
    /// Free-form body.
    pub description: String,
    /// Optional satisfaction rating in `1..=5`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    /// Previously uploaded screenshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_url: Option<String>,
    /// Signed-in reporter, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporter: Option<Reporter>,
    /// Device details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceInfo>,
    /// Screen or error context captured alongside the report.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    /// Whether the reporter is enrolled in the beta program.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_beta_user: Option<bool>,
    /// When the report was written.
    pub created_at: DateTime<Utc>,
}

impl FeedbackReport {
    /// Construct a report with the required fields, timestamped now.
    #[must_use]
    pub fn new(category: FeedbackCategory, title: String, description: String) -> Self {
        Self {
            category,
            title,
            description,
            rating: None,
            screenshot_url: None,
            reporter: None,
            device: None,
            context: None,
            is_beta_user: None,
            created_at: Utc::now(),
        }
    }

    /// Attach a satisfaction rating.
    #[must_use]
    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }

    /// Attach a screenshot reference.
    #[must_use]
    pub fn with_screenshot_url(mut self, url: String) -> Self {
        self.screenshot_url = Some(url);
        self
    }

    /// Attach the signed-in reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Attach device details.
    #[must_use]
    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = Some(device);
        self
    }

    /// Attach free-form context.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Record the reporter's beta enrollment.
    #[must_use]
    pub fn with_beta_user(mut self, is_beta_user: bool) -> Self {
        self.is_beta_user = Some(is_beta_user);
        self
    }

    /// Check that the report is complete enough to send.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the title or description is blank
    /// or the rating falls outside `1..=5`.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::Validation("title must not be empty".into()));
        }

        if self.description.trim().is_empty() {
            return Err(AppError::Validation("description must not be empty".into()));
        }

        if let Some(rating) = self.rating {
            if !(MIN_RATING..=MAX_RATING).contains(&rating) {
                return Err(AppError::Validation(format!(
                    "rating must be between {MIN_RATING} and {MAX_RATING}, got {rating}"
                )));
            }
        }

        Ok(())
    }
}
