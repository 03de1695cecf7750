//! Audit subjects: users, devices and groups

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::AppError;

/// Kind of subject being audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    User,
    Device,
    Group,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::User => "user",
            SubjectType::Device => "device",
            SubjectType::Group => "group",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" | "users" => Ok(SubjectType::User),
            "device" | "devices" => Ok(SubjectType::Device),
            "group" | "groups" => Ok(SubjectType::Group),
            other => Err(AppError::BadRequest(format!("Unknown subject type: {}", other))),
        }
    }
}

/// Canonical `(type, id)` identity of a subject, rendered as `type:id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SubjectKey {
    pub subject_type: SubjectType,
    pub id: String,
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.id)
    }
}

impl From<SubjectKey> for String {
    fn from(key: SubjectKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for SubjectKey {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let (ty, id) = value
            .split_once(':')
            .ok_or_else(|| AppError::BadRequest(format!("Invalid subject key: {}", value)))?;
        Ok(SubjectKey {
            subject_type: ty.parse()?,
            id: id.to_string(),
        })
    }
}

/// A user, device or group being audited
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    #[serde(rename = "type")]
    pub subject_type: SubjectType,
    pub id: String,
    /// Display label (user principal name, device name, group name)
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
}

impl Subject {
    pub fn new(subject_type: SubjectType, id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            subject_type,
            id: id.into(),
            label: label.into(),
            subtitle: None,
        }
    }

    pub fn user(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(SubjectType::User, id, label)
    }

    pub fn device(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(SubjectType::Device, id, label)
    }

    pub fn group(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(SubjectType::Group, id, label)
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn key(&self) -> SubjectKey {
        SubjectKey {
            subject_type: self.subject_type,
            id: self.id.clone(),
        }
    }

    /// Label if known, otherwise the raw id
    pub fn display_label(&self) -> &str {
        if self.label.trim().is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

/// Subjects are equal when their `(type, id)` keys are equal
impl PartialEq for Subject {
    fn eq(&self, other: &Self) -> bool {
        self.subject_type == other.subject_type && self.id == other.id
    }
}

impl Eq for Subject {}

impl std::hash::Hash for Subject {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.subject_type.hash(state);
        self.id.hash(state);
    }
}
