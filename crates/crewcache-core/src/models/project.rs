use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::{ParamValue, Params};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Planned,
    Active,
    Completed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl ProjectStatus {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "planned" => Some(ProjectStatus::Planned),
            "active" => Some(ProjectStatus::Active),
            "completed" => Some(ProjectStatus::Completed),
            "cancelled" | "canceled" => Some(ProjectStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planned => "planned",
            ProjectStatus::Active => "active",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
            ProjectStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub location: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub volunteer_ids: Vec<i64>,
    pub max_volunteers: Option<u32>,
}

impl Project {
    pub fn volunteer_count(&self) -> usize {
        self.volunteer_ids.len()
    }

    pub fn has_volunteer(&self, user_id: i64) -> bool {
        self.volunteer_ids.contains(&user_id)
    }

    /// Remaining volunteer slots, if the project is capped
    pub fn open_slots(&self) -> Option<u32> {
        self.max_volunteers
            .map(|max| max.saturating_sub(self.volunteer_ids.len() as u32))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: ProjectStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_volunteers: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_volunteers: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub search: Option<String>,
}

impl ProjectFilter {
    pub fn params(&self) -> Params {
        let mut params = Params::new();
        if let Some(status) = self.status {
            params.insert("status".to_string(), ParamValue::from(status.as_str()));
        }
        if let Some(ref search) = self.search {
            params.insert("search".to_string(), ParamValue::from(search.as_str()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_project() {
        let json = r#"{"id": 7, "name": "Park cleanup", "description": null, "status": "active", "location": "Riverside", "startDate": "2024-05-01", "endDate": null, "volunteerIds": [3, 4], "maxVolunteers": 5}"#;
        let project: Project = serde_json::from_str(json).unwrap();
        assert_eq!(project.status, ProjectStatus::Active);
        assert_eq!(project.volunteer_count(), 2);
        assert!(project.has_volunteer(3));
        assert_eq!(project.open_slots(), Some(3));
    }

    #[test]
    fn test_missing_volunteers_default_to_empty() {
        let json = r#"{"id": 8, "name": "Food drive", "status": "planned"}"#;
        let project: Project = serde_json::from_str(json).unwrap();
        assert!(project.volunteer_ids.is_empty());
        assert_eq!(project.open_slots(), None);
    }

    #[test]
    fn test_status_from_name() {
        assert_eq!(ProjectStatus::from_name("Active"), Some(ProjectStatus::Active));
        assert_eq!(ProjectStatus::from_name("canceled"), Some(ProjectStatus::Cancelled));
        assert_eq!(ProjectStatus::from_name("archived"), None);
    }

    #[test]
    fn test_filter_params() {
        let filter = ProjectFilter {
            status: Some(ProjectStatus::Active),
            search: None,
        };
        assert_eq!(
            filter.params().get("status"),
            Some(&ParamValue::from("active"))
        );
    }
}
