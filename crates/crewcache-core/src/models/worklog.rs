use serde::{Deserialize, Serialize};

use crate::cache::{ParamValue, Params};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkLog {
    pub id: i64,
    pub user_id: i64,
    pub project_id: i64,
    pub activity_id: Option<i64>,
    pub hours: f64,
    pub date: String,
    pub note: Option<String>,
}

/// Sum of hours across logs
pub fn total_hours(logs: &[WorkLog]) -> f64 {
    logs.iter().map(|log| log.hours).sum()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkLog {
    pub user_id: i64,
    pub project_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<i64>,
    pub hours: f64,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkLogUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Filters for the admin-wide work log list. Per-user logs use a scoped key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkLogFilter {
    pub project_id: Option<i64>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl WorkLogFilter {
    pub fn params(&self) -> Params {
        let mut params = Params::new();
        if let Some(project_id) = self.project_id {
            params.insert("projectId".to_string(), ParamValue::from(project_id));
        }
        if let Some(ref from) = self.from {
            params.insert("from".to_string(), ParamValue::from(from.as_str()));
        }
        if let Some(ref to) = self.to {
            params.insert("to".to_string(), ParamValue::from(to.as_str()));
        }
        params
    }
}
