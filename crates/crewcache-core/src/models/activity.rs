use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub scheduled_at: Option<String>,
    pub duration_hours: Option<f64>,
}

impl Activity {
    pub fn duration_display(&self) -> String {
        match self.duration_hours {
            Some(hours) => format!("{:.1}h", hours),
            None => "-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActivity {
    pub project_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_activity() {
        let json = r#"{"id": 12, "projectId": 7, "name": "Trail sweep", "description": null, "scheduledAt": "2024-05-02T09:00:00Z", "durationHours": 2.5}"#;
        let activity: Activity = serde_json::from_str(json).unwrap();
        assert_eq!(activity.project_id, 7);
        assert_eq!(activity.duration_display(), "2.5h");
    }

    #[test]
    fn test_new_activity_is_camel_case() {
        let body = serde_json::to_value(NewActivity {
            project_id: 7,
            name: "Setup".to_string(),
            description: None,
            scheduled_at: None,
            duration_hours: Some(1.0),
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"projectId": 7, "name": "Setup", "durationHours": 1.0})
        );
    }
}
