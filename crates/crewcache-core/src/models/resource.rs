use serde::{Deserialize, Serialize};

/// A file made available to volunteers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: i64,
    pub name: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size_bytes: Option<u64>,
    pub url: String,
    pub project_id: Option<i64>,
    pub uploaded_at: Option<String>,
}

impl Resource {
    pub fn size_display(&self) -> String {
        let bytes = match self.size_bytes {
            Some(bytes) => bytes,
            None => return "-".to_string(),
        };
        if bytes < 1024 {
            format!("{} B", bytes)
        } else if bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        } else {
            format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResource {
    pub name: String,
    pub file_name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
}
