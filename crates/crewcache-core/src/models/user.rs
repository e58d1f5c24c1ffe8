use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::{ParamValue, Params};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Coordinator,
    Volunteer,
    #[serde(other)]
    Unknown,
}

impl UserRole {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "admin" => Some(UserRole::Admin),
            "coordinator" => Some(UserRole::Coordinator),
            "volunteer" => Some(UserRole::Volunteer),
            _ => None,
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "Admin"),
            UserRole::Coordinator => write!(f, "Coordinator"),
            UserRole::Volunteer => write!(f, "Volunteer"),
            UserRole::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: UserRole,
    pub phone: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub created_at: Option<String>,
}

fn default_active() -> bool {
    true
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// "Last, First" for sorted listings
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: UserRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Partial update; absent fields are left unchanged by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub active: Option<bool>,
    pub search: Option<String>,
}

impl UserFilter {
    pub fn params(&self) -> Params {
        let mut params = Params::new();
        if let Some(role) = self.role {
            params.insert("role".to_string(), ParamValue::from(role.to_string().to_lowercase()));
        }
        if let Some(active) = self.active {
            params.insert("active".to_string(), ParamValue::from(active));
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
    fn test_parse_user() {
        let json = r#"{"id": 3, "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.org", "role": "coordinator", "phone": null, "createdAt": "2024-03-01T10:00:00Z"}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.full_name(), "Ada Lovelace");
        assert_eq!(user.display_name(), "Lovelace, Ada");
        assert_eq!(user.role, UserRole::Coordinator);
        assert!(user.active);
    }

    #[test]
    fn test_unknown_role() {
        let json = r#"{"id": 1, "firstName": "A", "lastName": "B", "email": "a@b", "role": "auditor"}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.role, UserRole::Unknown);
    }

    #[test]
    fn test_update_skips_absent_fields() {
        let update = UserUpdate {
            email: Some("new@example.org".to_string()),
            ..Default::default()
        };
        let body = serde_json::to_value(&update).unwrap();
        assert_eq!(body, serde_json::json!({"email": "new@example.org"}));
    }

    #[test]
    fn test_filter_params() {
        let filter = UserFilter {
            role: Some(UserRole::Volunteer),
            search: Some(String::new()),
            ..Default::default()
        };
        let params = filter.params();
        assert_eq!(params.get("role"), Some(&ParamValue::from("volunteer")));
        assert!(UserFilter::default().params().is_empty());
    }
}
