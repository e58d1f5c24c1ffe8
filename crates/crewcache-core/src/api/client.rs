//! API client for the volunteer management REST API.
//!
//! This module provides the `ApiClient` struct, with one method per
//! (entity, operation) pair. Responses are deserialized into the models in
//! `crate::models`; non-success statuses become `ApiError`s.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::{header, Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::auth::SessionData;
use crate::cache::Params;
use crate::models::{
    Activity, ActivityUpdate, NewActivity, NewProject, NewResource, NewSkill, NewUser, NewWorkLog,
    Project, ProjectUpdate, Resource, Skill, User, UserSkill, UserUpdate, WorkLog, WorkLogUpdate,
};
use crate::models::skill::AssignSkillRequest;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    token: String,
    user_id: i64,
}

/// API client for the volunteer management service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client for the service at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Authenticate and return session data
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<SessionData> {
        let url = self.endpoint("/auth/login");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .context("Failed to send authentication request")?;

        let response = Self::check_response(response).await?;
        let auth: AuthResponse = response.json().await.context("Failed to parse auth response")?;

        Ok(SessionData {
            token: auth.token,
            user_id: auth.user_id,
            username: username.to_string(),
            created_at: Utc::now(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn query_pairs(params: &Params) -> Vec<(String, String)> {
        params.iter().map(|(k, v)| (k.clone(), v.to_string())).collect()
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: reqwest::Response) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Send a request, backing off and retrying while the server answers 429.
    async fn send<B: Serialize>(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut request = self
                .client
                .request(method.clone(), url)
                .headers(self.auth_headers()?)
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(%method, url, "Sending request");
            let response = request
                .send()
                .await
                .with_context(|| format!("Failed to send {} request to {}", method, url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &Params) -> Result<T> {
        let url = self.endpoint(path);
        let response = self
            .send::<()>(Method::GET, &url, &Self::query_pairs(params), None)
            .await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    async fn write<T: DeserializeOwned, B: Serialize>(&self, method: Method, path: &str, body: &B) -> Result<T> {
        let url = self.endpoint(path);
        let response = self.send(method, &url, &[], Some(body)).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.write(Method::POST, path, body).await
    }

    async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.write(Method::PUT, path, body).await
    }

    /// DELETE, ignoring any response body
    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.endpoint(path);
        self.send::<()>(Method::DELETE, &url, &[], None).await?;
        Ok(())
    }

    // ===== Users =====

    pub async fn fetch_users(&self, params: &Params) -> Result<Vec<User>> {
        self.get("/users", params).await.context("Failed to fetch users")
    }

    pub async fn fetch_user(&self, id: i64) -> Result<User> {
        self.get(&format!("/users/{}", id), &Params::new())
            .await
            .with_context(|| format!("Failed to fetch user {}", id))
    }

    pub async fn fetch_current_user(&self) -> Result<User> {
        self.get("/users/me", &Params::new())
            .await
            .context("Failed to fetch current user")
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<User> {
        self.post("/users", user).await.context("Failed to create user")
    }

    pub async fn update_user(&self, id: i64, update: &UserUpdate) -> Result<User> {
        self.put(&format!("/users/{}", id), update)
            .await
            .with_context(|| format!("Failed to update user {}", id))
    }

    pub async fn delete_user(&self, id: i64) -> Result<()> {
        self.delete(&format!("/users/{}", id))
            .await
            .with_context(|| format!("Failed to delete user {}", id))
    }

    pub async fn update_profile(&self, update: &UserUpdate) -> Result<User> {
        self.put("/users/me", update).await.context("Failed to update profile")
    }

    // ===== Projects =====

    pub async fn fetch_projects(&self, params: &Params) -> Result<Vec<Project>> {
        self.get("/projects", params).await.context("Failed to fetch projects")
    }

    pub async fn fetch_project(&self, id: i64) -> Result<Project> {
        self.get(&format!("/projects/{}", id), &Params::new())
            .await
            .with_context(|| format!("Failed to fetch project {}", id))
    }

    pub async fn create_project(&self, project: &NewProject) -> Result<Project> {
        self.post("/projects", project).await.context("Failed to create project")
    }

    pub async fn update_project(&self, id: i64, update: &ProjectUpdate) -> Result<Project> {
        self.put(&format!("/projects/{}", id), update)
            .await
            .with_context(|| format!("Failed to update project {}", id))
    }

    pub async fn delete_project(&self, id: i64) -> Result<()> {
        self.delete(&format!("/projects/{}", id))
            .await
            .with_context(|| format!("Failed to delete project {}", id))
    }

    pub async fn assign_volunteer(&self, project_id: i64, user_id: i64) -> Result<Project> {
        self.post(
            &format!("/projects/{}/volunteers", project_id),
            &json!({ "userId": user_id }),
        )
        .await
        .with_context(|| format!("Failed to assign user {} to project {}", user_id, project_id))
    }

    pub async fn unassign_volunteer(&self, project_id: i64, user_id: i64) -> Result<()> {
        self.delete(&format!("/projects/{}/volunteers/{}", project_id, user_id))
            .await
            .with_context(|| format!("Failed to remove user {} from project {}", user_id, project_id))
    }

    // ===== Activities =====

    pub async fn fetch_activities(&self, params: &Params) -> Result<Vec<Activity>> {
        self.get("/activities", params).await.context("Failed to fetch activities")
    }

    pub async fn fetch_project_activities(&self, project_id: i64) -> Result<Vec<Activity>> {
        self.get(&format!("/projects/{}/activities", project_id), &Params::new())
            .await
            .with_context(|| format!("Failed to fetch activities for project {}", project_id))
    }

    pub async fn fetch_activity(&self, id: i64) -> Result<Activity> {
        self.get(&format!("/activities/{}", id), &Params::new())
            .await
            .with_context(|| format!("Failed to fetch activity {}", id))
    }

    pub async fn create_activity(&self, activity: &NewActivity) -> Result<Activity> {
        self.post("/activities", activity).await.context("Failed to create activity")
    }

    pub async fn update_activity(&self, id: i64, update: &ActivityUpdate) -> Result<Activity> {
        self.put(&format!("/activities/{}", id), update)
            .await
            .with_context(|| format!("Failed to update activity {}", id))
    }

    pub async fn delete_activity(&self, id: i64) -> Result<()> {
        self.delete(&format!("/activities/{}", id))
            .await
            .with_context(|| format!("Failed to delete activity {}", id))
    }

    // ===== Skills =====

    pub async fn fetch_skills(&self) -> Result<Vec<Skill>> {
        self.get("/skills", &Params::new()).await.context("Failed to fetch skills")
    }

    pub async fn create_skill(&self, skill: &NewSkill) -> Result<Skill> {
        self.post("/skills", skill).await.context("Failed to create skill")
    }

    pub async fn delete_skill(&self, id: i64) -> Result<()> {
        self.delete(&format!("/skills/{}", id))
            .await
            .with_context(|| format!("Failed to delete skill {}", id))
    }

    pub async fn fetch_user_skills(&self, user_id: i64) -> Result<Vec<UserSkill>> {
        self.get(&format!("/users/{}/skills", user_id), &Params::new())
            .await
            .with_context(|| format!("Failed to fetch skills for user {}", user_id))
    }

    pub async fn assign_skill(&self, user_id: i64, skill_id: i64, level: Option<String>) -> Result<UserSkill> {
        let request = AssignSkillRequest { skill_id, level };
        self.post(&format!("/users/{}/skills", user_id), &request)
            .await
            .with_context(|| format!("Failed to assign skill {} to user {}", skill_id, user_id))
    }

    pub async fn remove_skill(&self, user_id: i64, skill_id: i64) -> Result<()> {
        self.delete(&format!("/users/{}/skills/{}", user_id, skill_id))
            .await
            .with_context(|| format!("Failed to remove skill {} from user {}", skill_id, user_id))
    }

    // ===== Resources =====

    pub async fn fetch_resources(&self) -> Result<Vec<Resource>> {
        self.get("/resources", &Params::new())
            .await
            .context("Failed to fetch resources")
    }

    pub async fn fetch_resource(&self, id: i64) -> Result<Resource> {
        self.get(&format!("/resources/{}", id), &Params::new())
            .await
            .with_context(|| format!("Failed to fetch resource {}", id))
    }

    pub async fn create_resource(&self, resource: &NewResource) -> Result<Resource> {
        self.post("/resources", resource).await.context("Failed to create resource")
    }

    pub async fn delete_resource(&self, id: i64) -> Result<()> {
        self.delete(&format!("/resources/{}", id))
            .await
            .with_context(|| format!("Failed to delete resource {}", id))
    }

    // ===== Work Logs =====

    pub async fn fetch_work_logs(&self, params: &Params) -> Result<Vec<WorkLog>> {
        self.get("/work-logs", params).await.context("Failed to fetch work logs")
    }

    pub async fn fetch_user_work_logs(&self, user_id: i64) -> Result<Vec<WorkLog>> {
        self.get(&format!("/users/{}/work-logs", user_id), &Params::new())
            .await
            .with_context(|| format!("Failed to fetch work logs for user {}", user_id))
    }

    pub async fn fetch_work_log(&self, id: i64) -> Result<WorkLog> {
        self.get(&format!("/work-logs/{}", id), &Params::new())
            .await
            .with_context(|| format!("Failed to fetch work log {}", id))
    }

    pub async fn log_work(&self, log: &NewWorkLog) -> Result<WorkLog> {
        self.post("/work-logs", log).await.context("Failed to log work")
    }

    pub async fn update_work_log(&self, id: i64, update: &WorkLogUpdate) -> Result<WorkLog> {
        self.put(&format!("/work-logs/{}", id), update)
            .await
            .with_context(|| format!("Failed to update work log {}", id))
    }

    pub async fn delete_work_log(&self, id: i64) -> Result<()> {
        self.delete(&format!("/work-logs/{}", id))
            .await
            .with_context(|| format!("Failed to delete work log {}", id))
    }
}
