//! Query bindings: one function per entity read or write.
//!
//! Reads go through the cache under the key built by [`keys`], with the
//! caller's retry policy. Writes go through the mutation coordinator with the
//! `Mutation` variant that declares what they invalidate.

use crate::api::ApiClient;
use crate::cache::{CacheError, Mutation, QueryClient, QueryKey, QueryState};
use crate::models::{
    Activity, ActivityUpdate, NewActivity, NewProject, NewResource, NewSkill, NewUser, NewWorkLog,
    Project, ProjectFilter, ProjectUpdate, Resource, Skill, User, UserFilter, UserSkill, UserUpdate,
    WorkLog, WorkLogFilter, WorkLogUpdate,
};
use crate::retry::RetryPolicy;

/// Cache keys for every query.
pub mod keys {
    use crate::cache::{EntityKind, QueryKey, Scope};
    use crate::models::{ProjectFilter, UserFilter, WorkLogFilter};

    pub fn users(filter: &UserFilter) -> QueryKey {
        QueryKey::filtered(EntityKind::Users, filter.params())
    }

    pub fn user(id: i64) -> QueryKey {
        QueryKey::detail(EntityKind::Users, id)
    }

    pub fn current_user() -> QueryKey {
        QueryKey::list(EntityKind::CurrentUser)
    }

    pub fn projects(filter: &ProjectFilter) -> QueryKey {
        QueryKey::filtered(EntityKind::Projects, filter.params())
    }

    pub fn project(id: i64) -> QueryKey {
        QueryKey::detail(EntityKind::Projects, id)
    }

    pub fn activities() -> QueryKey {
        QueryKey::list(EntityKind::Activities)
    }

    pub fn project_activities(project_id: i64) -> QueryKey {
        QueryKey::scoped(EntityKind::Activities, Scope::project(project_id))
    }

    pub fn activity(id: i64) -> QueryKey {
        QueryKey::detail(EntityKind::Activities, id)
    }

    pub fn skills() -> QueryKey {
        QueryKey::list(EntityKind::Skills)
    }

    pub fn user_skills(user_id: i64) -> QueryKey {
        QueryKey::scoped(EntityKind::UserSkills, Scope::user(user_id))
    }

    pub fn resources() -> QueryKey {
        QueryKey::list(EntityKind::Resources)
    }

    pub fn resource(id: i64) -> QueryKey {
        QueryKey::detail(EntityKind::Resources, id)
    }

    pub fn work_logs(filter: &WorkLogFilter) -> QueryKey {
        QueryKey::filtered(EntityKind::WorkLogs, filter.params())
    }

    pub fn user_work_logs(user_id: i64) -> QueryKey {
        QueryKey::scoped(EntityKind::WorkLogs, Scope::user(user_id))
    }

    pub fn work_log(id: i64) -> QueryKey {
        QueryKey::detail(EntityKind::WorkLogs, id)
    }
}

/// Reads `$call` on a clone of the API client under `$key`, with retry.
/// Values listed in brackets are cloned into each attempt.
macro_rules! cached {
    ($self:ident, $key:expr, [$($cap:ident),*] |$api:ident| $call:expr) => {{
        let key = $key;
        let client = $self.api.clone();
        $self
            .retry
            .read(&$self.cache, &key, move || {
                let $api = client.clone();
                $(let $cap = $cap.clone();)*
                async move { $call.await }
            })
            .await
    }};
}

/// The API client and query cache of one signed-in session.
#[derive(Clone)]
pub struct Queries {
    api: ApiClient,
    cache: QueryClient,
    retry: RetryPolicy,
}

impl Queries {
    pub fn new(api: ApiClient, cache: QueryClient, retry: RetryPolicy) -> Self {
        Self { api, cache, retry }
    }

    pub fn cache(&self) -> &QueryClient {
        &self.cache
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    // ===== Users =====

    pub async fn users(&self, filter: &UserFilter) -> Result<Vec<User>, CacheError> {
        let key = keys::users(filter);
        let params = key.params().clone();
        cached!(self, key, [params] |api| api.fetch_users(&params))
    }

    pub async fn user(&self, id: i64) -> Result<User, CacheError> {
        cached!(self, keys::user(id), [] |api| api.fetch_user(id))
    }

    pub async fn current_user(&self) -> Result<User, CacheError> {
        cached!(self, keys::current_user(), [] |api| api.fetch_current_user())
    }

    pub async fn create_user(&self, user: &NewUser) -> anyhow::Result<User> {
        self.cache.run(Mutation::CreateUser, self.api.create_user(user)).await
    }

    pub async fn update_user(&self, id: i64, update: &UserUpdate) -> anyhow::Result<User> {
        self.cache
            .run(Mutation::UpdateUser { id }, self.api.update_user(id, update))
            .await
    }

    pub async fn delete_user(&self, id: i64) -> anyhow::Result<()> {
        self.cache
            .run(Mutation::DeleteUser { id }, self.api.delete_user(id))
            .await
    }

    /// Update the signed-in user's own profile; `id` is that user's id.
    pub async fn update_profile(&self, id: i64, update: &UserUpdate) -> anyhow::Result<User> {
        self.cache
            .run(Mutation::UpdateProfile { id }, self.api.update_profile(update))
            .await
    }

    // ===== Projects =====

    pub async fn projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>, CacheError> {
        let key = keys::projects(filter);
        let params = key.params().clone();
        cached!(self, key, [params] |api| api.fetch_projects(&params))
    }

    /// Project list as UI state: a stale list is shown while it refreshes.
    pub async fn projects_state(&self, filter: &ProjectFilter) -> QueryState<Vec<Project>> {
        let key = keys::projects(filter);
        let params = key.params().clone();
        let api = self.api.clone();
        self.cache
            .query(&key, move || async move { api.fetch_projects(&params).await })
            .await
    }

    pub async fn project(&self, id: i64) -> Result<Project, CacheError> {
        cached!(self, keys::project(id), [] |api| api.fetch_project(id))
    }

    pub async fn create_project(&self, project: &NewProject) -> anyhow::Result<Project> {
        self.cache
            .run(Mutation::CreateProject, self.api.create_project(project))
            .await
    }

    pub async fn update_project(&self, id: i64, update: &ProjectUpdate) -> anyhow::Result<Project> {
        self.cache
            .run(Mutation::UpdateProject { id }, self.api.update_project(id, update))
            .await
    }

    pub async fn delete_project(&self, id: i64) -> anyhow::Result<()> {
        self.cache
            .run(Mutation::DeleteProject { id }, self.api.delete_project(id))
            .await
    }

    pub async fn assign_volunteer(&self, project_id: i64, user_id: i64) -> anyhow::Result<Project> {
        self.cache
            .run(
                Mutation::AssignVolunteer {
                    project_id,
                    user_id,
                },
                self.api.assign_volunteer(project_id, user_id),
            )
            .await
    }

    pub async fn unassign_volunteer(&self, project_id: i64, user_id: i64) -> anyhow::Result<()> {
        self.cache
            .run(
                Mutation::UnassignVolunteer {
                    project_id,
                    user_id,
                },
                self.api.unassign_volunteer(project_id, user_id),
            )
            .await
    }

    // ===== Activities =====

    pub async fn activities(&self) -> Result<Vec<Activity>, CacheError> {
        cached!(self, keys::activities(), [] |api| api.fetch_activities(&Default::default()))
    }

    pub async fn project_activities(&self, project_id: i64) -> Result<Vec<Activity>, CacheError> {
        cached!(self, keys::project_activities(project_id), [] |api| {
            api.fetch_project_activities(project_id)
        })
    }

    pub async fn activity(&self, id: i64) -> Result<Activity, CacheError> {
        cached!(self, keys::activity(id), [] |api| api.fetch_activity(id))
    }

    pub async fn create_activity(&self, activity: &NewActivity) -> anyhow::Result<Activity> {
        let mutation = Mutation::CreateActivity {
            project_id: activity.project_id,
        };
        self.cache.run(mutation, self.api.create_activity(activity)).await
    }

    pub async fn update_activity(&self, id: i64, update: &ActivityUpdate) -> anyhow::Result<Activity> {
        self.cache
            .run(Mutation::UpdateActivity { id }, self.api.update_activity(id, update))
            .await
    }

    pub async fn delete_activity(&self, id: i64) -> anyhow::Result<()> {
        self.cache
            .run(Mutation::DeleteActivity { id }, self.api.delete_activity(id))
            .await
    }

    // ===== Skills =====

    pub async fn skills(&self) -> Result<Vec<Skill>, CacheError> {
        cached!(self, keys::skills(), [] |api| api.fetch_skills())
    }

    pub async fn user_skills(&self, user_id: i64) -> Result<Vec<UserSkill>, CacheError> {
        cached!(self, keys::user_skills(user_id), [] |api| api.fetch_user_skills(user_id))
    }

    pub async fn create_skill(&self, skill: &NewSkill) -> anyhow::Result<Skill> {
        self.cache.run(Mutation::CreateSkill, self.api.create_skill(skill)).await
    }

    pub async fn delete_skill(&self, id: i64) -> anyhow::Result<()> {
        self.cache
            .run(Mutation::DeleteSkill { id }, self.api.delete_skill(id))
            .await
    }

    pub async fn assign_skill(
        &self,
        user_id: i64,
        skill_id: i64,
        level: Option<String>,
    ) -> anyhow::Result<UserSkill> {
        self.cache
            .run(
                Mutation::AssignSkill { user_id, skill_id },
                self.api.assign_skill(user_id, skill_id, level),
            )
            .await
    }

    pub async fn remove_skill(&self, user_id: i64, skill_id: i64) -> anyhow::Result<()> {
        self.cache
            .run(
                Mutation::RemoveSkill { user_id, skill_id },
                self.api.remove_skill(user_id, skill_id),
            )
            .await
    }

    // ===== Resources =====

    pub async fn resources(&self) -> Result<Vec<Resource>, CacheError> {
        cached!(self, keys::resources(), [] |api| api.fetch_resources())
    }

    pub async fn resource(&self, id: i64) -> Result<Resource, CacheError> {
        cached!(self, keys::resource(id), [] |api| api.fetch_resource(id))
    }

    pub async fn create_resource(&self, resource: &NewResource) -> anyhow::Result<Resource> {
        self.cache
            .run(Mutation::CreateResource, self.api.create_resource(resource))
            .await
    }

    pub async fn delete_resource(&self, id: i64) -> anyhow::Result<()> {
        self.cache
            .run(Mutation::DeleteResource { id }, self.api.delete_resource(id))
            .await
    }

    // ===== Work Logs =====

    pub async fn work_logs(&self, filter: &WorkLogFilter) -> Result<Vec<WorkLog>, CacheError> {
        let key = keys::work_logs(filter);
        let params = key.params().clone();
        cached!(self, key, [params] |api| api.fetch_work_logs(&params))
    }

    pub async fn user_work_logs(&self, user_id: i64) -> Result<Vec<WorkLog>, CacheError> {
        cached!(self, keys::user_work_logs(user_id), [] |api| api.fetch_user_work_logs(user_id))
    }

    pub async fn work_log(&self, id: i64) -> Result<WorkLog, CacheError> {
        cached!(self, keys::work_log(id), [] |api| api.fetch_work_log(id))
    }

    pub async fn log_work(&self, log: &NewWorkLog) -> anyhow::Result<WorkLog> {
        let mutation = Mutation::LogWork {
            user_id: log.user_id,
        };
        self.cache.run(mutation, self.api.log_work(log)).await
    }

    pub async fn update_work_log(
        &self,
        id: i64,
        user_id: i64,
        update: &WorkLogUpdate,
    ) -> anyhow::Result<WorkLog> {
        self.cache
            .run(
                Mutation::UpdateWorkLog { id, user_id },
                self.api.update_work_log(id, update),
            )
            .await
    }

    pub async fn delete_work_log(&self, id: i64, user_id: i64) -> anyhow::Result<()> {
        self.cache
            .run(
                Mutation::DeleteWorkLog { id, user_id },
                self.api.delete_work_log(id),
            )
            .await
    }

    /// Every key this session currently holds, for display
    pub fn cached_keys(&self) -> Vec<QueryKey> {
        self.cache.store().snapshot().into_keys().collect()
    }
}
