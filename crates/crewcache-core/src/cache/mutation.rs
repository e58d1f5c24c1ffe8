//! Mutation coordination and the static invalidation table.
//!
//! Each write the client can perform is a `Mutation` variant, and each
//! variant declares which cached keys it makes untrustworthy. Nothing is
//! inferred at call sites: the table below is the whole protocol.

use std::future::Future;

use tracing::{debug, info};

use super::key::{EntityKind, KeyPattern, QueryKey, Scope};
use super::read::ReadCoordinator;
use super::store::Invalidated;

/// Keys to stale and keys to evict once a mutation succeeds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invalidation {
    pub stale: Vec<KeyPattern>,
    pub evict: Vec<QueryKey>,
}

impl Invalidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stale(mut self, pattern: impl Into<KeyPattern>) -> Self {
        self.stale.push(pattern.into());
        self
    }

    pub fn evict(mut self, key: QueryKey) -> Self {
        self.evict.push(key);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stale.is_empty() && self.evict.is_empty()
    }
}

/// Every write operation, with the ids its invalidation depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    CreateUser,
    UpdateUser { id: i64 },
    DeleteUser { id: i64 },
    UpdateProfile { id: i64 },
    CreateProject,
    UpdateProject { id: i64 },
    DeleteProject { id: i64 },
    AssignVolunteer { project_id: i64, user_id: i64 },
    UnassignVolunteer { project_id: i64, user_id: i64 },
    CreateActivity { project_id: i64 },
    UpdateActivity { id: i64 },
    DeleteActivity { id: i64 },
    CreateSkill,
    DeleteSkill { id: i64 },
    AssignSkill { user_id: i64, skill_id: i64 },
    RemoveSkill { user_id: i64, skill_id: i64 },
    CreateResource,
    DeleteResource { id: i64 },
    LogWork { user_id: i64 },
    UpdateWorkLog { id: i64, user_id: i64 },
    DeleteWorkLog { id: i64, user_id: i64 },
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::CreateUser => "create_user",
            Mutation::UpdateUser { .. } => "update_user",
            Mutation::DeleteUser { .. } => "delete_user",
            Mutation::UpdateProfile { .. } => "update_profile",
            Mutation::CreateProject => "create_project",
            Mutation::UpdateProject { .. } => "update_project",
            Mutation::DeleteProject { .. } => "delete_project",
            Mutation::AssignVolunteer { .. } => "assign_volunteer",
            Mutation::UnassignVolunteer { .. } => "unassign_volunteer",
            Mutation::CreateActivity { .. } => "create_activity",
            Mutation::UpdateActivity { .. } => "update_activity",
            Mutation::DeleteActivity { .. } => "delete_activity",
            Mutation::CreateSkill => "create_skill",
            Mutation::DeleteSkill { .. } => "delete_skill",
            Mutation::AssignSkill { .. } => "assign_skill",
            Mutation::RemoveSkill { .. } => "remove_skill",
            Mutation::CreateResource => "create_resource",
            Mutation::DeleteResource { .. } => "delete_resource",
            Mutation::LogWork { .. } => "log_work",
            Mutation::UpdateWorkLog { .. } => "update_work_log",
            Mutation::DeleteWorkLog { .. } => "delete_work_log",
        }
    }

    /// The keys this mutation invalidates on success.
    pub fn invalidation(&self) -> Invalidation {
        use EntityKind::*;
        use KeyPattern::{Kind, Lists};

        let detail = QueryKey::detail;
        let inv = Invalidation::new();

        match *self {
            Mutation::CreateUser => inv.stale(Lists(Users)),
            Mutation::UpdateUser { id } => inv
                .stale(Lists(Users))
                .stale(detail(Users, id))
                .stale(QueryKey::list(CurrentUser)),
            Mutation::DeleteUser { id } => inv
                .stale(Lists(Users))
                .stale(Kind(WorkLogs))
                .evict(detail(Users, id))
                .evict(QueryKey::scoped(UserSkills, Scope::user(id))),
            Mutation::UpdateProfile { id } => inv
                .stale(QueryKey::list(CurrentUser))
                .stale(detail(Users, id))
                .stale(Lists(Users)),

            Mutation::CreateProject => inv.stale(Lists(Projects)),
            Mutation::UpdateProject { id } => inv.stale(Lists(Projects)).stale(detail(Projects, id)),
            Mutation::DeleteProject { id } => inv
                .stale(Lists(Projects))
                .stale(Kind(Activities))
                .stale(Kind(WorkLogs))
                .evict(detail(Projects, id)),
            Mutation::AssignVolunteer { project_id, .. }
            | Mutation::UnassignVolunteer { project_id, .. } => inv
                .stale(Lists(Projects))
                .stale(detail(Projects, project_id)),

            Mutation::CreateActivity { project_id } => inv
                .stale(Lists(Activities))
                .stale(QueryKey::scoped(Activities, Scope::project(project_id)))
                .stale(detail(Projects, project_id)),
            Mutation::UpdateActivity { id } => {
                inv.stale(Lists(Activities)).stale(detail(Activities, id))
            }
            Mutation::DeleteActivity { id } => {
                inv.stale(Lists(Activities)).evict(detail(Activities, id))
            }

            Mutation::CreateSkill => inv.stale(Lists(Skills)),
            Mutation::DeleteSkill { id } => inv
                .stale(Lists(Skills))
                .stale(Kind(UserSkills))
                .evict(detail(Skills, id)),
            // Catalog membership is unchanged, so the global skill list stays valid
            Mutation::AssignSkill { user_id, .. } | Mutation::RemoveSkill { user_id, .. } => {
                inv.stale(QueryKey::scoped(UserSkills, Scope::user(user_id)))
            }

            Mutation::CreateResource => inv.stale(Lists(Resources)),
            Mutation::DeleteResource { id } => {
                inv.stale(Lists(Resources)).evict(detail(Resources, id))
            }

            Mutation::LogWork { user_id } => inv
                .stale(Lists(WorkLogs))
                .stale(QueryKey::scoped(WorkLogs, Scope::user(user_id))),
            Mutation::UpdateWorkLog { id, user_id } => inv
                .stale(Lists(WorkLogs))
                .stale(QueryKey::scoped(WorkLogs, Scope::user(user_id)))
                .stale(detail(WorkLogs, id)),
            Mutation::DeleteWorkLog { id, user_id } => inv
                .stale(Lists(WorkLogs))
                .stale(QueryKey::scoped(WorkLogs, Scope::user(user_id)))
                .evict(detail(WorkLogs, id)),
        }
    }
}

#[derive(Clone)]
pub struct MutationCoordinator {
    reads: ReadCoordinator,
}

impl MutationCoordinator {
    pub fn new(reads: ReadCoordinator) -> Self {
        Self { reads }
    }

    /// Run `operation`; on success apply `invalidation`, on failure leave the
    /// cache untouched and return the error unchanged.
    ///
    /// Invalidated keys are not refetched here; the next read does that.
    pub async fn mutate<R, Fut>(&self, invalidation: &Invalidation, operation: Fut) -> anyhow::Result<R>
    where
        Fut: Future<Output = anyhow::Result<R>>,
    {
        let result = operation.await?;
        let applied = self.apply(invalidation);
        debug!(
            staled = applied.staled.len(),
            removed = applied.removed.len(),
            "Mutation invalidated cache"
        );
        Ok(result)
    }

    /// `mutate` with the invalidation declared by `mutation`.
    pub async fn run<R, Fut>(&self, mutation: Mutation, operation: Fut) -> anyhow::Result<R>
    where
        Fut: Future<Output = anyhow::Result<R>>,
    {
        let invalidation = mutation.invalidation();
        let result = self.mutate(&invalidation, operation).await;
        match &result {
            Ok(_) => info!(mutation = mutation.name(), "Mutation succeeded"),
            Err(e) => info!(mutation = mutation.name(), error = %e, "Mutation failed, cache untouched"),
        }
        result
    }

    fn apply(&self, invalidation: &Invalidation) -> Invalidated {
        if invalidation.is_empty() {
            return Invalidated::default();
        }
        self.reads.invalidate(&invalidation.stale, &invalidation.evict)
    }
}
