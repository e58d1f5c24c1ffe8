//! Data models for the volunteer management API.
//!
//! Wire names are camelCase; every model maps them with serde.
//!
//! - `User`, `UserRole`: accounts and the signed-in user
//! - `Project`, `ProjectStatus`: projects and their volunteer roster
//! - `Activity`: scheduled work within a project
//! - `Skill`, `UserSkill`: the skill catalog and per-user skills
//! - `Resource`: shared files
//! - `WorkLog`: hours logged by volunteers

pub mod activity;
pub mod project;
pub mod resource;
pub mod skill;
pub mod user;
pub mod worklog;

pub use activity::{Activity, ActivityUpdate, NewActivity};
pub use project::{NewProject, Project, ProjectFilter, ProjectStatus, ProjectUpdate};
pub use resource::{NewResource, Resource};
pub use skill::{NewSkill, Skill, UserSkill};
pub use user::{NewUser, User, UserFilter, UserRole, UserUpdate};
pub use worklog::{total_hours, NewWorkLog, WorkLog, WorkLogFilter, WorkLogUpdate};
