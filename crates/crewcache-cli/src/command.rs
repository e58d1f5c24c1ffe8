//! Command-line argument parsing.

use anyhow::{anyhow, bail, Context, Result};

use crewcache_core::models::ProjectStatus;

/// Seconds between refresh rounds in watch mode
pub const DEFAULT_WATCH_INTERVAL_SECS: u64 = 15;

pub const USAGE: &str = "\
Usage: crewcache <command>

Session:
  login                           Sign in and store the session token
  logout                          Clear the stored session
  status                          Show who is signed in

Users:
  users                           List users
  user <id>                       Show one user

Projects:
  projects [--status S]           List projects (planned, active, completed, cancelled)
  project <id>                    Show one project with its volunteers
  assign <project> <user>         Assign a volunteer to a project
  unassign <project> <user>       Remove a volunteer from a project
  delete-project <id>             Delete a project

Skills:
  skills                          List the skill catalog
  user-skills <user>              List a user's skills
  assign-skill <user> <skill>     Give a user a skill
  remove-skill <user> <skill>     Take a skill from a user

Other:
  activities [project]            List activities, optionally for one project
  resources                       List shared files
  worklogs [user]                 List work logs, optionally for one user
  log-work <project> <hours> [note]
                                  Log hours for the signed-in user
  watch [interval-secs]           Refresh periodically and print cache events
";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login,
    Logout,
    Status,
    Users,
    User(i64),
    Projects { status: Option<ProjectStatus> },
    Project(i64),
    Assign { project_id: i64, user_id: i64 },
    Unassign { project_id: i64, user_id: i64 },
    DeleteProject(i64),
    Skills,
    UserSkills(i64),
    AssignSkill { user_id: i64, skill_id: i64 },
    RemoveSkill { user_id: i64, skill_id: i64 },
    Activities { project_id: Option<i64> },
    Resources,
    WorkLogs { user_id: Option<i64> },
    LogWork { project_id: i64, hours: f64, note: Option<String> },
    Watch { interval_secs: u64 },
    Help,
}

fn id_arg(args: &[String], index: usize, name: &str) -> Result<i64> {
    let raw = args
        .get(index)
        .ok_or_else(|| anyhow!("Missing <{}>", name))?;
    raw.parse()
        .with_context(|| format!("Invalid <{}>: {}", name, raw))
}

fn optional_id_arg(args: &[String], index: usize, name: &str) -> Result<Option<i64>> {
    match args.get(index) {
        Some(_) => id_arg(args, index, name).map(Some),
        None => Ok(None),
    }
}

impl Command {
    /// Parse arguments, excluding the program name.
    pub fn parse(args: &[String]) -> Result<Self> {
        let name = match args.first() {
            Some(name) => name.as_str(),
            None => return Ok(Command::Help),
        };

        let command = match name {
            "login" => Command::Login,
            "logout" => Command::Logout,
            "status" => Command::Status,
            "users" => Command::Users,
            "user" => Command::User(id_arg(args, 1, "id")?),
            "projects" => {
                let status = match args.get(1).map(String::as_str) {
                    Some("--status") => {
                        let raw = args
                            .get(2)
                            .ok_or_else(|| anyhow!("--status needs a value"))?;
                        Some(
                            ProjectStatus::from_name(raw)
                                .ok_or_else(|| anyhow!("Unknown project status: {}", raw))?,
                        )
                    }
                    Some(other) => bail!("Unexpected argument: {}", other),
                    None => None,
                };
                Command::Projects { status }
            }
            "project" => Command::Project(id_arg(args, 1, "id")?),
            "assign" => Command::Assign {
                project_id: id_arg(args, 1, "project")?,
                user_id: id_arg(args, 2, "user")?,
            },
            "unassign" => Command::Unassign {
                project_id: id_arg(args, 1, "project")?,
                user_id: id_arg(args, 2, "user")?,
            },
            "delete-project" => Command::DeleteProject(id_arg(args, 1, "id")?),
            "skills" => Command::Skills,
            "user-skills" => Command::UserSkills(id_arg(args, 1, "user")?),
            "assign-skill" => Command::AssignSkill {
                user_id: id_arg(args, 1, "user")?,
                skill_id: id_arg(args, 2, "skill")?,
            },
            "remove-skill" => Command::RemoveSkill {
                user_id: id_arg(args, 1, "user")?,
                skill_id: id_arg(args, 2, "skill")?,
            },
            "activities" => Command::Activities {
                project_id: optional_id_arg(args, 1, "project")?,
            },
            "resources" => Command::Resources,
            "worklogs" => Command::WorkLogs {
                user_id: optional_id_arg(args, 1, "user")?,
            },
            "log-work" => {
                let project_id = id_arg(args, 1, "project")?;
                let raw = args.get(2).ok_or_else(|| anyhow!("Missing <hours>"))?;
                let hours: f64 = raw
                    .parse()
                    .with_context(|| format!("Invalid <hours>: {}", raw))?;
                if !(hours > 0.0 && hours <= 24.0) {
                    bail!("Hours must be between 0 and 24, got {}", hours);
                }
                let note = if args.len() > 3 {
                    Some(args[3..].join(" "))
                } else {
                    None
                };
                Command::LogWork {
                    project_id,
                    hours,
                    note,
                }
            }
            "watch" => {
                let interval_secs = match args.get(1) {
                    Some(raw) => raw
                        .parse()
                        .with_context(|| format!("Invalid interval: {}", raw))?,
                    None => DEFAULT_WATCH_INTERVAL_SECS,
                };
                if interval_secs == 0 {
                    bail!("Interval must be at least one second");
                }
                Command::Watch { interval_secs }
            }
            "help" | "--help" | "-h" => Command::Help,
            other => bail!("Unknown command: {}\n\n{}", other, USAGE),
        };
        Ok(command)
    }

    /// Whether the command needs a signed-in session
    pub fn needs_session(&self) -> bool {
        !matches!(
            self,
            Command::Login | Command::Logout | Command::Status | Command::Help
        )
    }
}
