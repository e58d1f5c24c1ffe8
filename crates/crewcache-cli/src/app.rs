//! Session handling and command dispatch.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crewcache_core::api::ApiClient;
use crewcache_core::auth::{CredentialStore, Session};
use crewcache_core::cache::QueryClient;
use crewcache_core::config::{Config, ENV_PASSWORD};
use crewcache_core::models::{NewWorkLog, ProjectFilter, UserFilter, WorkLogFilter};
use crewcache_core::queries::Queries;

use crate::command::{Command, USAGE};
use crate::render;

pub struct App {
    config: Config,
    session: Session,
    api: ApiClient,
    queries: Option<Queries>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        let mut session = Session::new(cache_dir);
        if let Err(e) = session.load() {
            warn!(error = %e, "Ignoring unreadable session file");
        }

        let mut api = ApiClient::new(&config.api_base_url)?;
        if let Some(token) = session.token() {
            api.set_token(token.to_string());
        }

        Ok(Self {
            config,
            session,
            api,
            queries: None,
        })
    }

    pub async fn run(&mut self, command: Command) -> Result<()> {
        if command.needs_session() && !self.session.is_valid() {
            return Err(anyhow!("Not signed in. Run `crewcache login` first."));
        }
        if let Some(data) = self.session.data.as_ref() {
            if data.needs_refresh() {
                eprintln!(
                    "Session expires in {} minutes; run `crewcache login` to renew.",
                    data.minutes_until_expiry()
                );
            }
        }

        match command {
            Command::Help => {
                print!("{}", USAGE);
                Ok(())
            }
            Command::Login => self.login_interactive().await,
            Command::Logout => self.logout(),
            Command::Status => {
                self.print_status();
                Ok(())
            }
            other => self.run_query(other).await,
        }
    }

    // ===== Session =====

    fn prompt_username() -> Result<String> {
        print!("Username: ");
        io::stdout().flush()?;
        let mut username = String::new();
        io::stdin().read_line(&mut username)?;
        Ok(username.trim().to_string())
    }

    fn prompt_password() -> Result<String> {
        rpassword::prompt_password("Password: ").context("Failed to read password")
    }

    pub async fn login_interactive(&mut self) -> Result<()> {
        println!("\n=== crewcache login ===\n");

        let username = match self.config.last_username.clone() {
            Some(last_user) => {
                print!("Username [{}]: ", last_user);
                io::stdout().flush()?;
                let mut input = String::new();
                io::stdin().read_line(&mut input)?;
                let input = input.trim();
                if input.is_empty() {
                    last_user
                } else {
                    input.to_string()
                }
            }
            None => Self::prompt_username()?,
        };

        let from_env = std::env::var(ENV_PASSWORD).ok().filter(|p| !p.is_empty());
        let password = match from_env {
            Some(password) => password,
            None if CredentialStore::has_credentials(&username) => {
                print!("Use stored password? [Y/n]: ");
                io::stdout().flush()?;
                let mut input = String::new();
                io::stdin().read_line(&mut input)?;
                if input.trim().to_lowercase() != "n" {
                    CredentialStore::get_password(&username)?
                } else {
                    Self::prompt_password()?
                }
            }
            None => Self::prompt_password()?,
        };

        println!("\nAuthenticating...");
        let session_data = self.api.authenticate(&username, &password).await?;

        if let Err(e) = CredentialStore::store(&username, &password) {
            warn!(error = %e, "Could not store password in keychain");
        }

        self.config.last_username = Some(username);
        self.config.save()?;

        self.api.set_token(session_data.token.clone());
        self.session.update(session_data);
        self.session.save()?;

        println!("Login successful!\n");
        Ok(())
    }

    fn logout(&mut self) -> Result<()> {
        if let Some(queries) = self.queries.take() {
            queries.cache().teardown();
        }
        let username = self.session.data.as_ref().map(|d| d.username.clone());
        self.session.clear()?;
        if let Some(username) = username {
            CredentialStore::delete(&username)?;
            info!(username = %username, "Logged out");
        }
        println!("Signed out.");
        Ok(())
    }

    fn print_status(&self) {
        match self.session.data.as_ref() {
            Some(data) if !data.is_expired() => println!(
                "Signed in as {} (user {}) at {}, session expires in {} minutes",
                data.username,
                data.user_id,
                self.api.base_url(),
                data.minutes_until_expiry()
            ),
            _ => println!("Not signed in ({})", self.api.base_url()),
        }
    }

    /// The session's query client, created on first use
    fn queries(&mut self) -> &Queries {
        let api = &self.api;
        let config = &self.config;
        self.queries.get_or_insert_with(|| {
            Queries::new(
                api.clone(),
                QueryClient::new(config.freshness_policy()),
                config.retry_policy(),
            )
        })
    }

    fn user_id(&self) -> Result<i64> {
        self.session
            .user_id()
            .ok_or_else(|| anyhow!("Not signed in"))
    }

    // ===== Queries and mutations =====

    async fn run_query(&mut self, command: Command) -> Result<()> {
        let user_id = self.user_id()?;
        let queries = self.queries().clone();

        match command {
            Command::Users => {
                let users = queries.users(&UserFilter::default()).await?;
                render::users(&users);
            }
            Command::User(id) => {
                let user = queries.user(id).await?;
                render::user(&user);
            }
            Command::Projects { status } => {
                let filter = ProjectFilter {
                    status,
                    search: None,
                };
                let projects = queries.projects(&filter).await?;
                render::projects(&projects);
            }
            Command::Project(id) => {
                let project = queries.project(id).await?;
                render::project(&project);
            }
            Command::Assign {
                project_id,
                user_id,
            } => {
                queries.assign_volunteer(project_id, user_id).await?;
                // Detail key was staled, so this refetches
                let project = queries.project(project_id).await?;
                println!("Assigned user {} to {}.", user_id, project.name);
                render::project(&project);
            }
            Command::Unassign {
                project_id,
                user_id,
            } => {
                queries.unassign_volunteer(project_id, user_id).await?;
                let project = queries.project(project_id).await?;
                println!("Removed user {} from {}.", user_id, project.name);
                render::project(&project);
            }
            Command::DeleteProject(id) => {
                queries.delete_project(id).await?;
                println!("Deleted project {}.", id);
            }
            Command::Skills => {
                let skills = queries.skills().await?;
                render::skills(&skills);
            }
            Command::UserSkills(id) => {
                let skills = queries.user_skills(id).await?;
                render::user_skills(&skills);
            }
            Command::AssignSkill { user_id, skill_id } => {
                queries.assign_skill(user_id, skill_id, None).await?;
                let skills = queries.user_skills(user_id).await?;
                render::user_skills(&skills);
            }
            Command::RemoveSkill { user_id, skill_id } => {
                queries.remove_skill(user_id, skill_id).await?;
                let skills = queries.user_skills(user_id).await?;
                render::user_skills(&skills);
            }
            Command::Activities { project_id } => {
                let activities = match project_id {
                    Some(id) => queries.project_activities(id).await?,
                    None => queries.activities().await?,
                };
                render::activities(&activities);
            }
            Command::Resources => {
                let resources = queries.resources().await?;
                render::resources(&resources);
            }
            Command::WorkLogs { user_id } => {
                let logs = match user_id {
                    Some(id) => queries.user_work_logs(id).await?,
                    None => queries.work_logs(&WorkLogFilter::default()).await?,
                };
                render::work_logs(&logs);
            }
            Command::LogWork {
                project_id,
                hours,
                note,
            } => {
                let log = NewWorkLog {
                    user_id,
                    project_id,
                    activity_id: None,
                    hours,
                    date: Utc::now().format("%Y-%m-%d").to_string(),
                    note,
                };
                queries.log_work(&log).await?;
                let logs = queries.user_work_logs(user_id).await?;
                render::work_logs(&logs);
            }
            Command::Watch { interval_secs } => {
                watch(&queries, Duration::from_secs(interval_secs)).await?;
            }
            Command::Login | Command::Logout | Command::Status | Command::Help => {}
        }
        Ok(())
    }
}

/// Refresh the main lists on an interval and print every cache event until
/// interrupted.
async fn watch(queries: &Queries, interval: Duration) -> Result<()> {
    let mut events = queries.cache().subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => render::event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    println!("  ... {} events skipped", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    println!("Watching every {}s, Ctrl-C to stop.", interval.as_secs());
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => refresh_round(queries).await,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    printer.abort();
    queries.cache().teardown();
    Ok(())
}

async fn refresh_round(queries: &Queries) {
    let projects = queries.projects_state(&ProjectFilter::default()).await;
    let users = queries.users(&UserFilter::default()).await;
    let skills = queries.skills().await;

    let count = |n: Option<usize>| n.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
    println!(
        "[{}] projects: {} ({}), users: {}, skills: {}",
        Utc::now().format("%H:%M:%S"),
        count(projects.data.as_ref().map(Vec::len)),
        projects.status,
        count(users.as_ref().ok().map(Vec::len)),
        count(skills.as_ref().ok().map(Vec::len)),
    );
    for error in [projects.error.as_ref(), users.as_ref().err(), skills.as_ref().err()]
        .into_iter()
        .flatten()
    {
        println!("  error: {}", error);
    }
}
