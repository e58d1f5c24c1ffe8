//! Plain-text rendering of query results.

use crewcache_core::cache::CacheEvent;
use crewcache_core::models::{
    total_hours, Activity, Project, Resource, Skill, User, UserSkill, WorkLog,
};
use crewcache_core::utils::{format_date, format_hours, format_optional, truncate_string};

const NAME_WIDTH: usize = 28;

fn empty(what: &str) {
    println!("No {} found.", what);
}

pub fn users(users: &[User]) {
    if users.is_empty() {
        return empty("users");
    }
    println!("{:>6}  {:<28}  {:<12}  {}", "ID", "NAME", "ROLE", "EMAIL");
    for user in users {
        println!(
            "{:>6}  {:<28}  {:<12}  {}",
            user.id,
            truncate_string(&user.display_name(), NAME_WIDTH),
            user.role,
            user.email
        );
    }
}

pub fn user(user: &User) {
    println!("{} (#{})", user.full_name(), user.id);
    println!("  Role:    {}", user.role);
    println!("  Email:   {}", user.email);
    println!("  Phone:   {}", format_optional(&user.phone, "-"));
    println!("  Active:  {}", if user.active { "yes" } else { "no" });
}

pub fn projects(projects: &[Project]) {
    if projects.is_empty() {
        return empty("projects");
    }
    println!("{:>6}  {:<28}  {:<10}  {:>10}  {}", "ID", "NAME", "STATUS", "VOLUNTEERS", "STARTS");
    for project in projects {
        println!(
            "{:>6}  {:<28}  {:<10}  {:>10}  {}",
            project.id,
            truncate_string(&project.name, NAME_WIDTH),
            project.status,
            project.volunteer_count(),
            project.start_date.as_deref().map(format_date).unwrap_or_default()
        );
    }
}

pub fn project(project: &Project) {
    println!("{} (#{})", project.name, project.id);
    println!("  Status:     {}", project.status);
    println!("  Location:   {}", format_optional(&project.location, "-"));
    println!(
        "  Dates:      {} - {}",
        project.start_date.as_deref().map(format_date).unwrap_or_else(|| "?".to_string()),
        project.end_date.as_deref().map(format_date).unwrap_or_else(|| "?".to_string())
    );
    let ids: Vec<String> = project.volunteer_ids.iter().map(|id| id.to_string()).collect();
    println!(
        "  Volunteers: {}",
        if ids.is_empty() { "none".to_string() } else { ids.join(", ") }
    );
    if let Some(slots) = project.open_slots() {
        println!("  Open slots: {}", slots);
    }
    if let Some(ref description) = project.description {
        println!("\n{}", description);
    }
}

pub fn skills(skills: &[Skill]) {
    if skills.is_empty() {
        return empty("skills");
    }
    for skill in skills {
        println!(
            "{:>6}  {:<28}  {}",
            skill.id,
            truncate_string(&skill.name, NAME_WIDTH),
            format_optional(&skill.description, "")
        );
    }
}

pub fn user_skills(skills: &[UserSkill]) {
    if skills.is_empty() {
        return empty("skills");
    }
    for skill in skills {
        println!(
            "{:>6}  {:<28}  {}",
            skill.skill_id,
            truncate_string(&skill.skill_name, NAME_WIDTH),
            format_optional(&skill.level, "")
        );
    }
}

pub fn activities(activities: &[Activity]) {
    if activities.is_empty() {
        return empty("activities");
    }
    println!("{:>6}  {:>7}  {:<28}  {:<14}  {}", "ID", "PROJECT", "NAME", "WHEN", "DURATION");
    for activity in activities {
        println!(
            "{:>6}  {:>7}  {:<28}  {:<14}  {}",
            activity.id,
            activity.project_id,
            truncate_string(&activity.name, NAME_WIDTH),
            activity.scheduled_at.as_deref().map(format_date).unwrap_or_default(),
            activity.duration_display()
        );
    }
}

pub fn resources(resources: &[Resource]) {
    if resources.is_empty() {
        return empty("resources");
    }
    for resource in resources {
        println!(
            "{:>6}  {:<28}  {:>9}  {}",
            resource.id,
            truncate_string(&resource.name, NAME_WIDTH),
            resource.size_display(),
            resource.url
        );
    }
}

pub fn work_logs(logs: &[WorkLog]) {
    if logs.is_empty() {
        return empty("work logs");
    }
    println!("{:>6}  {:>6}  {:>7}  {:<14}  {:>6}  {}", "ID", "USER", "PROJECT", "DATE", "HOURS", "NOTE");
    for log in logs {
        println!(
            "{:>6}  {:>6}  {:>7}  {:<14}  {:>6}  {}",
            log.id,
            log.user_id,
            log.project_id,
            format_date(&log.date),
            format_hours(log.hours),
            format_optional(&log.note, "")
        );
    }
    println!("Total: {}", format_hours(total_hours(logs)));
}

pub fn event(event: &CacheEvent) {
    match event {
        CacheEvent::Fetching(key) => println!("  fetching {}", key),
        CacheEvent::Updated(key) => println!("  updated  {}", key),
        CacheEvent::Failed(key, error) => println!("  failed   {}: {}", key, error),
        CacheEvent::Stale(keys) => {
            for key in keys {
                println!("  stale    {}", key);
            }
        }
        CacheEvent::Removed(key) => println!("  removed  {}", key),
        CacheEvent::Cleared => println!("  cleared"),
    }
}
