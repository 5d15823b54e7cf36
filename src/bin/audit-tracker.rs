//! audit-tracker CLI: operator interface to the task workflow.

use std::path::PathBuf;
use std::sync::Arc;

use audit_tracker::config::Config;
use audit_tracker::db::Db;
use audit_tracker::engine::TaskWorkflowEngine;
use audit_tracker::model::{
    Action, Frequency, NewTask, ObservationStatus, Priority, Role, Status, Task, TaskId, User,
    UserId,
};
use audit_tracker::notify::{FanoutSink, NotificationSink, TracingSink};
use audit_tracker::telemetry::{TelemetryConfig, init_telemetry};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;

#[derive(Parser)]
#[command(name = "audit-tracker", about = "Maker-checker workflow for audit tasks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run database migrations
    Migrate,
    /// User directory operations
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Task operations
    Task {
        /// Id of the user performing the operation
        #[arg(long = "as", global = true)]
        actor: Option<String>,
        #[command(subcommand)]
        action: TaskAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Add or update a user
    Add {
        id: String,
        name: String,
        email: String,
        /// Primary role (admin, maker, checker1, checker2)
        #[arg(long)]
        role: String,
        /// Additional roles (not allowed with admin)
        #[arg(long = "extra-role")]
        extra_roles: Vec<String>,
    },
    /// List users
    List,
}

#[derive(Subcommand)]
enum TaskAction {
    /// Create a task (admin)
    Create {
        name: String,
        #[arg(long)]
        maker: String,
        #[arg(long)]
        checker1: String,
        #[arg(long)]
        checker2: String,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: NaiveDate,
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long, default_value = "monthly")]
        frequency: String,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        recurring: bool,
    },
    /// Import tasks from a TOML file (admin)
    Import { file: PathBuf },
    /// List tasks visible to the acting user
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
    },
    /// Show a task
    Show { id: String },
    /// Apply a workflow action (start, submit, checker1-approve, checker2-approve, reject)
    Transition {
        id: String,
        action: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Set the observation status (yes, no, mixed) before submitting
    Observe { id: String, observation: String },
    /// Overdue and rejected tasks visible to the acting user
    Escalations,
    /// Task counts per status
    Summary,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "audit-tracker".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Arc::new(
        Db::connect_with(
            config.database_url.expose_secret(),
            config.database_max_connections,
        )
        .await?,
    );
    db.migrate().await?;

    match cli.command {
        Command::Migrate => {
            println!("Migrations applied.");
            Ok(())
        }
        Command::User { action } => match action {
            UserAction::Add {
                id,
                name,
                email,
                role,
                extra_roles,
            } => cmd_user_add(&db, id, name, email, role, extra_roles).await,
            UserAction::List => cmd_user_list(&db).await,
        },
        Command::Task { actor, action } => {
            let actor = actor.ok_or_else(|| anyhow::anyhow!("--as <user-id> is required"))?;
            let user = db.get_user(&UserId(actor)).await?;
            let sinks: Vec<Box<dyn NotificationSink>> =
                vec![Box::new(TracingSink), Box::new(Arc::clone(&db))];
            let engine = TaskWorkflowEngine::new(db.clone(), Arc::new(FanoutSink::new(sinks)));
            cmd_task(&engine, &user, action).await
        }
    }
}

async fn cmd_user_add(
    db: &Db,
    id: String,
    name: String,
    email: String,
    role: String,
    extra_roles: Vec<String>,
) -> anyhow::Result<()> {
    let role: Role = role.parse()?;
    let extra = extra_roles
        .iter()
        .map(|r| r.parse::<Role>())
        .collect::<Result<Vec<_>, _>>()?;
    let user = User::new(id, name, email, role, extra)?;
    db.upsert_user(&user).await?;
    println!("Saved user {} ({})", user.id, user.role);
    Ok(())
}

async fn cmd_user_list(db: &Db) -> anyhow::Result<()> {
    let users = db.list_users().await?;
    println!("{:<16}  {:<10}  {:<24}  EMAIL", "ID", "ROLE", "NAME");
    println!("{}", "-".repeat(80));
    for user in &users {
        println!(
            "{:<16}  {:<10}  {:<24}  {}",
            user.id, user.role, user.name, user.email
        );
    }
    println!("\n{} user(s)", users.len());
    Ok(())
}

async fn cmd_task(
    engine: &TaskWorkflowEngine,
    user: &User,
    action: TaskAction,
) -> anyhow::Result<()> {
    match action {
        TaskAction::Create {
            name,
            maker,
            checker1,
            checker2,
            due,
            priority,
            frequency,
            category,
            description,
            recurring,
        } => {
            let new = NewTask::new(name, due, maker, checker1, checker2)
                .priority(priority.parse::<Priority>()?)
                .frequency(frequency.parse::<Frequency>()?)
                .category(category)
                .description(description)
                .recurring(recurring);
            let task = engine.create_task(user, new).await?;
            println!("Created: {} (status: {})", task.id, task.status);
            Ok(())
        }
        TaskAction::Import { file } => {
            let batch = audit_tracker::import::load_tasks(&file)?;
            let created = engine.import_tasks(user, batch).await?;
            for task in &created {
                println!("Created: {}  {}", task.id, task.name);
            }
            println!("\n{} task(s) imported", created.len());
            Ok(())
        }
        TaskAction::List { status } => {
            let tasks = match status {
                Some(s) => {
                    let status: Status = s.parse()?;
                    engine.list_visible_tasks_in(user, status).await?
                }
                None => engine.list_visible_tasks(user).await?,
            };
            print_task_table(&tasks);
            Ok(())
        }
        TaskAction::Show { id } => {
            let task = engine.get_visible_task(user, &TaskId(id)).await?;
            print_task(&task, &engine.available_actions(user, &task));
            Ok(())
        }
        TaskAction::Transition {
            id,
            action,
            comment,
        } => {
            let action: Action = action.parse()?;
            let task = engine
                .apply_transition(user, &TaskId(id), action, comment.as_deref())
                .await?;
            println!("{}: {} -> {}", task.id, action, task.status);
            Ok(())
        }
        TaskAction::Observe { id, observation } => {
            let observation: ObservationStatus = observation.parse()?;
            let task = engine
                .set_observation_status(user, &TaskId(id), observation)
                .await?;
            println!("{}: observation status {}", task.id, observation);
            Ok(())
        }
        TaskAction::Escalations => {
            let escalations = engine.escalations(user, Utc::now()).await?;
            if escalations.is_empty() {
                println!("Nothing to escalate.");
                return Ok(());
            }
            println!("{:<36}  {:<12}  {:<9}  {:<5}  NAME", "ID", "STATUS", "REASON", "DAYS");
            println!("{}", "-".repeat(100));
            for e in &escalations {
                println!(
                    "{:<36}  {:<12}  {:<9}  {:<5}  {}",
                    e.task.id,
                    e.task.status,
                    e.reason.as_str(),
                    e.days_overdue,
                    e.task.name
                );
            }
            Ok(())
        }
        TaskAction::Summary => {
            let summary = engine.status_summary(user).await?;
            for (status, count) in &summary {
                println!("{:<18}  {count}", status.to_string());
            }
            println!("{:<18}  {}", "total", summary.values().sum::<usize>());
            Ok(())
        }
    }
}

fn print_task_table(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks found.");
        return;
    }

    println!(
        "{:<36}  {:<18}  {:<6}  {:<10}  NAME",
        "ID", "STATUS", "PRI", "DUE"
    );
    println!("{}", "-".repeat(100));

    for task in tasks {
        println!(
            "{:<36}  {:<18}  {:<6}  {:<10}  {}",
            task.id,
            task.status,
            task.priority,
            task.due_date.format("%Y-%m-%d"),
            task.name
        );
    }

    println!("\n{} task(s)", tasks.len());
}

fn print_task(task: &Task, actions: &[Action]) {
    println!("ID:          {}", task.id);
    println!("Name:        {}", task.name);
    println!("Status:      {}", task.status);
    println!("Category:    {}", if task.category.is_empty() { "-" } else { &task.category });
    println!("Priority:    {}", task.priority);
    println!(
        "Frequency:   {}{}",
        task.frequency,
        if task.is_recurring { " (recurring)" } else { "" }
    );
    println!("Due:         {}", task.due_date);
    println!(
        "Observation: {}",
        task.observation_status
            .map(|o| o.to_string())
            .unwrap_or("-".to_string())
    );
    println!("Maker:       {}", task.assigned_to);
    println!("Checker 1:   {}", task.checker1);
    println!("Checker 2:   {}", task.checker2);
    println!("Created:     {}", task.created_at);
    println!("Updated:     {}", task.updated_at);
    if let Some(submitted) = task.submitted_at {
        println!("Submitted:   {submitted}");
    }
    println!("Version:     {}", task.version);
    if !task.description.is_empty() {
        println!("---\n{}", task.description);
    }
    if !task.comments.is_empty() {
        println!("--- comments");
        for c in &task.comments {
            println!("[{}] {}: {}", c.created_at.format("%Y-%m-%d %H:%M"), c.author_id, c.text);
        }
    }
    if !task.attachments.is_empty() {
        println!("--- attachments");
        for a in &task.attachments {
            println!("{} ({} bytes, {})", a.file_name, a.size_bytes, a.content_type);
        }
    }
    let actions: Vec<&str> = actions.iter().map(|a| a.as_str()).collect();
    println!(
        "Actions:     {}",
        if actions.is_empty() { "-".to_string() } else { actions.join(", ") }
    );
}
