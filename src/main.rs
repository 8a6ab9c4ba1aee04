use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;

use taskloop::application::services::scheduler_service::{self, DeletePolicy, Granularity};
use taskloop::application::{RecurrenceScheduler, TaskService};
use taskloop::domain::clock::{Clock, SystemClock};
use taskloop::domain::entities::{Priority, Task, TaskRole};
use taskloop::domain::value_objects::repeat_days;
use taskloop::infrastructure::SqliteTaskRepository;
use taskloop::utils::setup_logging;

const DEFAULT_USER: u64 = 1;

#[derive(Parser)]
#[command(name = "taskloop", about = "Personal task manager with recurring tasks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a one-off task
    Add {
        title: String,
        #[arg(long, value_name = "YYYY-MM-DD")]
        due: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Add a recurring template ("mon,wed,fri")
    Repeat {
        title: String,
        #[arg(long)]
        days: String,
        #[arg(long, value_name = "YYYY-MM-DD")]
        from: Option<String>,
        #[arg(long, value_name = "YYYY-MM-DD")]
        until: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// List everything due in a calendar window, materializing recurring
    /// instances as needed
    List {
        /// "week" or "month" (anything else means month)
        #[arg(long, default_value = "week")]
        range: String,
        /// Reference date inside the window; defaults to today
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<String>,
    },
    /// List recurring templates
    Templates,
    /// Mark a task complete
    Done { id: u64 },
    /// Delete a task. For recurring tasks --mode picks the scope
    Delete {
        id: u64,
        /// "this", "future" or "all"
        #[arg(long, default_value = "this")]
        mode: String,
    },
    /// Show a template's next upcoming occurrence
    Next { id: u64 },
}

fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{input}', expected YYYY-MM-DD"))
}

fn parse_opt_date(input: &Option<String>) -> Result<Option<NaiveDate>> {
    input.as_deref().map(parse_date).transpose()
}

fn parse_priority(input: &Option<String>) -> Result<Option<Priority>> {
    match input {
        Some(s) => match Priority::parse(s) {
            Some(p) => Ok(Some(p)),
            None => bail!("invalid priority '{s}', expected low, medium or high"),
        },
        None => Ok(None),
    }
}

fn parse_policy(input: &str) -> Result<DeletePolicy> {
    match input.to_lowercase().as_str() {
        "this" => Ok(DeletePolicy::This),
        "future" => Ok(DeletePolicy::Future),
        "all" => Ok(DeletePolicy::All),
        other => bail!("invalid delete mode '{other}', expected this, future or all"),
    }
}

fn print_task(task: &Task) {
    let done = if task.is_complete { "x" } else { " " };
    let due = task
        .due_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "          ".to_string());
    let marker = match task.role() {
        TaskRole::Instance { .. } => " ↻",
        _ => "",
    };
    let tags = if task.tags.is_empty() {
        String::new()
    } else {
        format!("  #{}", task.tags.join(" #"))
    };
    println!(
        "#{:<4} [{}] {}  {} ({}){}{}",
        task.id,
        done,
        due,
        task.title,
        task.priority.as_str(),
        marker,
        tags
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    dotenv().ok();

    let cli = Cli::parse();

    let db_path = std::env::var("TASKLOOP_DB").unwrap_or_else(|_| "tasks.db".to_string());
    let repo = Arc::new(SqliteTaskRepository::new(&db_path)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let tasks = TaskService::new(repo.clone(), clock.clone());
    let scheduler = RecurrenceScheduler::new(repo, clock.clone());

    match cli.command {
        Command::Add {
            title,
            due,
            priority,
            notes,
            tags,
        } => {
            let task = tasks
                .create_task(
                    DEFAULT_USER,
                    title,
                    parse_opt_date(&due)?,
                    parse_priority(&priority)?,
                    notes,
                    tags,
                )
                .await?;
            println!("added task #{}", task.id);
        }
        Command::Repeat {
            title,
            days,
            from,
            until,
            priority,
            notes,
            tags,
        } => {
            let template = tasks
                .create_template(
                    DEFAULT_USER,
                    title,
                    repeat_days::parse_days(&days)?,
                    parse_opt_date(&from)?,
                    parse_opt_date(&until)?,
                    parse_priority(&priority)?,
                    notes,
                    tags,
                )
                .await?;
            println!(
                "added template #{} ({})",
                template.id,
                repeat_days::format_days(&template.repeat_days)
            );
        }
        Command::List { range, date } => {
            let reference = parse_opt_date(&date)?.unwrap_or_else(|| clock.today());
            let granularity = Granularity::parse_lossy(&range);
            let (start, end) = scheduler_service::date_range_for(reference, granularity);
            let occurrences = scheduler.occurrences_for_range(start, end).await?;

            println!("{start} .. {end}");
            if occurrences.is_empty() {
                println!("nothing due");
            }
            for task in &occurrences {
                print_task(task);
            }
        }
        Command::Templates => {
            let templates = tasks.list_templates_for_user(DEFAULT_USER).await?;
            if templates.is_empty() {
                println!("no templates");
            }
            for tpl in &templates {
                let until = tpl
                    .repeat_until
                    .map(|d| format!(" until {d}"))
                    .unwrap_or_default();
                let state = if tpl.is_repeating { "" } else { " (inactive)" };
                println!(
                    "#{:<4} {}  every {}{}{}",
                    tpl.id,
                    tpl.title,
                    repeat_days::format_days(&tpl.repeat_days),
                    until,
                    state
                );
            }
        }
        Command::Done { id } => {
            let task = tasks.set_complete(id, true).await?;
            println!("completed #{} {}", task.id, task.title);
        }
        Command::Delete { id, mode } => {
            scheduler.delete_with_policy(id, parse_policy(&mode)?).await?;
            println!("deleted #{id} ({mode})");
        }
        Command::Next { id } => {
            let template = tasks.get_task(id).await?;
            match scheduler.next_occurrence(&template) {
                Some(date) => println!("next occurrence of #{id}: {date}"),
                None => println!("no occurrence of #{id} in the next two weeks"),
            }
        }
    }

    Ok(())
}
