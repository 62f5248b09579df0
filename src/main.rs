use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::Confirm;
use eyre::{Context, Result};
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use teamtasks::config::default_config_path;
use teamtasks::csv::export_filename;
use teamtasks::{Backend, Config, Priority, Query, Selection, SortKey, Status, SyncStatus, Task, TaskDraft, TaskError, TaskPatch, TaskStore};

#[derive(Parser)]
#[command(name = "teamtasks")]
#[command(about = "TeamTasks CLI - track, filter and exchange team tasks")]
#[command(version)]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Override the storage backend
    #[arg(short, long, value_enum)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tasks through the search/filter/sort pipeline
    List {
        #[arg(short, long, default_value = "")]
        search: String,

        #[arg(long, value_enum)]
        status: Option<Status>,

        #[arg(long, value_enum)]
        priority: Option<Priority>,

        #[arg(long, value_enum, default_value = "updated-at")]
        sort: SortKey,
    },

    /// Create a task
    Add {
        #[arg(short, long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(short, long, default_value = "")]
        assignee: String,

        #[arg(short, long, value_enum, default_value = "medium")]
        priority: Priority,

        #[arg(long, value_enum, default_value = "todo")]
        status: Status,

        /// Due date, YYYY-MM-DD
        #[arg(long)]
        due: Option<NaiveDate>,
    },

    /// Change fields of an existing task
    Update {
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(short, long)]
        assignee: Option<String>,

        #[arg(short, long, value_enum)]
        priority: Option<Priority>,

        #[arg(long, value_enum)]
        status: Option<Status>,

        #[arg(long, conflicts_with = "clear_due")]
        due: Option<NaiveDate>,

        #[arg(long)]
        clear_due: bool,

        /// Patch as a JSON object instead of flags
        #[arg(long, conflicts_with_all = ["title", "description", "assignee", "priority", "status", "due", "clear_due"])]
        json: Option<String>,
    },

    /// Flip a task between Done and Todo
    Toggle { id: String },

    /// Delete a task
    Delete {
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Import tasks from a CSV file
    Import { file: PathBuf },

    /// Export all tasks to a dated CSV file
    Export {
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// List distinct assignees
    Assignees,

    /// Report whether multi-user sync is configured
    Sync,
}

fn main() -> Result<()> {
    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config.or_else(default_config_path) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    // Open store
    let mut store = TaskStore::with_key(config.open_storage()?, &config.storage_key)?;
    store.load();

    match cli.command {
        Commands::List {
            search,
            status,
            priority,
            sort,
        } => {
            let query = Query::new()
                .search(search)
                .status(status.map_or(Selection::All, Selection::Only))
                .priority(priority.map_or(Selection::All, Selection::Only))
                .sort(sort);
            let view = store.query(&query);
            for task in &view {
                print_task(task);
            }
            println!("{} of {} tasks", view.len(), store.len());
        }
        Commands::Add {
            title,
            description,
            assignee,
            priority,
            status,
            due,
        } => {
            let mut draft = TaskDraft::new(title)
                .description(description)
                .assignee(assignee)
                .priority(priority)
                .status(status);
            draft.due_date = due;
            let task = store.create(draft)?;
            println!("Created {}", task.id);
        }
        Commands::Update {
            id,
            title,
            description,
            assignee,
            priority,
            status,
            due,
            clear_due,
            json,
        } => {
            let patch = match json {
                Some(json) => TaskPatch::from_json(&json)?,
                None => TaskPatch {
                    title,
                    description,
                    assignee,
                    priority,
                    status,
                    due_date: if clear_due { Some(None) } else { due.map(Some) },
                },
            };
            if patch.is_empty() {
                println!("Nothing to update");
                return Ok(());
            }
            let task = store.update(&id, &patch)?;
            print_task(&task);
        }
        Commands::Toggle { id } => {
            let task = store.toggle_status(&id)?;
            print_task(&task);
        }
        Commands::Delete { id, yes } => {
            let title = store
                .get(&id)
                .map(|task| task.title.clone())
                .ok_or_else(|| TaskError::NotFound(id.clone()))?;
            let approved = confirm_delete(&title, yes)?;
            let deleted = store.delete(&id, |_| approved)?;
            if deleted {
                println!("Deleted {}", id);
            } else {
                println!("Cancelled");
            }
        }
        Commands::Import { file } => {
            let ticket = store.begin_import()?;
            let text = match fs::read_to_string(&file) {
                Ok(text) => text,
                Err(e) => {
                    store.cancel_import(ticket);
                    return Err(e).with_context(|| format!("Failed to read {}", file.display()));
                }
            };
            let count = store.complete_import(ticket, &text)?;
            println!("Imported {} tasks", count);
        }
        Commands::Export { out } => {
            let path = out.join(export_filename(Local::now().date_naive()));
            fs::write(&path, store.export_csv()).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported {} tasks to {}", store.len(), path.display());
        }
        Commands::Assignees => {
            for name in store.assignees().iter() {
                println!("{}", name);
            }
        }
        Commands::Sync => match config.sync_status() {
            SyncStatus::NotConfigured => println!("Sync not configured"),
            SyncStatus::Configured { endpoint } => println!("Sync configured for {} (not yet supported)", endpoint),
        },
    }

    Ok(())
}

fn print_task(task: &Task) {
    let status = match task.status {
        Status::Todo => task.status.label().normal(),
        Status::InProgress => task.status.label().cyan(),
        Status::Waiting => task.status.label().yellow(),
        Status::Done => task.status.label().green(),
    };
    let priority = match task.priority {
        Priority::Critical => task.priority.label().red().bold(),
        Priority::High => task.priority.label().red(),
        _ => task.priority.label().normal(),
    };
    let assignee = if task.assignee.is_empty() {
        "Unassigned".dimmed()
    } else {
        task.assignee.as_str().normal()
    };
    let due = task.due_date.map(|d| format!(" due {}", d)).unwrap_or_default();

    println!(
        "{}  [{}] [{}] {} ({}){}",
        task.id.dimmed(),
        status,
        priority,
        task.title,
        assignee,
        due
    );
}

/// Ask before deleting unless `--yes` was given; defaults to no
fn confirm_delete(title: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    let approved = Confirm::new()
        .with_prompt(format!("Delete \"{}\"?", title))
        .default(false)
        .interact()
        .context("Failed to read confirmation")?;
    Ok(approved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_delete_yes_skips_prompt() {
        assert!(confirm_delete("Fix truck 12", true).unwrap());
    }

    #[test]
    fn test_delete_args() {
        let cli = Cli::parse_from(["teamtasks", "delete", "abc", "--yes"]);
        assert!(matches!(cli.command, Commands::Delete { ref id, yes: true } if id == "abc"));

        let cli = Cli::parse_from(["teamtasks", "delete", "abc"]);
        assert!(matches!(cli.command, Commands::Delete { yes: false, .. }));
    }
}
