//! Taskwise CLI - AI task enrichment over a local JSON store.

use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate, TimeZone, Utc, Weekday};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use taskwise_core::{
    EnrichmentField, FieldModifications, Frequency, Priority, RecurrenceRule, Task, TaskFilter,
    TaskDescriptor, TaskId, TaskStatus, Time, UserId,
};
use taskwise_enrichment::{Enricher, EnrichmentApplier, EnrichmentResult};
use taskwise_history::HistoryRecorder;
use taskwise_model::{ChatModel, OllamaChatClient, OllamaConfig, ScriptedModel, TracingUsageTracker};
use taskwise_schedule::{generate_occurrences, next_occurrence, suggest_due_date};
use taskwise_storage::{JsonStorage, TaskStore};

#[derive(Parser)]
#[command(name = "taskwise")]
#[command(about = "Personal tasks with AI enrichment", long_about = None)]
struct Cli {
    /// Storage directory
    #[arg(long, global = true, default_value = ".taskwise")]
    storage: PathBuf,

    /// Ollama server URL
    #[arg(long, global = true, default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Model name
    #[arg(long, global = true)]
    model: Option<String>,

    /// Acting user
    #[arg(long, global = true, default_value = "local")]
    user: String,

    /// Log filter, e.g. `info` or `taskwise_enrichment=debug`
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Never call a model; every AI step uses its fallback
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new task
    Add {
        /// Task title
        title: String,
        /// Description
        #[arg(long)]
        description: Option<String>,
        /// Estimate in minutes
        #[arg(long)]
        estimate: Option<u32>,
        /// Priority (none, low, medium, high)
        #[arg(long)]
        priority: Option<Priority>,
        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        due: Option<String>,
        /// Enrich before saving and apply the `--accept` fields
        #[arg(long)]
        enrich: bool,
        /// Fields to accept from the enrichment, comma-separated
        #[arg(long, value_delimiter = ',')]
        accept: Vec<EnrichmentField>,
    },
    /// List tasks
    List {
        /// Filter by status (todo, in_progress, completed, cancelled)
        #[arg(long)]
        status: Option<String>,
    },
    /// Propose an enrichment for a stored task or a free-form title
    Enrich {
        /// Stored task to enrich
        #[arg(long, conflicts_with = "title")]
        task: Option<String>,
        /// Title of a task that does not exist yet
        #[arg(long)]
        title: Option<String>,
        /// Description for `--title`
        #[arg(long, requires = "title")]
        description: Option<String>,
    },
    /// Apply a stored proposal to a task
    Apply {
        /// Task ID
        task: String,
        /// Proposal ID
        proposal: String,
        /// Fields to accept, comma-separated; none rejects the proposal
        #[arg(long, value_delimiter = ',')]
        accept: Vec<EnrichmentField>,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Mark a task completed and record its execution history
    Complete {
        /// Task ID
        task: String,
        /// Minutes actually spent
        #[arg(long)]
        actual: Option<u32>,
    },
    /// Suggest a due date for an estimate
    DueDate {
        /// Estimate in minutes
        minutes: u32,
        /// Priority (none, low, medium, high)
        #[arg(long, default_value = "none")]
        priority: Priority,
    },
    /// Next occurrence of a recurrence rule
    NextOccurrence {
        /// Date to advance from
        #[arg(long)]
        from: String,
        /// Occurrences so far
        #[arg(long, default_value = "0")]
        done: u32,
        #[command(flatten)]
        rule: RuleArgs,
    },
    /// Expand a recurrence rule into dates
    Occurrences {
        /// First date
        #[arg(long)]
        start: String,
        /// Maximum number of dates
        #[arg(long, default_value = "10")]
        max: usize,
        /// Hard stop date
        #[arg(long)]
        until: Option<String>,
        #[command(flatten)]
        rule: RuleArgs,
    },
}

impl Commands {
    /// Whether the command calls the model.
    fn uses_model(&self) -> bool {
        matches!(self, Commands::Enrich { .. } | Commands::Add { enrich: true, .. })
    }
}

/// User overrides for accepted fields.
#[derive(Args)]
struct Overrides {
    /// Title override
    #[arg(long = "set-title")]
    title: Option<String>,
    /// Description override
    #[arg(long = "set-description")]
    description: Option<String>,
    /// Due date override
    #[arg(long = "set-due")]
    due: Option<String>,
    /// Estimate override in minutes
    #[arg(long = "set-estimate")]
    estimate: Option<u32>,
    /// Priority override
    #[arg(long = "set-priority")]
    priority: Option<Priority>,
}

impl Overrides {
    fn into_modifications(self) -> Result<Option<FieldModifications>> {
        let modifications = FieldModifications {
            title: self.title,
            description: self.description,
            due_date: self.due.as_deref().map(parse_time).transpose()?,
            estimated_minutes: self.estimate,
            priority: self.priority,
        };
        Ok((modifications != FieldModifications::default()).then_some(modifications))
    }
}

/// Recurrence rule flags.
#[derive(Args)]
struct RuleArgs {
    /// daily, weekly, monthly or yearly
    #[arg(long, value_parser = parse_frequency)]
    frequency: Frequency,
    /// Step between occurrences
    #[arg(long, default_value = "1")]
    interval: u32,
    /// Weekly: allowed days, comma-separated (mon,thu)
    #[arg(long, value_delimiter = ',')]
    days: Vec<Weekday>,
    /// Monthly: fixed day of month
    #[arg(long)]
    day_of_month: Option<u32>,
    /// Monthly: nth week for "nth weekday" rules
    #[arg(long, requires = "weekday")]
    nth: Option<u32>,
    /// Monthly: weekday for "nth weekday" rules
    #[arg(long, requires = "nth")]
    weekday: Option<Weekday>,
    /// Last allowed date
    #[arg(long)]
    end: Option<String>,
    /// Maximum number of occurrences
    #[arg(long)]
    count: Option<u32>,
}

impl RuleArgs {
    fn into_rule(self) -> Result<RecurrenceRule> {
        let mut rule = RecurrenceRule::new(self.frequency)
            .every(self.interval)
            .on_days(self.days);
        rule.day_of_month = self.day_of_month;
        rule.week_of_month = self.nth;
        rule.day_of_week_in_month = self.weekday;
        rule.end_date = self.end.as_deref().map(parse_time).transpose()?;
        rule.count = self.count;
        Ok(rule)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let user = UserId::new(cli.user.clone());
    let storage = Arc::new(
        JsonStorage::new(&cli.storage)
            .await
            .with_context(|| format!("opening storage at {}", cli.storage.display()))?,
    );

    let model: Arc<dyn ChatModel> = if cli.offline {
        Arc::new(ScriptedModel::new())
    } else {
        let mut config = OllamaConfig {
            url: cli.ollama_url.clone(),
            ..Default::default()
        };
        if let Some(model) = &cli.model {
            config.model = model.clone();
        }
        let client = OllamaChatClient::new(config);
        if cli.command.uses_model() && !client.health_check().await {
            warn!(
                "Ollama is not reachable at {}; AI steps will use their fallbacks",
                cli.ollama_url
            );
        }
        Arc::new(client)
    };
    let enricher = Enricher::new(storage.clone(), model, Arc::new(TracingUsageTracker));
    let applier = EnrichmentApplier::new(storage.clone(), storage.clone(), enricher.cache());

    match cli.command {
        Commands::Add {
            title,
            description,
            estimate,
            priority,
            due,
            enrich,
            accept,
        } => {
            let mut task = Task::new(user.clone(), title);
            task.description = description;
            task.estimated_minutes = estimate;
            task.priority = priority.unwrap_or_default();
            task.due_date = due.as_deref().map(parse_time).transpose()?;
            storage.save_task(&task).await?;

            if enrich {
                let result = enricher.enrich(&user, &TaskDescriptor::from(&task)).await;
                print_enrichment(&result);
                task = applier
                    .apply(&user, task.id, result.proposal_id, &accept, None)
                    .await?;
            }
            println!("Added task: {} - {}", task.id, task.title);
        }
        Commands::List { status } => {
            let status = status.map(|s| parse_status(&s)).transpose()?;
            let filter = TaskFilter {
                user_id: Some(user.clone()),
                status: status.map(|s| vec![s]),
                ..Default::default()
            };
            let tasks = storage.list_tasks(&filter).await?;

            println!("Tasks ({})", tasks.len());
            for task in tasks {
                println!(
                    "  {} | {} | {} | {} - {}",
                    task.id,
                    format_status(task.status),
                    task.priority,
                    task.estimated_minutes
                        .map(|m| format!("{}m", m))
                        .unwrap_or_else(|| "-".to_string()),
                    task.title,
                );
            }
        }
        Commands::Enrich {
            task,
            title,
            description,
        } => {
            let result = match (task, title) {
                (Some(id), _) => enricher.enrich_task(&user, parse_id(&id)?).await?,
                (None, Some(title)) => {
                    let mut descriptor = TaskDescriptor::new(title);
                    descriptor.description = description;
                    enricher.enrich(&user, &descriptor).await
                }
                (None, None) => return Err(anyhow!("Pass --task or --title")),
            };
            print_enrichment(&result);
        }
        Commands::Apply {
            task,
            proposal,
            accept,
            overrides,
        } => {
            let modifications = overrides.into_modifications()?;
            let task = applier
                .apply(
                    &user,
                    parse_id(&task)?,
                    parse_id(&proposal)?,
                    &accept,
                    modifications.as_ref(),
                )
                .await?;
            println!("Updated task: {} - {}", task.id, task.title);
        }
        Commands::Complete { task, actual } => {
            let task_id: TaskId = parse_id(&task)?;
            let mut task = storage
                .get_task(task_id)
                .await?
                .filter(|t| t.is_owned_by(&user) && !t.is_deleted())
                .ok_or_else(|| anyhow!("Task not found: {}", task_id))?;
            if actual.is_some() {
                task.actual_minutes = actual;
            }
            task.complete(Utc::now());
            storage.save_task(&task).await?;

            let record = HistoryRecorder::new(storage.clone(), storage.clone())
                .record(&user, task_id)
                .await?;
            info!("Completed task {}", task_id);
            println!("Completed: {} ({})", task.title, record.outcome);
            if let Some(ratio) = record.accuracy_ratio {
                println!("  Actual/estimate: {:.2}", ratio);
            }
            if record.days_overdue > 0 {
                println!("  Days overdue: {}", record.days_overdue);
            }
        }
        Commands::DueDate { minutes, priority } => {
            let due = suggest_due_date(minutes, priority, Local::now());
            println!("{}", due.format("%a %Y-%m-%d %H:%M"));
        }
        Commands::NextOccurrence { from, done, rule } => {
            let rule = rule.into_rule()?;
            match next_occurrence(&rule, parse_time(&from)?, done) {
                Some(next) if next.is_complete => println!("Series complete"),
                Some(next) => println!(
                    "#{} {}",
                    next.occurrence_number,
                    next.next_date.format("%a %Y-%m-%d")
                ),
                None => return Err(anyhow!("Rule produces no next date")),
            }
        }
        Commands::Occurrences {
            start,
            max,
            until,
            rule,
        } => {
            let rule = rule.into_rule()?;
            let until = until.as_deref().map(parse_time).transpose()?;
            for date in generate_occurrences(&rule, parse_time(&start)?, max, until) {
                println!("{}", date.format("%a %Y-%m-%d"));
            }
        }
    }

    Ok(())
}

fn print_enrichment(result: &EnrichmentResult) {
    let proposal = &result.proposal;
    println!("Proposal {}", result.proposal_id);
    println!("  Title: {}", proposal.title);
    if !proposal.description.is_empty() {
        println!("  Description: {}", proposal.description);
    }
    if proposal.subtasks.is_empty() {
        println!("  Estimate: {} min", proposal.estimated_minutes);
    } else {
        println!(
            "  Estimate: {} min (subtasks add up to {} min)",
            proposal.estimated_minutes,
            proposal.subtask_minutes()
        );
    }
    println!("  Priority: {}", proposal.priority);
    if let Some(due) = proposal.due_date {
        println!("  Due: {}", due.with_timezone(&Local).format("%a %Y-%m-%d %H:%M"));
    }
    for subtask in &proposal.subtasks {
        println!(
            "  {}. {} ({} min, {}{})",
            subtask.order,
            subtask.title,
            subtask.estimated_minutes,
            subtask.subtask_type.as_str(),
            if subtask.ai_can_do { ", AI can help" } else { "" }
        );
    }

    let insights = &result.insights;
    println!(
        "  Similar tasks: {} | Confidence: {:?} | Success: {}%",
        insights.similar_task_count, insights.confidence, insights.success_probability
    );
    for m in &result.similar_tasks {
        println!("    {}% {}", m.score, m.title);
    }
    for risk in &insights.risk_factors {
        println!("  Risk: {}", risk);
    }
}

fn parse_id<T: std::str::FromStr>(s: &str) -> Result<T> {
    s.parse().map_err(|_| anyhow!("Invalid ID: {}", s))
}

/// RFC 3339, or a bare date at local midnight.
fn parse_time(s: &str) -> Result<Time> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {}", s))?;
    date.and_hms_opt(0, 0, 0)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("Invalid local date: {}", s))
}

fn parse_frequency(s: &str) -> Result<Frequency, String> {
    match s.to_lowercase().as_str() {
        "daily" => Ok(Frequency::Daily),
        "weekly" => Ok(Frequency::Weekly),
        "monthly" => Ok(Frequency::Monthly),
        "yearly" => Ok(Frequency::Yearly),
        _ => Err(format!("unknown frequency: {}", s)),
    }
}

fn parse_status(s: &str) -> Result<TaskStatus> {
    match s.to_lowercase().as_str() {
        "todo" => Ok(TaskStatus::Todo),
        "in_progress" => Ok(TaskStatus::InProgress),
        "completed" | "done" => Ok(TaskStatus::Completed),
        "cancelled" => Ok(TaskStatus::Cancelled),
        _ => Err(anyhow!("Unknown status: {}", s)),
    }
}

fn format_status(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "TODO",
        TaskStatus::InProgress => "IN PROGRESS",
        TaskStatus::Completed => "DONE",
        TaskStatus::Cancelled => "CANCELLED",
    }
}
