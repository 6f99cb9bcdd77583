//! # docdesk CLI
//!
//! ```bash
//! docdesk --config ./config/docdesk.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docdesk init` | Create the SQLite database and run migrations |
//! | `docdesk user add` | Register a user |
//! | `docdesk project add` | Create a project |
//! | `docdesk assignment <action>` | Add, list, update, delete assignments |
//! | `docdesk upload <file>` | Extract, chunk and embed a file |
//! | `docdesk document <action>` | List or delete documents |
//! | `docdesk reprocess` | Process every pending document |
//! | `docdesk search "<query>"` | Retrieve matching chunks |
//! | `docdesk chat "<message>"` | Ask the assistant |
//! | `docdesk insights <id>` | Plan an assignment |
//! | `docdesk history` | Show chat history or sessions |
//! | `docdesk suggestions` | Suggested prompts |

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docdesk::app::App;
use docdesk::assistant::UserContext;
use docdesk::config::load_config;
use docdesk::error::{truncate_chars, Error};
use docdesk::models::{AssignmentStatus, AssignmentUpdate, NewAssignment, Priority};

#[derive(Parser)]
#[command(
    name = "docdesk",
    about = "docdesk: document ingestion, retrieval and a grounded assistant",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docdesk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Manage users.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Manage projects.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Manage assignments.
    Assignment {
        #[command(subcommand)]
        action: AssignmentAction,
    },

    /// Upload a file: extract its text, then chunk and embed it.
    Upload {
        path: PathBuf,
        /// Owning user id.
        #[arg(long)]
        user: String,
        /// Override the detected content type.
        #[arg(long)]
        content_type: Option<String>,
    },

    /// List or delete documents.
    Document {
        #[command(subcommand)]
        action: DocumentAction,
    },

    /// Process every document still in `pending`.
    Reprocess,

    /// Retrieve chunks relevant to a query.
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Ask the assistant a question.
    Chat {
        message: String,
        #[arg(long)]
        user: String,
        /// Continue an existing session.
        #[arg(long)]
        session: Option<String>,
    },

    /// Generate insights for an assignment.
    Insights { assignment_id: String },

    /// Show chat history, or a session list with `--sessions`.
    History {
        #[arg(long)]
        user: String,
        #[arg(long)]
        session: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        sessions: bool,
        /// Delete the session given by `--session`.
        #[arg(long, requires = "session")]
        delete: bool,
    },

    /// Suggested chat prompts for a user.
    Suggestions {
        #[arg(long)]
        user: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserAction {
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        description: Option<String>,
    },
    List {
        #[arg(long)]
        owner: String,
    },
}

#[derive(Subcommand)]
enum AssignmentAction {
    Add {
        #[arg(long)]
        user: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// low, medium or high.
        #[arg(long, default_value = "medium")]
        priority: String,
        /// Due date, YYYY-MM-DD.
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        project: Option<String>,
    },
    List {
        #[arg(long)]
        user: String,
    },
    Update {
        id: String,
        /// todo, in-progress or completed.
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        progress: Option<u8>,
        #[arg(long)]
        priority: Option<String>,
    },
    Delete {
        id: String,
    },
    Stats {
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand)]
enum DocumentAction {
    List {
        #[arg(long)]
        user: String,
    },
    Delete {
        id: String,
        #[arg(long)]
        user: String,
    },
}

fn parse_priority(s: &str) -> anyhow::Result<Priority> {
    Priority::parse(s).with_context(|| format!("invalid priority '{}'", s))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    // Connecting applies migrations, which is all `init` needs.
    let app = App::connect(&cfg).await?;

    match cli.command {
        Commands::Init => println!("Database initialized successfully."),
        Commands::User { action } => match action {
            UserAction::Add { email, name } => {
                let user = app.records.create_user(&email, &name).await?;
                println!("{}", user.id);
            }
        },
        Commands::Project { action } => match action {
            ProjectAction::Add {
                name,
                owner,
                description,
            } => {
                let project = app
                    .records
                    .create_project(&name, description.as_deref(), &owner)
                    .await?;
                println!("{}", project.id);
            }
            ProjectAction::List { owner } => {
                for p in app.records.list_projects(&owner).await? {
                    println!("{}  {}", p.id, p.name);
                }
            }
        },
        Commands::Assignment { action } => match action {
            AssignmentAction::Add {
                user,
                title,
                description,
                priority,
                due,
                project,
            } => {
                let new = NewAssignment {
                    title,
                    description,
                    priority: parse_priority(&priority)?,
                    due_date: due,
                    assignee_id: user,
                    project_id: project,
                };
                let assignment = app.records.create_assignment(&new).await?;
                println!("{}", assignment.id);
            }
            AssignmentAction::List { user } => {
                for a in app.records.list_assignments(&user).await? {
                    println!(
                        "{}  [{}] {} ({}%, {}, due {})",
                        a.id,
                        a.status.as_str(),
                        a.title,
                        a.progress,
                        a.priority.as_str(),
                        a.due_date.as_deref().unwrap_or("-")
                    );
                }
            }
            AssignmentAction::Update {
                id,
                status,
                progress,
                priority,
            } => {
                let status = match status {
                    Some(s) => Some(
                        AssignmentStatus::parse(&s)
                            .with_context(|| format!("invalid status '{}'", s))?,
                    ),
                    None => None,
                };
                if progress.is_some_and(|p| p > 100) {
                    bail!("progress must be between 0 and 100");
                }
                let update = AssignmentUpdate {
                    status,
                    progress,
                    priority: priority.as_deref().map(parse_priority).transpose()?,
                    ..AssignmentUpdate::default()
                };
                print_json(&app.records.update_assignment(&id, &update).await?)?;
            }
            AssignmentAction::Delete { id } => {
                if !app.records.delete_assignment(&id).await? {
                    return Err(Error::NotFound(format!("assignment {}", id)).into());
                }
                println!("Deleted assignment {}", id);
            }
            AssignmentAction::Stats { user } => {
                print_json(&app.records.assignment_stats(&user).await?)?;
            }
        },
        Commands::Upload {
            path,
            user,
            content_type,
        } => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let outcome = app
                .ingestor
                .upload(&user, &filename, content_type.as_deref().unwrap_or(""), &bytes)
                .await?;
            print_json(&outcome)?;
        }
        Commands::Document { action } => match action {
            DocumentAction::List { user } => {
                for d in app.records.list_documents(&user).await? {
                    println!(
                        "{}  [{}] {} ({}, {} bytes, {} chunks)",
                        d.id,
                        d.status.as_str(),
                        d.title,
                        d.file_type,
                        d.file_size,
                        d.chunk_count
                    );
                }
            }
            DocumentAction::Delete { id, user } => {
                app.ingestor.delete_document(&user, &id).await?;
                println!("Deleted document {}", id);
            }
        },
        Commands::Reprocess => {
            let report = app.ingestor.process_pending().await?;
            println!(
                "processed: {}, failed: {}, skipped: {}",
                report.processed, report.failed, report.skipped
            );
        }
        Commands::Search { query, limit } => {
            let limit = limit.unwrap_or(app.retriever.config().default_limit);
            let hits = app.retriever.search_similar_chunks(&query, limit).await;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [{:.2} {:?}] {}",
                    i + 1,
                    hit.similarity,
                    hit.origin,
                    hit.document_title
                );
                println!("   {}", truncate_chars(&hit.content, 200));
            }
        }
        Commands::Chat {
            message,
            user,
            session,
        } => {
            let turn = app
                .assistant
                .converse(&user, &message, session.as_deref())
                .await;
            println!("{}", turn.answer.response);
            for s in &turn.answer.sources {
                println!("  source: {} ({})", s.document_title, s.file_type);
            }
            println!("session: {}", turn.session_id);
        }
        Commands::Insights { assignment_id } => {
            let assignment = app
                .records
                .get_assignment(&assignment_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("assignment {}", assignment_id)))?;
            let user = UserContext::for_user(assignment.assignee_id.clone());
            let outcome = app
                .assistant
                .generate_assignment_insights(&assignment, &user)
                .await;
            print_json(&outcome)?;
        }
        Commands::History {
            user,
            session,
            limit,
            sessions,
            delete,
        } => {
            if delete {
                let session = session.unwrap_or_default();
                let removed = app.assistant.delete_session(&user, &session).await?;
                println!("Deleted {} messages", removed);
            } else if sessions {
                print_json(&app.assistant.chat_sessions(&user).await?)?;
            } else {
                print_json(
                    &app.assistant
                        .chat_history(&user, session.as_deref(), limit)
                        .await?,
                )?;
            }
        }
        Commands::Suggestions { user } => {
            let ctx = UserContext { user_id: user };
            for s in app.assistant.chat_suggestions(&ctx).await {
                println!("{}", s);
            }
        }
    }

    Ok(())
}
