//! Command-line surface and the handlers behind it.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use sref_core::error::CoreError;
use sref_core::item::ItemDraft;
use sref_core::state::ViewMode;
use sref_core::types::ItemId;
use sref_store::{ChangeSync, IdentitySync, ProviderSessionSync};
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::render;

#[derive(Debug, Parser)]
#[command(name = "sref", version, about = "Catalog of style reference codes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List items, optionally filtered by text and tags.
    List(ListArgs),
    /// Show every tag in use, sorted.
    Tags,
    /// Show one item in full.
    Show { id: String },
    /// Add an item.
    Add(AddArgs),
    /// Change fields of an existing item.
    Edit(EditArgs),
    /// Delete an item.
    Delete { id: String },
    /// Write the catalog to a dated JSON file.
    Export {
        /// Directory for the dated file.
        #[arg(long, default_value = ".", conflicts_with = "output")]
        dir: PathBuf,
        /// Exact output path instead of a dated name.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Replace the catalog with the contents of an export file.
    Import { file: PathBuf },
    /// Create an account.
    Signup {
        #[arg(long, env = "SREF_EMAIL")]
        email: String,
        #[arg(long, env = "SREF_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Follow changes made by other sessions until interrupted.
    Watch,
}

impl Command {
    /// Whether startup signs in with the configured credentials. `signup`
    /// reads the same variables for the account it creates.
    pub fn signs_in_at_startup(&self) -> bool {
        !matches!(self, Command::Signup { .. })
    }
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Case-insensitive text matched against code, title, description and tags.
    #[arg(long, short)]
    pub search: Option<String>,
    /// Only items carrying this tag. Repeat to require several.
    #[arg(long = "tag", short)]
    pub tags: Vec<String>,
    #[arg(long, default_value_t = ViewMode::Grid)]
    pub view: ViewMode,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(long)]
    pub code: String,
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub image_url: Option<String>,
    #[arg(long = "tag", short)]
    pub tags: Vec<String>,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    pub id: String,
    #[arg(long)]
    pub code: Option<String>,
    #[arg(long)]
    pub title: Option<String>,
    /// New description; an empty string removes it.
    #[arg(long)]
    pub description: Option<String>,
    /// New image URL; an empty string removes it.
    #[arg(long)]
    pub image_url: Option<String>,
    /// Replace the tags. Repeat for several.
    #[arg(long = "tag", short)]
    pub tags: Vec<String>,
    /// Remove all tags.
    #[arg(long, conflicts_with = "tags")]
    pub clear_tags: bool,
}

pub async fn run(app: &App, command: Command) -> anyhow::Result<()> {
    match command {
        Command::List(args) => list(app, args),
        Command::Tags => {
            for tag in app.store.all_tags() {
                println!("{tag}");
            }
        }
        Command::Show { id } => {
            let item = app
                .store
                .get(&ItemId::new(id.as_str()))
                .ok_or_else(|| CoreError::item_not_found(&id))?;
            app.store.set_selected_item(Some(&item.id));
            print!("{}", render::detail(&item));
        }
        Command::Add(args) => {
            let mut draft = ItemDraft::new(args.code, args.title).with_tags(args.tags);
            draft.description = args.description;
            draft.image_url = args.image_url;
            let item = app.store.create(draft).await?;
            println!("Item added successfully ({})", item.id);
        }
        Command::Edit(args) => edit(app, args).await?,
        Command::Delete { id } => {
            app.store.delete(&ItemId::new(id)).await?;
            println!("Item deleted successfully");
        }
        Command::Export { dir, output } => {
            let path = match output {
                Some(path) => {
                    app.store.export_to_path(&path).await?;
                    path
                }
                None => app.store.export_to_dir(&dir).await?,
            };
            println!("Data exported successfully to {}", path.display());
        }
        Command::Import { file } => {
            let count = app.store.import_file(&file).await?;
            println!("Data imported successfully ({count} items)");
        }
        Command::Signup { email, password } => signup(app, &email, &password).await?,
        Command::Watch => watch(app).await,
    }
    Ok(())
}

fn list(app: &App, args: ListArgs) {
    app.store.set_view_mode(args.view);
    if let Some(query) = args.search {
        app.store.set_search_query(query);
    }
    for tag in args.tags {
        app.store.toggle_tag(tag);
    }
    let items = app.store.filtered_items();
    print!("{}", render::items(&items, app.store.snapshot().view_mode));
}

async fn edit(app: &App, args: EditArgs) -> anyhow::Result<()> {
    let id = ItemId::new(args.id);
    let mut item = app
        .store
        .get(&id)
        .ok_or_else(|| CoreError::item_not_found(&id))?;

    if let Some(code) = args.code {
        item.code = code;
    }
    if let Some(title) = args.title {
        item.title = title;
    }
    if let Some(description) = args.description {
        item.description = Some(description).filter(|d| !d.trim().is_empty());
    }
    if let Some(url) = args.image_url {
        item.image_url = Some(url).filter(|u| !u.trim().is_empty());
    }
    if args.clear_tags {
        item.tags = Default::default();
    } else if !args.tags.is_empty() {
        item.tags = args.tags.into_iter().collect();
    }

    app.store.update(item).await?;
    println!("Item updated successfully");
    Ok(())
}

async fn signup(app: &App, email: &str, password: &str) -> anyhow::Result<()> {
    match app.identity.sign_up(email, password).await {
        Ok(Some(principal)) => println!("Account created, signed in as {}", principal.email),
        Ok(None) => println!("Check your email to confirm your account"),
        Err(err @ CoreError::RateLimited { .. }) => {
            eprintln!("{err}");
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

/// Run the sync tasks and print every notification until Ctrl-C.
async fn watch(app: &App) {
    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    match app.store.gateway_changes() {
        Some(changes) => tasks.push(tokio::spawn(ChangeSync::run(
            app.store.clone(),
            changes,
            cancel.clone(),
        ))),
        None => tracing::warn!("Backend does not push changes, nothing to follow"),
    }
    tasks.push(tokio::spawn(IdentitySync::run(
        app.store.clone(),
        app.identity.watch(),
        cancel.clone(),
    )));
    if let Some(sessions) = app.identity.provider_session_changes() {
        tasks.push(tokio::spawn(ProviderSessionSync::run(
            app.identity.clone(),
            sessions,
            cancel.clone(),
        )));
    }

    let mut events = app.events.subscribe();
    let mut state = app.store.watch();
    println!("Watching {} items, press Ctrl-C to stop", app.store.snapshot().items.len());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(event) = events.recv() => println!("[{:?}] {}", event.severity, event.message),
            Ok(()) = state.changed() => {
                let count = state.borrow_and_update().items.len();
                println!("{count} items");
            }
        }
    }

    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
}
