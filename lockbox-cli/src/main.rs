//! Lockbox CLI - a multi-user client for the lockbox secrets manager.
//!
//! Secrets are encrypted locally before they reach the server; the server
//! only ever stores opaque ciphertexts. Exit codes: 0 success, 1 runtime
//! error, 2 usage error.

use clap::{Parser, Subcommand, ValueEnum};
use std::io::{BufRead, Write};

use lockbox_core::config::{ClientConfig, ConfigOverrides};
use lockbox_core::sync::models::ResolvePolicy;
use lockbox_core::{
    load_or_create_key, ApiClient, BatchOptions, FieldEdit, ItemService, ItemStore, LockboxError,
    Session, SyncEngine,
};

#[derive(Parser)]
#[command(name = "lockbox", version, about = "Lockbox secrets manager CLI")]
struct Cli {
    /// Server address as host:port
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Talk to the server over https
    #[arg(long, global = true)]
    https: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account on the server and log in
    Register { login: String, password: String },

    /// Log in to an existing account
    Login { login: String, password: String },

    /// Show the authentication status
    Status,

    /// List local items
    Items,

    /// Show one item with decrypted fields
    ItemGet { name: String },

    /// Add an item, optionally with login and password
    ItemAdd {
        name: String,
        login: Option<String>,
        password: Option<String>,
    },

    /// Edit or add one field of an item and sync it
    ItemEdit {
        /// Conflict resolution strategy
        #[arg(long, value_enum)]
        resolve: Option<ResolveArg>,

        name: String,

        /// Field to set: login|password|text|card|file
        field: String,

        /// One value; card takes four: number holder exp cvc
        values: Vec<String>,
    },

    /// Synchronize all local items with the server
    Sync {
        /// Full sync from the epoch, fetching items this device lacks
        #[arg(long)]
        all: bool,

        /// Conflict resolution strategy
        #[arg(long, value_enum)]
        resolve: Option<ResolveArg>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ResolveArg {
    Client,
    Server,
}

impl From<ResolveArg> for ResolvePolicy {
    fn from(value: ResolveArg) -> Self {
        match value {
            ResolveArg::Client => ResolvePolicy::Client,
            ResolveArg::Server => ResolvePolicy::Server,
        }
    }
}

enum CliError {
    Usage(String),
    Runtime(anyhow::Error),
}

impl From<LockboxError> for CliError {
    fn from(e: LockboxError) -> Self {
        Self::Runtime(e.into())
    }
}

impl From<lockbox_core::StoreError> for CliError {
    fn from(e: lockbox_core::StoreError) -> Self {
        Self::Runtime(e.into())
    }
}

impl From<lockbox_core::CryptoError> for CliError {
    fn from(e: lockbox_core::CryptoError) -> Self {
        Self::Runtime(e.into())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => 0,
        Err(CliError::Usage(message)) => {
            eprintln!("usage error: {}", message);
            2
        }
        Err(CliError::Runtime(e)) => {
            eprintln!("error: {}", e);
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = ClientConfig::load(&ConfigOverrides {
        base_url: cli.base_url.clone(),
        https: cli.https,
    });
    let session = Session::new(&config);
    let client = ApiClient::new(&config.server_url())?;

    match cli.command {
        Commands::Register { login, password } => {
            let token = client.register(&login, &password).await?;
            session.save_token(&token)?;
            session.save_login(&login)?;
            println!("Registered and logged in as {}", login);
            Ok(())
        }

        Commands::Login { login, password } => {
            let token = client.login(&login, &password).await?;
            session.save_token(&token)?;
            session.save_login(&login)?;
            println!("Logged in as {}", login);
            Ok(())
        }

        Commands::Status => {
            let token = session.load_token().ok();
            let result = client.status(token.as_deref()).await?;
            println!("{}", result);
            Ok(())
        }

        Commands::Items => {
            let ctx = UserContext::open(&config, &session)?;
            let items = ctx.service().list()?;
            if items.is_empty() {
                println!("No items yet");
                return Ok(());
            }
            for item in items {
                let marker = if item.deleted { " [deleted]" } else { "" };
                println!("{}  v{}{}", item.name, item.version, marker);
            }
            Ok(())
        }

        Commands::ItemGet { name } => {
            let ctx = UserContext::open(&config, &session)?;
            let view = ctx.service().get_decrypted(&name)?;
            println!("{}:", view.name);
            println!("  id:       {}", view.id);
            println!("  version:  {}", view.version);
            println!("  login:    {}", view.login);
            println!("  password: {}", view.password);
            println!("  text:     {}", view.text);
            println!("  card:     {}", view.card);
            println!("  file:     {}", view.file_name);
            Ok(())
        }

        Commands::ItemAdd {
            name,
            login,
            password,
        } => {
            let ctx = UserContext::open(&config, &session)?;
            let id = ctx
                .service()
                .add(&name, login.as_deref(), password.as_deref())?;
            println!("Created:");
            println!("  id:   {}", id);
            println!("  name: {}", name);
            Ok(())
        }

        Commands::ItemEdit {
            resolve,
            name,
            field,
            values,
        } => {
            let edit = parse_field_edit(&field, &values)?;
            edit_and_sync(&config, &session, &client, &name, edit, field == "file", resolve).await
        }

        Commands::Sync { all, resolve } => {
            let ctx = UserContext::open(&config, &session)?;
            let token = session.load_token()?;
            let engine = SyncEngine::new(&client, &ctx.store, &session);

            println!("→ Syncing all items...");
            let opts = BatchOptions {
                all,
                resolve: resolve.map(Into::into),
            };
            let summary = engine.sync_batch(&token, &opts).await?;
            print_batch_summary(&summary);

            if !summary.conflicts.is_empty() && resolve.is_none() {
                if let Some(choice) = prompt_resolution()? {
                    println!("→ Re-syncing (resolve={:?})...", choice);
                    let opts = BatchOptions {
                        all,
                        resolve: Some(choice.into()),
                    };
                    let summary = engine.sync_batch(&token, &opts).await?;
                    print_batch_summary(&summary);
                }
            }
            Ok(())
        }
    }
}

/// Per-user context: the open store plus the field key.
struct UserContext {
    store: ItemStore,
    key: lockbox_core::FieldKey,
}

impl UserContext {
    fn open(config: &ClientConfig, session: &Session) -> Result<Self, CliError> {
        let login = session.load_login()?;
        let (store, _) = ItemStore::open_for_user(&config.client_db_path, &login)?;
        let key = load_or_create_key(&config.client_db_path.join(&login))?;
        Ok(Self { store, key })
    }

    fn service(&self) -> ItemService<'_> {
        ItemService::new(&self.store, self.key.clone())
    }
}

fn parse_field_edit(field: &str, values: &[String]) -> Result<FieldEdit, CliError> {
    match field {
        "login" | "password" | "text" | "file" => {
            if values.len() != 1 {
                return Err(CliError::Usage(format!(
                    "{} takes exactly one value",
                    field
                )));
            }
            let value = values[0].clone();
            Ok(match field {
                "login" => FieldEdit::Login(value),
                "password" => FieldEdit::Password(value),
                "text" => FieldEdit::Text(value),
                _ => FieldEdit::File(value),
            })
        }
        "card" => {
            if values.len() != 4 {
                return Err(CliError::Usage(
                    "card takes four values: <number> <holder> <exp> <cvc>".into(),
                ));
            }
            Ok(FieldEdit::Card {
                number: values[0].clone(),
                card_holder: values[1].clone(),
                exp: values[2].clone(),
                cvc: values[3].clone(),
            })
        }
        other => Err(CliError::Usage(format!(
            "unknown field type {:?} (expected: login|password|text|card|file)",
            other
        ))),
    }
}

async fn edit_and_sync(
    config: &ClientConfig,
    session: &Session,
    client: &ApiClient,
    name: &str,
    edit: FieldEdit,
    is_file: bool,
    resolve: Option<ResolveArg>,
) -> Result<(), CliError> {
    let ctx = UserContext::open(config, session)?;
    let token = session.load_token()?;

    let (id, created) = ctx.service().edit(name, edit)?;
    println!("{}:", if created { "Created" } else { "Updated" });
    println!("  id:   {}", id);
    println!("  name: {}", name);

    let engine = SyncEngine::new(client, &ctx.store, session);

    // A file edit uploads its blob concurrently with the metadata sync.
    let mut upload = None;
    if is_file {
        let item = ctx.store.get_item_by_name(name)?;
        if !item.blob_id.is_empty() {
            upload = Some(engine.spawn_blob_upload(&token, &item.blob_id)?);
        }
    }

    println!("→ Syncing with server...");
    let mut resolve = resolve.map(ResolvePolicy::from);
    let outcome = engine.sync_item(&token, name, resolve).await?;

    if outcome.applied {
        println!("✓ Synced. New version: {}", outcome.new_version);
    } else if !outcome.conflicts.is_empty() {
        report_conflicts(&outcome.conflicts, outcome.server_version, resolve);

        if resolve.is_none() {
            if let Some(choice) = prompt_resolution()? {
                resolve = Some(choice.into());
                println!("→ Re-syncing (resolve={:?})...", choice);
                let retry = engine.sync_item(&token, name, resolve).await?;
                if retry.applied {
                    println!("✓ Synced. New version: {}", retry.new_version);
                } else {
                    report_conflicts(&retry.conflicts, retry.server_version, resolve);
                }
            } else {
                println!("• Cancelled");
            }
        }
    } else {
        println!("• Sync finished: nothing applied");
    }

    if let Some(upload) = upload {
        match upload.await {
            Ok(Ok(receipt)) => {
                if receipt.created {
                    println!(
                        "✓ File uploaded (blob_id={}, size={} bytes)",
                        receipt.id, receipt.size
                    );
                } else {
                    println!(
                        "✓ File was already uploaded (blob_id={}, size={} bytes)",
                        receipt.id, receipt.size
                    );
                }
            }
            Ok(Err(e)) => println!("× File upload failed: {}", e),
            Err(_) => println!("× File upload task dropped"),
        }
    }
    Ok(())
}

fn report_conflicts(
    conflicts: &[lockbox_core::sync::models::Conflict],
    server_version: i64,
    resolve: Option<ResolvePolicy>,
) {
    match serde_json::to_string(conflicts) {
        Ok(json) => println!("! Server conflict: {}", json),
        Err(_) => println!("! Server conflict ({} items)", conflicts.len()),
    }
    if server_version > 0 {
        println!("  server version: {}", server_version);
    }
    if resolve == Some(ResolvePolicy::Server) {
        println!("• Local copy aligned with the server (resolve=server)");
    }
}

fn print_batch_summary(summary: &lockbox_core::BatchSummary) {
    println!("Applied:        {}", summary.applied_count);
    println!("Server upserts: {}", summary.server_upserts);
    if !summary.conflicts.is_empty() {
        if let Ok(json) = serde_json::to_string(&summary.conflicts) {
            println!("! Conflicts: {}", json);
        }
    }
    if !summary.server_changes.is_empty() {
        println!("Server changes since last sync: {}", summary.server_changes.len());
    }
    if !summary.queued_blob_ids.is_empty() {
        println!("Queued blob downloads: {}", summary.queued_blob_ids.join(", "));
    }
    if let Some(server_time) = &summary.server_time {
        println!("Synced at {}", server_time);
    }
}

/// Interactive conflict prompt: client, server, or cancel.
fn prompt_resolution() -> Result<Option<ResolveArg>, CliError> {
    let stdin = std::io::stdin();
    loop {
        print!("Choose resolution [client|server|cancel]: ");
        std::io::stdout().flush().map_err(LockboxError::Io)?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).map_err(LockboxError::Io)? == 0 {
            return Ok(None);
        }
        match line.trim().to_lowercase().as_str() {
            "client" => return Ok(Some(ResolveArg::Client)),
            "server" => return Ok(Some(ResolveArg::Server)),
            "cancel" | "c" => return Ok(None),
            _ => println!("Invalid choice. Enter client, server or cancel."),
        }
    }
}
