use clap::{Parser, Subcommand};
use furnish_admin_core::config::DEFAULT_BASE_URL;
use furnish_admin_core::pagination::DEFAULT_DELTA;
use furnish_admin_core::{
    AdminClient, AdminResource, AssumeYes, ClientConfig, CollectionState, ControllerConfig,
    MultipartForm, Payload, QueryParams, Session, SessionStore, compute_window, format_window,
};
use serde_json::{Map, Value};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

#[derive(Parser)]
#[command(name = "furnish-admin")]
#[command(about = "Manage the content of the furniture site from the command line")]
struct Cli {
    /// Admin API base URL
    #[arg(long, env = "FURNISH_API_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,
    /// Bearer token, overrides the saved session
    #[arg(long, env = "FURNISH_API_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Print the HTTP calls made before exiting
    #[arg(long)]
    show_requests: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a page of a collection
    List {
        /// products, banners, news, csr, users, roles or contacts
        resource: AdminResource,
        #[arg(short, long)]
        page: Option<u32>,
        /// Extra query parameter, e.g. --param category=outdoor
        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
        /// Pages shown on each side of the current one
        #[arg(long, default_value_t = DEFAULT_DELTA)]
        delta: u32,
    },
    /// Show one record
    Show { resource: AdminResource, id: String },
    /// Create a record
    Create {
        resource: AdminResource,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Update a record
    Update {
        resource: AdminResource,
        id: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Delete a record
    Delete {
        resource: AdminResource,
        id: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Preview the page buttons for a position in a paginated list
    Pages {
        #[arg(long)]
        current: u32,
        #[arg(long)]
        total: u32,
        #[arg(long, default_value_t = DEFAULT_DELTA)]
        delta: u32,
    },
    /// Save a bearer token for later commands
    Login {
        token: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Forget the saved token
    Logout,
}

#[derive(clap::Args)]
struct FieldArgs {
    /// Record field, e.g. --field name=Sofa. Values that parse as JSON are sent as JSON.
    #[arg(short, long = "field", value_parser = parse_key_value)]
    fields: Vec<(String, String)>,
    /// File attachment, e.g. --file image=./sofa.jpg. Switches the body to multipart.
    #[arg(long = "file", value_parser = parse_key_value)]
    files: Vec<(String, String)>,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Expected key=value, got `{}`", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Key cannot be empty: `{}`", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

fn guess_mime(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_lowercase();
    let mime = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime.to_string())
}

fn build_payload(args: FieldArgs) -> Result<Payload, Box<dyn std::error::Error>> {
    if args.files.is_empty() {
        let record: Map<String, Value> = args
            .fields
            .into_iter()
            .map(|(key, value)| {
                let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
                (key, value)
            })
            .collect();
        return Ok(Payload::Json(Value::Object(record)));
    }

    let mut form = MultipartForm::new();
    for (key, value) in args.fields {
        form = form.text(key, value);
    }
    for (key, path) in args.files {
        let path = PathBuf::from(path);
        let bytes = std::fs::read(&path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.clone());
        form = form.file(key, file_name, guess_mime(&path), bytes);
    }
    Ok(Payload::Multipart(form))
}

fn ask_confirmation(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}

/// Prints the success or error message. Returns false on error.
fn report(state: &CollectionState) -> bool {
    if let Some(error) = &state.error {
        eprintln!("Error: {}", error);
        return false;
    }
    if let Some(success) = &state.success {
        println!("{}", success);
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Pages {
            current,
            total,
            delta,
        } => {
            println!("{}", format_window(&compute_window(*current, *total, *delta)));
            return Ok(());
        }
        Commands::Login { token, user } => {
            let store = SessionStore::default_location()?;
            let session = Session::anonymous();
            session.login(token.clone(), user.clone());
            store.save(&session)?;
            println!("Token saved to {}", store.path().display());
            return Ok(());
        }
        Commands::Logout => {
            SessionStore::default_location()?.clear()?;
            println!("Logged out");
            return Ok(());
        }
        _ => {}
    }

    let store = match &cli.token {
        Some(_) => None,
        None => Some(SessionStore::default_location()?),
    };
    let session = match (&cli.token, &store) {
        (Some(token), _) => Session::with_token(token.clone()),
        (None, Some(store)) => store.load()?,
        (None, None) => Session::anonymous(),
    };
    let had_token = session.is_authenticated();
    if !session.is_authenticated() {
        log::warn!("No token configured, requests are sent anonymously");
    }

    let client = AdminClient::new(
        &ClientConfig::with_base_url(cli.base_url.clone()),
        ControllerConfig::default(),
        session,
    )?;

    let succeeded = match cli.command {
        Commands::List {
            resource,
            page,
            params,
            delta,
        } => {
            let controller = client.controller(resource);
            let mut query: QueryParams = params.into_iter().collect();
            if let Some(page) = page {
                query.insert("page", page);
            }

            controller.fetch_page(query).await;
            let state = controller.state();
            let ok = report(&state);
            if ok {
                for item in &state.items {
                    print_json(item);
                }
                let pagination = state.pagination;
                println!(
                    "Page {} of {} ({} {})",
                    pagination.current_page, pagination.last_page, pagination.total, resource
                );
                if pagination.last_page > 1 {
                    println!("{}", format_window(&pagination.window(delta)));
                }
            }
            ok
        }
        Commands::Show { resource, id } => {
            let controller = client.controller(resource);
            let item = controller.get_item(&id).await;
            if let Some(item) = &item {
                print_json(item);
            }
            report(&controller.state())
        }
        Commands::Create { resource, fields } => {
            let controller = client.controller(resource);
            let saved = controller.create(build_payload(fields)?).await;
            if let Some(saved) = &saved {
                print_json(saved);
            }
            report(&controller.state())
        }
        Commands::Update {
            resource,
            id,
            fields,
        } => {
            let controller = client.controller(resource);
            let saved = controller.update(&id, build_payload(fields)?).await;
            if let Some(saved) = &saved {
                print_json(saved);
            }
            report(&controller.state())
        }
        Commands::Delete { resource, id, yes } => {
            let controller = client.controller(resource);
            let deleted = if yes {
                controller.delete_item(&id, &AssumeYes).await
            } else {
                controller.delete_item(&id, &ask_confirmation).await
            };
            if !deleted && controller.state().error.is_none() {
                println!("Nothing deleted");
            }
            report(&controller.state())
        }
        Commands::Pages { .. } | Commands::Login { .. } | Commands::Logout => true,
    };

    // A 401 during the command dropped the session
    if let Some(store) = &store {
        if had_token && !client.session().is_authenticated() {
            store.clear()?;
            eprintln!("Session expired, run `furnish-admin login` again");
        }
    }

    if cli.show_requests {
        for record in client.transport().request_log().records() {
            let timestamp = record
                .timestamp
                .format(&Rfc3339)
                .unwrap_or_else(|_| record.timestamp.to_string());
            println!(
                "{} {} {} -> {}",
                timestamp, record.method, record.url, record.status_code
            );
        }
    }

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
