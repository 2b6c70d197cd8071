use std::io;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{Level, error, subscriber::set_global_default};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    set_global_default(
        Registry::default()
            .with(fmt::Layer::default().compact().with_writer(io::stdout))
            .with(
                EnvFilter::builder()
                    .with_default_directive(Level::INFO.into())
                    .from_env_lossy(),
            ),
    )
    .expect("set tracing subscriber");

    if let Some(Command::Init(args)) = cli.command {
        run_init(args);
        return;
    }

    let Some(database_url) = cli.database_url else {
        eprintln!("error: DATABASE_URL is required unless using a subcommand");
        std::process::exit(2);
    };

    let config = lectern::config::AppConfig {
        port: cli.port,
        database_url: database_url.trim().to_string(),
        hub_ui_code: cli.hub_ui_code.trim().to_string(),
        hub_secret: cli.hub_secret.trim().to_string(),
        vapid_public_key: trimmed(cli.vapid_public_key),
        vapid_private_key: trimmed(cli.vapid_private_key),
        vapid_subject: trimmed(cli.vapid_subject).or(trimmed(cli.hub_public_origin)),
        worker_count: cli.worker_count,
        queue_size: cli.queue_size,
        max_retries: cli.max_retries,
        retry_base_backoff_ms: cli.retry_base_backoff_ms,
        push_ttl_seconds: cli.push_ttl_seconds,
        subscribe_rate_limit: cli.subscribe_rate_limit,
        subscribe_rate_window: Duration::from_secs(cli.subscribe_rate_window_seconds),
    };

    if let Err(err) = lectern::serve(config).await {
        error!("server failed: {err}");
        std::process::exit(1);
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Parser, Debug)]
#[command(name = "lectern", version, about = "Web Push notification hub")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long, env = "PORT", default_value_t = 4000)]
    port: u16,
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
    #[arg(long, env = "HUB_UI_CODE", default_value = "", hide_env_values = true)]
    hub_ui_code: String,
    #[arg(long, env = "HUB_SECRET", default_value = "", hide_env_values = true)]
    hub_secret: String,
    #[arg(long, env = "VAPID_PUBLIC_KEY")]
    vapid_public_key: Option<String>,
    #[arg(long, env = "VAPID_PRIVATE_KEY", hide_env_values = true)]
    vapid_private_key: Option<String>,
    #[arg(long, env = "VAPID_SUBJECT")]
    vapid_subject: Option<String>,
    #[arg(long, env = "HUB_PUBLIC_ORIGIN")]
    hub_public_origin: Option<String>,
    #[arg(long, env = "WORKER_COUNT", default_value_t = 10)]
    worker_count: usize,
    #[arg(long, env = "QUEUE_SIZE", default_value_t = 1024)]
    queue_size: usize,
    #[arg(long, env = "MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,
    #[arg(long, env = "RETRY_BASE_BACKOFF_MS", default_value_t = 400)]
    retry_base_backoff_ms: u64,
    #[arg(long, env = "PUSH_TTL_SECONDS", default_value_t = 1_209_600)]
    push_ttl_seconds: u32,
    #[arg(long, env = "SUBSCRIBE_RATE_LIMIT", default_value_t = 5)]
    subscribe_rate_limit: usize,
    #[arg(long, env = "SUBSCRIBE_RATE_WINDOW_SECONDS", default_value_t = 60)]
    subscribe_rate_window_seconds: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a fresh VAPID key pair and print it in env-var form.
    Init(InitArgs),
}

#[derive(Args, Debug)]
struct InitArgs {
    #[arg(long)]
    subject: Option<String>,
}

fn run_init(args: InitArgs) {
    let credentials = match lectern::generate_vapid_credentials() {
        Ok(credentials) => credentials,
        Err(err) => {
            eprintln!("failed to generate VAPID credentials: {err}");
            std::process::exit(1);
        }
    };
    let (subject, show_subject_note) = match args.subject {
        Some(subject) => (subject, false),
        None => ("mailto:you@example.com".to_string(), true),
    };

    println!("VAPID credentials generated.");
    println!();
    println!("VAPID_PRIVATE_KEY=\"{}\"", credentials.private_key);
    println!("VAPID_PUBLIC_KEY=\"{}\"", credentials.public_key);
    println!("VAPID_SUBJECT=\"{subject}\"");
    if show_subject_note {
        println!();
        println!("Note: replace VAPID_SUBJECT with a contact URI you control.");
    }
}
