use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use picker_core::{PickerConfig, Service, DEFAULT_PROMPTS_DIR};
use picker_engine::store::PromptSnapshot;
use picker_server::{run_server, AppState};

#[derive(Parser)]
#[command(
    name = "arr-llm-picker",
    version,
    about = "LLM-driven release selection for Radarr and Sonarr",
    long_about = "Answers the Download Decision Override webhook of Radarr and Sonarr by asking\n\
                   an LLM to pick the best release, falling back to the arr's own choice on any\n\
                   failure. Prompts live in {PROMPTS_DIR}/{service}/{profile}/system.txt.\n\n\
                   Examples:\n  \
                     arr-llm-picker                      Serve on 0.0.0.0:8080\n  \
                     arr-llm-picker serve --port 9000    Serve on another port\n  \
                     arr-llm-picker prompts --dir ./prompts  Check a prompt directory",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook server (default)
    #[command(long_about = "Run the webhook server.\n\n\
        Configuration is read from the environment. LLM_API_URL and LLM_MODEL are\n\
        required, plus RADARR_URL/RADARR_API_KEY and/or SONARR_URL/SONARR_API_KEY.\n\n\
        Examples:\n  arr-llm-picker serve\n  arr-llm-picker serve --host 127.0.0.1 --port 9000 --log-json")]
    Serve(ServeArgs),
    /// Load a prompt directory and report what was found
    #[command(long_about = "Load a prompt directory and report what was found.\n\n\
        Lists usable and unreadable prompts per service. Exits non-zero if any\n\
        prompt file is unreadable.\n\n\
        Examples:\n  arr-llm-picker prompts\n  arr-llm-picker prompts --dir ./prompts")]
    Prompts {
        /// Prompt root directory
        #[arg(long, env = "PROMPTS_DIR", default_value = DEFAULT_PROMPTS_DIR)]
        dir: PathBuf,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn serve(args: &ServeArgs) -> Result<()> {
    let config = PickerConfig::from_env()?;
    config.log_summary();

    let ip: IpAddr = args
        .host
        .parse()
        .into_diagnostic()
        .wrap_err_with(|| format!("invalid host address '{}'", args.host))?;
    let addr = SocketAddr::new(ip, args.port);

    let state = Arc::new(AppState::from_config(&config)?);
    tracing::info!(
        prompts = state.engine.prompts().snapshot().loaded_count(),
        "prompts loaded"
    );

    run_server(addr, state, config.max_concurrent_requests).await?;
    Ok(())
}

fn report_prompts(dir: &std::path::Path) -> Result<()> {
    let snapshot = PromptSnapshot::scan(dir);
    println!("Prompts in {}", dir.display());

    let mut unreadable_total = 0;
    for service in Service::ALL {
        let loaded = snapshot.profiles(service);
        let unreadable = snapshot.unreadable(service);
        unreadable_total += unreadable.len();

        println!("\n{}:", service.display_name());
        if loaded.is_empty() && unreadable.is_empty() {
            println!("  (none)");
        }
        for profile in &loaded {
            println!("  ok          {profile}");
        }
        for (profile, reason) in &unreadable {
            println!("  unreadable  {profile} ({reason})");
        }
    }

    if unreadable_total > 0 {
        miette::bail!("{unreadable_total} prompt file(s) could not be used");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        None => serve(&cli.serve).await,
        Some(Command::Serve(args)) => serve(&args).await,
        Some(Command::Prompts { dir }) => report_prompts(&dir),
    }
}
