use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

use compose_pilot::compose::{self, MessageTemplate};
use compose_pilot::hands::BrowserSession;
use compose_pilot::types::now_ms;
use compose_pilot::{
    ChromeDom, CompletionGate, ComposeRequest, FlagStore, GateDecision, JsonFileStore,
    PilotConfig, RunReport, SequenceEvent, Sequencer, UnmatchedPolicy, logging,
};

#[derive(Parser)]
#[command(name = "compose-pilot", version, about = "Send a message through a web composer UI")]
struct Cli {
    /// JSON configuration file (defaults to $COMPOSE_PILOT_CONFIG, then built-ins)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open the composer in the current tab, fill it in and submit
    Send {
        /// Full display name of the recipient, as the type-ahead shows it
        #[arg(long)]
        recipient: String,
        /// Subject line; together with --body replaces the configured template
        #[arg(long, requires = "body")]
        subject: Option<String>,
        #[arg(long, requires = "subject")]
        body: Option<String>,
        /// Name used for {sender} and as signature
        #[arg(long)]
        sender: Option<String>,
        /// Page to load before starting
        #[arg(long)]
        url: Option<String>,
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
        /// Run even if the completion flag is already set
        #[arg(long)]
        force: bool,
    },
    /// Show the completion flag and whether a run would start
    Status,
    /// Write the default configuration as JSON
    InitConfig {
        #[arg(default_value = "compose-pilot.json")]
        path: PathBuf,
        #[arg(long)]
        overwrite: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    SubmitAnyway,
    AbortIfUnmatched,
}

impl From<PolicyArg> for UnmatchedPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::SubmitAnyway => UnmatchedPolicy::SubmitAnyway,
            PolicyArg::AbortIfUnmatched => UnmatchedPolicy::AbortIfUnmatched,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    logging::setup(cli.verbose);

    let mut config = PilotConfig::load(cli.config.as_deref())?;
    let file_store = Arc::new(JsonFileStore::new(
        config
            .state_file
            .clone()
            .unwrap_or_else(JsonFileStore::default_path),
    ));
    tracing::debug!(path = ?file_store.path(), "Using flag store");
    let store: Arc<dyn FlagStore> = file_store;
    let gate = CompletionGate::new(store.clone(), config.flag_key.clone())
        .with_rerun_after(config.rerun_after());

    match cli.command {
        Command::Send {
            recipient,
            subject,
            body,
            sender,
            url,
            policy,
            force,
        } => {
            if let Some(policy) = policy {
                config.unmatched = policy.into();
            }
            if url.is_some() {
                config.browser.start_url = url;
            }
            let template = match (subject, body) {
                (Some(subject), Some(body)) => MessageTemplate::Fixed { subject, body },
                _ => config.message.clone(),
            };
            let request =
                compose::compose_random(&template, &recipient, sender.as_deref(), now_ms())?;

            let config = &config;
            let job_store = store.clone();
            let job = move || send(config, job_store, request);
            let report = if force {
                Some(job().await)
            } else {
                gate.run_once(now_ms(), job).await?
            };

            match report {
                Some(Ok(report)) => print_report(&report),
                Some(Err(e)) => return Err(e),
                None => println!(
                    "Already sent (flag `{}` is set); pass --force to send again.",
                    gate.key()
                ),
            }
        }
        Command::Status => {
            let flag = store.get(gate.key())?;
            println!("flag `{}`: {:?}", gate.key(), flag);
            match gate.check(now_ms())? {
                GateDecision::Run => println!("next `send` will run"),
                GateDecision::Skip { .. } => println!("next `send` will be skipped"),
            }
        }
        Command::InitConfig { path, overwrite } => {
            if path.exists() && !overwrite {
                return Err(anyhow!(
                    "{} already exists (use --overwrite)",
                    path.display()
                ));
            }
            PilotConfig::default().write_to(&path)?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

async fn send(
    config: &PilotConfig,
    store: Arc<dyn FlagStore>,
    request: ComposeRequest,
) -> Result<RunReport> {
    let browser_config = config.browser.clone();
    let session = tokio::task::spawn_blocking(move || -> Result<BrowserSession> {
        let session = BrowserSession::launch(&browser_config)?;
        if let Some(url) = &browser_config.start_url {
            session.open(url)?;
        }
        Ok(session)
    })
    .await
    .map_err(|e| anyhow!("Browser launch panicked: {}", e))??;

    let (event_tx, mut event_rx) = broadcast::channel::<SequenceEvent>(64);
    let printer = tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            println!("{}", event.describe());
        }
    });

    let dom = Arc::new(ChromeDom::new(session.tab.clone()));
    let sequencer = Sequencer::from_config(dom, store, config).with_events(event_tx);
    let result = sequencer
        .run(&request)
        .await
        .with_context(|| format!("sending to `{}`", request.recipient_display_name));

    drop(sequencer);
    let _ = printer.await;
    result
}

fn print_report(report: &RunReport) {
    match &report.selected {
        Some(name) => println!("Sent to {name}."),
        None => println!(
            "Submitted without a selected recipient (type-ahead showed {:?}).",
            report.candidates_seen
        ),
    }
}
