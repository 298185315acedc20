use anyhow::{anyhow, bail, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use coachcall::call::{
    CallEntry, CallEvent, CallView, Collaborators, ConnectionState, IncomingCallOffer,
    LoopbackTransportFactory, MediaDevices, MemoryFeedbackStore, NavigationSink, Notification,
    NotificationLevel, NotificationSink, Participant, Role, Route, SessionConnectionManager,
    SessionDescriptor, SyntheticDevices,
};
use coachcall::config::{CallConfigFile, ConfigError};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("simulate", sub)) => {
            let file = CallConfigFile::load_or_default(
                sub.get_one::<PathBuf>("config").map(PathBuf::as_path),
            )?;
            init_logging(&file.logging.level);
            simulate(file, sub).await
        }
        Some(("config", sub)) => {
            init_logging("warn");
            run_config(sub)
        }
        _ => bail!("No valid command provided"),
    }
}

/// RUST_LOG wins over the configured level
fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env).format_target(false).try_init();
}

fn build_cli() -> Command {
    Command::new("coachcall")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Live coaching session connection manager")
        .arg_required_else_help(true)
        .subcommand_required(true)
        .subcommand(build_simulate_command())
        .subcommand(build_config_command())
}

fn build_simulate_command() -> Command {
    Command::new("simulate")
        .about("Run a full call against synthetic devices and a loopback peer")
        .long_about("Runs one call from entry to feedback using a test-pattern camera, \
                     a silent microphone and an in-process loopback transport. \
                     Notifications and navigation are printed as they happen.")
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration")
                .value_name("SECONDS")
                .value_parser(value_parser!(u64))
                .default_value("10")
                .help("Scheduled session length in seconds")
        )
        .arg(
            Arg::new("role")
                .short('r')
                .long("role")
                .value_name("ROLE")
                .value_parser(["host", "participant"])
                .default_value("participant")
                .help("Side of the call the local user is on")
        )
        .arg(
            Arg::new("incoming")
                .long("incoming")
                .action(ArgAction::SetTrue)
                .help("Enter through the incoming-call gate")
        )
        .arg(
            Arg::new("decline")
                .long("decline")
                .action(ArgAction::SetTrue)
                .requires("incoming")
                .help("Decline the incoming call")
        )
        .arg(
            Arg::new("deny-media")
                .long("deny-media")
                .action(ArgAction::SetTrue)
                .help("Simulate a declined camera/microphone permission prompt")
        )
        .arg(
            Arg::new("rating")
                .long("rating")
                .value_name("STARS")
                .value_parser(value_parser!(u8))
                .default_value("5")
                .help("Rating to submit after the session (1-5)")
        )
        .arg(
            Arg::new("comment")
                .long("comment")
                .value_name("TEXT")
                .default_value("")
                .help("Comment to submit with the rating")
        )
        .arg(
            Arg::new("skip-feedback")
                .long("skip-feedback")
                .action(ArgAction::SetTrue)
                .conflicts_with_all(["rating", "comment"])
                .help("Skip the feedback dialog")
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .env("COACHCALL_CONFIG")
                .help("Configuration file")
        )
}

fn build_config_command() -> Command {
    let path_arg = || {
        Arg::new("path")
            .value_name("PATH")
            .value_parser(value_parser!(PathBuf))
            .help("Configuration file (defaults to the user config directory)")
    };

    Command::new("config")
        .about("Manage configuration")
        .subcommand_required(true)
        .subcommand(
            Command::new("init")
                .about("Create default configuration file")
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Overwrite an existing file")
                )
                .arg(path_arg())
        )
        .subcommand(
            Command::new("show")
                .about("Show configuration")
                .arg(path_arg())
        )
        .subcommand(
            Command::new("validate")
                .about("Validate configuration file")
                .arg(path_arg())
        )
}

struct ConsoleNotifications;

impl NotificationSink for ConsoleNotifications {
    fn notify(&self, notification: Notification) {
        let tag = match notification.level {
            NotificationLevel::Info => "info",
            NotificationLevel::Success => " ok ",
            NotificationLevel::Warning => "warn",
            NotificationLevel::Error => "FAIL",
        };
        println!("[{}] {}: {}", tag, notification.title, notification.message);
    }
}

struct ConsoleNavigation;

impl NavigationSink for ConsoleNavigation {
    fn navigate(&self, route: Route) {
        println!("-> {}", route.path());
    }
}

async fn simulate(file: CallConfigFile, args: &ArgMatches) -> Result<()> {
    if let Err(errors) = file.validate() {
        bail!("Invalid configuration: {}", errors.join("; "));
    }
    let config = file.to_call_config();

    let duration = args.get_one::<u64>("duration").copied().unwrap_or(10);
    let role: Role = args
        .get_one::<String>("role")
        .map(|s| s.parse())
        .transpose()
        .map_err(|e: String| anyhow!(e))?
        .unwrap_or(Role::Participant);
    let rating = args.get_one::<u8>("rating").copied().unwrap_or(5);
    let comment = args.get_one::<String>("comment").cloned().unwrap_or_default();
    let skip_feedback = args.get_flag("skip-feedback");

    let devices: Arc<dyn MediaDevices> = if args.get_flag("deny-media") {
        Arc::new(SyntheticDevices::denied())
    } else {
        Arc::new(SyntheticDevices::new())
    };
    let store = Arc::new(MemoryFeedbackStore::new());
    let collaborators = Collaborators::new(
        devices,
        Arc::new(LoopbackTransportFactory::new(config.negotiation_delay)),
    )
    .with_notifications(Arc::new(ConsoleNotifications))
    .with_navigation(Arc::new(ConsoleNavigation))
    .with_feedback_store(store.clone());

    let manager = SessionConnectionManager::new(config, collaborators);
    let mut events = manager.subscribe();

    let descriptor = SessionDescriptor::new(
        "simulated-session",
        Participant::new("Coach Kim"),
        Participant::new("Alex"),
        duration,
        role,
    )
    .with_category("strength");
    println!(
        "Session {} ({}s) as {}, with {}",
        descriptor.id,
        duration,
        role,
        descriptor.remote().name
    );

    if args.get_flag("incoming") {
        manager
            .enter(CallEntry::Incoming(IncomingCallOffer::new(descriptor)))
            .await?;
        if args.get_flag("decline") {
            manager.decline().await?;
        } else {
            manager.accept().await?;
        }
    } else {
        manager.enter(CallEntry::Known(descriptor)).await?;
    }

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                log::warn!("Skipped {} call events", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            CallEvent::Tick { remaining } => println!("   {}", remaining),
            CallEvent::RemoteTrackAttached { track } => {
                println!("   remote {} track attached", track.kind)
            }
            CallEvent::StateChanged {
                to: ConnectionState::Failed,
                ..
            } => {
                if let CallView::Failed { reason, actions } = manager.snapshot().await.view {
                    println!("   failed: {} (actions: {:?})", reason, actions);
                }
                manager.go_back().await?;
            }
            CallEvent::FeedbackOpened => {
                if skip_feedback {
                    manager.skip_feedback().await?;
                } else {
                    manager.submit_feedback(rating, comment.clone()).await?;
                }
            }
            CallEvent::Navigated { .. } => break,
            _ => {}
        }
    }

    for record in store.records().await {
        println!(
            "Feedback recorded: {} stars \"{}\" at {}",
            record.rating.value(),
            record.comment,
            record.submitted_at.to_rfc3339()
        );
    }
    Ok(())
}

fn config_path(args: &ArgMatches) -> Result<PathBuf> {
    match args.get_one::<PathBuf>("path") {
        Some(path) => Ok(path.clone()),
        None => CallConfigFile::default_path().ok_or_else(|| ConfigError::NoConfigDir.into()),
    }
}

fn run_config(args: &ArgMatches) -> Result<()> {
    match args.subcommand() {
        Some(("init", sub)) => {
            let path = config_path(sub)?;
            CallConfigFile::init(&path, sub.get_flag("force"))?;
            println!("Created default configuration at: {}", path.display());
        }
        Some(("show", sub)) => {
            let path = config_path(sub)?;
            if path.exists() {
                let config = CallConfigFile::load_from_file(&path)?;
                println!("{}", toml::to_string_pretty(&config)?);
            } else {
                println!("Configuration file not found. Showing default configuration:");
                println!("{}", CallConfigFile::generate_sample_config());
            }
        }
        Some(("validate", sub)) => {
            let path = config_path(sub)?;
            let config = CallConfigFile::load_from_file(&path)?;
            match config.validate() {
                Ok(()) => println!("Configuration is valid"),
                Err(errors) => {
                    eprintln!("Configuration validation failed:");
                    for error in &errors {
                        eprintln!("  - {}", error);
                    }
                    bail!("{} problem(s) in {}", errors.len(), path.display());
                }
            }
        }
        _ => bail!("Unknown config subcommand. Available: init, show, validate"),
    }
    Ok(())
}
