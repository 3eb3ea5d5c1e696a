use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use terminoda::{
    AppResult,
    cli::{Cli, Commands},
    config::Config,
    demo, init_logging,
    session::{CommandRouter, InteractiveCommand, SessionEvent, SessionManager},
    ui,
};

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse_args();

    // Load configuration; env overrides are already applied
    let (config, load_error) = Config::load_with_fallback(&cli.config_file);

    // Initialize logging
    let _log_guard = init_logging(
        &cli.effective_log_level(&config.log_level),
        &config.log.file_path,
    )?;

    tracing::info!("Terminoda starting...");
    if let Some(err) = load_error {
        tracing::warn!("Failed to load config: {:#}, using defaults", err);
    }
    config.validate()?;
    tracing::debug!("CLI arguments: {:?}", cli);

    if cli.is_dry_run_mode() {
        ui::display_dry_run(&cli, &config)?;
        return Ok(());
    }

    match cli.command() {
        Commands::Config { action } => {
            Config::handle_command(&action, &cli.config_file)?;
        }
        Commands::Demo => {
            demo::run_demo(config).await?;
        }
        Commands::Interactive => {
            run_interactive(config).await?;
        }
    }

    tracing::info!("Terminoda stopped");
    Ok(())
}

/// Run the interactive shell on stdin/stdout
async fn run_interactive(config: Config) -> AppResult<()> {
    ui::display_welcome_page()?;

    let (mut session_manager, _transport) = SessionManager::with_loopback(config);
    let mut ui_events = session_manager
        .take_event_receiver()
        .ok_or("UI event receiver already taken")?;
    let commands = session_manager.command_sender();

    let printer = tokio::spawn(async move {
        while let Some(event) = ui_events.recv().await {
            let done = matches!(event, SessionEvent::ShutdownRequested);
            ui::print_event(&event);
            if done {
                break;
            }
        }
    });

    tokio::spawn(read_commands(commands));

    session_manager.run().await?;
    if let Err(e) = printer.await {
        tracing::warn!("UI printer task failed: {}", e);
    }
    Ok(())
}

/// Parse stdin lines into commands until quit or end of input
async fn read_commands(commands: mpsc::UnboundedSender<InteractiveCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                let _ = commands.send(InteractiveCommand::Quit);
                break;
            }
            Err(e) => {
                tracing::error!("Failed to read stdin: {}", e);
                let _ = commands.send(InteractiveCommand::Quit);
                break;
            }
        };

        match CommandRouter::parse_interactive_command(&line) {
            Ok(Some(command)) => {
                let quit = matches!(command, InteractiveCommand::Quit);
                if commands.send(command).is_err() || quit {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => println!("{} {}", "Command error:".red(), e),
        }
    }
}
