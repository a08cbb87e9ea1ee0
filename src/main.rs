//! setupflow - command-line entry point
//!
//! Loads an installation description and drives it through the engine with
//! the unattended front-end.

use log::{debug, error, info, warn};
use std::path::Path;
use std::sync::Arc;
use strum::IntoEnumIterator;

use setupflow::cli::{Cli, Commands};
use setupflow::controller::InstallerController;
use setupflow::orchestrator::{InstallReport, Orchestrator};
use setupflow::session::CancelToken;
use setupflow::view::{Answers, UnattendedView};
use setupflow::wizard::{BuiltinProvider, ProviderRegistry, WizardProvider};
use setupflow::{payload, Config, WizardMode};

/// Initialize the logger with appropriate settings
fn init_logger() {
    use env_logger::Builder;
    use std::io::Write;

    Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}:{}] {}",
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env() // Allows RUST_LOG env var to override
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    debug!("setupflow starting up");

    let cli = Cli::parse_args();
    let dry_run = cli.dry_run;

    match &cli.command {
        Commands::Validate { config } => {
            info!("Validating configuration file: {:?}", config);
            match Config::load_from_file(config).and_then(|c| c.validate().map(|()| c)) {
                Ok(config) => {
                    println!(
                        "✓ {} {} is valid ({} component(s))",
                        config.app_name,
                        config.app_version,
                        config.components.len()
                    );
                }
                Err(e) => {
                    error!("Configuration validation failed: {:#}", e);
                    eprintln!("✗ Configuration validation failed: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Plan { config, mode } => {
            let config = load_config(config, dry_run)?;
            let mode = mode.unwrap_or(config.mode);
            print_plan(config, mode)?;
        }
        Commands::Install {
            config,
            mode,
            wizard,
            no_wizard,
            ..
        } => {
            let config = load_config(config, dry_run)?;
            let answers = cli.command.answers().unwrap_or_default();
            let mode = mode.unwrap_or(config.mode);
            let name = wizard.clone().unwrap_or_else(|| mode.to_string());

            match run_install(config, answers, &name, *no_wizard) {
                Ok(report) => print_report(&report),
                Err(e) => {
                    error!("Installation failed: {}", e);
                    eprintln!("\n✗ Installation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Load, validate and attach payload hooks. Relative payload sources are
/// resolved against the description's directory.
fn load_config(path: &Path, dry_run: bool) -> anyhow::Result<Config> {
    info!("Loading configuration from: {:?}", path);
    let mut config = Config::load_from_file(path)?;
    config.validate()?;
    if dry_run {
        config.dry_run = true;
    }
    let base = path.parent().unwrap_or(Path::new("."));
    payload::attach_hooks(&mut config, base);
    Ok(config)
}

/// Built-in wizards, with the theme step when the description offers themes.
fn registry(config: &Config) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for mode in WizardMode::iter() {
        let mut provider = BuiltinProvider::new(mode);
        if !config.themes.is_empty() {
            provider = provider.with_theme_step();
        }
        registry.register(Arc::new(provider));
    }
    registry
}

fn run_install(
    mut config: Config,
    answers: Answers,
    wizard: &str,
    no_wizard: bool,
) -> setupflow::Result<InstallReport> {
    let token = CancelToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("Interrupt received, stopping at the next step");
        handler_token.cancel();
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let mut view = UnattendedView::new(answers);

    if no_wizard {
        if let Some(ids) = view.answers().components.clone() {
            config.set_selected(&ids);
        }
        if let Some(dir) = view.answers().install_path.clone() {
            config.install_dir = dir;
        }
        info!("Installing {} without a wizard", config.app_name);
        return Orchestrator::new(config)
            .with_cancel_token(token)
            .run_unattended(&mut view);
    }

    let provider = registry(&config).get(wizard)?;
    info!("Running the '{}' wizard", provider.name());
    Orchestrator::new(config)
        .with_cancel_token(token)
        .run_wizard(provider.as_ref(), &mut view)
}

fn print_plan(mut config: Config, mode: WizardMode) -> setupflow::Result<()> {
    let provider = registry(&config).for_mode(mode)?;
    let wizard = provider.build(&config)?;

    println!("{} {} ({} wizard)", config.app_name, config.app_version, mode);
    for state in wizard.dfa().states() {
        let title = wizard.ui(state).map(|ui| ui.title.as_str()).unwrap_or("");
        let marker = if wizard.is_extension_state(state) { "+" } else { " " };
        println!(" {} {:<12} {}", marker, state.as_str(), title);
    }

    // Walk it with default answers to show the path taken
    let initial = wizard
        .dfa()
        .initial_state()
        .map(ToString::to_string)
        .unwrap_or_default();
    config.dry_run = true;
    let mut view = UnattendedView::new(Answers {
        accept_license: true,
        ..Answers::default()
    });
    let mut controller = InstallerController::new(config, wizard, &mut view);
    controller.run()?;
    drop(controller);

    let mut path = vec![initial.as_str()];
    path.extend(view.visited());
    println!("\nDefault path: {}", path.join(" → "));
    Ok(())
}

fn print_report(report: &InstallReport) {
    let verb = if report.dry_run { "Would install" } else { "Installed" };
    println!(
        "\n✓ {} {} into {} ({:.1}s)",
        verb,
        report.installed.join(", "),
        report.install_dir.display(),
        report.duration.as_secs_f64()
    );
    for warning in &report.warnings {
        println!("  ⚠ {}", warning);
    }
}
