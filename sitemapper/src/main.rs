use colored::Colorize;
use commands::command_argument_builder;
use sitemapper::handlers::{
    Settings, handle_generate, handle_init, handle_results, handle_serve, handle_validate,
};
use tracing_subscriber::EnvFilter;

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();

    init_tracing(chosen_command.get_flag("verbose"));
    let settings = Settings::from_matches(&chosen_command);

    let outcome = match chosen_command.subcommand() {
        Some(("init", primary_command)) => handle_init(&settings, primary_command),
        Some(("generate", primary_command)) => handle_generate(&settings, primary_command).await,
        Some(("validate", primary_command)) => handle_validate(&settings, primary_command).await,
        Some(("results", primary_command)) => handle_results(&settings, primary_command).await,
        Some(("serve", primary_command)) => handle_serve(&settings, primary_command).await,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = outcome {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// RUST_LOG wins; otherwise info, or debug with --verbose.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
