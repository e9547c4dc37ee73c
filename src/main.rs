use clap::Parser;
use dbhelper::cli::{self, CliOptions};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

fn main() {
    let options = CliOptions::parse();

    // Initialize the logging system using tracing subscriber
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    if options.debug {
        if let Ok(directive) = "dbhelper::sql=info".parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting dbhelper...");

    let stdout = std::io::stdout();
    if let Err(e) = cli::run(&options, &mut stdout.lock()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
