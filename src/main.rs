use enctool::cli::Cli;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let matches = Cli::build_command().get_matches();
    init_logging(matches.get_flag("verbose"));

    if let Err(e) = Cli::run_with_matches(matches) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
