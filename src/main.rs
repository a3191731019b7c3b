use clap::Parser;

fn main() {
    let cli = labelcodec::Cli::parse();

    let default_filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(err) = labelcodec::run(cli) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
