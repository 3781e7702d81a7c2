//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = osmfence_cli::run() {
        eprintln!("osmfence: {err}");
        std::process::exit(1);
    }
}
