use clap::Parser;

/// Exit status of a rollout whose deployments did not become ready.
const ROLLOUT_FAILED: i32 = 2;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match fuse::cli::Cli::parse().run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(ROLLOUT_FAILED),
        Err(error) => {
            const BOLD_RED: &str = "\x1b[1;31m";
            const BOLD: &str = "\x1b[1m";
            const RESET: &str = "\x1b[0m";
            eprintln!("{BOLD_RED}error{RESET}{BOLD}:{RESET} {error}");
            std::process::exit(1);
        }
    }
}
