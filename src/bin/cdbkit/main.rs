use anyhow::Result;
use env_logger::{Builder, Env};

mod cli;
mod util;
mod cmd_make;
mod cmd_dump;
mod cmd_get;
mod cmd_check;
mod cmd_stats;

fn init_logger() {
    // Уровень из RUST_LOG, иначе info. Пишет в stderr: stdout занят dump'ом.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Make { path, tmp, input } =>
            cmd_make::exec(path, tmp, input),

        cli::Cmd::Dump { path, out } =>
            cmd_dump::exec(path, out),

        cli::Cmd::Get { path, key, all, out } =>
            cmd_get::exec(path, key, all, out),

        cli::Cmd::Check { path, json } =>
            cmd_check::exec(path, json),

        cli::Cmd::Stats { path, json } =>
            cmd_stats::exec(path, json),
    }
}
