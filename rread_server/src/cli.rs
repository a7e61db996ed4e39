use std::{env, env::VarError};

/// Settings whose values are safe to print
const PLAIN_ENVS: [&str; 21] = [
    "RUST_LOG",
    "RR_HOST",
    "RR_PORT",
    "RR_DATABASE_URL",
    "RR_SIGNATURE_CHECKS",
    "RR_WEBHOOK_IP_WHITELIST",
    "RR_USE_X_FORWARDED_FOR",
    "RR_USE_FORWARDED",
    "RR_MP_API_URL",
    "RR_MP_TIMEOUT_SECS",
    "RR_SMTP_SERVER",
    "RR_SMTP_PORT",
    "RR_EMAIL_USER",
    "RR_WORKER_COUNT",
    "RR_JOB_MAX_ATTEMPTS",
    "RR_JOB_BASE_DELAY_SECS",
    "RR_JOB_MAX_DELAY_SECS",
    "RR_JOB_POLL_INTERVAL_MS",
    "RR_JOB_LEASE_SECS",
    "RR_ORDER_LOOKUP_ATTEMPTS",
    "RR_ORDER_LOOKUP_DELAY_MS",
];

/// Settings that are only reported as present or missing
const SECRET_ENVS: [&str; 3] = ["RR_WEBHOOK_SECRET", "RR_MP_ACCESS_TOKEN", "RR_EMAIL_PASSWORD"];

/// What the worker binary was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    /// No arguments: run the workers until interrupted
    Run,
    /// `--dead`: list the dead-lettered jobs and exit
    ListDeadJobs,
    /// `--revive <job id>`: put a dead-lettered job back on the queue and exit
    ReviveJob(i64),
    /// Anything else
    Help,
}

/// The server takes no arguments, so any argument at all prints the help and the current environment. Returns true
/// if it did, in which case the caller should exit.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        print_help();
    }
    has_cli_args
}

/// Parses the worker's arguments, without the program name.
pub fn parse_worker_args<I: IntoIterator<Item = String>>(args: I) -> WorkerCommand {
    let args = args.into_iter().collect::<Vec<_>>();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] => WorkerCommand::Run,
        ["--dead"] => WorkerCommand::ListDeadJobs,
        ["--revive", id] => match id.trim_start_matches('#').parse::<i64>() {
            Ok(id) if id > 0 => WorkerCommand::ReviveJob(id),
            _ => {
                eprintln!("{id} is not a job id");
                WorkerCommand::Help
            },
        },
        _ => WorkerCommand::Help,
    }
}

pub fn print_help() {
    println!("\n{}\n", include_str!("./cli-help.txt"));
    display_envs();
}

fn display_envs() {
    println!("Current environment values:");
    for name in PLAIN_ENVS {
        println!("  {name:<35} {:<15}", describe(name, env::var(name)));
    }
    for name in SECRET_ENVS {
        let val = match env::var(name) {
            Ok(s) if !s.trim().is_empty() => "Set (hidden)".to_string(),
            Ok(_) => "Empty".to_string(),
            Err(e) => describe(name, Err(e)),
        };
        println!("  {name:<35} {val:<15}");
    }
}

fn describe(name: &str, value: Result<String, VarError>) -> String {
    match value {
        Ok(s) => s,
        Err(VarError::NotPresent) => "Not set".into(),
        Err(VarError::NotUnicode(_)) => format!("{name} is not valid unicode"),
    }
}
