//! Runs fulfilment workers without the HTTP ingress, so fulfilment can be scaled separately. Uses the same environment
//! as the server; `RR_WORKER_COUNT` sets the number of workers in this process.
//!
//! `rread_worker --dead` lists the dead-lettered jobs and `rread_worker --revive <id>` puts one back on the queue.
use std::env;

use dotenvy::dotenv;
use log::*;
use rread_engine::JobQueueApi;
use rread_server::{
    cli::{parse_worker_args, print_help, WorkerCommand},
    config::ServerConfig,
    dead_letters::{dead_letter_report, describe_job, revive_dead_job},
    errors::ServerError,
    server::open_database,
    workers::{create_alert_handlers, start_fulfillment_workers},
};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let command = parse_worker_args(env::args().skip(1));
    if command == WorkerCommand::Help {
        print_help();
        return;
    }
    let mut config = ServerConfig::from_env_or_default();
    let result = match command {
        WorkerCommand::ListDeadJobs => list_dead_jobs(&config).await,
        WorkerCommand::ReviveJob(id) => revive_job(&config, id).await,
        _ => {
            if config.workers.count == 0 {
                warn!("🕰️ RR_WORKER_COUNT is 0, which makes no sense for a dedicated worker. Running 1 worker.");
                config.workers.count = 1;
            }
            run_workers(config).await.map(|_| println!("Bye!"))
        },
    };
    if let Err(e) = result {
        eprintln!("{e}");
    }
}

async fn list_dead_jobs(config: &ServerConfig) -> Result<(), ServerError> {
    let queue = JobQueueApi::new(open_database(config).await?);
    println!("{}", dead_letter_report(&queue).await?);
    Ok(())
}

async fn revive_job(config: &ServerConfig, job_id: i64) -> Result<(), ServerError> {
    let queue = JobQueueApi::new(open_database(config).await?);
    let job = revive_dead_job(&queue, job_id).await?;
    println!("Revived. Workers will pick it up shortly.\n{}", describe_job(&job));
    Ok(())
}

async fn run_workers(config: ServerConfig) -> Result<(), ServerError> {
    let db = open_database(&config).await?;
    let handlers = create_alert_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let (shutdown, shutdown_signal) = watch::channel(false);
    let workers = start_fulfillment_workers(&config, db, producers, shutdown_signal)
        .map_err(|e| ServerError::InitializeError(format!("Could not create the gateway client. {e}")))?;
    tokio::signal::ctrl_c().await?;
    info!("🕰️ Shutting down. Jobs in progress will be finished first.");
    let _ = shutdown.send(true);
    for worker in workers {
        if let Err(e) = worker.await {
            warn!("🕰️ A fulfilment worker did not shut down cleanly. {e}");
        }
    }
    Ok(())
}
