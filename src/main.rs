use anyhow::Result;
use std::time::Duration;
use taskserver::cli::{Args, ExecutionMode, RunConfig, demo_project};
use taskserver::{EventLogger, Scheduler, TracingSink};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskserver=info")),
        )
        .init();

    let args = Args::parse();

    match args.mode()? {
        ExecutionMode::Run(config) => run(config).await,
        ExecutionMode::ShowConfig(config) => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

async fn run(config: RunConfig) -> Result<()> {
    let scheduler = Scheduler::new(config.scheduler)?;
    let logger = EventLogger::new(TracingSink).spawn(scheduler.subscribe());

    let project = demo_project();
    info!("Loaded project {} with {} tasks", project.name(), project.len());
    scheduler.add_project(project);

    scheduler.start()?;

    match config.duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!("Run duration of {}s elapsed", secs);
                }
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            info!("Interrupted");
        }
    }

    scheduler.stop().await?;
    info!("{} tasks still active at shutdown", scheduler.active_task_count());

    // In-flight runs keep the bus open; give the logger a moment to drain.
    drop(scheduler);
    if tokio::time::timeout(Duration::from_secs(1), logger).await.is_err() {
        info!("Event logger still draining at exit");
    }
    Ok(())
}
