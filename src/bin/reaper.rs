use chrono::Utc;
use clap::Parser;
use eyre::Result;
use gh_runner_control_plane::cloud::Ec2ComputeClient;
use gh_runner_control_plane::config::Config;
use gh_runner_control_plane::init_tracing;
use gh_runner_control_plane::reaper::sweep;

#[derive(Parser, Debug)]
#[command(
    name = "gh-runner-reaper",
    version,
    about = "Terminates ephemeral runners that have outlived the configured max runtime"
)]
struct Args {
    /// Interval between sweeps, in seconds.
    #[arg(long, default_value_t = 300)]
    poll_seconds: u64,

    /// Run a single sweep and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = Config::from_env()?;

    let aws_config = aws_config::load_from_env().await;
    let ec2 = Ec2ComputeClient::new(aws_sdk_ec2::Client::new(&aws_config));

    tracing::info!(
        max_runtime_s = config.max_runtime.as_secs(),
        min_running_time_s = config.min_running_time.as_secs(),
        once = args.once,
        "reaper starting"
    );

    loop {
        match sweep(&ec2, &config, Utc::now()).await {
            Ok(outcome) => {
                tracing::info!(
                    terminated = outcome.terminated,
                    spared = outcome.spared,
                    "sweep complete"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "sweep failed");
            }
        }

        if args.once {
            break;
        }

        tokio::time::sleep(std::time::Duration::from_secs(args.poll_seconds)).await;
    }

    Ok(())
}
