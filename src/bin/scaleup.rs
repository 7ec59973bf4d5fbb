use clap::Parser;
use eyre::Result;
use gh_runner_control_plane::cloud::Ec2ComputeClient;
use gh_runner_control_plane::config::Config;
use gh_runner_control_plane::forge::ForgeClient;
use gh_runner_control_plane::queue::SqsQueueAdapter;
use gh_runner_control_plane::scaleup::process_batch;
use gh_runner_control_plane::secrets::SecretStore;
use gh_runner_control_plane::{init_tracing, model::AppCredentials};

#[derive(Parser, Debug)]
#[command(
    name = "gh-runner-scaleup",
    version,
    about = "Reconciles queued workflow_job events against the running fleet by launching EC2 runners"
)]
struct Args {
    /// Max queue messages drained per cycle.
    #[arg(long, default_value_t = 10)]
    max_messages: i32,

    /// Polling interval between cycles, in seconds.
    #[arg(long, default_value_t = 20)]
    poll_seconds: u64,

    /// Run a single drain-and-reconcile cycle and exit.
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
    let sqs = SqsQueueAdapter::new(aws_sdk_sqs::Client::new(&aws_config), config.sqs_queue_url.clone());
    let secrets = SecretStore::new(aws_sdk_secretsmanager::Client::new(&aws_config));
    let forge = ForgeClient::new();

    // Cold-start fetch; cached for the life of this process, same as
    // keeper-rs's single provider/signer built once before entering its loop.
    let creds: AppCredentials = secrets.load(&config.secret_arn).await?;

    tracing::info!(
        github_org = config.github_org,
        runners_max = config.runners_max,
        instance_types = ?config.instance_types,
        once = args.once,
        "scale-up reconciler starting"
    );

    loop {
        match process_batch(&sqs, &ec2, &forge, &creds, &config, args.max_messages).await {
            Ok(outcome) => {
                tracing::info!(
                    launched = outcome.launched,
                    skipped = outcome.skipped,
                    errors = outcome.errors,
                    "cycle complete"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "scale-up cycle failed");
            }
        }

        if args.once {
            break;
        }

        tokio::time::sleep(std::time::Duration::from_secs(args.poll_seconds)).await;
    }

    Ok(())
}
