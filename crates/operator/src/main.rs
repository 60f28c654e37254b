use clap::Parser;
use futures::stream::StreamExt;
use group_sync_types::GroupSync;
use kube::{api::ListParams, client::Client, runtime::controller::Action, runtime::Controller, Api, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod adapters;
mod clock;
mod engine;
mod error;
mod lifecycle;
mod registry;
mod resolver;
mod scheduler;
mod store;
mod util;

#[cfg(feature = "metrics")]
mod metrics;

use clock::SystemClock;
use error::Error;
use resolver::KubeSecretResolver;
use store::KubeGroupStore;
use util::FINALIZER_NAME;

/// Top-level CLI configuration for the binary. Any command line
/// flags should go in here.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Prometheus metrics server scrape port. Disabled by default.
    #[cfg(feature = "metrics")]
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Log filter directive, e.g. "info" or "group_sync_operator=debug".
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Context injected with each `reconcile` and `on_error` method invocation.
struct ContextData {
    client: Client,
}

impl ContextData {
    fn new(client: Client) -> Self {
        ContextData { client }
    }
}

/// Entrypoint for the `GroupSync` controller.
async fn run(client: Client) -> Result<(), Error> {
    tracing::info!("starting GroupSync controller");

    let crd_api: Api<GroupSync> = Api::all(client.clone());
    let context: Arc<ContextData> = Arc::new(ContextData::new(client));

    // TODO: leader election belongs here before the controller starts
    // watching, via `kube::runtime::leases::LeaseManager` or a sidecar -
    // out of scope for now, but this is where a future maintainer
    // would wire it in. Likewise a `/healthz` endpoint alongside the
    // metrics server.
    Controller::new(crd_api, ListParams::default())
        .run(reconcile, on_error, context)
        .for_each(|reconciliation_result| async move {
            if let Err(err) = reconciliation_result {
                tracing::error!(error = %err, "reconciliation error");
            }
        })
        .await;
    Ok(())
}

/// Reconciliation function for the `GroupSync` resource. Runs one full
/// cycle: builds the `Registry` from the spec, drives every provider
/// through its lifecycle, folds the output into the platform group store,
/// then decides the next requeue delay and patches status.
async fn reconcile(instance: Arc<GroupSync>, context: Arc<ContextData>) -> Result<Action, Error> {
    let client = context.client.clone();
    let name = instance.name_any();
    let clock = SystemClock;

    if instance.meta().deletion_timestamp.is_some() {
        util::finalizer::delete::<GroupSync>(client, &name).await?;
        return Ok(Action::await_change());
    }

    if !instance.finalizers().iter().any(|f| f == FINALIZER_NAME) {
        util::finalizer::add::<GroupSync>(client.clone(), &name).await?;
        return Ok(Action::requeue(Duration::ZERO));
    }

    let registered = match registry::build(&instance.spec) {
        Ok(registered) => registered,
        Err(err) => {
            let message = err.to_string();
            util::patch::patch_status(client, &instance, |status| {
                scheduler::apply_config_invalid(status, &clock, &message);
            })
            .await?;
            return Ok(Action::requeue(util::DEFAULT_REQUEUE_INTERVAL));
        }
    };

    let store = KubeGroupStore::new(context.client.clone());
    let resolver = Arc::new(KubeSecretResolver::new(context.client.clone()));
    let exclude_invalid = instance.spec.exclude_invalid_group_names.unwrap_or(false);

    let mut aggregate = error::AggregateError::new();

    for mut provider in registered {
        let provider_name = provider.name.clone();
        let outcome = lifecycle::run_provider(provider.adapter.as_mut(), resolver.clone(), CancellationToken::new()).await;

        match outcome {
            lifecycle::ProviderOutcome::Synced(groups) => {
                let report = engine::reconcile_provider(
                    &name,
                    &provider_name,
                    groups,
                    exclude_invalid,
                    provider.prune,
                    &store,
                    &clock,
                )
                .await;

                #[cfg(feature = "metrics")]
                {
                    util::metrics::METRICS
                        .number_groups
                        .with_label_values(&["", &name, &provider_name])
                        .set(report.groups_synced as f64);
                    util::metrics::METRICS
                        .pruned_number_groups
                        .with_label_values(&["", &name, &provider_name])
                        .set(report.groups_pruned as f64);
                }

                if report.is_err() {
                    let message = report
                        .store_errors
                        .iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("; ");
                    #[cfg(feature = "metrics")]
                    {
                        util::metrics::METRICS
                            .unsuccessful_syncs_count
                            .with_label_values(&["", &name, &provider_name])
                            .inc();
                        util::metrics::METRICS
                            .sync_error
                            .with_label_values(&["", &name, &provider_name])
                            .set(1.0);
                    }
                    aggregate.push(provider_name.clone(), Error::PlatformStoreFailure {
                        group: provider_name,
                        source: Box::<dyn std::error::Error + Send + Sync>::from(message),
                    });
                } else {
                    #[cfg(feature = "metrics")]
                    {
                        util::metrics::METRICS
                            .successful_syncs_count
                            .with_label_values(&["", &name, &provider_name])
                            .inc();
                        util::metrics::METRICS
                            .sync_error
                            .with_label_values(&["", &name, &provider_name])
                            .set(0.0);
                    }
                }
            }
            lifecycle::ProviderOutcome::Failed(err) => {
                tracing::warn!(provider = %provider_name, error = %err, "provider failed, continuing with peers");
                #[cfg(feature = "metrics")]
                {
                    util::metrics::METRICS
                        .unsuccessful_syncs_count
                        .with_label_values(&["", &name, &provider_name])
                        .inc();
                    util::metrics::METRICS
                        .sync_error
                        .with_label_values(&["", &name, &provider_name])
                        .set(1.0);
                }
                aggregate.push(provider_name, err);
            }
            lifecycle::ProviderOutcome::DefaultsChanged => {
                // Init() mutated the spec; persist nothing here (the spec
                // object itself is immutable from this function's view) and
                // abort the cycle so the next reconcile observes the
                // defaulted state.
                tracing::info!(provider = %provider_name, "provider defaults changed, requeuing immediately");
                return Ok(Action::requeue(Duration::ZERO));
            }
        }
    }

    let cycle_succeeded = aggregate.is_empty();
    let decision = scheduler::requeue_decision(&clock, instance.spec.schedule.as_deref(), cycle_succeeded);

    #[cfg(feature = "metrics")]
    if let Some(next) = decision.next_scheduled {
        util::metrics::METRICS
            .next_scheduled_sync
            .with_label_values(&["", &name])
            .set(next.timestamp() as f64);
    }

    let cycle_error = if cycle_succeeded { None } else { Some(aggregate.to_string()) };
    util::patch::patch_status(client, &instance, |status| {
        scheduler::apply_cycle_result(status, &clock, cycle_error.as_deref(), decision.next_scheduled);
    })
    .await?;

    Ok(Action::requeue(decision.delay))
}

/// Actions to be taken when a reconciliation fails outright (not a
/// per-provider failure, which is isolated and folded into status above,
/// but a failure of the reconcile function itself - e.g. a Kubernetes API
/// error while patching status).
fn on_error(instance: Arc<GroupSync>, error: &Error, _context: Arc<ContextData>) -> Action {
    tracing::error!(name = %instance.name_any(), error = %error, "reconciliation error");
    Action::requeue(Duration::from_secs(5))
}

/// Secondary entrypoint that configures logging/metrics and runs the
/// controller.
async fn run_main(client: Client, cli: Cli) {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(cli.log_level))
        .init();

    #[cfg(feature = "metrics")]
    if let Some(metrics_port) = cli.metrics_port {
        tokio::spawn(metrics::run_server(metrics_port));
    }

    run(client).await.unwrap();

    panic!("exited unexpectedly");
}

/// Main entrypoint that sets up the environment before running the
/// secondary entrypoint `run_main`.
#[tokio::main]
async fn main() {
    // Set the panic hook to exit the process with a non-zero exit code
    // when a panic occurs on any thread. Desired behavior in a container:
    // the controller or metrics server should never exit without restarting.
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    let cli = Cli::parse();

    // Create a kubernetes client using the default configuration.
    // In-cluster, the kubeconfig will be set by the service account.
    let client: Client = Client::try_default()
        .await
        .expect("Expected a valid KUBECONFIG environment variable.");

    run_main(client, cli).await;

    // Unreachable: the controller should never exit without a panic.
    panic!("exited prematurely");
}
