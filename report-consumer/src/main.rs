//! Consume storm reports from Kafka and store them in PostgreSQL.
use std::sync::Arc;

use anyhow::Context;
use envconfig::Envconfig;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use report_common::gateway::PersistenceGateway;
use report_common::health::HealthRegistry;
use report_common::metrics::{serve, setup_metrics_router};
use report_common::store::PgReportStore;
use report_consumer::config::Config;
use report_consumer::consumer::ConsumerSettings;
use report_consumer::coordinator::ConsumerGroup;
use report_consumer::kafka::KafkaBroker;

fn setup_tracing() -> Result<(), anyhow::Error> {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy()
            .add_directive("rdkafka=warn".parse()?),
    );
    tracing_subscriber::registry().with(log_layer).init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    setup_tracing()?;
    info!("Starting report consumer...");

    let config = Config::init_from_env().context("invalid configuration")?;
    info!(
        topic = config.kafka.kafka_consumer_topic.as_str(),
        group_id = config.kafka.kafka_consumer_group.as_str(),
        "Configuration loaded"
    );

    let liveness = HealthRegistry::new("liveness");

    let router = setup_metrics_router(liveness.clone())?;
    let bind = config.bind();
    tokio::task::spawn(async move {
        if let Err(error) = serve(router, &bind).await {
            error!(error = ?error, "failed to start serving metrics");
        }
    });

    let store = PgReportStore::new(&config.database_url, config.max_pg_connections)
        .await
        .context("failed to connect to the reports database")?;
    let gateway = Arc::new(PersistenceGateway::new(store, config.persist_timeout.0));

    let broker = KafkaBroker::new(&config.kafka, config.metadata_timeout.0)
        .context("failed to create kafka client")?;

    let settings = ConsumerSettings {
        read_timeout: config.read_timeout.0,
        retry_policy: config.retry_policy.policy(),
        liveness_deadline: time::Duration::try_from(config.liveness_deadline.0)?,
    };
    let group = ConsumerGroup::new(broker, gateway, liveness, settings);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(error) => error!(error = ?error, "failed to listen for ctrl+c"),
        }
    });

    let report = group.run(cancel).await?;
    if !report.is_success() {
        anyhow::bail!(
            "{} partition consumer(s) failed: {:?}",
            report.failures.len(),
            report.failures
        );
    }

    info!(totals = ?report.totals(), "Report consumer shut down");
    Ok(())
}
