use anyhow::Context;

use userstream_consumer::start;
use userstream_infra::StreamConfig;
use userstream_infra::event_bus::{KafkaRecordSource, KafkaTopicAdmin};

fn main() -> anyhow::Result<()> {
    userstream_observability::init();

    let config = StreamConfig::from_env().context("loading configuration")?;
    let admin = KafkaTopicAdmin::new(&config).context("creating kafka admin client")?;
    let source = KafkaRecordSource::new(&config).context("creating kafka consumer")?;

    let consumer = start(&config, &admin, source)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("waiting for ctrl-c")?;
    tracing::info!("shutdown requested");

    consumer.stop()?;
    Ok(())
}
