use anyhow::Context;

use userstream_consumer::provision;
use userstream_infra::StreamConfig;
use userstream_infra::event_bus::KafkaTopicAdmin;

fn main() -> anyhow::Result<()> {
    userstream_observability::init();

    let config = StreamConfig::from_env().context("loading configuration")?;
    let admin = KafkaTopicAdmin::new(&config).context("creating kafka admin client")?;
    provision(&config, &admin)?;
    Ok(())
}
