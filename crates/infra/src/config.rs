//! Stream configuration, loaded from the environment.

use core::str::FromStr;
use std::time::Duration;

use userstream_events::{EncodingScheme, TopicSpec};

use crate::publisher::RoutingKey;
use crate::workers::ConsumerOptions;

pub const DEFAULT_BROKERS: &str = "localhost:9092";
pub const DEFAULT_USER_EVENTS_TOPIC: &str = "user-events";
pub const DEFAULT_CONSUMER_GROUP: &str = "user-consumer";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("`{var}` is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("`{0}` must list at least one broker")]
    NoBrokers(&'static str),
}

/// Producer acknowledgment level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acks {
    /// Wait for every in-sync replica.
    #[default]
    All,
    /// Wait for the partition leader only.
    Leader,
    /// Do not wait.
    None,
}

impl Acks {
    /// Value of the Kafka `acks` producer property.
    pub fn as_kafka_value(self) -> &'static str {
        match self {
            Acks::All => "all",
            Acks::Leader => "1",
            Acks::None => "0",
        }
    }
}

impl FromStr for Acks {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "-1" => Ok(Acks::All),
            "leader" | "1" => Ok(Acks::Leader),
            "none" | "0" => Ok(Acks::None),
            other => Err(format!("expected all|leader|none, got `{other}`")),
        }
    }
}

/// Everything the producer, consumer and provisioner need to reach the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub brokers: Vec<String>,
    pub user_events_topic: String,
    pub partitions: i32,
    pub replication_factor: i32,
    pub consumer_group: String,
    pub acks: Acks,
    pub encoding: EncodingScheme,
    pub routing_key: RoutingKey,
    pub publish_timeout: Duration,
    pub poll_timeout: Duration,
    pub commit_interval: Duration,
    pub read_backoff: Duration,
    pub handler_timeout: Option<Duration>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            brokers: vec![DEFAULT_BROKERS.to_string()],
            user_events_topic: DEFAULT_USER_EVENTS_TOPIC.to_string(),
            partitions: 3,
            replication_factor: 1,
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
            acks: Acks::All,
            encoding: EncodingScheme::HeaderTagged,
            routing_key: RoutingKey::Entity,
            publish_timeout: Duration::from_millis(5000),
            poll_timeout: Duration::from_millis(250),
            commit_interval: Duration::from_millis(1000),
            read_backoff: Duration::from_millis(1000),
            handler_timeout: None,
        }
    }
}

impl StreamConfig {
    /// Load from process environment variables; unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load using `lookup` as the variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("KAFKA_BROKERS") {
            config.brokers = split_and_trim(&raw);
            if config.brokers.is_empty() {
                return Err(ConfigError::NoBrokers("KAFKA_BROKERS"));
            }
        }
        if let Some(topic) = lookup("KAFKA_TOPIC_USER_EVENTS") {
            let topic = topic.trim();
            if topic.is_empty() {
                return Err(invalid("KAFKA_TOPIC_USER_EVENTS", "must not be empty"));
            }
            config.user_events_topic = topic.to_string();
        }
        if let Some(group) = lookup("KAFKA_CONSUMER_GROUP") {
            let group = group.trim();
            if group.is_empty() {
                return Err(invalid("KAFKA_CONSUMER_GROUP", "must not be empty"));
            }
            config.consumer_group = group.to_string();
        }

        parse_into(&lookup, "KAFKA_TOPIC_PARTITIONS", &mut config.partitions)?;
        parse_into(&lookup, "KAFKA_TOPIC_REPLICATION_FACTOR", &mut config.replication_factor)?;
        parse_into(&lookup, "KAFKA_PRODUCER_ACKS", &mut config.acks)?;
        parse_into(&lookup, "KAFKA_ENCODING", &mut config.encoding)?;
        parse_into(&lookup, "KAFKA_ROUTING_KEY", &mut config.routing_key)?;

        millis_into(&lookup, "KAFKA_PUBLISH_TIMEOUT_MS", &mut config.publish_timeout)?;
        millis_into(&lookup, "KAFKA_POLL_TIMEOUT_MS", &mut config.poll_timeout)?;
        millis_into(&lookup, "KAFKA_COMMIT_INTERVAL_MS", &mut config.commit_interval)?;
        millis_into(&lookup, "KAFKA_READ_BACKOFF_MS", &mut config.read_backoff)?;
        if let Some(raw) = lookup("KAFKA_HANDLER_TIMEOUT_MS") {
            config.handler_timeout = Some(parse_millis("KAFKA_HANDLER_TIMEOUT_MS", &raw)?);
        }

        Ok(config)
    }

    pub fn with_brokers<I, S>(mut self, brokers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.brokers = brokers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.user_events_topic = topic.into();
        self
    }

    pub fn with_partitions(mut self, partitions: i32) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_consumer_group(mut self, group: impl Into<String>) -> Self {
        self.consumer_group = group.into();
        self
    }

    pub fn with_encoding(mut self, encoding: EncodingScheme) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_routing_key(mut self, routing_key: RoutingKey) -> Self {
        self.routing_key = routing_key;
        self
    }

    pub fn with_commit_interval(mut self, interval: Duration) -> Self {
        self.commit_interval = interval;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_read_backoff(mut self, backoff: Duration) -> Self {
        self.read_backoff = backoff;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    /// Comma-joined broker list, as Kafka clients expect it.
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }

    /// Topics this service relies on.
    pub fn topic_specs(&self) -> Vec<TopicSpec> {
        vec![TopicSpec::new(
            self.user_events_topic.clone(),
            self.partitions,
            self.replication_factor,
        )]
    }

    pub fn consumer_options(&self) -> ConsumerOptions {
        ConsumerOptions {
            name: format!("{}-consumer", self.user_events_topic),
            poll_timeout: self.poll_timeout,
            commit_interval: self.commit_interval,
            read_backoff: self.read_backoff,
            handler_timeout: self.handler_timeout,
        }
    }
}

fn split_and_trim(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn invalid(var: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.into(),
    }
}

fn parse_into<F, T>(lookup: &F, var: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: core::fmt::Display,
{
    if let Some(raw) = lookup(var) {
        *slot = raw.trim().parse().map_err(|e: T::Err| invalid(var, e.to_string()))?;
    }
    Ok(())
}

fn parse_millis(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| invalid(var, e.to_string()))
}

fn millis_into<F>(lookup: &F, var: &'static str, slot: &mut Duration) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(var) {
        *slot = parse_millis(var, &raw)?;
    }
    Ok(())
}
