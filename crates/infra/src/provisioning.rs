//! Topic provisioning, run once at startup by every process that touches the stream.

use tracing::{info, instrument};

use userstream_events::{AdminError, TopicAdmin, TopicSpec};

use crate::config::StreamConfig;

/// Provisioning failed; the process must not start.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to provision topic `{topic}`: {source}")]
pub struct ProvisionError {
    pub topic: String,
    #[source]
    pub source: AdminError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

/// Create every topic in `specs` that does not exist yet.
///
/// A topic that already exists counts as success, so this is safe to run on
/// every start. Partition count and replication of an existing topic are not
/// checked.
#[instrument(skip_all)]
pub fn ensure<A>(admin: &A, specs: &[TopicSpec]) -> Result<ProvisionReport, ProvisionError>
where
    A: TopicAdmin + ?Sized,
{
    let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
    info!(topics = ?names, "creating topics if they don't exist");

    let mut report = ProvisionReport::default();
    for spec in specs {
        spec.validate().map_err(|source| ProvisionError {
            topic: spec.name.clone(),
            source,
        })?;

        match admin.create_topic(spec) {
            Ok(()) => report.created.push(spec.name.clone()),
            Err(AdminError::AlreadyExists(_)) => report.existing.push(spec.name.clone()),
            Err(source) => {
                return Err(ProvisionError {
                    topic: spec.name.clone(),
                    source,
                });
            }
        }
    }

    info!(created = ?report.created, existing = ?report.existing, "topics initialized");
    Ok(report)
}

/// Provision the topics `config` names.
pub fn ensure_topics<A>(config: &StreamConfig, admin: &A) -> Result<ProvisionReport, ProvisionError>
where
    A: TopicAdmin + ?Sized,
{
    ensure(admin, &config.topic_specs())
}
