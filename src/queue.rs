//! Durable queue topology
//!
//! One JetStream stream with two subjects decouples HTTP ingestion from
//! processing: gateway payloads land on `webhook.principal`, helpdesk
//! callbacks on `webhook.callback`. Each subject is drained by one durable
//! pull consumer with manual acknowledgement.

use anyhow::{Context, Result};
use async_nats::jetstream::consumer::{pull, PullConsumer};
use async_nats::jetstream::{self, stream};
use tracing::info;

/// Stream holding both webhook subjects
pub const STREAM_NAME: &str = "wootrico";

/// Subject for gateway (provider) payloads
pub const SUBJECT_PRINCIPAL: &str = "webhook.principal";

/// Subject for helpdesk callbacks
pub const SUBJECT_CALLBACK: &str = "webhook.callback";

/// Durable consumer draining the principal subject
pub const CONSUMER_PRINCIPAL: &str = "consumer-webhook-principal";

/// Durable consumer draining the callback subject
pub const CONSUMER_CALLBACK: &str = "consumer-webhook-callback";

/// Handle to the durable queue
#[derive(Clone)]
pub struct Queue {
    jetstream: jetstream::Context,
}

impl Queue {
    /// Connect to NATS and create the stream if it does not exist yet
    pub async fn connect(nats_url: &str) -> Result<Self> {
        let client = async_nats::connect(nats_url)
            .await
            .with_context(|| format!("failed to connect to NATS at {nats_url}"))?;
        let jetstream = jetstream::new(client);

        jetstream
            .get_or_create_stream(stream::Config {
                name: STREAM_NAME.to_string(),
                subjects: vec![SUBJECT_PRINCIPAL.to_string(), SUBJECT_CALLBACK.to_string()],
                ..Default::default()
            })
            .await
            .context("failed to create queue stream")?;
        info!(stream = STREAM_NAME, "durable queue ready");

        Ok(Self { jetstream })
    }

    /// Publish a payload, waiting for the stream's acknowledgement
    pub async fn publish(&self, subject: &'static str, payload: Vec<u8>) -> Result<()> {
        self.jetstream
            .publish(subject, payload.into())
            .await
            .context("queue publish failed")?
            .await
            .context("queue publish was not acknowledged")?;
        Ok(())
    }

    /// Get or create the durable pull consumer for one subject
    pub async fn pull_consumer(&self, durable_name: &str, subject: &str) -> Result<PullConsumer> {
        let stream = self
            .jetstream
            .get_stream(STREAM_NAME)
            .await
            .context("queue stream missing")?;
        let consumer = stream
            .get_or_create_consumer(
                durable_name,
                pull::Config {
                    durable_name: Some(durable_name.to_string()),
                    filter_subject: subject.to_string(),
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("failed to create consumer {durable_name}"))?;
        Ok(consumer)
    }
}
