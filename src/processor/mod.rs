//! Reconciliation processors
//!
//! Two queue consumers drain the durable subjects: `principal` carries
//! gateway (provider) events, `callback` carries helpdesk callbacks. Every
//! message is acknowledged whether or not processing succeeded; failures are
//! logged instead of redelivered so one poison payload can never block the
//! subject.

pub mod callback;
pub mod principal;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::queue::{
    CONSUMER_CALLBACK, CONSUMER_PRINCIPAL, SUBJECT_CALLBACK, SUBJECT_PRINCIPAL,
};
use crate::server::AppState;

/// Wait between consumer reconnect attempts
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Which subject a worker drains
#[derive(Debug, Clone, Copy)]
enum Lane {
    Principal,
    Callback,
}

impl Lane {
    fn durable_name(self) -> &'static str {
        match self {
            Self::Principal => CONSUMER_PRINCIPAL,
            Self::Callback => CONSUMER_CALLBACK,
        }
    }

    fn subject(self) -> &'static str {
        match self {
            Self::Principal => SUBJECT_PRINCIPAL,
            Self::Callback => SUBJECT_CALLBACK,
        }
    }
}

/// Spawn both processor workers
pub fn start(state: Arc<AppState>) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(run(state.clone(), Lane::Principal)),
        tokio::spawn(run(state, Lane::Callback)),
    ]
}

async fn run(state: Arc<AppState>, lane: Lane) {
    let subject = lane.subject();
    loop {
        let consumer = match state.queue.pull_consumer(lane.durable_name(), subject).await {
            Ok(consumer) => consumer,
            Err(e) => {
                error!(subject, error = %e, "failed to acquire consumer");
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };
        let mut messages = match consumer.messages().await {
            Ok(messages) => messages,
            Err(e) => {
                error!(subject, error = %e, "failed to open consumer stream");
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };
        info!(subject, "processor draining");

        while let Some(next) = messages.next().await {
            let message = match next {
                Ok(message) => message,
                Err(e) => {
                    error!(subject, error = %e, "queue message error");
                    continue;
                }
            };

            match serde_json::from_slice::<Value>(&message.payload) {
                Ok(payload) => {
                    let result = match lane {
                        Lane::Principal => principal::handle(&state, payload).await,
                        Lane::Callback => callback::handle(&state, payload).await,
                    };
                    if let Err(e) = result {
                        error!(subject, error = %e, "event processing failed");
                    }
                }
                Err(e) => warn!(subject, error = %e, "unparseable event payload"),
            }

            // Always ack: failures are logged above, and redelivering a
            // payload that just failed would only block the subject.
            if let Err(e) = message.ack().await {
                error!(subject, error = %e, "ack failed");
            }
        }

        warn!(subject, "consumer stream ended, reconnecting");
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}
