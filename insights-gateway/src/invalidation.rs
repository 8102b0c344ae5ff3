//! AMQP listener that drops cached pages when new data is ingested.
//!
//! Consumes `insights.data_ingested`. A body of `{"tenantId": "..."}` clears
//! that tenant; a body without a tenant clears every tenant. Messages are
//! acked once handled, undecodable ones included.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use lapin::{
    options::{BasicAckOptions, BasicConsumeOptions, QueueDeclareOptions},
    types::FieldTable,
    Connection, ConnectionProperties,
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{models::DataIngested, AppState};

pub const QUEUE: &str = "insights.data_ingested";
const CONSUMER_TAG: &str = "insights-gateway";

pub fn decode(data: &[u8]) -> Result<DataIngested, serde_json::Error> {
    serde_json::from_slice(data)
}

/// Connect, declare the queue and start consuming in the background.
pub async fn spawn(url: &str, state: Arc<AppState>) -> Result<JoinHandle<()>> {
    let conn = Connection::connect(url, ConnectionProperties::default())
        .await
        .context("failed to connect to AMQP broker")?;
    let chan = conn.create_channel().await.context("failed to open AMQP channel")?;
    chan.queue_declare(
        QUEUE,
        QueueDeclareOptions {
            durable: true,
            ..Default::default()
        },
        FieldTable::default(),
    )
    .await
    .context("failed to declare invalidation queue")?;

    let mut consumer = chan
        .basic_consume(
            QUEUE,
            CONSUMER_TAG,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("failed to start consuming invalidation queue")?;

    info!(queue = QUEUE, "cache invalidation listener started");

    Ok(tokio::spawn(async move {
        // The connection must outlive the consumer.
        let _conn = conn;
        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(d) => d,
                Err(e) => {
                    error!(error = %e, "AMQP consumer error");
                    continue;
                }
            };

            match decode(&delivery.data) {
                Ok(msg) => {
                    let tenant_id = msg.tenant_id.as_deref().filter(|t| !t.is_empty());
                    if let Err(e) = state.service.invalidate(tenant_id).await {
                        error!(error = %e, tenant_id, "cache invalidation failed");
                    }
                }
                Err(e) => warn!(error = %e, "undecodable invalidation message, skipping"),
            }

            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                error!(error = %e, "failed to ack invalidation message");
            }
        }
        warn!(queue = QUEUE, "cache invalidation listener stopped");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_tenant_message() {
        let msg = decode(br#"{"tenantId":"org_1"}"#).unwrap();
        assert_eq!(msg.tenant_id.as_deref(), Some("org_1"));
    }

    #[test]
    fn decode_global_message() {
        let msg = decode(b"{}").unwrap();
        assert_eq!(msg.tenant_id, None);
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(decode(b"not json").is_err());
    }
}
