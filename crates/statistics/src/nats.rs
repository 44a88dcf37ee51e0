//! NATS-backed broker. A "channel" is a per-cycle handle on the shared client;
//! closing it flushes everything published during the cycle.

use crate::broker::{Broker, BrokerError, PublishChannel};
use async_trait::async_trait;
use bytes::Bytes;
use rotator_core::config::NatsConfig;
use tracing::{debug, info};

pub struct NatsBroker {
    client: async_nats::Client,
    subject: String,
}

impl NatsBroker {
    pub async fn connect(config: &NatsConfig) -> Result<Self, BrokerError> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "nats://localhost:4222".to_string());

        info!(url = %url, subject = %config.subject, "Connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .max_reconnects(Some(config.max_reconnects))
            .connect(&url)
            .await
            .map_err(|e| BrokerError::Open(e.to_string()))?;

        info!("NATS connection established");

        Ok(Self {
            client,
            subject: config.subject.clone(),
        })
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn open_channel(&self) -> Result<Box<dyn PublishChannel>, BrokerError> {
        Ok(Box::new(NatsChannel {
            client: self.client.clone(),
            subject: self.subject.clone(),
            published: 0,
        }))
    }
}

struct NatsChannel {
    client: async_nats::Client,
    subject: String,
    published: usize,
}

#[async_trait]
impl PublishChannel for NatsChannel {
    async fn publish(&mut self, payload: Bytes) -> Result<(), BrokerError> {
        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Content-Type", "application/json");

        self.client
            .publish_with_headers(self.subject.clone(), headers, payload)
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        self.published += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.client
            .flush()
            .await
            .map_err(|e| BrokerError::Close(e.to_string()))?;
        debug!(subject = %self.subject, published = self.published, "NATS channel flushed");
        Ok(())
    }
}
