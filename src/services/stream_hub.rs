// src/services/stream_hub.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::{common::error::AppError, models::auth::UserId};

/// Entrega em tempo real. Melhor esforço: quem chama registra a falha e segue.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn push_to_user_group(&self, user_id: UserId, event: &str, payload: Value) -> Result<(), AppError>;

    /// Sinal global de "recarregue", sem destinatário. Fica dentro do tenant.
    async fn push_to_all(&self, tenant_id: Uuid, event: &str, payload: Value) -> Result<(), AppError>;
}

pub fn user_topic(user_id: UserId) -> String {
    format!("user-{}", user_id)
}

pub fn broadcast_topic(tenant_id: Uuid) -> String {
    format!("all-{}", tenant_id)
}

// ---
// Hub em memória (um canal broadcast por tópico)
// ---
#[derive(Clone)]
pub struct StreamHub {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<Value>>>>,
    capacity: usize,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Publica no tópico. Sem assinantes, não faz nada.
    pub async fn publish(&self, topic: &str, value: Value) {
        let channels = self.channels.read().await;
        if let Some(tx) = channels.get(topic) {
            // Erro de envio = ninguém ouvindo
            let _ = tx.send(value);
        }
    }

    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<Value> {
        let mut channels = self.channels.write().await;
        channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Remove canais sem assinantes.
    pub async fn cleanup(&self) -> usize {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, tx| tx.receiver_count() > 0);
        before - channels.len()
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

fn envelope(event: &str, payload: Value) -> Value {
    json!({ "type": event, "payload": payload })
}

#[async_trait]
impl RealtimeTransport for StreamHub {
    async fn push_to_user_group(&self, user_id: UserId, event: &str, payload: Value) -> Result<(), AppError> {
        self.publish(&user_topic(user_id), envelope(event, payload)).await;
        Ok(())
    }

    async fn push_to_all(&self, tenant_id: Uuid, event: &str, payload: Value) -> Result<(), AppError> {
        self.publish(&broadcast_topic(tenant_id), envelope(event, payload)).await;
        Ok(())
    }
}
