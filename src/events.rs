use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::order::{LineItemStatus, OrderStatus};

/// Domain events emitted after successful state changes. Consumers run off
/// the request path; a slow or absent consumer never fails a request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    OrderCreated { order_id: Uuid },
    OrderPlaced { order_id: Uuid },
    PaymentFailed { order_id: Uuid },
    ItemApproved { order_id: Uuid, product_id: Uuid },
    ItemRejected { order_id: Uuid, product_id: Uuid },
    FulfillmentAdvanced {
        order_id: Uuid,
        product_id: Uuid,
        status: LineItemStatus,
    },
    TrackingUpdated { order_id: Uuid, product_id: Uuid },
    ReturnRequested { order_id: Uuid, product_id: Uuid },
    RefundApproved { order_id: Uuid, product_id: Uuid },
    RefundRejected { order_id: Uuid, product_id: Uuid },
    RefundCompleted { order_id: Uuid, product_id: Uuid },
    OrderStatusChanged { order_id: Uuid, status: OrderStatus },
}

/// Cloneable handle for emitting events onto the shared channel.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, event: Event) {
        if let Err(e) = self.tx.send(event).await {
            error!("Failed to send event: {}", e);
        }
    }
}

pub fn event_channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging each event. Runs as a background task
/// for the lifetime of the server.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        info!(?event, "processing event");
    }
}
