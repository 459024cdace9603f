//! Sink doubles for forwarder and pipeline tests.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::ports::{SinkError, TradeSink};
use crate::domain::trade::TradeEvent;

/// Stores every event it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TradeEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<TradeEvent> {
        self.events.lock().clone()
    }

    pub fn prices(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.price().to_string()).collect()
    }
}

#[async_trait]
impl TradeSink for RecordingSink {
    async fn insert(&self, event: &TradeEvent) -> Result<(), SinkError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Never completes a write.
#[derive(Debug, Default)]
pub struct HangingSink;

#[async_trait]
impl TradeSink for HangingSink {
    async fn insert(&self, _event: &TradeEvent) -> Result<(), SinkError> {
        std::future::pending().await
    }
}
