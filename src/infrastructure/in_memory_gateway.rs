use crate::domain::intent::IntentStatus;
use crate::domain::money::Amount;
use crate::domain::ports::{CardGateway, CreatedIntent, GatewayIntentState};
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Deterministic card gateway used by the CLI driver and the test suites.
///
/// Intent ids are sequential (`pi_1`, `pi_2`, ...). Captures are simulated by
/// marking the intent, which is what a card network does out of band before a
/// webhook lands.
#[derive(Default)]
pub struct InMemoryCardGateway {
    counter: AtomicU64,
    intents: Arc<RwLock<HashMap<String, GatewayIntentState>>>,
}

impl InMemoryCardGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves a known intent to the given network-side status.
    pub async fn mark(&self, external_id: &str, status: IntentStatus) -> Result<()> {
        let mut intents = self.intents.write().await;
        let state = intents.get_mut(external_id).ok_or_else(|| {
            BillingError::Gateway(format!("gateway does not know intent {external_id}"))
        })?;
        state.status = status;
        Ok(())
    }

    /// Simulates a completed card capture for the intent.
    pub async fn settle(&self, external_id: &str) -> Result<()> {
        self.mark(external_id, IntentStatus::Succeeded).await
    }
}

#[async_trait]
impl CardGateway for InMemoryCardGateway {
    async fn create_intent(&self, amount: Amount, currency: &str) -> Result<CreatedIntent> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let external_id = format!("pi_{n}");
        let client_secret = format!("{external_id}_secret");
        self.intents.write().await.insert(
            external_id.clone(),
            GatewayIntentState {
                status: IntentStatus::Created,
                amount,
                currency: currency.to_string(),
            },
        );
        Ok(CreatedIntent {
            external_id,
            client_secret,
            requires_action: false,
        })
    }

    async fn describe_intent(&self, external_id: &str) -> Result<GatewayIntentState> {
        let intents = self.intents.read().await;
        intents.get(external_id).cloned().ok_or_else(|| {
            BillingError::Gateway(format!("gateway does not know intent {external_id}"))
        })
    }
}
