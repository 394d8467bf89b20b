//! Invalid token reconciler: prunes tokens the gateway reported as permanently
//! unusable, leaving transient failures alone.

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::best_effort::BestEffort;
use crate::dispatcher::TokenDelivery;
use crate::store::TokenStore;

pub struct TokenReconciler {
    tokens: Arc<dyn TokenStore>,
}

impl TokenReconciler {
    pub fn new(tokens: Arc<dyn TokenStore>) -> Self {
        Self { tokens }
    }

    /// Tokens whose delivery failed with a permanent error code, de-duplicated,
    /// in order of first appearance.
    pub fn invalid_tokens(deliveries: &[TokenDelivery]) -> Vec<String> {
        let mut seen = HashSet::new();
        deliveries
            .iter()
            .filter(|d| d.outcome.is_permanently_invalid())
            .filter(|d| seen.insert(d.token.as_str()))
            .map(|d| d.token.clone())
            .collect()
    }

    /// Remove permanently invalid tokens from the user's token set.
    ///
    /// Issues at most one store call, and none when nothing is invalid. Returns
    /// the tokens removed; a store failure is logged and reported as ignored.
    pub async fn reconcile(
        &self,
        user_id: Uuid,
        deliveries: &[TokenDelivery],
    ) -> BestEffort<Vec<String>> {
        let invalid = Self::invalid_tokens(deliveries);
        if invalid.is_empty() {
            return BestEffort::Ok(invalid);
        }

        tracing::info!(
            user_id = %user_id,
            count = invalid.len(),
            "Removing invalid push tokens"
        );

        let result = self
            .tokens
            .remove_tokens(user_id, &invalid)
            .await
            .map(|()| invalid);

        BestEffort::capture(result, "remove invalid push tokens")
    }
}
