//! Block data retrieval.
//!
//! Reconstructs everything the pipeline needs for one height: the block,
//! its collections, the transactions with their statuses, and the flat
//! event list. The result is a pure projection of what the gateway
//! returns; no events are synthesized.

use std::sync::Arc;

use futures::future::try_join_all;
use log::debug;

use crate::{BlockData, Event, GatewayAdapter, IndexerResult, TransactionWithStatus};

pub struct BlockDataFetcher<G> {
    gateway: Arc<G>,
}

impl<G> BlockDataFetcher<G>
where
    G: GatewayAdapter,
{
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// Fetches the full data set for one block height.
    ///
    /// Collections are fetched in parallel, then transactions and statuses
    /// as two independent parallel fans zipped by index. Each transaction's
    /// events are flattened with denormalized `transaction_id` and
    /// `block_id` fields for downstream convenience.
    pub async fn fetch_block_data(&self, height: u64) -> IndexerResult<BlockData> {
        let block = self.gateway.get_block_by_height(height).await?;

        let collections = try_join_all(
            block
                .collection_guarantees
                .iter()
                .map(|guarantee| self.gateway.get_collection_by_id(&guarantee.collection_id)),
        )
        .await?;

        let transaction_ids: Vec<String> = collections
            .iter()
            .flat_map(|collection| collection.transaction_ids.iter().cloned())
            .collect();

        let (transactions, statuses) = tokio::try_join!(
            try_join_all(
                transaction_ids
                    .iter()
                    .map(|id| self.gateway.get_transaction_by_id(id)),
            ),
            try_join_all(
                transaction_ids
                    .iter()
                    .map(|id| self.gateway.get_transaction_status_by_id(id)),
            ),
        )?;

        let transactions: Vec<TransactionWithStatus> = transactions
            .into_iter()
            .zip(statuses)
            .map(|(transaction, status)| TransactionWithStatus {
                transaction,
                status,
            })
            .collect();

        let events: Vec<Event> = transactions
            .iter()
            .flat_map(|tx| {
                tx.status
                    .events
                    .iter()
                    .map(|event| Event::from_chain(event, &tx.transaction.id, &block.id))
            })
            .collect();

        debug!(
            "fetched block {} with {} transactions and {} events",
            height,
            transactions.len(),
            events.len()
        );

        Ok(BlockData {
            block,
            collections,
            transactions,
            events,
        })
    }
}
