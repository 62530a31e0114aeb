// src/pipeline/collate.rs

//! Drains pool output queues into a single record list.

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::models::Record;
use crate::pipeline::pool::{PageBatch, PoolId};

/// Merge every queue until all of them are closed.
///
/// Record order follows arrival order and carries no meaning.
pub async fn collate(queues: Vec<mpsc::Receiver<PageBatch>>) -> Vec<Record> {
    collate_with(queues, |_, _| {}).await
}

/// Like [`collate`], visiting each record with the pool that produced it.
pub async fn collate_with<F>(queues: Vec<mpsc::Receiver<PageBatch>>, mut visit: F) -> Vec<Record>
where
    F: FnMut(PoolId, &mut Record),
{
    let mut merged = stream::select_all(queues.into_iter().map(ReceiverStream::new));
    let mut records = Vec::new();
    let mut batches = 0usize;

    while let Some(batch) = merged.next().await {
        let PageBatch {
            pool,
            records: mut page,
            ..
        } = batch;
        for record in &mut page {
            visit(pool, record);
        }
        records.append(&mut page);
        batches += 1;
    }

    log::debug!("collated {} records from {} batches", records.len(), batches);
    records
}
