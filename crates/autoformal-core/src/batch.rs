//! Bounded-concurrency batch driver.
//!
//! Every submitted item yields exactly one [`ItemResult`], returned in input
//! order. A panicking or aborted item run becomes a Fatal result instead of
//! taking the batch down.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{instrument, warn};

use crate::config::BatchConfig;
use crate::domain::result::{ItemResult, ItemStatus};
use crate::domain::work_item::WorkItem;
use crate::obs;

/// Runs one item to completion. Implementations should never panic, but
/// the driver survives it if they do.
#[async_trait]
pub trait ItemRunner: Send + Sync {
    async fn run_item(&self, item: &WorkItem) -> ItemResult;
}

pub struct BatchDriver {
    runner: Arc<dyn ItemRunner>,
    config: BatchConfig,
}

impl BatchDriver {
    pub fn new(runner: Arc<dyn ItemRunner>, config: BatchConfig) -> Self {
        Self { runner, config }
    }

    pub async fn run_batch(&self, items: Vec<WorkItem>) -> Vec<ItemResult> {
        self.run_batch_with(items, |_| {}).await
    }

    /// Like [`BatchDriver::run_batch`], calling `on_result` as each item
    /// finishes (completion order).
    #[instrument(skip_all, fields(submitted = items.len(), concurrency = self.config.concurrency))]
    pub async fn run_batch_with<F>(&self, items: Vec<WorkItem>, mut on_result: F) -> Vec<ItemResult>
    where
        F: FnMut(&ItemResult),
    {
        let clock = Instant::now();
        let items: Vec<WorkItem> = match self.config.limit {
            Some(limit) => items.into_iter().take(limit).collect(),
            None => items,
        };
        let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();

        let sem = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let runner = Arc::clone(&self.runner);
            let sem = Arc::clone(&sem);
            tasks.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let outcome = AssertUnwindSafe(runner.run_item(&item)).catch_unwind().await;
                let result = match outcome {
                    Ok(result) => result,
                    Err(panic) => {
                        let reason = panic_message(&*panic);
                        warn!(item_id = %item.id, reason = %reason, "item run panicked");
                        ItemResult::fatal(&item.id, format!("item run panicked: {reason}"))
                    }
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<ItemResult>> = ids.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    on_result(&result);
                    slots[index] = Some(result);
                }
                Err(err) => warn!(error = %err, "item task did not complete"),
            }
        }

        let mut results = Vec::with_capacity(slots.len());
        for (slot, id) in slots.into_iter().zip(ids) {
            let result = match slot {
                Some(result) => result,
                None => {
                    let result = ItemResult::fatal(id, "item task did not complete");
                    on_result(&result);
                    result
                }
            };
            results.push(result);
        }

        let succeeded = results
            .iter()
            .filter(|r| matches!(r.status, ItemStatus::Success | ItemStatus::PartialSuccess))
            .count();
        let fatal = results
            .iter()
            .filter(|r| r.status == ItemStatus::Fatal)
            .count();
        obs::emit_batch_finished(
            results.len(),
            succeeded,
            fatal,
            clock.elapsed().as_millis() as u64,
        );
        results
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
