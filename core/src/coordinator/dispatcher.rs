//! Dispatch loop.
//!
//! One loop per coordinator, so dispatch passes never overlap. A pass admits
//! queued tasks while global slots are free; the loop then sleeps until a
//! task is queued or a slot is released.

use std::sync::Arc;

use super::executor;
use super::Inner;

pub(crate) async fn run(inner: Arc<Inner>) {
    let mut shutdown = inner.shutdown.subscribe();
    loop {
        if *shutdown.borrow_and_update() {
            break;
        }
        let dispatched = dispatch_pass(&inner).await;
        if dispatched > 0 {
            tracing::trace!(dispatched, "dispatch pass");
        }
        tokio::select! {
            _ = inner.work.notified() => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!("dispatch loop stopped");
}

/// Admit as many queued tasks as the global budget allows.
pub(crate) async fn dispatch_pass(inner: &Arc<Inner>) -> usize {
    let mut dispatched = 0;
    while !inner.is_shut_down() {
        let Ok(permit) = inner.slots.clone().try_acquire_owned() else {
            break;
        };
        // The permit goes back to the semaphore if nothing is queued.
        let Some(task) = inner.store.pop_next().await else {
            break;
        };
        let abort = inner.abort_signal(&task.id);
        inner.events.task_started(&task.id);
        tokio::spawn(executor::execute_task(inner.clone(), task, abort, permit));
        dispatched += 1;
    }
    dispatched
}
