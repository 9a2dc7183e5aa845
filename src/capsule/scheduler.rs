//! Unlock scheduler
//!
//! One deferred wake-up slot per capsule: "wake me at time T". A single
//! task owns a min-heap of pending wake times; `arm` overwrites a capsule's
//! slot and `disarm` clears it. When a slot comes due the capsule id is
//! sent on the wake channel so the owning actor can run its unlock check
//! cold, with no caller present.

use super::item::CapsuleId;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

enum SchedulerCommand {
    Arm {
        capsule: CapsuleId,
        at: DateTime<Utc>,
    },
    Disarm {
        capsule: CapsuleId,
    },
}

/// Handle used by capsule actors to manage their wake-up slot
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Arm the capsule's wake-up, overwriting any pending one. Only one
    /// wake-up is pending per capsule at a time.
    pub fn arm(&self, capsule: CapsuleId, at: DateTime<Utc>) {
        let _ = self.tx.send(SchedulerCommand::Arm { capsule, at });
    }

    /// Cancel the capsule's pending wake-up, if any.
    pub fn disarm(&self, capsule: CapsuleId) {
        let _ = self.tx.send(SchedulerCommand::Disarm { capsule });
    }
}

/// Spawn the scheduler task.
///
/// Returns the handle actors arm themselves through and the channel due
/// capsule ids are delivered on.
pub fn spawn() -> (SchedulerHandle, mpsc::UnboundedReceiver<CapsuleId>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (wake_tx, wake_rx) = mpsc::unbounded_channel();
    tokio::spawn(run(cmd_rx, wake_tx));
    (SchedulerHandle { tx: cmd_tx }, wake_rx)
}

async fn run(
    mut commands: mpsc::UnboundedReceiver<SchedulerCommand>,
    wake_tx: mpsc::UnboundedSender<CapsuleId>,
) {
    // `slots` is authoritative (one pending time per capsule); heap entries
    // that disagree with it are stale and skipped on pop.
    let mut heap: BinaryHeap<Reverse<(DateTime<Utc>, CapsuleId)>> = BinaryHeap::new();
    let mut slots: HashMap<CapsuleId, DateTime<Utc>> = HashMap::new();

    loop {
        while let Some(Reverse((at, capsule))) = heap.peek().copied() {
            if slots.get(&capsule) == Some(&at) {
                break;
            }
            heap.pop();
        }
        let next = heap.peek().map(|Reverse((at, _))| *at);

        tokio::select! {
            command = commands.recv() => match command {
                Some(SchedulerCommand::Arm { capsule, at }) => {
                    trace!(capsule = %capsule, at = %at, "arming wake-up");
                    slots.insert(capsule, at);
                    heap.push(Reverse((at, capsule)));
                }
                Some(SchedulerCommand::Disarm { capsule }) => {
                    trace!(capsule = %capsule, "disarming wake-up");
                    slots.remove(&capsule);
                }
                None => break, // all handles dropped
            },
            _ = wait_until(next), if next.is_some() => {
                let now = Utc::now();
                while let Some(Reverse((at, capsule))) = heap.peek().copied() {
                    if at > now {
                        break;
                    }
                    heap.pop();
                    if slots.get(&capsule) == Some(&at) {
                        slots.remove(&capsule);
                        debug!(capsule = %capsule, "wake-up fired");
                        if wake_tx.send(capsule).is_err() {
                            return; // nobody listening anymore
                        }
                    }
                }
            }
        }
    }
}

async fn wait_until(at: Option<DateTime<Utc>>) {
    match at {
        Some(at) => {
            let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(delay).await;
        }
        None => std::future::pending().await,
    }
}
