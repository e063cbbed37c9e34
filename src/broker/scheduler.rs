//! Matchmaking search scheduling

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::BrokerEvent;

/// A user's pending matchmaking attempt
struct PendingSearch {
    /// Distinguishes this attempt from superseded ones whose timer fire
    /// may still be queued behind us
    generation: u64,

    /// One-shot delay timer; aborted on cancel
    timer: JoinHandle<()>,
}

/// Manages at most one pending search per user connection: a randomized
/// delay, a cancellable one-shot timer, and a still-wanted guard.
///
/// The timer does not resolve the match itself; it posts a
/// [`BrokerEvent::SearchFired`] back onto the broker queue, so the match
/// decision runs inside the single broker task like every other event.
/// A cancellation processed before a queued fire wins: the fire finds no
/// matching request and is a silent no-op.
pub struct SearchScheduler {
    min_delay: Duration,
    max_delay: Duration,
    pending: HashMap<Uuid, PendingSearch>,
    next_generation: u64,
}

impl SearchScheduler {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            pending: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Schedule a search for `user_id`, superseding any prior pending
    /// request. Returns the drawn delay so the caller can surface it to
    /// the user as UI feedback.
    pub fn start_search(
        &mut self,
        user_id: Uuid,
        events: &mpsc::UnboundedSender<BrokerEvent>,
    ) -> Duration {
        self.cancel_search(&user_id);

        let generation = self.next_generation;
        self.next_generation += 1;

        let delay = self.draw_delay();

        let events = events.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The broker may already be gone during shutdown
            let _ = events.send(BrokerEvent::SearchFired {
                user_id,
                generation,
            });
        });

        self.pending
            .insert(user_id, PendingSearch { generation, timer });

        delay
    }

    /// Cancel a pending search. Idempotent and side-effect-free when no
    /// request exists. A timer fire already queued behind this event will
    /// find no matching request and do nothing.
    pub fn cancel_search(&mut self, user_id: &Uuid) -> bool {
        match self.pending.remove(user_id) {
            Some(pending) => {
                pending.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Consume a fired timer. Returns true exactly when the fire belongs
    /// to the live request for this user; stale fires (cancelled or
    /// superseded requests) return false and leave no residue.
    pub fn take_fired(&mut self, user_id: &Uuid, generation: u64) -> bool {
        let live = self
            .pending
            .get(user_id)
            .map(|p| p.generation == generation)
            .unwrap_or(false);
        if live {
            self.pending.remove(user_id);
        }
        live
    }

    /// Generation of the user's live request, if any. Used by tests to
    /// drive fires deterministically.
    pub fn pending_generation(&self, user_id: &Uuid) -> Option<u64> {
        self.pending.get(user_id).map(|p| p.generation)
    }

    pub fn has_pending(&self, user_id: &Uuid) -> bool {
        self.pending.contains_key(user_id)
    }

    fn draw_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let millis = rand::thread_rng().gen_range(self.min_delay.as_millis()..=self.max_delay.as_millis());
        Duration::from_millis(millis as u64)
    }
}
