//! # Conversation Scheduler
//!
//! Runs turns strictly in arrival order per conversation while different
//! conversations proceed in parallel. Each conversation with pending work
//! owns one worker task; the queue entry is removed when the worker drains
//! it, so idle conversations hold no state.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

type Job = BoxFuture<'static, ()>;
type Queues = Arc<Mutex<HashMap<String, VecDeque<Job>>>>;

#[derive(Clone, Default)]
pub struct ConversationScheduler {
    queues: Queues,
}

impl ConversationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `job` behind earlier jobs of the same conversation.
    pub fn submit<F>(&self, conversation_id: &str, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        match queues.get_mut(conversation_id) {
            // A worker is already draining this conversation.
            Some(queue) => queue.push_back(job.boxed()),
            None => {
                queues.insert(conversation_id.to_string(), VecDeque::from([job.boxed()]));
                let queues = self.queues.clone();
                let conversation_id = conversation_id.to_string();
                tokio::spawn(drain(queues, conversation_id));
            }
        }
    }

    /// Conversations with queued or running work.
    pub fn active_conversations(&self) -> usize {
        self.queues.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

async fn drain(queues: Queues, conversation_id: String) {
    loop {
        let job = {
            let mut queues = queues.lock().unwrap_or_else(|e| e.into_inner());
            let Some(queue) = queues.get_mut(&conversation_id) else {
                return;
            };
            match queue.pop_front() {
                Some(job) => job,
                None => {
                    queues.remove(&conversation_id);
                    return;
                }
            }
        };

        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            tracing::error!(conversation_id = %conversation_id, "Turn panicked; continuing with the next one");
        }
    }
}
