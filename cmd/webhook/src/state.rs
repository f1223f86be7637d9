use podgate_admission::Chain;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone)]
pub struct WebhookState {
    pub chain: Arc<Chain>,
    ready: Arc<AtomicBool>,
}

impl WebhookState {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain: Arc::new(chain),
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::Relaxed);
    }
}
