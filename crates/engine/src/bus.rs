use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

use linkrot_core::{LinkResult, RetryInfo};

pub type LinkListener = Box<dyn Fn(&LinkResult) + Send + Sync>;
pub type RetryListener = Box<dyn Fn(&RetryInfo) + Send + Sync>;

/// Synchronous multi-listener observer for `link` and `retry` events.
/// Listeners run inline in registration order. A panicking listener is
/// isolated and logged; it never corrupts engine state.
#[derive(Default)]
pub struct EventBus {
    link: Vec<LinkListener>,
    retry: Vec<RetryListener>,
}

impl EventBus {
    pub fn on_link(&mut self, listener: impl Fn(&LinkResult) + Send + Sync + 'static) {
        self.link.push(Box::new(listener));
    }

    pub fn on_retry(&mut self, listener: impl Fn(&RetryInfo) + Send + Sync + 'static) {
        self.retry.push(Box::new(listener));
    }

    pub fn emit_link(&self, result: &LinkResult) {
        for listener in &self.link {
            if catch_unwind(AssertUnwindSafe(|| listener(result))).is_err() {
                warn!(url = %result.url, "link listener panicked");
            }
        }
    }

    pub fn emit_retry(&self, info: &RetryInfo) {
        for listener in &self.retry {
            if catch_unwind(AssertUnwindSafe(|| listener(info))).is_err() {
                warn!(url = %info.url, "retry listener panicked");
            }
        }
    }
}
