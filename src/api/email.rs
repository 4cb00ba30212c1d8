//! Email queue, worker and delivery abstractions.
//!
//! Handlers never deliver mail inline. They push an [`EmailMessage`] onto an
//! [`EmailQueue`] and return; a single background task drains the queue and
//! hands each message to an [`EmailSender`]. A failed send moves to its own
//! task and is retried with exponential backoff and jitter until
//! `max_attempts` is reached, then dropped with an error log.
//!
//! The default sender is [`LogEmailSender`], which logs the message (including
//! the link) and returns `Ok(())`. Swap in an SMTP or API backed sender by
//! implementing the trait.

use anyhow::{Result, anyhow};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{Instrument, debug, error, info, info_span, warn};

pub const TEMPLATE_VERIFY_EMAIL: &str = "verify_email";
pub const TEMPLATE_PASSWORD_RESET: &str = "password_reset";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub subject: String,
    pub body: String,
}

/// Email delivery abstraction used by the worker.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to schedule a retry.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the message instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender {
    from: String,
}

impl LogEmailSender {
    #[must_use]
    pub fn new(from: String) -> Self {
        Self { from }
    }
}

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            from = %self.from,
            to_email = %message.to_email,
            template = %message.template,
            subject = %message.subject,
            body = %message.body,
            "email send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EmailWorkerConfig {
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EmailWorkerConfig {
    /// Default worker config: 5 max attempts and 5s->5m exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        let max_attempts = self.max_attempts.max(1);
        let backoff_base = if self.backoff_base.is_zero() {
            Duration::from_secs(1)
        } else {
            self.backoff_base
        };
        let backoff_max = if self.backoff_max < backoff_base {
            backoff_base
        } else {
            self.backoff_max
        };
        Self {
            max_attempts,
            backoff_base,
            backoff_max,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle used by handlers to enqueue outgoing mail.
#[derive(Clone, Debug)]
pub struct EmailQueue {
    tx: mpsc::UnboundedSender<EmailMessage>,
}

impl EmailQueue {
    /// A queue plus the receiving end, for callers that drain messages themselves.
    #[must_use]
    pub fn unbounded() -> (Self, mpsc::UnboundedReceiver<EmailMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a message for background delivery.
    ///
    /// # Errors
    /// Returns an error if the worker has stopped.
    pub fn enqueue(&self, message: EmailMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| anyhow!("email worker is not running"))
    }
}

/// Spawn the background worker and return the queue that feeds it.
///
/// The first attempt happens in queue order. A message that fails gets its own
/// retry task, so later messages are never held behind its backoff.
pub fn spawn_email_worker(
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) -> (EmailQueue, tokio::task::JoinHandle<()>) {
    let (queue, mut rx) = EmailQueue::unbounded();
    let config = config.normalize();

    let handle = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let span = info_span!(
                "email.deliver",
                template = %message.template,
                to_email = %message.to_email
            );
            if span.in_scope(|| attempt_delivery(sender.as_ref(), &message, 1, &config)) {
                let retry = retry_delivery(Arc::clone(&sender), message, config);
                tokio::spawn(retry.instrument(span));
            }
        }
        info!("email worker stopped");
    });

    (queue, handle)
}

/// Returns `true` when the message failed and has attempts left.
fn attempt_delivery(
    sender: &dyn EmailSender,
    message: &EmailMessage,
    attempt: u32,
    config: &EmailWorkerConfig,
) -> bool {
    match sender.send(message) {
        Ok(()) => false,
        Err(err) if attempt >= config.max_attempts() => {
            error!(attempts = attempt, "email delivery failed permanently: {err}");
            false
        }
        Err(err) => {
            warn!(attempt, "email delivery failed, retrying: {err}");
            true
        }
    }
}

async fn retry_delivery(
    sender: Arc<dyn EmailSender>,
    message: EmailMessage,
    config: EmailWorkerConfig,
) {
    let mut attempt = 1u32;
    loop {
        let delay = backoff_delay(attempt, config.backoff_base(), config.backoff_max());
        debug!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "email retry scheduled"
        );
        sleep(delay).await;
        attempt = attempt.saturating_add(1);
        if !attempt_delivery(sender.as_ref(), &message, attempt, &config) {
            return;
        }
    }
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    let capped = if delay > max { max } else { delay };
    jitter_delay(capped)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}
