// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Long-poll subscription.
//!
//! `subscribe` runs the polling cycle on the calling task until `unsubscribe`
//! is observed or a probe fails. Each iteration posts the fingerprint of the
//! cached content; the server holds the request until the config changes or
//! its own timeout fires. A non-empty answer triggers a fresh fetch.
//!
//! ```text
//!   Idle --subscribe--> Polling --(is_subscribed == false | error)--> Idle
//! ```
//!
//! `unsubscribe` only takes effect between iterations. Callers needing a hard
//! stop drop the `subscribe` future (for example from `tokio::select!`); the
//! polling flag is reset either way.

use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, info, warn};

use crate::client::{ConfigClient, CONFIG_PATH};
use crate::error::{AcmError, Result};
use crate::http::{HttpRequest, HEADER_LONG_POLL_TIMEOUT};
use crate::key::ConfigKey;
use crate::util::content_fingerprint;

/// Form field carrying the probe payload.
pub const PROBE_FIELD: &str = "Probe-Modify-Request";
/// Separates the fields of one probe record.
pub const WORD_SEPARATOR: &str = "\u{2}";
/// Terminates a probe record.
pub const LINE_SEPARATOR: &str = "\u{1}";

/// Snapshot of the subscription flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriptionState {
    /// Desired state, set by `subscribe` and cleared by `unsubscribe`.
    pub is_subscribed: bool,
    /// True exactly while a polling cycle is running.
    pub is_polling: bool,
}

/// How a call to [`ConfigClient::subscribe`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Another call is already running the cycle; nothing was started.
    AlreadyPolling,
    /// The cycle observed `unsubscribe` and exited.
    Stopped,
}

/// Result of one long-poll probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Unchanged,
    /// The server reported a change and the content was fetched again.
    Changed,
}

#[derive(Debug, Default)]
pub(crate) struct SubscriptionFlags {
    subscribed: AtomicBool,
    polling: AtomicBool,
}

/// Clears the polling flag when the cycle exits, including on cancellation.
struct PollingGuard<'a>(&'a AtomicBool);

impl Drop for PollingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Builds the `dataId\x02group\x02fingerprint\x02namespace\x01` probe record.
pub fn probe_payload(key: &ConfigKey, fingerprint: &str, namespace: &str) -> String {
    let mut payload = [key.data_id(), key.group(), fingerprint, namespace].join(WORD_SEPARATOR);
    payload.push_str(LINE_SEPARATOR);
    payload
}

impl ConfigClient {
    /// Subscribes to `data_id`/`group` and long-polls until unsubscribed.
    ///
    /// Returns immediately with [`SubscribeOutcome::AlreadyPolling`] when a
    /// cycle is already running; the target is still updated and the running
    /// cycle picks it up on its next iteration. Probe or fetch failures end the
    /// cycle and are returned unchanged; there is no retry or backoff.
    pub async fn subscribe(&self, data_id: &str, group: &str) -> Result<SubscribeOutcome> {
        let key = ConfigKey::new(data_id, group)?;
        self.set_target(key);
        self.subscription.subscribed.store(true, Ordering::SeqCst);

        if self
            .subscription
            .polling
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(data_id, group, "acm long-poll already running");
            return Ok(SubscribeOutcome::AlreadyPolling);
        }

        debug!(data_id, group, "acm long-poll started");
        loop {
            let polling = PollingGuard(&self.subscription.polling);
            while self.subscription.subscribed.load(Ordering::SeqCst) {
                if let Err(err) = self.check_server_config_info().await {
                    warn!(data_id, group, error = %err, "acm long-poll stopped on error");
                    return Err(err);
                }
            }
            drop(polling);

            // A subscribe that raced the final flag check saw `AlreadyPolling`.
            if !self.resume_polling() {
                break;
            }
            debug!(data_id, group, "acm long-poll resumed");
        }
        debug!(data_id, group, "acm long-poll stopped");
        Ok(SubscribeOutcome::Stopped)
    }

    /// Reclaims the polling flag when a subscription arrived while the cycle was exiting.
    fn resume_polling(&self) -> bool {
        self.subscription.subscribed.load(Ordering::SeqCst)
            && self
                .subscription
                .polling
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }

    /// Asks the running cycle to exit after its in-flight probe.
    pub fn unsubscribe(&self) {
        self.subscription.subscribed.store(false, Ordering::SeqCst);
    }

    pub fn subscription_state(&self) -> SubscriptionState {
        SubscriptionState {
            is_subscribed: self.subscription.subscribed.load(Ordering::SeqCst),
            is_polling: self.subscription.polling.load(Ordering::SeqCst),
        }
    }

    /// Runs one long-poll probe for the current target.
    pub async fn check_server_config_info(&self) -> Result<ProbeOutcome> {
        let key = self.target().ok_or_else(|| {
            AcmError::Configuration(
                "no subscription target; call get_config or subscribe first".to_string(),
            )
        })?;

        let fingerprint = content_fingerprint(self.content().as_deref());
        let payload = probe_payload(&key, &fingerprint, self.namespace());

        let hold_millis =
            u64::try_from(self.options.long_poll_timeout.as_millis()).map_err(|_| {
                AcmError::Configuration("long-poll timeout is out of range".to_string())
            })?;
        let mut extra = HeaderMap::new();
        extra.insert(HEADER_LONG_POLL_TIMEOUT, HeaderValue::from(hold_millis));
        let headers = self.build_headers(key.group(), Some(extra)).await?;
        let url = self.request_url(CONFIG_PATH).await?;
        let request = HttpRequest::post(url)
            .with_headers(headers)
            .with_form_field(PROBE_FIELD, payload)
            .with_timeout(self.options.long_poll_client_timeout);

        let body = self.transport.execute(request).await?.into_body()?;
        if body.is_empty() {
            debug!(
                data_id = key.data_id(),
                group = key.group(),
                "acm config unchanged"
            );
            return Ok(ProbeOutcome::Unchanged);
        }

        info!(
            data_id = key.data_id(),
            group = key.group(),
            "acm config changed, fetching"
        );
        self.fetch(&key).await?;
        Ok(ProbeOutcome::Changed)
    }
}
