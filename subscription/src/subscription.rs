//! The GENA subscription lifecycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use gena_server::{EventCallback, EventServer};

use crate::error::{Result, SubscriptionError};

/// Fraction of the granted timeout after which a renewal fires. Renewing
/// with margin, never exactly at expiry, keeps the subscription alive even
/// when the renewal request itself takes time.
const RENEWAL_MARGIN: f64 = 0.75;

const SUBSCRIBE: &str = "SUBSCRIBE";
const UNSUBSCRIBE: &str = "UNSUBSCRIBE";

/// One outstanding subscription to a remote device's eventing service.
///
/// A `Subscription` owns the SUBSCRIBE/RENEW/UNSUBSCRIBE request lifecycle
/// against a single subscribe URI, registers its callback with the
/// notification server once the device assigns a subscription id, and can
/// keep itself alive with a self-renewing timer.
///
/// The handle is cheap to clone; clones share the same lifecycle state,
/// which is how the renewal timer calls back into the subscription it
/// belongs to.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<Inner>,
}

struct Inner {
    client: reqwest::Client,
    server: Arc<EventServer>,
    subscribe_uri: String,
    requested_timeout: Option<u32>,
    callback: EventCallback,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// Assigned by the device on a successful SUBSCRIBE; absent before then
    /// and again after unsubscribing.
    sid: Option<String>,
    /// Pending renewal timer, if auto-renew is active.
    renewal: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Create a subscription bound to a notification server and a target
    /// subscribe URI. No request is issued until [`subscribe`](Self::subscribe).
    ///
    /// `requested_timeout` is the subscription period to ask the device for,
    /// in seconds; the device may grant a different one.
    pub fn new(
        server: Arc<EventServer>,
        subscribe_uri: impl Into<String>,
        callback: EventCallback,
        requested_timeout: Option<u32>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client: reqwest::Client::new(),
                server,
                subscribe_uri: subscribe_uri.into(),
                requested_timeout,
                callback,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// The target subscribe URI.
    pub fn subscribe_uri(&self) -> &str {
        &self.inner.subscribe_uri
    }

    /// The currently assigned subscription id, if subscribed.
    pub async fn sid(&self) -> Option<String> {
        self.inner.state.lock().await.sid.clone()
    }

    /// Whether a successful SUBSCRIBE is currently in effect.
    pub async fn is_subscribed(&self) -> bool {
        self.inner.state.lock().await.sid.is_some()
    }

    /// Issue the initial SUBSCRIBE request.
    ///
    /// On success the returned `SID` is stored, the callback is registered
    /// with the notification server under that id, and — when `auto_renew`
    /// is set — a renewal timer is armed from the response's `TIMEOUT`
    /// header.
    pub async fn subscribe(&self, auto_renew: bool) -> Result<()> {
        let callback_url = self.inner.server.callback_url().await;
        let response = self
            .send_request(
                SUBSCRIBE,
                vec![
                    ("CALLBACK".to_string(), format!("<{callback_url}>")),
                    ("NT".to_string(), "upnp:event".to_string()),
                ],
            )
            .await?;

        let sid = header(&response, "SID").ok_or(SubscriptionError::MissingSid)?;
        let timeout_header = header(&response, "TIMEOUT");

        let mut state = self.inner.state.lock().await;
        state.sid = Some(sid.clone());
        self.inner
            .server
            .registry()
            .register(&sid, self.inner.callback.clone())
            .await;
        tracing::info!(sid = %sid, uri = %self.inner.subscribe_uri, "subscribed");

        if auto_renew {
            self.arm_renewal(&mut state, timeout_header.as_deref());
        }
        Ok(())
    }

    /// Renew the subscription before it expires.
    ///
    /// A 412 from the device means it no longer recognizes the subscription
    /// id (expired or dropped server-side); that is recovered transparently
    /// by issuing a fresh [`subscribe`](Self::subscribe) instead of
    /// surfacing an error.
    ///
    /// # Errors
    ///
    /// [`SubscriptionError::NotSubscribed`] when called before any
    /// successful subscribe — no request is issued in that case. Any other
    /// non-success response is surfaced as
    /// [`SubscriptionError::RequestFailed`].
    pub async fn renew(&self, auto_renew: bool) -> Result<()> {
        let sid = self
            .inner
            .state
            .lock()
            .await
            .sid
            .clone()
            .ok_or(SubscriptionError::NotSubscribed)?;

        match self
            .send_request(SUBSCRIBE, vec![("SID".to_string(), sid.clone())])
            .await
        {
            Ok(response) => {
                tracing::info!(sid = %sid, "renewed subscription");
                if auto_renew {
                    let timeout_header = header(&response, "TIMEOUT");
                    let mut state = self.inner.state.lock().await;
                    self.arm_renewal(&mut state, timeout_header.as_deref());
                }
                Ok(())
            }
            Err(SubscriptionError::PreconditionFailed { .. }) => {
                tracing::warn!(
                    sid = %sid,
                    "subscription no longer recognized by device, re-subscribing"
                );
                // Drop the stale registration before the fresh subscribe
                // creates one under the new id.
                let _ = self
                    .inner
                    .server
                    .registry()
                    .unregister(&sid, &self.inner.callback)
                    .await;
                self.inner.state.lock().await.sid = None;
                self.subscribe(auto_renew).await
            }
            Err(e) => Err(e),
        }
    }

    /// Cancel the subscription.
    ///
    /// A no-op when never subscribed. The pending renewal timer is canceled
    /// synchronously before the UNSUBSCRIBE request goes out, and local
    /// state (timer, registry entry, stored sid) is cleaned up even when the
    /// request fails, so repeated calls never leak resources.
    pub async fn unsubscribe(&self) -> Result<()> {
        let sid = {
            let mut state = self.inner.state.lock().await;
            let Some(sid) = state.sid.take() else {
                return Ok(());
            };
            // A stale renewal must not fire after teardown has begun.
            if let Some(renewal) = state.renewal.take() {
                renewal.abort();
            }
            sid
        };

        let request_result = self
            .send_request(UNSUBSCRIBE, vec![("SID".to_string(), sid.clone())])
            .await;

        let registry_result = self
            .inner
            .server
            .registry()
            .unregister(&sid, &self.inner.callback)
            .await;

        request_result?;
        registry_result?;
        tracing::info!(sid = %sid, "unsubscribed");
        Ok(())
    }

    /// Arm (or re-arm) the renewal timer from a `TIMEOUT` response header.
    ///
    /// Absent or `infinite` timeouts arm nothing: infinite subscriptions are
    /// never renewed. The timer task invokes `renew` on its own task, never
    /// blocking the scheduler, and logs renewal failures.
    fn arm_renewal(&self, state: &mut State, timeout_header: Option<&str>) {
        let Some(seconds) = parse_timeout(timeout_header) else {
            return;
        };
        let delay = renewal_delay(seconds);

        if let Some(previous) = state.renewal.take() {
            // When the timer task re-arms after renewing, `previous` is the
            // task currently running; aborting it would cut the renewal
            // chain short.
            if tokio::task::try_id() != Some(previous.id()) {
                previous.abort();
            }
        }

        let subscription = self.clone();
        tracing::debug!(delay = ?delay, "arming renewal timer");
        state.renewal = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(error) = subscription.renew(true).await {
                tracing::error!(
                    uri = %subscription.inner.subscribe_uri,
                    error = %error,
                    "automatic subscription renewal failed"
                );
            }
        }));
    }

    /// Send one subscription request to the subscribe URI.
    ///
    /// The configured requested timeout, when present, is attached to every
    /// outgoing request as `TIMEOUT: Second-<n>`.
    async fn send_request(
        &self,
        method: &str,
        mut headers: Vec<(String, String)>,
    ) -> Result<reqwest::Response> {
        if let Some(timeout) = self.inner.requested_timeout {
            headers.push(("TIMEOUT".to_string(), format!("Second-{timeout}")));
        }

        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|e| SubscriptionError::Network(e.to_string()))?;
        let mut request = self.inner.client.request(method, &self.inner.subscribe_uri);
        for (name, value) in &headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SubscriptionError::Network(e.to_string()))?;

        match response.status().as_u16() {
            200 => Ok(response),
            412 => Err(SubscriptionError::PreconditionFailed {
                sid: headers
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case("SID"))
                    .map(|(_, value)| value.clone()),
            }),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(SubscriptionError::RequestFailed {
                    uri: self.inner.subscribe_uri.clone(),
                    headers,
                    status,
                    body,
                })
            }
        }
    }
}

/// Extract a response header as a string.
fn header(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Parse a `TIMEOUT` header value into seconds.
///
/// Returns `None` for an absent header or the literal `infinite`, which both
/// mean "do not renew". The `Second-<n>` prefix is matched
/// case-insensitively.
fn parse_timeout(header: Option<&str>) -> Option<u64> {
    let value = header?.trim();
    if value.eq_ignore_ascii_case("infinite") {
        return None;
    }
    value
        .to_ascii_lowercase()
        .strip_prefix("second-")?
        .parse()
        .ok()
}

/// When a renewal should fire for a granted timeout of `seconds`.
fn renewal_delay(seconds: u64) -> Duration {
    Duration::from_secs_f64(seconds as f64 * RENEWAL_MARGIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timeout_second_format() {
        assert_eq!(parse_timeout(Some("Second-100")), Some(100));
        assert_eq!(parse_timeout(Some("second-1800")), Some(1800));
        assert_eq!(parse_timeout(Some("SECOND-5")), Some(5));
    }

    #[test]
    fn test_parse_timeout_infinite_and_absent() {
        assert_eq!(parse_timeout(Some("infinite")), None);
        assert_eq!(parse_timeout(Some("INFINITE")), None);
        assert_eq!(parse_timeout(None), None);
    }

    #[test]
    fn test_parse_timeout_garbage() {
        assert_eq!(parse_timeout(Some("Minute-3")), None);
        assert_eq!(parse_timeout(Some("Second-abc")), None);
        assert_eq!(parse_timeout(Some("")), None);
    }

    #[test]
    fn test_renewal_fires_with_margin_before_expiry() {
        assert_eq!(renewal_delay(100), Duration::from_secs(75));
        assert_eq!(renewal_delay(1800), Duration::from_secs(1350));
    }
}
