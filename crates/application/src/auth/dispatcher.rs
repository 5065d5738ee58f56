//! Authenticated request dispatch with deduplication and one-shot retry.

use std::sync::Arc;

use squadup_domain::{
    ApiRequest, ApiResponse, AuthError, AuthResult, RequestKey, SessionSettings, token_preview,
};

use super::refresh::RefreshCoordinator;
use super::single_flight::SingleFlight;
use super::token_store::TokenStore;
use crate::ports::HttpTransport;

/// Everything one dispatch needs, cloned into the task that runs it.
#[derive(Clone)]
struct Attempt {
    transport: Arc<dyn HttpTransport>,
    store: Arc<TokenStore>,
    refresh: RefreshCoordinator,
    expiry_buffer_secs: u64,
}

impl Attempt {
    async fn run(self, request: ApiRequest) -> AuthResult<ApiResponse> {
        let token = if self.store.is_expired(self.expiry_buffer_secs) {
            tracing::debug!(key = %request.key(), "access token near expiry, refreshing first");
            self.refresh.refresh().await?
        } else {
            self.store.access_token().ok_or(AuthError::Unauthenticated)?
        };

        let response = self.send(&request, &token).await?;
        if !response.is_unauthorized() {
            return settle(response);
        }

        let retry = match self.store.access_token() {
            Some(current) if current != token => {
                tracing::info!(
                    key = %request.key(),
                    "request rejected with 401, token already replaced"
                );
                current
            }
            _ => {
                tracing::info!(key = %request.key(), "request rejected with 401, refreshing");
                match self.refresh.refresh().await {
                    Ok(token) => token,
                    Err(e) => {
                        tracing::warn!(error = %e, "refresh after 401 failed");
                        return Err(response.into_rejection());
                    }
                }
            }
        };
        settle(self.send(&request, &retry).await?)
    }

    async fn send(&self, request: &ApiRequest, token: &str) -> AuthResult<ApiResponse> {
        tracing::debug!(
            key = %request.key(),
            access_token = %token_preview(token),
            "dispatching"
        );
        Ok(self.transport.send(request.with_bearer(token)).await?)
    }
}

fn settle(response: ApiResponse) -> AuthResult<ApiResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(response.into_rejection())
    }
}

/// Sends requests on behalf of the signed-in user.
pub struct RequestDispatcher {
    attempt: Attempt,
    settings: Arc<SessionSettings>,
    in_flight: SingleFlight<RequestKey, AuthResult<ApiResponse>>,
}

impl RequestDispatcher {
    /// Creates a dispatcher sending through `transport`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<TokenStore>,
        refresh: RefreshCoordinator,
        settings: Arc<SessionSettings>,
    ) -> Self {
        Self {
            attempt: Attempt {
                transport,
                store,
                refresh,
                expiry_buffer_secs: settings.request_expiry_buffer_secs,
            },
            settings,
            in_flight: SingleFlight::new(),
        }
    }

    /// Number of distinct requests currently outstanding.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Sends `request` with the current access token attached.
    ///
    /// A request whose method and resolved URL match one already outstanding
    /// shares its outcome instead of going to the network again. A token
    /// inside the expiry buffer is refreshed before sending. A 401 triggers
    /// one replay, after a refresh unless the store already holds a newer
    /// token than the one sent.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` if no access token exists.
    /// - `InvalidInput` if the URL cannot be resolved.
    /// - `RefreshDenied` if the token had expired and could not be refreshed.
    /// - `Network` if the server could not be reached.
    /// - `UpstreamRejected` for a final non-2xx reply. If the refresh after a
    ///   401 fails, this is the original 401.
    pub async fn authenticated_request(&self, request: ApiRequest) -> AuthResult<ApiResponse> {
        if self.attempt.store.access_token().is_none() {
            return Err(AuthError::Unauthenticated);
        }

        let url = self.settings.resolve_url(&request.url)?;
        let request = ApiRequest {
            url: url.into(),
            ..request
        };
        let key = request.key();

        let flight = self.in_flight.join(key.clone(), || {
            let attempt = self.attempt.clone();
            async move { attempt.run(request).await }
        });
        if flight.joined() {
            tracing::debug!(%key, "joining identical request in flight");
        }

        flight
            .wait()
            .await
            .unwrap_or_else(|| Err(AuthError::Network(format!("request {key} was aborted"))))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::auth::api::AuthApi;
    use crate::auth::signals::SessionSignals;
    use crate::testing::{ManualClock, MemoryStorage, ScriptedTransport};
    use chrono::Duration as TimeDelta;
    use futures_util::future::join_all;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use squadup_domain::HttpMethod;
    use std::time::Duration;

    const REFRESH: &str = "/api/auth/refresh";
    const SQUADS: &str = "/api/squads";

    struct Fixture {
        dispatcher: RequestDispatcher,
        store: Arc<TokenStore>,
        transport: Arc<ScriptedTransport>,
        clock: Arc<ManualClock>,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let transport = Arc::new(ScriptedTransport::new().with_latency(Duration::from_millis(25)));
        let settings = Arc::new(SessionSettings::default());
        let store = Arc::new(TokenStore::new(Arc::new(MemoryStorage::default()), clock.clone()));
        store.set_credential_pair("acc", "ref", 3600).await.unwrap();
        let api = Arc::new(AuthApi::new(transport.clone(), settings.clone(), clock.clone()));
        let refresh = RefreshCoordinator::new(store.clone(), api, SessionSignals::default());
        Fixture {
            dispatcher: RequestDispatcher::new(transport.clone(), store.clone(), refresh, settings),
            store,
            transport,
            clock,
        }
    }

    fn squads() -> ApiResponse {
        ApiResponse::json_body(200, &json!([{"name": "night owls"}]))
    }

    fn refreshed(token: &str) -> ApiResponse {
        ApiResponse::json_body(200, &json!({"access_token": token, "expires_in": 3600}))
    }

    #[tokio::test(start_paused = true)]
    async fn test_attaches_bearer_and_resolves_relative_url() {
        let f = fixture().await;
        f.transport.respond(HttpMethod::Get, SQUADS, squads());

        let response = f
            .dispatcher
            .authenticated_request(ApiRequest::get(SQUADS))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        let call = &f.transport.calls()[0];
        assert_eq!(call.url, "http://localhost:3001/api/squads");
        assert_eq!(call.bearer_token(), Some("acc"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_requests_share_one_call() {
        let f = fixture().await;
        f.transport.respond(HttpMethod::Get, SQUADS, squads());

        let results = join_all(
            (0..5).map(|_| f.dispatcher.authenticated_request(ApiRequest::get(SQUADS))),
        )
        .await;

        assert_eq!(f.transport.calls_to(HttpMethod::Get, SQUADS), 1);
        let first = results[0].clone().unwrap();
        assert!(results.iter().all(|r| r.as_ref() == Ok(&first)));
        assert_eq!(f.dispatcher.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_methods_are_not_merged() {
        let f = fixture().await;
        f.transport.respond(HttpMethod::Get, SQUADS, squads());
        f.transport
            .respond(HttpMethod::Post, SQUADS, ApiResponse::new(201, "{}"));

        let (get, post) = tokio::join!(
            f.dispatcher.authenticated_request(ApiRequest::get(SQUADS)),
            f.dispatcher
                .authenticated_request(ApiRequest::post(SQUADS).with_json(&json!({"name": "x"}))),
        );

        assert!(get.is_ok());
        assert_eq!(post.unwrap().status, 201);
        assert_eq!(f.transport.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_refreshes_before_sending() {
        let f = fixture().await;
        f.clock.advance(TimeDelta::seconds(3600 + 11 * 60));
        f.transport
            .respond(HttpMethod::Post, REFRESH, refreshed("fresh"));
        f.transport.respond(HttpMethod::Get, SQUADS, squads());

        let response = f
            .dispatcher
            .authenticated_request(ApiRequest::get(SQUADS))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(f.transport.calls().len(), 2);
        assert_eq!(f.transport.calls_to(HttpMethod::Post, REFRESH), 1);
        assert_eq!(f.transport.calls()[1].bearer_token(), Some("fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_proactive_refresh_clears_session() {
        let f = fixture().await;
        f.clock.advance(TimeDelta::seconds(3600 + 11 * 60));
        f.transport
            .respond(HttpMethod::Post, REFRESH, ApiResponse::new(401, ""));

        let result = f
            .dispatcher
            .authenticated_request(ApiRequest::get(SQUADS))
            .await;

        assert!(matches!(result, Err(AuthError::RefreshDenied(_))));
        assert_eq!(f.store.access_token(), None);
        assert_eq!(f.store.refresh_token(), None);
        assert_eq!(f.transport.calls_to(HttpMethod::Get, SQUADS), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_401_refreshes_and_replays_once() {
        let f = fixture().await;
        f.transport
            .respond(HttpMethod::Get, SQUADS, ApiResponse::new(401, ""));
        f.transport.respond(HttpMethod::Get, SQUADS, squads());
        f.transport
            .respond(HttpMethod::Post, REFRESH, refreshed("fresh"));

        let response = f
            .dispatcher
            .authenticated_request(ApiRequest::get(SQUADS))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        let calls = f.transport.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].bearer_token(), Some("acc"));
        assert_eq!(calls[2].bearer_token(), Some("fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_401_after_token_rotation_replays_without_refresh() {
        let f = fixture().await;
        f.transport
            .respond(HttpMethod::Get, SQUADS, ApiResponse::new(401, ""));
        f.transport.respond(HttpMethod::Get, SQUADS, squads());

        let (result, ()) = tokio::join!(
            f.dispatcher.authenticated_request(ApiRequest::get(SQUADS)),
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                f.store
                    .replace_access_token("ref", "rotated", 3600)
                    .await
                    .unwrap();
            }
        );

        assert_eq!(result.unwrap().status, 200);
        assert_eq!(f.transport.calls_to(HttpMethod::Post, REFRESH), 0);
        let bearers: Vec<_> = f
            .transport
            .calls()
            .iter()
            .map(|c| c.bearer_token().map(str::to_string))
            .collect();
        assert_eq!(
            bearers,
            vec![Some("acc".to_string()), Some("rotated".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_401_with_failed_refresh_surfaces_original_401() {
        let f = fixture().await;
        f.transport.respond(
            HttpMethod::Get,
            SQUADS,
            ApiResponse::json_body(401, &json!({"error": "token revoked"})),
        );
        f.transport
            .respond(HttpMethod::Post, REFRESH, ApiResponse::new(401, ""));

        let result = f
            .dispatcher
            .authenticated_request(ApiRequest::get(SQUADS))
            .await;

        assert!(matches!(
            result,
            Err(AuthError::UpstreamRejected { status: 401, .. })
        ));
        assert_eq!(f.store.access_token(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_401_fails_without_another_refresh() {
        let f = fixture().await;
        f.transport
            .respond(HttpMethod::Get, SQUADS, ApiResponse::new(401, ""));
        f.transport
            .respond(HttpMethod::Post, REFRESH, refreshed("fresh"));

        let result = f
            .dispatcher
            .authenticated_request(ApiRequest::get(SQUADS))
            .await;

        assert!(matches!(
            result,
            Err(AuthError::UpstreamRejected { status: 401, .. })
        ));
        assert_eq!(f.transport.calls_to(HttpMethod::Post, REFRESH), 1);
        assert_eq!(f.transport.calls_to(HttpMethod::Get, SQUADS), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_domain_error_surfaces_verbatim() {
        let f = fixture().await;
        f.transport
            .respond(HttpMethod::Get, SQUADS, ApiResponse::new(404, "no such squad"));

        let result = f
            .dispatcher
            .authenticated_request(ApiRequest::get(SQUADS))
            .await;

        assert_eq!(
            result,
            Err(AuthError::UpstreamRejected {
                status: 404,
                body: "no such squad".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_token_is_unauthenticated() {
        let f = fixture().await;
        f.store.clear().await;

        let result = f
            .dispatcher
            .authenticated_request(ApiRequest::get(SQUADS))
            .await;

        assert_eq!(result, Err(AuthError::Unauthenticated));
        assert!(f.transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_error_leaves_session_untouched() {
        let f = fixture().await;
        f.transport.fail(HttpMethod::Get, SQUADS, "connection refused");

        let result = f
            .dispatcher
            .authenticated_request(ApiRequest::get(SQUADS))
            .await;

        assert!(matches!(result, Err(AuthError::Network(_))));
        assert_eq!(f.store.access_token().as_deref(), Some("acc"));
    }
}
