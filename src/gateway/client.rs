use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use rand::Rng;
use reqwest::{header, Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::request::{build_request, GatewayOperation, GatewayRequest};
use super::response::{parse_response, GatewayResponse};
use super::{GatewayError, PaymentGateway};
use crate::config::GatewayConfig;
use crate::credentials::CredentialCache;

/// Why a single HTTP exchange did not produce a usable body.
#[derive(Debug)]
enum AttemptError {
    /// Nothing reached the gateway, or it told us it did not process it.
    Retryable(String),
    /// The request may have been processed.
    Indeterminate(String),
    /// The gateway refused the request outright.
    Rejected { status: u16, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Success,
    Retryable,
    Rejected,
    Indeterminate,
}

fn classify_status(status: StatusCode) -> StatusClass {
    match status.as_u16() {
        200..=299 => StatusClass::Success,
        408 | 429 | 502 | 503 | 504 => StatusClass::Retryable,
        400..=499 => StatusClass::Rejected,
        _ => StatusClass::Indeterminate,
    }
}

fn classify_transport_error(err: &reqwest::Error) -> AttemptError {
    if err.is_connect() {
        AttemptError::Retryable(format!("connect failed: {}", err))
    } else if err.is_timeout() {
        AttemptError::Indeterminate(format!("request timed out: {}", err))
    } else {
        AttemptError::Indeterminate(format!("connection dropped: {}", err))
    }
}

// Definite rejections say nothing about the gateway's health.
fn counts_as_failure(err: &AttemptError) -> bool {
    !matches!(err, AttemptError::Rejected { .. })
}

/// Exponential delay for the `retry`-th retry (0-based), capped at `max`,
/// with equal jitter: half fixed, half random.
fn retry_delay(base: Duration, max: Duration, retry: u32) -> Duration {
    let ceiling = base.saturating_mul(1u32 << retry.min(16)).min(max);
    let half = ceiling / 2;
    let jitter_ms = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
    half + Duration::from_millis(jitter_ms)
}

fn encode_form(request: &GatewayRequest) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(&request.fields)
        .finish()
}

/// HTTP adapter for the card/ACH gateway.
///
/// Holds one pooled connection set for the lifetime of the process. Signing
/// secrets are pulled from the credential cache on every call and dropped
/// once the request is built.
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    url: String,
    credentials: Arc<CredentialCache>,
    max_retries: u32,
    backoff_base: Duration,
    backoff_max: Duration,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl GatewayClient {
    pub fn new(
        config: &GatewayConfig,
        credentials: Arc<CredentialCache>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()?;

        // failsafe's backoff counts whole seconds.
        let breaker_reset = config.breaker_reset.max(Duration::from_secs(1));
        let reset = backoff::equal_jittered(breaker_reset, breaker_reset * 2);
        let policy = failure_policy::consecutive_failures(config.breaker_failure_threshold, reset);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Ok(GatewayClient {
            client,
            url: config.url.clone(),
            credentials,
            max_retries: config.max_retries,
            backoff_base: config.backoff_base,
            backoff_max: config.backoff_max,
            circuit_breaker,
        })
    }

    /// Whether the circuit breaker currently lets calls through.
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    async fn send_once(&self, body: String) -> Result<String, FailsafeError<AttemptError>> {
        let client = self.client.clone();
        let url = self.url.clone();

        self.circuit_breaker
            .call_with(counts_as_failure, async move {
                let response = client
                    .post(&url)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| classify_transport_error(&e))?;

                let status = response.status();
                match classify_status(status) {
                    StatusClass::Success => response.text().await.map_err(|e| {
                        AttemptError::Indeterminate(format!("body read failed: {}", e))
                    }),
                    StatusClass::Retryable => {
                        Err(AttemptError::Retryable(format!("gateway returned HTTP {}", status)))
                    }
                    StatusClass::Rejected => Err(AttemptError::Rejected {
                        status: status.as_u16(),
                        body: response.text().await.unwrap_or_default(),
                    }),
                    StatusClass::Indeterminate => Err(AttemptError::Indeterminate(format!(
                        "gateway returned HTTP {}",
                        status
                    ))),
                }
            })
            .await
    }
}

#[async_trait]
impl PaymentGateway for GatewayClient {
    async fn execute(
        &self,
        op: &GatewayOperation,
        cancel: &CancellationToken,
    ) -> Result<GatewayResponse, GatewayError> {
        if cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        let request = {
            let credentials = self.credentials.get(op.merchant_id).await?;
            build_request(op, &credentials)?
        };
        let body = encode_form(&request);
        tracing::debug!(
            kind = %op.kind,
            tran_nbr = %op.tran_nbr,
            request = %request.masked(),
            "Prepared gateway request"
        );

        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match self.send_once(body.clone()).await {
                Ok(text) => {
                    let response = parse_response(&text)?;
                    tracing::info!(
                        kind = %op.kind,
                        tran_nbr = %op.tran_nbr,
                        attempt,
                        response_code = %response.response_code,
                        approved = response.approved,
                        "Gateway responded"
                    );
                    return Ok(response);
                }
                Err(FailsafeError::Rejected) => {
                    tracing::warn!(kind = %op.kind, "Gateway circuit breaker is open");
                    return Err(GatewayError::Transient {
                        attempts: attempt - 1,
                        reason: "gateway circuit breaker is open".to_string(),
                    });
                }
                Err(FailsafeError::Inner(AttemptError::Rejected { status, body })) => {
                    tracing::warn!(kind = %op.kind, status, "Gateway rejected request");
                    return Err(GatewayError::Rejected { status, body });
                }
                Err(FailsafeError::Inner(AttemptError::Indeterminate(reason))) => {
                    tracing::error!(
                        kind = %op.kind,
                        tran_nbr = %op.tran_nbr,
                        attempt,
                        reason = %reason,
                        "Gateway outcome unknown"
                    );
                    return Err(GatewayError::Indeterminate(reason));
                }
                Err(FailsafeError::Inner(AttemptError::Retryable(reason))) => {
                    if attempt > self.max_retries {
                        return Err(GatewayError::Transient {
                            attempts: attempt,
                            reason,
                        });
                    }

                    let delay = retry_delay(self.backoff_base, self.backoff_max, attempt - 1);
                    tracing::warn!(
                        kind = %op.kind,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Transient gateway failure, retrying"
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            tracing::info!(kind = %op.kind, attempt, "Gateway retry cancelled");
                            return Err(GatewayError::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
