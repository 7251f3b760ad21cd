//! Bind escalation ladder
//!
//! The ladder is a fixed list of [`LadderStep`]s. Each step is planned into a
//! concrete [`BindAttemptSpec`] (or skipped when it does not apply), run on a
//! fresh connection, and its failure classified:
//!
//! 1. Primary: simple bind, plain or implicit TLS as configured
//! 2. StartTLS: same port, only for plain endpoints
//! 3. Implicit TLS on the TLS port
//! 4. Negotiate, then NTLM, over the transport of the last failed attempt
//!
//! A rejection or infrastructure failure ends the ladder immediately; only
//! "strong authentication required" moves to the next step.

use crate::ldap::classify::classify;
use crate::ldap::client::DirectoryConnector;
use crate::ldap::credential::NormalizedCredential;
use crate::ldap::types::*;
use dcauth_core::DirectorySettings;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Evaluation order of the ladder
pub const LADDER: [LadderStep; 5] = [
    LadderStep::Primary,
    LadderStep::StartTls,
    LadderStep::ImplicitTlsFallback,
    LadderStep::Alternate(BindMechanism::Negotiate),
    LadderStep::Alternate(BindMechanism::Ntlm),
];

/// Knobs for one run of the ladder
#[derive(Debug, Clone)]
pub struct LadderPolicy {
    /// Port for the implicit-TLS fallback
    pub tls_port: u16,
    pub attempt_timeout: Duration,
    /// Bound on the whole ladder
    pub deadline: Duration,
    /// When false, steps that would send the password in clear are skipped
    pub allow_plaintext_bind: bool,
    pub connect: ConnectOptions,
}

impl Default for LadderPolicy {
    fn default() -> Self {
        Self::from(&DirectorySettings::default())
    }
}

impl From<&DirectorySettings> for LadderPolicy {
    fn from(settings: &DirectorySettings) -> Self {
        Self {
            tls_port: settings.tls_port,
            attempt_timeout: settings.attempt_timeout,
            deadline: settings.deadline,
            allow_plaintext_bind: settings.allow_plaintext_bind,
            connect: ConnectOptions {
                connect_timeout: settings.attempt_timeout,
                skip_tls_verify: settings.skip_tls_verify,
            },
        }
    }
}

/// Runs the ladder against one endpoint
pub struct BindStrategyEngine {
    connector: Arc<dyn DirectoryConnector>,
    policy: LadderPolicy,
}

impl BindStrategyEngine {
    pub fn new(connector: Arc<dyn DirectoryConnector>, policy: LadderPolicy) -> Self {
        Self { connector, policy }
    }

    /// Authenticate `credential` against `endpoint`
    pub async fn authenticate(
        &self,
        endpoint: &DirectoryEndpoint,
        credential: &NormalizedCredential,
    ) -> AuthReport {
        let mut attempts = Vec::new();

        let outcome = match timeout(
            self.policy.deadline,
            self.run_ladder(endpoint, credential, &mut attempts),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    "Authentication deadline of {}s elapsed, abandoning ladder",
                    self.policy.deadline.as_secs()
                );
                AuthOutcome::Failed(format!(
                    "authentication did not complete within {}s",
                    self.policy.deadline.as_secs()
                ))
            }
        };

        AuthReport { outcome, attempts }
    }

    async fn run_ladder(
        &self,
        endpoint: &DirectoryEndpoint,
        credential: &NormalizedCredential,
        attempts: &mut Vec<AttemptRecord>,
    ) -> AuthOutcome {
        let bind_name = credential.bind_name();

        for step in LADDER {
            let Some(spec) = self.plan(step, endpoint, attempts) else {
                debug!(step = %step, "Ladder step not applicable, skipping");
                continue;
            };

            debug!(step = %step, "Attempting {}", spec);
            let started = Instant::now();
            let result = self.attempt(&spec, &bind_name, &credential.password).await;
            let elapsed = started.elapsed();

            let error = match result {
                Ok(()) => {
                    info!(step = %step, "Bind succeeded: {}", spec);
                    attempts.push(AttemptRecord {
                        step,
                        spec,
                        failure: None,
                        elapsed,
                    });
                    return AuthOutcome::Authenticated(bind_name);
                }
                Err(e) => e,
            };

            let class = classify(&error);
            attempts.push(AttemptRecord {
                step,
                spec,
                failure: Some(class),
                elapsed,
            });

            match class {
                FailureClass::StrongAuthRequired => {
                    info!(step = %step, "Directory requires stronger authentication ({}), escalating", error);
                }
                FailureClass::Rejected => {
                    debug!(step = %step, "Bind rejected: {}", error);
                    return AuthOutcome::Rejected;
                }
                FailureClass::Infrastructure => {
                    warn!(step = %step, "Directory unavailable: {}", error);
                    return AuthOutcome::Failed(error.to_string());
                }
            }
        }

        if attempts.is_empty() {
            return AuthOutcome::Failed("no applicable bind method for this endpoint".to_string());
        }

        warn!(
            "Directory required stronger authentication on all {} attempts",
            attempts.len()
        );
        AuthOutcome::Failed(
            "directory requires stronger authentication than any available bind method"
                .to_string(),
        )
    }

    /// Turn a step into a concrete attempt, or `None` when it does not apply
    fn plan(
        &self,
        step: LadderStep,
        endpoint: &DirectoryEndpoint,
        previous: &[AttemptRecord],
    ) -> Option<BindAttemptSpec> {
        let spec = match step {
            LadderStep::Primary => {
                let transport = if endpoint.implicit_tls {
                    Transport::ImplicitTls
                } else {
                    Transport::Plain
                };
                if !transport.is_encrypted() && !self.policy.allow_plaintext_bind {
                    return None;
                }
                BindAttemptSpec {
                    host: endpoint.host.clone(),
                    port: endpoint.port,
                    transport,
                    mechanism: BindMechanism::Simple,
                }
            }
            LadderStep::StartTls => {
                if endpoint.implicit_tls {
                    return None;
                }
                BindAttemptSpec {
                    host: endpoint.host.clone(),
                    port: endpoint.port,
                    transport: Transport::StartTls,
                    mechanism: BindMechanism::Simple,
                }
            }
            LadderStep::ImplicitTlsFallback => BindAttemptSpec {
                host: endpoint.host.clone(),
                port: self.policy.tls_port,
                transport: Transport::ImplicitTls,
                mechanism: BindMechanism::Simple,
            },
            LadderStep::Alternate(mechanism) => {
                if !self.connector.supports(mechanism) {
                    return None;
                }
                let last = previous.last()?;
                if !last.spec.transport.is_encrypted() && !self.policy.allow_plaintext_bind {
                    return None;
                }
                BindAttemptSpec {
                    mechanism,
                    ..last.spec.clone()
                }
            }
        };

        // Never repeat an attempt already made, e.g. the TLS fallback of an
        // ldaps:// endpoint that already failed on the same port.
        if previous.iter().any(|record| record.spec == spec) {
            return None;
        }

        Some(spec)
    }

    /// One connection, one bind; the connection is released on every path
    async fn attempt(
        &self,
        spec: &BindAttemptSpec,
        bind_name: &str,
        password: &str,
    ) -> Result<(), DirectoryError> {
        let run = async {
            let mut session = self.connector.connect(spec, &self.policy.connect).await?;
            let result = session.bind(spec.mechanism, bind_name, password).await;
            session.close().await;
            result
        };

        // On timeout the session is dropped mid-flight, which releases it.
        match timeout(self.policy.attempt_timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(DirectoryError::Timeout(self.policy.attempt_timeout)),
        }
    }
}
