//! Scripted in-memory directory for tests
//!
//! [`ScriptedConnector`] answers each connection attempt with the next
//! [`FakeResponse`] from its script, then with a fallback response. It
//! counts connections opened and released so tests can check that no
//! session outlives its attempt.

use crate::ldap::{
    BindAttemptSpec, BindMechanism, ConnectOptions, DirectoryConnector, DirectoryError,
    DirectorySession,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// How the fake directory answers one attempt
#[derive(Debug, Clone)]
pub enum FakeResponse {
    /// Connect and bind succeed
    Accept,
    /// Connect succeeds, bind fails with this result
    Bind { rc: u32, message: String },
    /// Connect fails
    ConnectError(DirectoryError),
    /// Connect succeeds, bind succeeds only with this password
    Password(String),
    /// Connect succeeds, bind never completes
    Hang,
}

impl FakeResponse {
    /// Active Directory's answer to a wrong password
    pub fn invalid_credentials() -> Self {
        Self::Bind {
            rc: 49,
            message: "80090308: LdapErr: DSID-0C09044E, comment: AcceptSecurityContext error, data 52e, v4563".to_string(),
        }
    }

    /// Active Directory's answer to a simple bind when signing is enforced
    pub fn strong_auth_required() -> Self {
        Self::Bind {
            rc: 8,
            message: "00002028: LdapErr: DSID-0C090259, comment: The server requires binds to turn on integrity checking if SSL\\TLS are not already active on the connection, data 0, v4563".to_string(),
        }
    }
}

#[derive(Default)]
struct State {
    script: VecDeque<FakeResponse>,
    specs: Vec<BindAttemptSpec>,
    bind_names: Vec<String>,
    opened: usize,
    released: usize,
}

/// Fake [`DirectoryConnector`] driven by a script of responses
pub struct ScriptedConnector {
    state: Arc<Mutex<State>>,
    fallback: FakeResponse,
    mechanisms: Vec<BindMechanism>,
}

impl ScriptedConnector {
    /// Responses are consumed in order; once exhausted every attempt is
    /// rejected as a wrong password
    pub fn new(script: Vec<FakeResponse>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                script: script.into(),
                ..State::default()
            })),
            fallback: FakeResponse::invalid_credentials(),
            mechanisms: vec![
                BindMechanism::Simple,
                BindMechanism::Negotiate,
                BindMechanism::Ntlm,
            ],
        }
    }

    /// Directory that accepts exactly one password for every user
    pub fn accepting(password: &str) -> Self {
        Self::new(vec![]).with_fallback(FakeResponse::Password(password.to_string()))
    }

    pub fn with_fallback(mut self, response: FakeResponse) -> Self {
        self.fallback = response;
        self
    }

    pub fn with_mechanisms(mut self, mechanisms: &[BindMechanism]) -> Self {
        self.mechanisms = mechanisms.to_vec();
        self
    }

    /// Number of connect calls, failed ones included
    pub fn connection_attempts(&self) -> usize {
        self.lock().specs.len()
    }

    /// Sessions opened and not yet dropped
    pub fn open_sessions(&self) -> usize {
        let state = self.lock();
        state.opened - state.released
    }

    pub fn specs(&self) -> Vec<BindAttemptSpec> {
        self.lock().specs.clone()
    }

    pub fn bind_names(&self) -> Vec<String> {
        self.lock().bind_names.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DirectoryConnector for ScriptedConnector {
    fn supports(&self, mechanism: BindMechanism) -> bool {
        self.mechanisms.contains(&mechanism)
    }

    async fn connect(
        &self,
        spec: &BindAttemptSpec,
        _options: &ConnectOptions,
    ) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        let response = {
            let mut state = self.lock();
            state.specs.push(spec.clone());
            let response = state
                .script
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());

            if let FakeResponse::ConnectError(error) = response {
                return Err(error);
            }

            state.opened += 1;
            response
        };

        Ok(Box::new(FakeSession {
            state: self.state.clone(),
            response,
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<State>>,
    response: FakeResponse,
}

#[async_trait]
impl DirectorySession for FakeSession {
    async fn bind(
        &mut self,
        _mechanism: BindMechanism,
        bind_name: &str,
        password: &str,
    ) -> Result<(), DirectoryError> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .bind_names
            .push(bind_name.to_string());

        match &self.response {
            FakeResponse::Accept => Ok(()),
            FakeResponse::Password(expected) if expected == password => Ok(()),
            FakeResponse::Password(_) => Err(DirectoryError::Bind {
                rc: 49,
                message: "80090308: LdapErr: DSID-0C09044E, comment: AcceptSecurityContext error, data 52e, v4563".to_string(),
            }),
            FakeResponse::Bind { rc, message } => Err(DirectoryError::Bind {
                rc: *rc,
                message: message.clone(),
            }),
            FakeResponse::Hang => std::future::pending().await,
            FakeResponse::ConnectError(error) => Err(error.clone()),
        }
    }

    async fn close(self: Box<Self>) {}
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .released += 1;
    }
}
