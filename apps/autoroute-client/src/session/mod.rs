//! Login handshake with the autorouter.
//!
//! ```text
//! Idle ──loginstart──▶ AwaitingChallenge ──login──▶ Authenticating
//!   ▲                                                   │
//!   │                                  loginresult true │ false
//!   └──── disconnect ◀── Authenticated ◀────────────────┴──▶ Rejected
//! ```

use autoroute_proto::command::{LOGIN, LOGIN_START};
use autoroute_proto::Frame;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    AwaitingChallenge,
    Authenticating,
    Authenticated,
    Rejected,
}

/// Process-local id for one authenticated session, used to correlate logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(pub u64);

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

static NEXT_SESSION_TOKEN: AtomicU64 = AtomicU64::new(1);

fn next_session_token() -> SessionToken {
    SessionToken(NEXT_SESSION_TOKEN.fetch_add(1, Ordering::Relaxed))
}

#[derive(Clone)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Lowercase hex SHA-256 of `password ‖ challenge ‖ seq`.
pub fn login_hash(password: &str, challenge: &str, seq: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(challenge.as_bytes());
    hasher.update(seq.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hex millisecond timestamps, strictly increasing per clock.
#[derive(Debug, Default)]
pub struct SequenceClock {
    last: u64,
}

impl SequenceClock {
    pub fn next(&mut self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        self.next_at(now)
    }

    pub fn next_at(&mut self, now_ms: u64) -> String {
        let value = now_ms.max(self.last + 1);
        self.last = value;
        format!("{value:x}")
    }
}

/// What the caller should do after feeding a handshake frame in.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthStep {
    Send(Frame),
    Authenticated(SessionToken),
    Rejected(String),
    Ignored,
}

#[derive(Debug)]
pub struct AuthMachine {
    state: AuthState,
    credentials: Option<Credentials>,
    clock: SequenceClock,
    token: Option<SessionToken>,
}

impl Default for AuthMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthMachine {
    pub fn new() -> Self {
        Self {
            state: AuthState::Idle,
            credentials: None,
            clock: SequenceClock::default(),
            token: None,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    pub fn token(&self) -> Option<SessionToken> {
        self.token
    }

    pub fn user(&self) -> Option<&str> {
        self.credentials.as_ref().map(Credentials::user)
    }

    /// Start a handshake; returns the `loginstart` frame to send.
    pub fn begin(&mut self, credentials: Credentials) -> Result<Frame, ClientError> {
        match self.state {
            AuthState::Idle | AuthState::Rejected => {}
            AuthState::Authenticated => return Err(ClientError::AlreadyAuthenticated),
            other => return Err(ClientError::LoginInProgress(other)),
        }
        info!(user = %credentials.user(), "starting login");
        self.credentials = Some(credentials);
        self.state = AuthState::AwaitingChallenge;
        Ok(Frame::command(LOGIN_START))
    }

    pub fn on_challenge(&mut self, frame: &Frame) -> AuthStep {
        if self.state != AuthState::AwaitingChallenge {
            warn!(state = ?self.state, "unexpected login challenge ignored");
            return AuthStep::Ignored;
        }
        let challenge = frame.text("challenge").unwrap_or_default();
        if challenge.is_empty() {
            return self.reject("server error");
        }
        let Some(credentials) = self.credentials.as_ref() else {
            return self.reject("no credentials");
        };
        let seq = self.clock.next();
        let hash = login_hash(&credentials.password, &challenge, &seq);
        let login = Frame::command(LOGIN)
            .with_field("user", credentials.user.clone())
            .with_field("seq", seq)
            .with_field("hash", hash);
        self.state = AuthState::Authenticating;
        debug!("answering login challenge");
        AuthStep::Send(login)
    }

    pub fn on_result(&mut self, frame: &Frame) -> AuthStep {
        if self.state != AuthState::Authenticating {
            warn!(state = ?self.state, "unexpected login result ignored");
            return AuthStep::Ignored;
        }
        if frame.flag("result").unwrap_or(false) {
            let token = next_session_token();
            self.state = AuthState::Authenticated;
            self.token = Some(token);
            info!(session = %token, user = ?self.user(), "login accepted");
            AuthStep::Authenticated(token)
        } else {
            self.reject("login rejected")
        }
    }

    /// Back to `Idle`, e.g. after the transport went away.
    pub fn reset(&mut self) {
        self.state = AuthState::Idle;
        self.token = None;
        self.forget_password();
    }

    fn reject(&mut self, reason: &str) -> AuthStep {
        warn!(reason, "login failed");
        self.state = AuthState::Rejected;
        self.token = None;
        self.forget_password();
        AuthStep::Rejected(reason.to_string())
    }

    fn forget_password(&mut self) {
        if let Some(credentials) = self.credentials.as_mut() {
            credentials.password.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(value: &str) -> Frame {
        Frame::command("loginchallenge").with_field("challenge", value)
    }

    fn result(ok: bool) -> Frame {
        Frame::command("loginresult").with_field("result", ok)
    }

    #[test]
    fn hash_matches_known_digest() {
        assert_eq!(
            login_hash("pw", "XYZ", "1"),
            "d472d3e6b79337eb602b7dc5b49f8e8839a236e0f96cde0f88de33f5e3235199"
        );
        assert_eq!(
            login_hash("", "", ""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sequence_is_hex_and_strictly_increasing() {
        let mut clock = SequenceClock::default();
        assert_eq!(clock.next_at(255), "ff");
        assert_eq!(clock.next_at(255), "100");
        assert_eq!(clock.next_at(10), "101");
        assert_eq!(clock.next_at(0x1000), "1000");
    }

    #[test]
    fn full_handshake() {
        let mut auth = AuthMachine::new();
        let start = auth.begin(Credentials::new("alice", "secret")).unwrap();
        assert_eq!(start.command_name(), Some("loginstart"));
        assert_eq!(auth.state(), AuthState::AwaitingChallenge);

        let AuthStep::Send(login) = auth.on_challenge(&challenge("c0ffee")) else {
            panic!("expected a login frame");
        };
        let seq = login.text("seq").unwrap();
        assert_eq!(login.text("user").as_deref(), Some("alice"));
        assert_eq!(login.text("hash").unwrap(), login_hash("secret", "c0ffee", &seq));
        assert!(u64::from_str_radix(&seq, 16).is_ok());
        assert_eq!(auth.state(), AuthState::Authenticating);

        assert!(matches!(auth.on_result(&result(true)), AuthStep::Authenticated(_)));
        assert!(auth.is_authenticated());
        assert!(auth.token().is_some());
        assert!(matches!(
            auth.begin(Credentials::new("alice", "secret")),
            Err(ClientError::AlreadyAuthenticated)
        ));
    }

    #[test]
    fn empty_challenge_rejects_without_hash() {
        let mut auth = AuthMachine::new();
        auth.begin(Credentials::new("bob", "pw")).unwrap();
        assert_eq!(
            auth.on_challenge(&challenge("")),
            AuthStep::Rejected("server error".into())
        );
        assert_eq!(auth.state(), AuthState::Rejected);
        // A stray result after rejection changes nothing.
        assert_eq!(auth.on_result(&result(true)), AuthStep::Ignored);
        assert_eq!(auth.state(), AuthState::Rejected);
    }

    #[test]
    fn falsy_result_rejects_and_allows_retry() {
        let mut auth = AuthMachine::new();
        auth.begin(Credentials::new("bob", "pw")).unwrap();
        auth.on_challenge(&challenge("abc"));
        assert!(matches!(auth.on_result(&result(false)), AuthStep::Rejected(_)));
        assert!(auth.credentials.as_ref().unwrap().password.is_empty());
        assert!(auth.begin(Credentials::new("bob", "pw2")).is_ok());
    }

    #[test]
    fn second_login_while_pending_fails() {
        let mut auth = AuthMachine::new();
        auth.begin(Credentials::new("bob", "pw")).unwrap();
        assert!(matches!(
            auth.begin(Credentials::new("bob", "pw")),
            Err(ClientError::LoginInProgress(AuthState::AwaitingChallenge))
        ));
        // A result before the challenge was answered is out of order.
        assert_eq!(auth.on_result(&result(true)), AuthStep::Ignored);
        assert_eq!(auth.state(), AuthState::AwaitingChallenge);
    }

    #[test]
    fn credentials_debug_hides_password() {
        let rendered = format!("{:?}", Credentials::new("carol", "hunter2"));
        assert!(rendered.contains("carol"));
        assert!(!rendered.contains("hunter2"));
    }
}
