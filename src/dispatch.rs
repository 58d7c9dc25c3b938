//! Request dispatcher: routes one inbound request to the register, login,
//! actuator, dashboard or logs handler and formats the text reply.
//!
//! Each request goes `Parse → Authorize (protected resources) → Execute →
//! Respond`. The clock is read once per request, so token validation, token
//! issuance and ledger timestamps all see the same instant. The dispatcher
//! owns every store and handles one request at a time; nothing is shared.
//!
//! ## Wire contract
//!
//! | Resource    | Method | Payload             | Success                              |
//! |-------------|--------|---------------------|--------------------------------------|
//! | `register`  | POST   | `username:password` | `SUCCESS:Registered`                 |
//! | `login`     | POST   | `username:password` | `TOKEN:<token>`                      |
//! | `led`       | PUT    | `token:0` / `token:1` | `SUCCESS:LED ON` / `SUCCESS:LED OFF` |
//! | `led`       | GET    | `token`             | `STATE:ON` / `STATE:OFF`             |
//! | `dashboard` | GET    | `token`             | `USER:u\|LED:s\|USERS:n\|LOGS:n`     |
//! | `logs`      | GET    | `token`             | `LOGS:u,s,t;…` or `LOGS:No logs available` |
//!
//! Rejections are `ERROR:<reason>` with the reason taken from [`AccessError`].

use crate::actuator::Actuator;
use crate::auth::{CredentialStore, SessionManager};
use crate::clock::{Clock, Tick};
use crate::controller::ResourceController;
use crate::error::{AccessError, AccessResult};
use crate::ledger::{ActivityLedger, RecentLogs};
use std::fmt;

/// Default number of ledger entries returned by the `logs` resource.
pub const DEFAULT_LOG_PAGE: usize = 10;

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        })
    }
}

/// Addressable resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Register,
    Login,
    Led,
    Dashboard,
    Logs,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Self::Register,
        Self::Login,
        Self::Led,
        Self::Dashboard,
        Self::Logs,
    ];

    /// Resolve a request path. Leading and trailing slashes are ignored.
    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_matches('/') {
            "register" => Some(Self::Register),
            "login" => Some(Self::Login),
            "led" => Some(Self::Led),
            "dashboard" => Some(Self::Dashboard),
            "logs" => Some(Self::Logs),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Login => "login",
            Self::Led => "led",
            Self::Dashboard => "dashboard",
            Self::Logs => "logs",
        }
    }

    /// One-line usage shown in the startup banner.
    pub fn usage(&self) -> &'static str {
        match self {
            Self::Register => "POST /register  - Register new user (username:password)",
            Self::Login => "POST /login     - Login user (username:password)",
            Self::Led => "PUT|GET /led    - Control LED (token:0|1) / read state (token)",
            Self::Dashboard => "GET  /dashboard - Dashboard summary (token)",
            Self::Logs => "GET  /logs      - Recent activity (token)",
        }
    }
}

/// An inbound request as handed over by the transport.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub path: &'a str,
    pub method: Method,
    pub payload: &'a [u8],
}

impl<'a> Request<'a> {
    pub fn new(path: &'a str, method: Method, payload: &'a [u8]) -> Self {
        Self {
            path,
            method,
            payload,
        }
    }
}

/// Outcome of dispatching one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Text body, success or `ERROR:` alike.
    Content(String),
    /// No such resource.
    NotFound,
    /// Known resource, unsupported method.
    MethodNotAllowed,
}

impl Reply {
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Content(body) => Some(body.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Register,
    Login,
    SetLed,
    GetLed,
    Dashboard,
    Logs,
}

impl Operation {
    fn resolve(resource: Resource, method: Method) -> Option<Self> {
        match (resource, method) {
            (Resource::Register, Method::Post) => Some(Self::Register),
            (Resource::Login, Method::Post) => Some(Self::Login),
            (Resource::Led, Method::Put) => Some(Self::SetLed),
            (Resource::Led, Method::Get) => Some(Self::GetLed),
            (Resource::Dashboard, Method::Get) => Some(Self::Dashboard),
            (Resource::Logs, Method::Get) => Some(Self::Logs),
            _ => None,
        }
    }
}

pub struct Dispatcher<A: Actuator, C: Clock> {
    users: CredentialStore,
    sessions: SessionManager,
    ledger: ActivityLedger,
    controller: ResourceController<A>,
    clock: C,
    log_page: usize,
}

impl<A: Actuator, C: Clock> Dispatcher<A, C> {
    /// Dispatcher with default session lifetime, ledger capacity and log page.
    pub fn new(actuator: A, clock: C) -> Self {
        Self {
            users: CredentialStore::new(),
            sessions: SessionManager::default(),
            ledger: ActivityLedger::new(),
            controller: ResourceController::new(actuator),
            clock,
            log_page: DEFAULT_LOG_PAGE,
        }
    }

    pub fn with_sessions(mut self, sessions: SessionManager) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_ledger(mut self, ledger: ActivityLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_log_page(mut self, log_page: usize) -> Self {
        self.log_page = log_page;
        self
    }

    /// Handle one request to completion.
    pub fn handle(&mut self, request: &Request<'_>) -> Reply {
        let Some(resource) = Resource::from_path(request.path) else {
            tracing::debug!(path = request.path, "Unknown resource");
            return Reply::NotFound;
        };
        let Some(operation) = Operation::resolve(resource, request.method) else {
            tracing::debug!(
                resource = resource.as_str(),
                method = %request.method,
                "Method not allowed"
            );
            return Reply::MethodNotAllowed;
        };

        let now = self.clock.now();
        let body = match self.execute(operation, request.payload, now) {
            Ok(body) => body,
            Err(err) => {
                tracing::debug!(resource = resource.as_str(), reason = %err, "Request rejected");
                format!("ERROR:{err}")
            }
        };
        Reply::Content(body)
    }

    fn execute(&mut self, operation: Operation, payload: &[u8], now: Tick) -> AccessResult<String> {
        let payload = std::str::from_utf8(payload).map_err(|_| AccessError::InvalidFormat)?;
        match operation {
            Operation::Register => self.register(payload),
            Operation::Login => self.login(payload, now),
            Operation::SetLed => self.set_led(payload, now),
            Operation::GetLed => self.get_led(payload, now),
            Operation::Dashboard => self.dashboard(payload, now),
            Operation::Logs => self.logs(payload, now),
        }
    }

    // ── Public resources ────────────────────────────────────────────

    fn register(&mut self, payload: &str) -> AccessResult<String> {
        let (username, password) = split_pair(payload)?;
        self.users.register(username, password)?;
        tracing::info!(username = username, "User registered");
        Ok("SUCCESS:Registered".into())
    }

    fn login(&mut self, payload: &str, now: Tick) -> AccessResult<String> {
        let (username, password) = split_pair(payload)?;
        self.users.authenticate(username, password)?;
        let token = self.sessions.issue_token(&mut self.users, username, now)?;
        tracing::info!(username = username, "User logged in");
        Ok(format!("TOKEN:{token}"))
    }

    // ── Protected resources ─────────────────────────────────────────

    fn set_led(&mut self, payload: &str, now: Tick) -> AccessResult<String> {
        let (token, requested) = match payload.split_once(':') {
            Some((token, requested)) => (token, Some(requested)),
            None => (payload, None),
        };
        let username = self.authorize(token, now)?;
        let requested = requested.ok_or(AccessError::InvalidFormat)?;

        let state = self
            .controller
            .set(&mut self.ledger, &username, requested, now)?;
        Ok(format!("SUCCESS:LED {state}"))
    }

    fn get_led(&self, payload: &str, now: Tick) -> AccessResult<String> {
        let token = payload.split_once(':').map_or(payload, |(token, _)| token);
        self.authorize(token, now)?;
        Ok(format!("STATE:{}", self.controller.get()))
    }

    fn dashboard(&self, token: &str, now: Tick) -> AccessResult<String> {
        let username = self.authorize(token, now)?;
        tracing::info!(username = username.as_str(), "Dashboard accessed");
        Ok(format!(
            "USER:{username}|LED:{}|USERS:{}|LOGS:{}",
            self.controller.get(),
            self.users.len(),
            self.ledger.count()
        ))
    }

    fn logs(&self, token: &str, now: Tick) -> AccessResult<String> {
        let username = self.authorize(token, now)?;
        tracing::info!(username = username.as_str(), "Logs accessed");

        let lines = match self.ledger.recent(self.log_page) {
            RecentLogs::Entries(entries) if !entries.is_empty() => entries
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(";"),
            _ => return Ok("LOGS:No logs available".into()),
        };
        Ok(format!("LOGS:{lines}"))
    }

    fn authorize(&self, token: &str, now: Tick) -> AccessResult<String> {
        self.sessions
            .authorize(&self.users, token, now)
            .map(str::to_string)
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub fn users(&self) -> &CredentialStore {
        &self.users
    }

    pub fn ledger(&self) -> &ActivityLedger {
        &self.ledger
    }

    pub fn controller(&self) -> &ResourceController<A> {
        &self.controller
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }
}

/// Split `a:b` on the first colon.
fn split_pair(payload: &str) -> AccessResult<(&str, &str)> {
    payload.split_once(':').ok_or(AccessError::InvalidFormat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{ActuatorState, MemoryActuator};
    use crate::clock::ManualClock;
    use std::time::Duration;

    type TestDispatcher = Dispatcher<MemoryActuator, ManualClock>;

    fn dispatcher() -> (TestDispatcher, ManualClock) {
        let clock = ManualClock::starting_at(1_000);
        let sessions = SessionManager::with_seed(Duration::from_secs(3600), 42);
        let dispatcher =
            Dispatcher::new(MemoryActuator::new(false), clock.clone()).with_sessions(sessions);
        (dispatcher, clock)
    }

    fn send(d: &mut TestDispatcher, path: &str, method: Method, payload: &str) -> String {
        match d.handle(&Request::new(path, method, payload.as_bytes())) {
            Reply::Content(body) => body,
            other => panic!("expected content, got {other:?}"),
        }
    }

    fn login(d: &mut TestDispatcher, user: &str, pass: &str) -> String {
        send(d, "register", Method::Post, &format!("{user}:{pass}"));
        let reply = send(d, "login", Method::Post, &format!("{user}:{pass}"));
        reply
            .strip_prefix("TOKEN:")
            .unwrap_or_else(|| panic!("login failed: {reply}"))
            .to_string()
    }

    #[test]
    fn register_replies() {
        let (mut d, _) = dispatcher();
        assert_eq!(send(&mut d, "register", Method::Post, "alice:secret1"), "SUCCESS:Registered");
        assert_eq!(send(&mut d, "register", Method::Post, "alice:other12"), "ERROR:User exists");
        assert_eq!(send(&mut d, "register", Method::Post, "al:secret1"), "ERROR:Min 3 chars");
        assert_eq!(send(&mut d, "register", Method::Post, "alicesecret"), "ERROR:Invalid format");
    }

    #[test]
    fn register_password_may_contain_colons() {
        let (mut d, _) = dispatcher();
        send(&mut d, "register", Method::Post, "alice:se:cret");
        assert!(d.users().check_password("alice", "se:cret"));
        assert!(send(&mut d, "login", Method::Post, "alice:se:cret").starts_with("TOKEN:alice_"));
    }

    #[test]
    fn login_replies() {
        let (mut d, _) = dispatcher();
        send(&mut d, "register", Method::Post, "alice:secret1");
        assert_eq!(send(&mut d, "login", Method::Post, "bob:secret1"), "ERROR:User not found");
        assert_eq!(send(&mut d, "login", Method::Post, "alice:nope"), "ERROR:Wrong password");
        assert_eq!(send(&mut d, "login", Method::Post, "alice"), "ERROR:Invalid format");
        assert!(send(&mut d, "login", Method::Post, "alice:secret1").starts_with("TOKEN:alice_1000_"));
    }

    #[test]
    fn led_set_and_get() {
        let (mut d, _) = dispatcher();
        let token = login(&mut d, "alice", "secret1");

        assert_eq!(send(&mut d, "led", Method::Put, &format!("{token}:1")), "SUCCESS:LED ON");
        assert_eq!(send(&mut d, "led", Method::Get, &token), "STATE:ON");
        assert_eq!(send(&mut d, "led", Method::Put, &format!("{token}:0")), "SUCCESS:LED OFF");
        assert_eq!(send(&mut d, "led", Method::Get, &token), "STATE:OFF");
        assert_eq!(d.ledger().count(), 2);
    }

    #[test]
    fn led_bare_token_on_put_is_invalid_format() {
        let (mut d, _) = dispatcher();
        let token = login(&mut d, "alice", "secret1");

        assert_eq!(send(&mut d, "led", Method::Put, &token), "ERROR:Invalid format");
        assert_eq!(send(&mut d, "led", Method::Put, "bogus"), "ERROR:Invalid token");
        assert_eq!(d.ledger().count(), 0);
    }

    #[test]
    fn led_invalid_state_leaves_ledger_unchanged() {
        let (mut d, _) = dispatcher();
        let token = login(&mut d, "alice", "secret1");

        assert_eq!(send(&mut d, "led", Method::Put, &format!("{token}:2")), "ERROR:Invalid state");
        assert_eq!(d.ledger().count(), 0);
        assert_eq!(d.controller().get(), ActuatorState::Off);
    }

    #[test]
    fn expired_token_is_rejected_without_side_effects() {
        let (mut d, clock) = dispatcher();
        let token = login(&mut d, "alice", "secret1");

        clock.advance(Duration::from_secs(3600));
        assert_eq!(send(&mut d, "led", Method::Put, &format!("{token}:1")), "ERROR:Invalid token");
        assert_eq!(send(&mut d, "led", Method::Get, &token), "ERROR:Invalid token");
        assert_eq!(send(&mut d, "dashboard", Method::Get, &token), "ERROR:Invalid token");
        assert_eq!(send(&mut d, "logs", Method::Get, &token), "ERROR:Invalid token");
        assert_eq!(d.ledger().count(), 0);
        assert_eq!(d.controller().get(), ActuatorState::Off);
    }

    #[test]
    fn dashboard_summary() {
        let (mut d, _) = dispatcher();
        let token = login(&mut d, "alice", "secret1");
        send(&mut d, "register", Method::Post, "bob:secret2");
        send(&mut d, "led", Method::Put, &format!("{token}:1"));

        assert_eq!(
            send(&mut d, "dashboard", Method::Get, &token),
            "USER:alice|LED:ON|USERS:2|LOGS:1"
        );
    }

    #[test]
    fn logs_empty_then_newest_first() {
        let (mut d, clock) = dispatcher();
        let token = login(&mut d, "alice", "secret1");
        assert_eq!(send(&mut d, "logs", Method::Get, &token), "LOGS:No logs available");

        send(&mut d, "led", Method::Put, &format!("{token}:1"));
        clock.advance(Duration::from_millis(500));
        send(&mut d, "led", Method::Put, &format!("{token}:0"));

        assert_eq!(
            send(&mut d, "logs", Method::Get, &token),
            "LOGS:alice,OFF,1500;alice,ON,1000"
        );
    }

    #[test]
    fn logs_are_limited_to_page() {
        let (mut d, _) = dispatcher();
        let token = login(&mut d, "alice", "secret1");
        for i in 0..15 {
            send(&mut d, "led", Method::Put, &format!("{token}:{}", i % 2));
        }

        let reply = send(&mut d, "logs", Method::Get, &token);
        let body = reply.strip_prefix("LOGS:").unwrap();
        assert_eq!(body.split(';').count(), DEFAULT_LOG_PAGE);
    }

    #[test]
    fn zero_page_reports_no_logs() {
        let (d, _) = dispatcher();
        let mut d = d.with_log_page(0);
        let token = login(&mut d, "alice", "secret1");
        send(&mut d, "led", Method::Put, &format!("{token}:1"));

        assert_eq!(send(&mut d, "logs", Method::Get, &token), "LOGS:No logs available");
    }

    #[test]
    fn unknown_resource_and_wrong_method() {
        let (mut d, _) = dispatcher();
        assert_eq!(d.handle(&Request::new("toaster", Method::Get, b"")), Reply::NotFound);
        assert_eq!(
            d.handle(&Request::new("register", Method::Get, b"alice:secret1")),
            Reply::MethodNotAllowed
        );
        assert_eq!(
            d.handle(&Request::new("led", Method::Post, b"tok:1")),
            Reply::MethodNotAllowed
        );
        assert!(d.users().is_empty());
    }

    #[test]
    fn paths_ignore_surrounding_slashes() {
        let (mut d, _) = dispatcher();
        let reply = d.handle(&Request::new("/register/", Method::Post, b"alice:secret1"));
        assert_eq!(reply.content(), Some("SUCCESS:Registered"));
    }

    #[test]
    fn non_utf8_payload_is_invalid_format() {
        let (mut d, _) = dispatcher();
        let reply = d.handle(&Request::new("register", Method::Post, &[0xff, b':', 0xfe]));
        assert_eq!(reply.content(), Some("ERROR:Invalid format"));
    }

    #[test]
    fn resource_names_resolve() {
        for resource in Resource::ALL {
            assert_eq!(Resource::from_path(resource.as_str()), Some(resource));
        }
    }
}
