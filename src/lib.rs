//! Token-guarded actuator service.
//!
//! A small device exposes `register`, `login`, `led`, `dashboard` and `logs`
//! over CoAP. Users register and log in to obtain a short-lived session
//! token; every actuator read or write, dashboard read and log read must
//! present a live token. Actuator changes are recorded in a bounded ledger.
//!
//! The core ([`auth`], [`ledger`], [`controller`], [`dispatch`]) is plain
//! owned state driven one request at a time; [`coap`] feeds it datagrams.

pub mod actuator;
pub mod auth;
pub mod clock;
pub mod coap;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod ledger;

pub use actuator::{Actuator, ActuatorState, MemoryActuator};
pub use auth::{CredentialStore, SessionManager, UserRecord};
pub use clock::{Clock, ManualClock, MonotonicClock, Tick};
pub use config::Config;
pub use controller::ResourceController;
pub use dispatch::{Dispatcher, Method, Reply, Request, Resource};
pub use error::{AccessError, AccessResult};
pub use ledger::{ActivityLedger, LogEntry, RecentLogs, MAX_LOGS};
