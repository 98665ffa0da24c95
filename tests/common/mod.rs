// Shared fixtures for the protocol client tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use stagefeed::events::{ChannelEvent, EventBus, Subscription};
use stagefeed::rpc::{ChatCredentials, RpcProvider, SubscriptionRequest};
use stagefeed::status::StatusListener;
use stagefeed::transport::{Connector, MemoryConnector, MemoryListener};
use stagefeed::ClientContext;

/// Scriptable RPC provider that records every subscription request.
#[derive(Debug, Default)]
pub struct MockRpc {
    credentials: Option<ChatCredentials>,
    failing_types: HashSet<String>,
    requests: Mutex<Vec<SubscriptionRequest>>,
}

impl MockRpc {
    /// Provider without credentials: chat falls back to anonymous.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Provider that hands out `username` / `token`.
    pub fn authenticated(username: &str, token: &str) -> Self {
        Self {
            credentials: Some(ChatCredentials {
                token: token.into(),
                username: username.into(),
            }),
            ..Self::default()
        }
    }

    /// Make subscriptions of `event_type` fail.
    pub fn failing(mut self, event_type: &str) -> Self {
        self.failing_types.insert(event_type.into());
        self
    }

    pub fn requests(&self) -> Vec<SubscriptionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RpcProvider for MockRpc {
    async fn fetch_chat_credentials(&self) -> Result<ChatCredentials> {
        match &self.credentials {
            Some(credentials) => Ok(credentials.clone()),
            None => bail!("not logged in"),
        }
    }

    async fn subscribe(&self, request: &SubscriptionRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        if self.failing_types.contains(&request.event_type) {
            bail!("403 forbidden for {}", request.event_type);
        }
        Ok(())
    }
}

/// Records every connection-status flag.
#[derive(Debug, Default)]
pub struct RecordingStatus {
    flags: Mutex<Vec<bool>>,
}

impl RecordingStatus {
    pub fn flags(&self) -> Vec<bool> {
        self.flags.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<bool> {
        self.flags.lock().unwrap().last().copied()
    }
}

impl StatusListener for RecordingStatus {
    fn set_connected(&self, connected: bool) {
        self.flags.lock().unwrap().push(connected);
    }
}

/// Collects every event published on a bus.
pub struct EventLog {
    events: Arc<Mutex<Vec<ChannelEvent>>>,
    _subscription: Subscription,
}

impl EventLog {
    pub fn attach(bus: &EventBus) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscription = bus.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        Self {
            events,
            _subscription: subscription,
        }
    }

    pub fn events(&self) -> Vec<ChannelEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| e.kind.as_str().to_string())
            .collect()
    }
}

/// Everything a client test needs.
pub struct Harness {
    pub ctx: ClientContext,
    pub connector: Arc<MemoryConnector>,
    pub listener: MemoryListener,
    pub rpc: Arc<MockRpc>,
    pub bus: EventBus,
    pub status: Arc<RecordingStatus>,
}

impl Harness {
    pub fn new(rpc: MockRpc) -> Self {
        let (connector, listener) = MemoryConnector::new();
        let connector = Arc::new(connector);
        let rpc = Arc::new(rpc);
        let bus = EventBus::new();
        let dyn_connector: Arc<dyn Connector> = Arc::clone(&connector) as Arc<dyn Connector>;
        let dyn_rpc: Arc<dyn RpcProvider> = Arc::clone(&rpc) as Arc<dyn RpcProvider>;
        let ctx = ClientContext::new(dyn_connector, dyn_rpc, bus.clone());
        Self {
            ctx,
            connector,
            listener,
            rpc,
            bus,
            status: Arc::new(RecordingStatus::default()),
        }
    }
}

/// Let spawned tasks run without advancing the paused clock.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}
