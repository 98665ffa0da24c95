//! Collaborators shared by both protocol clients.

use std::sync::Arc;

use crate::events::EventBus;
use crate::rpc::RpcProvider;
use crate::transport::Connector;

/// Socket factory, RPC provider and bus handed to each client at spawn.
#[derive(Debug, Clone)]
pub struct ClientContext {
    /// Opens sockets.
    pub connector: Arc<dyn Connector>,
    /// Mints credentials and registers subscriptions.
    pub rpc: Arc<dyn RpcProvider>,
    /// Where normalized events are published.
    pub bus: EventBus,
}

impl ClientContext {
    /// Bundle the collaborators.
    pub fn new(connector: Arc<dyn Connector>, rpc: Arc<dyn RpcProvider>, bus: EventBus) -> Self {
        Self {
            connector,
            rpc,
            bus,
        }
    }
}
