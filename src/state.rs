//! Shared application state.
//!
//! One [`AppState`] is built at startup and shared by every handler. The
//! Transfer Registry is owned here and handed to the call-control client,
//! the bridge sessions and the dial callbacks, so all of them observe the
//! same transfer records.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::config::ServerConfig;
use crate::core::bridge::ToolContext;
use crate::core::records::{CallRecordStore, InMemoryCallRecordStore};
use crate::core::transfer::{CallControl, TransferError, TransferRegistry, TwilioCallControl};

/// Why a media stream connection was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    GlobalLimitReached,
    PerIpLimitReached,
}

pub struct AppState {
    pub config: ServerConfig,
    pub transfer_registry: Arc<TransferRegistry>,
    /// `None` when telephony REST credentials are not configured
    pub call_control: Option<Arc<dyn CallControl>>,
    pub call_records: Arc<dyn CallRecordStore>,

    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, u32>,
}

impl AppState {
    /// Build the state with the default in-memory record store and, when
    /// configured, the Twilio call-control client.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, TransferError> {
        let registry = Arc::new(TransferRegistry::new());

        let call_control: Option<Arc<dyn CallControl>> = match config.call_control_config() {
            Some(control_config) => {
                let client = TwilioCallControl::new(control_config, registry.clone())?;
                Some(Arc::new(client))
            }
            None => {
                tracing::warn!(
                    "Call control not configured (TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN, TRANSFER_WEBHOOK_URL); transfers are disabled"
                );
                None
            }
        };

        Ok(Self::with_parts(
            config,
            registry,
            call_control,
            Arc::new(InMemoryCallRecordStore::new()),
        ))
    }

    /// Assemble the state from explicit collaborators.
    pub fn with_parts(
        config: ServerConfig,
        transfer_registry: Arc<TransferRegistry>,
        call_control: Option<Arc<dyn CallControl>>,
        call_records: Arc<dyn CallRecordStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            transfer_registry,
            call_control,
            call_records,
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        })
    }

    /// Collaborators for one call's tool dispatcher.
    pub fn tool_context(&self) -> ToolContext {
        let lines: BTreeMap<u8, String> = self.config.transfer_lines.clone();
        ToolContext::new(
            self.transfer_registry.clone(),
            self.call_control.clone(),
            self.call_records.clone(),
            lines,
        )
        .with_transfer_timeout(self.config.transfer_timeout())
    }

    // =========================================================================
    // Connection accounting
    // =========================================================================

    /// Reserve a media stream slot for `ip`.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        let max_global = self.config.max_websocket_connections;
        let acquired = self
            .ws_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| match max_global {
                Some(max) if current >= max => None,
                _ => Some(current + 1),
            });
        if acquired.is_err() {
            return Err(ConnectionLimitError::GlobalLimitReached);
        }

        let max_per_ip = self.config.max_connections_per_ip;
        let mut entry = self.ip_connections.entry(ip).or_insert(0);
        if *entry >= max_per_ip {
            drop(entry);
            self.ws_connections.fetch_sub(1, Ordering::SeqCst);
            return Err(ConnectionLimitError::PerIpLimitReached);
        }
        *entry += 1;
        Ok(())
    }

    /// Release a slot taken by [`AppState::try_acquire_connection`].
    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(1)
            });

        let remove = match self.ip_connections.get_mut(&ip) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        };
        if remove {
            self.ip_connections.remove_if(&ip, |_, count| *count == 0);
        }
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::SeqCst)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.ip_connections.get(ip).map(|c| *c).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_new_without_telephony_disables_transfers() {
        let state = AppState::new(ServerConfig::default()).unwrap();
        assert!(state.call_control.is_none());
        assert!(state.tool_context().call_control.is_none());
    }

    #[test]
    fn test_new_with_telephony_builds_call_control() {
        let mut config = ServerConfig::default();
        config.twilio_account_sid = Some("AC123".to_string());
        config.twilio_auth_token = Some("token".to_string());
        config.transfer_webhook_url = Some("https://bridge.example.com/twiml/transfer".to_string());

        let state = AppState::new(config).unwrap();
        assert!(state.call_control.is_some());
    }

    #[test]
    fn test_tool_context_uses_configured_lines_and_timeout() {
        let mut config = ServerConfig::default();
        config.transfer_lines.insert(2, "+12125551234".to_string());
        config.transfer_timeout_seconds = 12;

        let state = AppState::new(config).unwrap();
        let ctx = state.tool_context();
        assert_eq!(ctx.transfer_lines.get(&2).map(String::as_str), Some("+12125551234"));
        assert_eq!(ctx.transfer_timeout.as_secs(), 12);
    }

    #[test]
    fn test_release_unknown_ip_is_harmless() {
        let state = AppState::new(ServerConfig::default()).unwrap();
        let ip: IpAddr = Ipv4Addr::new(10, 0, 0, 1).into();
        state.release_connection(ip);
        assert_eq!(state.ws_connection_count(), 0);
        assert_eq!(state.ip_connection_count(&ip), 0);
    }
}
