use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mqdeliver_codec::Protocol;
use parking_lot::RwLock;

use crate::database::MessageDatabase;
use crate::role::RoleAdapter;
use crate::sender::PacketSender;
use crate::settings::Delivery;
use crate::types::{duration_millis, ClientId, ConnectionState, Limits, TimestampMillis, RETRY_INTERVAL_DEFAULT};

/// One MQTT connection as seen by the delivery handlers.
pub struct Session {
    id: ClientId,
    protocol: Protocol,
    state: RwLock<ConnectionState>,
    limits: Limits,
    retry_interval: TimestampMillis,
    pub(crate) role: Arc<dyn RoleAdapter>,
    pub(crate) sender: Arc<dyn PacketSender>,
}

impl Session {
    pub fn new(
        id: impl Into<ClientId>,
        protocol: Protocol,
        role: Arc<dyn RoleAdapter>,
        sender: Arc<dyn PacketSender>,
    ) -> Self {
        Self {
            id: id.into(),
            protocol,
            state: RwLock::new(ConnectionState::New),
            limits: Limits::default(),
            retry_interval: duration_millis(RETRY_INTERVAL_DEFAULT),
            role,
            sender,
        }
    }

    /// Builds a session from the `delivery` section of the settings: role,
    /// limits and retry interval. A broker role keeps its records in `db`.
    pub fn from_settings(
        cfg: &Delivery,
        id: impl Into<ClientId>,
        protocol: Protocol,
        db: Arc<dyn MessageDatabase>,
        sender: Arc<dyn PacketSender>,
    ) -> Self {
        Self::new(id, protocol, cfg.role_adapter(db), sender)
            .with_limits(cfg.limits())
            .with_retry_interval(cfg.retry_interval)
    }

    #[inline]
    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Limits of the session's stores. Set before the first message is stored;
    /// stores that already exist keep theirs.
    #[inline]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    #[inline]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = duration_millis(interval);
        self
    }

    #[inline]
    pub fn retry_interval(&self) -> TimestampMillis {
        self.retry_interval
    }

    #[inline]
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    #[inline]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    #[inline]
    pub fn role(&self) -> &Arc<dyn RoleAdapter> {
        &self.role
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    #[inline]
    pub fn set_state(&self, state: ConnectionState) {
        let prev = std::mem::replace(&mut *self.state.write(), state);
        if prev != state {
            log::debug!("{} connection state {:?} -> {:?}", self.id, prev, state);
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("protocol", &self.protocol.level())
            .field("state", &self.state())
            .field("role", &self.role.kind())
            .finish()
    }
}
