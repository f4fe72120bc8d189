//! Control channel conventions
//!
//! In-band control traffic shares the channel namespace with ordinary
//! messages. Each kind lives under a reserved `<namespace>:<kind>` prefix and
//! is recognized by ordinal, case-sensitive prefix comparison.

/// Kinds of control traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Publish,
    DiscoverRequest,
    DiscoverResponse,
    RegistryAlive,
    RegistryShutdown,
    SubscribeRequest,
    SubscribeResponse,
    SubscribeTrigger,
    Unsubscribe,
    Error,
    TokenGet,
    TokenCheck,
    Reply,
}

impl ControlKind {
    /// Suffix after `<namespace>:`. Order matters for [`ControlChannels::classify`].
    const ALL: [(ControlKind, &'static str); 13] = [
        (ControlKind::Publish, "publish:"),
        (ControlKind::DiscoverRequest, "discover:request"),
        (ControlKind::DiscoverResponse, "discover:response"),
        (ControlKind::RegistryAlive, "registry:alive"),
        (ControlKind::RegistryShutdown, "registry:shutdown"),
        (ControlKind::SubscribeRequest, "subscribe:request"),
        (ControlKind::SubscribeResponse, "subscribe:response"),
        (ControlKind::SubscribeTrigger, "subscribe:trigger"),
        (ControlKind::Unsubscribe, "unsubscribe"),
        (ControlKind::Error, "error"),
        (ControlKind::TokenGet, "token:get"),
        (ControlKind::TokenCheck, "token:check"),
        (ControlKind::Reply, "reply:"),
    ];

    fn suffix(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, suffix)| *suffix)
            .unwrap_or_default()
    }
}

/// Builds and recognizes the control channels of one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlChannels {
    namespace: String,
}

impl ControlChannels {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fixed channel for `kind`. For `Publish` and `Reply` this is the prefix
    /// that [`publish`](Self::publish) and [`reply`](Self::reply) extend.
    pub fn channel(&self, kind: ControlKind) -> String {
        format!("{}:{}", self.namespace, kind.suffix())
    }

    pub fn publish(&self, channel: &str) -> String {
        format!("{}{channel}", self.channel(ControlKind::Publish))
    }

    pub fn reply(&self, id: &str) -> String {
        format!("{}{id}", self.channel(ControlKind::Reply))
    }

    /// Wildcard pattern selecting every control channel of this namespace.
    pub fn pattern(&self) -> String {
        format!("{}:*", self.namespace)
    }

    /// Wildcard pattern selecting every channel of `kind`, whatever the
    /// trailing topic segments.
    pub fn pattern_for(&self, kind: ControlKind) -> String {
        format!("{}*", self.channel(kind))
    }

    /// Identify the control kind `channel` belongs to.
    pub fn classify(&self, channel: &str) -> Option<ControlKind> {
        let rest = channel
            .strip_prefix(self.namespace.as_str())?
            .strip_prefix(':')?;
        ControlKind::ALL
            .iter()
            .find(|(_, suffix)| rest.starts_with(suffix))
            .map(|(kind, _)| *kind)
    }
}
