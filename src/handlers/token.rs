//! Token exchange handlers
//!
//! A requester asks for a token scoped to one resource on `<ns>:token:get`;
//! the token is later presented on `<ns>:token:check` together with the
//! resource and the access it needs. Tokens are single-use: a check consumes
//! the token whatever the outcome.
//!
//! Tokens have the form `<resource>:<sha256 hex>`, the digest covering the
//! resource, the reply topic and a random nonce. Issued tokens are kept in a
//! [`KeyValueStore`] under the `auth.tokens` area so several processes
//! sharing a store can verify each other's tokens.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, PoisonError, RwLock};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::{Broker, ControlChannels, ControlKind, Message, Topic};
use crate::handlers::chain::ControlHandler;
use crate::persistence::KeyValueStore;
use crate::utils::StoreError;

/// Storage area holding issued tokens.
pub const TOKEN_AREA: &str = "auth.tokens";

/// Custom property naming the identity behind a token request.
pub const REQUESTER: &str = "requester";

bitflags! {
    /// Permission bitmask granted to an identity.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u32 {
        const READ = 1;
        const WRITE = 1 << 1;
        const ADMIN = 1 << 2;
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredIdentity {
    name: String,
    access: u32,
}

/// Payload of a `token:get` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub resource: String,
}

/// Payload of a `token:check` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCheck {
    pub token: String,
    pub resource: String,
    pub access: u32,
}

pub struct TokenAuthority {
    store: Arc<dyn KeyValueStore>,
    grants: RwLock<HashMap<String, Access>>,
}

impl TokenAuthority {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            grants: RwLock::new(HashMap::new()),
        }
    }

    /// Set the permissions of `identity`, replacing earlier grants.
    pub fn grant(&self, identity: impl Into<String>, access: Access) {
        self.grants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.into(), access);
    }

    pub fn access_of(&self, identity: &str) -> Access {
        self.grants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .copied()
            .unwrap_or_else(Access::empty)
    }

    /// Issue a token for `requester` scoped to `resource`.
    pub fn issue(
        &self,
        resource: &str,
        reply_channel: &str,
        requester: &str,
    ) -> Result<String, StoreError> {
        let key = token_key(resource, reply_channel, &Uuid::new_v4().to_string());
        let identity = StoredIdentity {
            name: requester.to_string(),
            access: self.access_of(requester).bits(),
        };
        let encoded = serde_json::to_vec(&identity).unwrap_or_default();
        self.store.set(TOKEN_AREA, &key, &encoded)?;

        debug!(resource, requester, "Token issued");
        Ok(format!("{resource}:{key}"))
    }

    /// Verify `token` for `resource` and `required` access, consuming it.
    pub fn check(&self, token: &str, resource: &str, required: Access) -> Result<bool, StoreError> {
        let Some((prefix, key)) = token.rsplit_once(':') else {
            return Ok(false);
        };

        // Taking the entry is the single-use gate: of any number of
        // concurrent checks, only one receives the stored identity.
        let stored = self.store.take_bytes(TOKEN_AREA, key)?;
        if prefix != resource {
            warn!(resource, "Token presented for a different resource");
            return Ok(false);
        }

        let Some(identity) = stored.and_then(|raw| serde_json::from_slice::<StoredIdentity>(&raw).ok())
        else {
            return Ok(false);
        };
        let granted = Access::from_bits_truncate(identity.access);
        let allowed = granted.contains(required);
        info!(resource, identity = %identity.name, allowed, "Token checked");
        Ok(allowed)
    }
}

fn token_key(resource: &str, reply_channel: &str, nonce: &str) -> String {
    let digest = Sha256::new()
        .chain_update(resource.as_bytes())
        .chain_update(reply_channel.as_bytes())
        .chain_update(nonce.as_bytes())
        .finalize();
    digest.iter().fold(String::with_capacity(64), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

fn channel_has_prefix(message: &Message, prefix: &str) -> bool {
    Topic::channel_of(&message.topic).starts_with(prefix)
}

/// Issues tokens for `<ns>:token:get` requests.
pub struct GetTokenHandler {
    prefix: String,
    authority: Arc<TokenAuthority>,
    broker: Broker,
}

impl GetTokenHandler {
    pub fn new(channels: &ControlChannels, authority: Arc<TokenAuthority>, broker: Broker) -> Self {
        Self {
            prefix: channels.channel(ControlKind::TokenGet),
            authority,
            broker,
        }
    }
}

impl ControlHandler for GetTokenHandler {
    fn can_handle_this(&self, _version: &str, message: &Message) -> bool {
        channel_has_prefix(message, &self.prefix)
    }

    fn handle_this(&self, _version: &str, message: &Message) {
        let Some(reply_to) = message.reply_to() else {
            warn!(topic = %message.topic, "Token request without reply topic");
            return;
        };
        let request: TokenRequest = match serde_json::from_str(&message.payload) {
            Ok(r) => r,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Malformed token request");
                return;
            }
        };
        let requester = message.property(REQUESTER).unwrap_or_default();

        match self.authority.issue(&request.resource, reply_to, requester) {
            Ok(token) => {
                self.broker.reply(message, token);
            }
            Err(e) => warn!(resource = %request.resource, error = %e, "Could not issue token"),
        }
    }

    fn name(&self) -> &str {
        "get-token"
    }
}

/// Answers `<ns>:token:check` requests with `"true"` or `"false"`.
pub struct CheckTokenHandler {
    prefix: String,
    authority: Arc<TokenAuthority>,
    broker: Broker,
}

impl CheckTokenHandler {
    pub fn new(channels: &ControlChannels, authority: Arc<TokenAuthority>, broker: Broker) -> Self {
        Self {
            prefix: channels.channel(ControlKind::TokenCheck),
            authority,
            broker,
        }
    }
}

impl ControlHandler for CheckTokenHandler {
    fn can_handle_this(&self, _version: &str, message: &Message) -> bool {
        channel_has_prefix(message, &self.prefix)
    }

    fn handle_this(&self, _version: &str, message: &Message) {
        let allowed = match serde_json::from_str::<TokenCheck>(&message.payload) {
            Ok(check) => self
                .authority
                .check(
                    &check.token,
                    &check.resource,
                    Access::from_bits_truncate(check.access),
                )
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Token check failed");
                    false
                }),
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Malformed token check");
                false
            }
        };
        self.broker.reply(message, allowed.to_string());
    }

    fn name(&self) -> &str {
        "check-token"
    }
}
