// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the omnichannel chat integration core.
//!
//! Holds the error taxonomy, the domain and event model, and the traits
//! every collaborator (platform clients, broker, identity, object store)
//! implements.

pub mod error;
pub mod event;
pub mod media;
pub mod time;
pub mod traits;
pub mod types;

pub use error::OmnichatError;
pub use event::{MessageBody, MessageEvent, PlatformEvent, StatusEvent, TypingEvent, WebhookEnvelope};
pub use types::{
    AdapterType, ChannelType, ChatStatus, HealthStatus, MessageSource, MessageStatus, MessageType,
    SenderType, TenantId,
};

pub use traits::{
    BusPublisher, IdentityResolver, MediaStore, PlatformClient, PlatformFactory, PlatformRegistry,
    PluginAdapter, TokenEndpoint, TokenGrant, TokenResponse,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn wire_names_of_enums() {
        assert_eq!(ChannelType::Avito.to_string(), "AVITO");
        assert_eq!(ChannelType::from_str("TELEGRAM").unwrap(), ChannelType::Telegram);
        assert_eq!(SenderType::Operator.to_string(), "OPERATOR");
        assert_eq!(MessageType::Document.to_string(), "DOCUMENT");
        assert_eq!(MessageStatus::Delivered.to_string(), "DELIVERED");
        assert_eq!(MessageSource::Webhook.to_string(), "webhook");
        assert_eq!(ChatStatus::Closed.to_string(), "CLOSED");
    }

    #[test]
    fn enum_serde_matches_display() {
        let json = serde_json::to_string(&MessageStatus::Failed).unwrap();
        assert_eq!(json, "\"FAILED\"");
        let parsed: MessageSource = serde_json::from_str("\"web\"").unwrap();
        assert_eq!(parsed, MessageSource::Web);
    }

    #[test]
    fn grant_types_match_oauth_names() {
        let grant = TokenGrant::RefreshToken {
            client_id: "id".into(),
            client_secret: "secret".into(),
            refresh_token: "r".into(),
        };
        assert_eq!(grant.grant_type(), "refresh_token");
        let debug = format!("{grant:?}");
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_platform<T: PlatformClient>() {}
        fn _assert_bus<T: BusPublisher>() {}
        fn _assert_identity<T: IdentityResolver>() {}
        fn _assert_media<T: MediaStore>() {}
        fn _assert_token<T: TokenEndpoint>() {}
        fn _assert_factory<T: PlatformFactory>() {}
    }
}
