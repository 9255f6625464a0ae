use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::ProviderConfig;

type HmacSha256 = Hmac<Sha256>;

/// How long a join credential stays valid after issuance.
const CREDENTIAL_TTL_HOURS: i64 = 24;

/// What a participant is allowed to do on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Publisher,
    Subscriber,
}

impl Role {
    /// The privilege number embedded in the signed payload.
    fn privilege(&self) -> u8 {
        match self {
            Role::Publisher => 1,
            Role::Subscriber => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Publisher => "publisher",
            Role::Subscriber => "subscriber",
        }
    }
}

/// A signed, time-limited permission to join a media-relay channel.
///
/// Ephemeral: minted fresh on every request that needs one, never persisted
/// or cached. Independent credentials may coexist for the same channel.
#[derive(Debug, Clone)]
pub struct JoinCredential {
    pub channel_name: String,
    pub uid: u32,
    pub role: Role,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    /// A required argument was empty or undefined
    #[error("{0} is required to issue a credential")]
    InvalidArgument(&'static str),
}

/// Issues [JoinCredential]s for the external media-relay provider.
///
/// Stateless beyond its configuration; the expiry is computed from the wall
/// clock at call time, so repeated calls with the same arguments produce
/// independently valid credentials.
pub struct TokenIssuer {
    config: ProviderConfig,
}

impl TokenIssuer {
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    /// The provider application id, needed by clients alongside the token.
    pub fn app_id(&self) -> &str {
        &self.config.app_id
    }

    pub fn issue(
        &self,
        channel_name: &str,
        uid: u32,
        role: Role,
    ) -> Result<JoinCredential, CredentialError> {
        if channel_name.is_empty() {
            return Err(CredentialError::InvalidArgument("channel name"));
        }

        if uid == 0 {
            return Err(CredentialError::InvalidArgument("uid"));
        }

        let expires_at = Utc::now() + Duration::hours(CREDENTIAL_TTL_HOURS);

        let payload = format!(
            "{}:{}:{}:{}:{}",
            self.config.app_id,
            channel_name,
            uid,
            role.privilege(),
            expires_at.timestamp()
        );

        let token = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(self.sign(&payload))
        );

        Ok(JoinCredential {
            channel_name: channel_name.to_string(),
            uid,
            role,
            token,
            expires_at,
        })
    }

    fn sign(&self, payload: &str) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(self.config.app_certificate.as_bytes())
            .expect("hmac accepts any key length");

        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn issuer() -> TokenIssuer {
        let config = ProviderConfig::new("test-app".to_string(), "test-secret".to_string())
            .expect("config is valid");

        TokenIssuer::new(config)
    }

    #[test]
    fn test_empty_config_is_rejected() {
        assert!(ProviderConfig::new("".to_string(), "secret".to_string()).is_err());
        assert!(ProviderConfig::new("app".to_string(), "  ".to_string()).is_err());
    }

    #[test]
    fn test_arguments_are_validated() {
        let issuer = issuer();

        assert!(matches!(
            issuer.issue("", 123, Role::Publisher),
            Err(CredentialError::InvalidArgument("channel name"))
        ));

        assert!(matches!(
            issuer.issue("stream_abc", 0, Role::Subscriber),
            Err(CredentialError::InvalidArgument("uid"))
        ));
    }

    #[test]
    fn test_expiry_window_is_a_day() {
        let issuer = issuer();
        let credential = issuer
            .issue("stream_abc", 42, Role::Publisher)
            .expect("credential issues");

        let window = credential.expires_at - Utc::now();

        assert!(window <= Duration::hours(24));
        assert!(window > Duration::hours(23));
    }

    #[test]
    fn test_roles_sign_differently() {
        let issuer = issuer();

        let publisher = issuer
            .issue("stream_abc", 42, Role::Publisher)
            .expect("credential issues");

        let subscriber = issuer
            .issue("stream_abc", 42, Role::Subscriber)
            .expect("credential issues");

        assert_ne!(publisher.token, subscriber.token);
    }

    #[test]
    fn test_token_is_payload_and_signature() {
        let issuer = issuer();
        let credential = issuer
            .issue("stream_abc", 42, Role::Publisher)
            .expect("credential issues");

        let (payload, signature) = credential
            .token
            .split_once('.')
            .expect("token has two parts");

        let decoded = URL_SAFE_NO_PAD.decode(payload).expect("payload decodes");
        let decoded = String::from_utf8(decoded).expect("payload is utf8");

        assert!(decoded.starts_with("test-app:stream_abc:42:1:"));

        let expected = URL_SAFE_NO_PAD.encode(issuer.sign(&decoded));
        assert_eq!(signature, expected);
    }
}
