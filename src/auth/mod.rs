pub mod token;
pub mod verify;

use crate::connection::ManageConnection;
use crate::lookup::LookupService;
use crate::storage::StoreConnection;
use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};

pub use token::TokenStore;
pub use verify::{DEFAULT_VERIFY_URL, HttpVerifier, VerificationApi};

/// Why a request failed authentication. `reason()` is the client-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    UnknownNation,
    InvalidAuthCode,
    Unknown,
}

impl AuthRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            AuthRejection::UnknownNation => "UNKNOWN NATION ID",
            AuthRejection::InvalidAuthCode => "INVALID NS AUTH CODE",
            AuthRejection::Unknown => "UNKNOWN REASON",
        }
    }
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Validates a nation's request by auth token, falling back to a
/// verification code checked against the external API.
pub struct AuthService<M: ManageConnection> {
    lookups: Arc<LookupService<M>>,
    tokens: TokenStore,
    verifier: Arc<dyn VerificationApi>,
}

impl<M> AuthService<M>
where
    M: ManageConnection,
    M::Connection: StoreConnection,
{
    pub fn new(
        lookups: Arc<LookupService<M>>,
        tokens: TokenStore,
        verifier: Arc<dyn VerificationApi>,
    ) -> Self {
        Self {
            lookups,
            tokens,
            verifier,
        }
    }

    /// Returns the token the client should keep using on success: the
    /// presented one if it is still valid, otherwise a newly issued one.
    pub async fn validate(
        &self,
        nation: Option<&str>,
        auth_token: Option<&str>,
        auth: Option<&str>,
    ) -> std::result::Result<String, AuthRejection> {
        let Some(nation) = nation.filter(|name| !name.trim().is_empty()) else {
            return Err(AuthRejection::UnknownNation);
        };

        let nation_id = match self.lookups.nation_id(nation).await {
            Ok(Some(id)) => id,
            Ok(None) => return Err(AuthRejection::UnknownNation),
            Err(err) => {
                error!(%nation, error = %err, "unable to validate request");
                return Err(AuthRejection::Unknown);
            }
        };

        if let Some(token) = auth_token {
            if self.tokens.is_valid(nation_id, token).await {
                return Ok(token.to_string());
            }
        }

        let Some(code) = auth else {
            return Err(AuthRejection::InvalidAuthCode);
        };

        match self.verifier.verify(nation, code).await {
            Ok(true) => self.tokens.issue(nation_id).await.map_err(|err| {
                error!(%nation, error = %err, "unable to issue auth token");
                AuthRejection::Unknown
            }),
            Ok(false) => Err(AuthRejection::InvalidAuthCode),
            Err(err) => {
                warn!(%nation, error = %err, "verification request failed");
                Err(AuthRejection::Unknown)
            }
        }
    }
}
