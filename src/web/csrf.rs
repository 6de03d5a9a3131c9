use rand::RngExt;
use rand::distr::Alphanumeric;
use tower_sessions::Session;

use crate::error::WishcardError;

const CSRF_TOKEN_KEY: &str = "csrf_token";

/// Random alphanumeric token, used for CSRF and studio ids.
pub(crate) fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

pub(crate) async fn csrf_token(session: &Session) -> Result<String, WishcardError> {
    let existing = session
        .get::<String>(CSRF_TOKEN_KEY)
        .await
        .map_err(|err| WishcardError::InternalServerError(err.to_string()))?;
    if let Some(token) = existing {
        return Ok(token);
    }
    let token = generate_token();
    session
        .insert(CSRF_TOKEN_KEY, token.clone())
        .await
        .map_err(|err| WishcardError::InternalServerError(err.to_string()))?;
    Ok(token)
}

pub(crate) async fn validate_csrf(session: &Session, token: &str) -> Result<(), WishcardError> {
    let stored = session
        .get::<String>(CSRF_TOKEN_KEY)
        .await
        .map_err(|err| WishcardError::InternalServerError(err.to_string()))?;
    match stored {
        Some(expected) if !token.is_empty() && expected == token => Ok(()),
        _ => Err(WishcardError::Unauthorized),
    }
}
