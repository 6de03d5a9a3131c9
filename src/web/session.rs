//! Maps a browser session to its card studio.

use std::sync::Arc;

use tower_sessions::Session;
use tracing::debug;

use super::AppState;
use super::csrf::generate_token;
use crate::error::WishcardError;
use crate::studio::CardStudio;

const STUDIO_TOKEN_KEY: &str = "studio_token";

/// Returns this session's studio, creating both token and studio on first use.
pub(crate) async fn studio_for(
    session: &Session,
    state: &AppState,
) -> Result<Arc<CardStudio>, WishcardError> {
    let existing = session
        .get::<String>(STUDIO_TOKEN_KEY)
        .await
        .map_err(|err| WishcardError::InternalServerError(err.to_string()))?;
    let token = match existing {
        Some(token) => token,
        None => {
            let token = generate_token();
            session
                .insert(STUDIO_TOKEN_KEY, token.clone())
                .await
                .map_err(|err| WishcardError::InternalServerError(err.to_string()))?;
            debug!("Started a new card studio");
            token
        }
    };
    Ok(state.studios.studio(&token).await)
}
