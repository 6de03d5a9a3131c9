use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION};
use tracing::instrument;

use super::prelude::*;
use crate::card::ExportedFile;
use crate::studio::ExportOutcome;

#[derive(Deserialize)]
pub(crate) struct CardForm {
    csrf_token: String,
    #[serde(default)]
    recipient_name: String,
    #[serde(default)]
    wish: String,
}

/// Saves the form fields.
pub(crate) async fn update_card_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CardForm>,
) -> Result<Redirect, WishcardError> {
    validate_csrf(&session, &form.csrf_token).await?;
    let studio = studio_for(&session, &state).await?;
    studio.update_request(form.recipient_name, form.wish).await;
    Ok(Redirect::to("/"))
}

/// Saves the form fields, then replaces the wish with suggestion `number` (1-based).
pub(crate) async fn choose_suggestion_handler(
    State(state): State<AppState>,
    session: Session,
    Path(number): Path<usize>,
    Form(form): Form<CardForm>,
) -> Result<Redirect, WishcardError> {
    validate_csrf(&session, &form.csrf_token).await?;
    let index = number.checked_sub(1).ok_or(WishcardError::BadRequest)?;
    let studio = studio_for(&session, &state).await?;
    studio.update_request(form.recipient_name, form.wish).await;
    if studio.choose_suggestion(index).await.is_none() {
        debug!("Unknown suggestion {number}");
        return Err(WishcardError::BadRequest);
    }
    Ok(Redirect::to("/"))
}

/// Saves the form fields and starts a new background in the background.
///
/// Answers straight away so the page can show the loading state and poll.
/// A trigger while one is already running sends no request and lands on the
/// same page.
#[instrument(skip_all)]
pub(crate) async fn generate_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CardForm>,
) -> Result<Redirect, WishcardError> {
    validate_csrf(&session, &form.csrf_token).await?;
    let studio = studio_for(&session, &state).await?;
    studio.update_request(form.recipient_name, form.wish).await;
    match studio.begin_generation().await {
        Some(ticket) => {
            // Detached, so it finishes even if the browser goes away.
            tokio::spawn(async move {
                studio.finish_generation(ticket).await;
            });
        }
        None => debug!("Generation already running, ignoring trigger"),
    }
    Ok(Redirect::to("/"))
}

/// Sends the rasterized card, or goes back to the page when there is none.
#[instrument(skip_all)]
pub(crate) async fn download_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, WishcardError> {
    let studio = studio_for(&session, &state).await?;
    match studio.export().await {
        ExportOutcome::Exported(file) => {
            info!("Sending {} ({} bytes)", file.filename, file.bytes.len());
            let disposition = HeaderValue::from_str(&format!(
                "attachment; filename=\"{}\"",
                file.filename
            ))
            .map_err(|err| WishcardError::InternalServerError(err.to_string()))?;
            Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, ExportedFile::MIME_TYPE)
                .header(CONTENT_DISPOSITION, disposition)
                .header(CACHE_CONTROL, "no-store")
                .body(Body::from(file.bytes))
                .map_err(WishcardError::from)
        }
        ExportOutcome::NothingToExport | ExportOutcome::Failed(_) => {
            Ok(Redirect::to("/").into_response())
        }
    }
}
