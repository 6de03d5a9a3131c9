use super::prelude::*;
use crate::card::RenderState;
use crate::constants::{CARD_GREETING, CARD_LABEL, SUGGESTED_WISHES};

#[derive(Clone, Debug)]
pub(crate) struct SuggestionView {
    pub(crate) number: usize,
    pub(crate) text: &'static str,
}

#[derive(Clone, Debug)]
pub(crate) struct CardView {
    pub(crate) image_uri: String,
    pub(crate) greeting: &'static str,
    pub(crate) recipient_name: String,
    pub(crate) wish: String,
    pub(crate) label: &'static str,
}

#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub(crate) struct HomeTemplate {
    pub(crate) csrf_token: String,
    pub(crate) recipient_name: String,
    pub(crate) wish: String,
    pub(crate) suggestions: Vec<SuggestionView>,
    pub(crate) is_loading: bool,
    pub(crate) generation_error: Option<String>,
    pub(crate) export_error: Option<String>,
    pub(crate) card: Option<CardView>,
}

/// handles the / GET
pub(crate) async fn home_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<HomeTemplate, WishcardError> {
    let csrf_token = csrf_token(&session).await?;
    let studio = studio_for(&session, &state).await?;
    let snapshot = studio.snapshot().await;

    let card = match &snapshot.render {
        RenderState::Ready(image) => Some(CardView {
            image_uri: image.data_uri(),
            greeting: CARD_GREETING,
            recipient_name: snapshot.request.recipient_name().to_string(),
            wish: snapshot.request.wish().to_string(),
            label: CARD_LABEL,
        }),
        _ => None,
    };

    Ok(HomeTemplate {
        csrf_token,
        recipient_name: snapshot.request.recipient_name().to_string(),
        wish: snapshot.request.wish().to_string(),
        suggestions: SUGGESTED_WISHES
            .iter()
            .enumerate()
            .map(|(index, text)| SuggestionView {
                number: index + 1,
                text: *text,
            })
            .collect(),
        is_loading: snapshot.render.is_loading(),
        generation_error: snapshot.render.error().map(|err| err.user_message()),
        export_error: snapshot
            .export_error
            .as_ref()
            .map(|err| err.user_message().to_string()),
        card,
    })
}
