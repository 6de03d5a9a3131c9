//! Card data: what the user typed, the generated background and the
//! generation lifecycle.

use base64::Engine;
use base64::engine::general_purpose;

use crate::constants::{DEFAULT_RECIPIENT_NAME, SUGGESTED_WISHES};
use crate::error::GenerationError;

/// The two text fields of the request form.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CardRequest {
    recipient_name: String,
    wish: String,
}

impl Default for CardRequest {
    fn default() -> Self {
        Self {
            recipient_name: DEFAULT_RECIPIENT_NAME.to_string(),
            wish: SUGGESTED_WISHES[0].to_string(),
        }
    }
}

impl CardRequest {
    /// Builds a request from explicit values.
    pub fn new(recipient_name: impl Into<String>, wish: impl Into<String>) -> Self {
        Self {
            recipient_name: recipient_name.into(),
            wish: wish.into(),
        }
    }

    /// Who the card is for. May be blank.
    pub fn recipient_name(&self) -> &str {
        &self.recipient_name
    }

    /// The wish text, line breaks included.
    pub fn wish(&self) -> &str {
        &self.wish
    }

    /// Replaces the recipient name.
    pub fn set_recipient_name(&mut self, recipient_name: impl Into<String>) {
        self.recipient_name = recipient_name.into();
    }

    /// Replaces the wish.
    pub fn set_wish(&mut self, wish: impl Into<String>) {
        self.wish = wish.into();
    }

    /// Overwrites the wish with suggestion `index` (0-based).
    ///
    /// Returns the chosen text, or `None` (leaving the wish alone) when the
    /// index is out of range.
    pub fn choose_suggestion(&mut self, index: usize) -> Option<&'static str> {
        let suggestion = SUGGESTED_WISHES.get(index).copied()?;
        self.wish = suggestion.to_string();
        Some(suggestion)
    }
}

/// An image returned by the generation service, held decoded.
#[derive(Clone, Eq, PartialEq)]
pub struct GeneratedImage {
    mime_type: String,
    bytes: Vec<u8>,
}

impl std::fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl GeneratedImage {
    /// Wraps already-decoded image bytes.
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Decodes the base64 payload the service sends back.
    pub fn from_base64(mime_type: impl Into<String>, encoded: &str) -> Result<Self, GenerationError> {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| GenerationError::InvalidResponse(format!("bad base64 image: {err}")))?;
        if bytes.is_empty() {
            return Err(GenerationError::NoImages);
        }
        Ok(Self::new(mime_type, bytes))
    }

    /// MIME type of the payload, eg `image/jpeg`.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The raw encoded image.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// `data:` URI usable directly as an image source.
    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Where the background generation currently stands.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RenderState {
    /// Nothing requested yet
    #[default]
    Idle,
    /// A request is in flight
    Loading,
    /// The background is available
    Ready(GeneratedImage),
    /// The last request failed
    Failed(GenerationError),
}

impl RenderState {
    /// True while a request is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// The current image, if any.
    pub fn image(&self) -> Option<&GeneratedImage> {
        match self {
            Self::Ready(image) => Some(image),
            _ => None,
        }
    }

    /// The last generation failure, if any.
    pub fn error(&self) -> Option<&GenerationError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// A rasterized card ready to hand to the browser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportedFile {
    /// Filename offered for the download
    pub filename: String,
    /// PNG bytes
    pub bytes: Vec<u8>,
}

impl ExportedFile {
    /// MIME type of every exported card.
    pub const MIME_TYPE: &'static str = "image/png";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_suggestion_sets_its_literal_text() {
        let mut request = CardRequest::new("Mẹ", "something else");
        for (index, expected) in SUGGESTED_WISHES.iter().enumerate() {
            let chosen = request.choose_suggestion(index);
            assert_eq!(chosen, Some(*expected));
            assert_eq!(request.wish(), *expected);
            assert_eq!(request.recipient_name(), "Mẹ");
        }
    }

    #[test]
    fn unknown_suggestion_leaves_wish_alone() {
        let mut request = CardRequest::new("Chị", "giữ nguyên");
        assert_eq!(request.choose_suggestion(SUGGESTED_WISHES.len()), None);
        assert_eq!(request.wish(), "giữ nguyên");
    }

    #[test]
    fn defaults_match_the_first_suggestion() {
        let request = CardRequest::default();
        assert_eq!(request.recipient_name(), DEFAULT_RECIPIENT_NAME);
        assert_eq!(request.wish(), SUGGESTED_WISHES[0]);
    }

    #[test]
    fn blank_and_multiline_text_is_kept_verbatim() {
        let mut request = CardRequest::default();
        request.set_recipient_name("");
        request.set_wish("dòng một\n\ndòng ba <b>");
        assert_eq!(request.recipient_name(), "");
        assert_eq!(request.wish(), "dòng một\n\ndòng ba <b>");
    }

    #[test]
    fn base64_payload_round_trips_into_a_data_uri() {
        let image = GeneratedImage::from_base64("image/jpeg", "/9j/4AAQ").expect("decode");
        assert_eq!(image.bytes(), &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]);
        assert_eq!(image.data_uri(), "data:image/jpeg;base64,/9j/4AAQ");
    }

    #[test]
    fn garbage_payload_is_an_invalid_response() {
        let err = GeneratedImage::from_base64("image/jpeg", "not base64!!").unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse(_)));
        assert_eq!(
            GeneratedImage::from_base64("image/jpeg", "").unwrap_err(),
            GenerationError::NoImages
        );
    }

    #[test]
    fn render_state_accessors() {
        let image = GeneratedImage::new("image/jpeg", vec![1, 2, 3]);
        assert!(RenderState::Loading.is_loading());
        assert_eq!(RenderState::Ready(image.clone()).image(), Some(&image));
        assert_eq!(RenderState::Idle.image(), None);
        assert_eq!(
            RenderState::Failed(GenerationError::NoImages).error(),
            Some(&GenerationError::NoImages)
        );
    }
}
