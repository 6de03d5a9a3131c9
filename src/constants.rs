//! Shared constants for the card generator
//!

/// Wishes offered as quick-fill options, in display order.
pub const SUGGESTED_WISHES: [&str; 4] = [
    "Chúc bạn một ngày 20/10 thật nhiều niềm vui, hạnh phúc và luôn xinh đẹp. Mãi yêu!",
    "Nhân ngày Phụ nữ Việt Nam, chúc bạn luôn là bông hoa xinh đẹp nhất trong vườn hoa ngát hương. Luôn tỏa sáng nhé!",
    "Gửi đến bạn những lời chúc tốt đẹp nhất. Chúc bạn có một ngày 20/10 thật ý nghĩa, trọn vẹn và đong đầy yêu thương.",
    "Happy Vietnamese Women's Day! Chúc bạn luôn mạnh khỏe, thành công và giữ mãi nụ cười trên môi.",
];

/// Recipient name a fresh session starts with.
pub const DEFAULT_RECIPIENT_NAME: &str = "Người Phụ Nữ Tuyệt Vời";

/// Line printed above the recipient name.
pub const CARD_GREETING: &str = "Thân tặng,";

/// Label printed at the bottom of every card.
pub const CARD_LABEL: &str = "20/10";

/// Filename offered to the browser when downloading a card.
pub const DOWNLOAD_FILENAME: &str = "thiep-chuc-mung-20-10.png";

/// Pixel density used when exporting a card.
pub const EXPORT_PIXEL_RATIO: u32 = 2;

/// Prompt sent to the image service. Never derived from user input.
pub const CARD_PROMPT: &str = "A beautiful and elegant greeting card for Vietnamese Women's Day (October 20th).
Style: delicate watercolor painting.
Subject: A graceful arrangement of pink lotus flowers and white apricot blossoms (hoa mai trắng).
Background: Soft, pastel colors with a hint of morning light.
Feeling: Celebratory, gentle, and full of respect.
No text on the image. High resolution, artistic, and sophisticated.";

/// Default Imagen model.
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";

/// Default base URL of the Generative Language API.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Aspect ratio requested from the image service.
pub const IMAGE_ASPECT_RATIO: &str = "3:4";

/// Encoding requested from the image service.
pub const IMAGE_MIME_TYPE: &str = "image/jpeg";

/// Environment variable carrying the image service credential.
pub const API_KEY_ENV: &str = "API_KEY";

/// Minutes of inactivity before a session (and its card) is dropped.
pub const SESSION_IDLE_MINUTES: i64 = 60;

/// Fonts tried, in order, when no font path is configured.
pub const FALLBACK_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[cfg(test)]
/// Credential used in tests
pub const TEST_API_KEY: &str = "test-api-key";
