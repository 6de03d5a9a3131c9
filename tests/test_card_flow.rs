use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use wishcard::card::{GeneratedImage, RenderState};
use wishcard::config::setup_logging;
use wishcard::constants::{CARD_GREETING, CARD_LABEL, CARD_PROMPT, DOWNLOAD_FILENAME};
use wishcard::error::{ExportError, GenerationError};
use wishcard::generator::ImageGenerator;
use wishcard::raster::{CardComposition, CardRasterizer, FontRasterizer, FontSet, discover_body_font};
use wishcard::studio::{CardStudio, ExportOutcome, GenerationOutcome};

fn small_jpeg() -> Vec<u8> {
    let image = RgbImage::from_pixel(30, 40, Rgb([200, 90, 120]));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Jpeg)
        .expect("encode jpeg");
    bytes.into_inner()
}

struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageGenerator for RecordingGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError> {
        self.prompts.lock().expect("prompts").push(prompt.to_string());
        Ok(GeneratedImage::new("image/jpeg", small_jpeg()))
    }
}

#[derive(Default)]
struct RecordingRasterizer {
    seen: Mutex<Vec<(CardComposition, u32)>>,
}

#[async_trait]
impl CardRasterizer for RecordingRasterizer {
    async fn rasterize(
        &self,
        card: &CardComposition,
        pixel_ratio: u32,
    ) -> Result<Vec<u8>, ExportError> {
        self.seen
            .lock()
            .expect("seen")
            .push((card.clone(), pixel_ratio));
        Ok(b"\x89PNG".to_vec())
    }
}

#[tokio::test]
async fn test_card_for_mum_is_generated_and_exported() {
    let _ = setup_logging(true);

    let generator = Arc::new(RecordingGenerator {
        prompts: Mutex::new(Vec::new()),
    });
    let rasterizer = Arc::new(RecordingRasterizer::default());
    let studio = CardStudio::new(generator.clone(), rasterizer.clone());

    studio.set_recipient_name("Mẹ").await;
    studio.set_wish("Chúc mẹ luôn vui vẻ").await;

    assert!(matches!(studio.generate().await, GenerationOutcome::Ready));
    assert_eq!(
        generator.prompts.lock().expect("prompts").as_slice(),
        [CARD_PROMPT.to_string()]
    );
    let snapshot = studio.snapshot().await;
    assert!(matches!(snapshot.render, RenderState::Ready(_)));

    let ExportOutcome::Exported(file) = studio.export().await else {
        panic!("export should succeed once a background exists");
    };
    assert_eq!(file.filename, DOWNLOAD_FILENAME);
    assert_eq!(file.bytes, b"\x89PNG");

    let seen = rasterizer.seen.lock().expect("seen");
    let (card, ratio) = &seen[0];
    assert_eq!(*ratio, 2);
    assert_eq!(card.greeting, CARD_GREETING);
    assert_eq!(card.recipient_name, "Mẹ");
    assert_eq!(card.wish, "Chúc mẹ luôn vui vẻ");
    assert_eq!(card.label, CARD_LABEL);
}

#[tokio::test]
async fn test_exported_png_is_twice_the_preview_size() {
    let _ = setup_logging(true);

    let Some(font_path) = discover_body_font() else {
        eprintln!("No system font found, skipping");
        return;
    };
    let fonts = FontSet::load(&font_path, None).expect("load font");
    let generator = Arc::new(RecordingGenerator {
        prompts: Mutex::new(Vec::new()),
    });
    let studio = CardStudio::new(generator, Arc::new(FontRasterizer::new(Some(fonts))));

    studio
        .update_request("Chị Lan", "Chúc chị luôn xinh đẹp\nvà hạnh phúc")
        .await;
    assert!(matches!(studio.generate().await, GenerationOutcome::Ready));

    let ExportOutcome::Exported(file) = studio.export().await else {
        panic!("export should succeed with a font available");
    };
    let png = image::load_from_memory_with_format(&file.bytes, ImageFormat::Png)
        .expect("decode exported png");
    assert_eq!((png.width(), png.height()), (720, 960));
}
