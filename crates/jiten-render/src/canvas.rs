use std::sync::Arc;

use jiten_dictionary::DecodedImage;
use parking_lot::Mutex;

/// A caller-owned RGBA drawing surface.
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

pub type CanvasHandle = Arc<Mutex<Canvas>>;

impl Canvas {
    pub fn new(width: u32, height: u32) -> Canvas {
        Canvas {
            width,
            height,
            pixels: vec![0; (width as usize) * (height as usize) * 4],
        }
    }

    pub fn shared(width: u32, height: u32) -> CanvasHandle {
        Arc::new(Mutex::new(Canvas::new(width, height)))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Writes a raw pixel buffer at the origin, clipped to the canvas.
    pub fn put_image_data(&mut self, buffer: &[u8], width: u32, height: u32) {
        if buffer.len() < (width as usize) * (height as usize) * 4 {
            tracing::warn!("pixel buffer is smaller than its declared dimensions, dropping");
            return;
        }
        let copy_width = width.min(self.width) as usize;
        let copy_height = height.min(self.height) as usize;
        for row in 0..copy_height {
            let src = row * (width as usize) * 4;
            let dst = row * (self.width as usize) * 4;
            self.pixels[dst..dst + copy_width * 4]
                .copy_from_slice(&buffer[src..src + copy_width * 4]);
        }
    }

    /// Scales a decoded image onto the whole canvas.
    pub fn draw_image(&mut self, image: &DecodedImage) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let Some(source) =
            image::RgbaImage::from_raw(image.width, image.height, image.pixels.clone())
        else {
            tracing::warn!("decoded image does not match its declared dimensions, dropping");
            return;
        };
        let resized = image::imageops::resize(
            &source,
            self.width,
            self.height,
            image::imageops::FilterType::Triangle,
        );
        self.pixels.copy_from_slice(resized.as_raw());
    }
}
