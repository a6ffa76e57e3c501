use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kanal::AsyncSender;
use resvg::{tiny_skia, usvg};

use crate::database::DictionaryDatabase;
use crate::error::DictionaryError;
use crate::protocol::{DecodedImage, DrawMediaRequest, DrawReply};
use crate::types::DrawMedia;

pub(crate) const SVG_MEDIA_TYPE: &str = "image/svg+xml";

/// Vector rasterization engine: a font set loaded once per worker.
#[derive(Clone)]
pub(crate) struct Rasterizer {
    fontdb: Arc<usvg::fontdb::Database>,
}

pub(crate) struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Rasterizer {
    pub(crate) async fn load(font_path: Option<&Path>) -> Rasterizer {
        let font_path: Option<PathBuf> = font_path.map(Path::to_path_buf);
        let fontdb = tokio::task::spawn_blocking(move || {
            let mut fonts = usvg::fontdb::Database::new();
            match font_path {
                Some(path) => match std::fs::read(&path) {
                    Ok(bytes) => fonts.load_font_data(bytes),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to load draw font, text in vector media will not render");
                    }
                },
                None => tracing::debug!("no draw font configured"),
            }
            fonts
        })
        .await
        .unwrap_or_else(|_| usvg::fontdb::Database::new());
        Rasterizer {
            fontdb: Arc::new(fontdb),
        }
    }

    /// Rasterizes vector content to a pixel width equal to the requesting
    /// canvas's width, preserving aspect ratio.
    pub(crate) fn rasterize(
        &self,
        data: &[u8],
        target_width: u32,
    ) -> Result<RasterImage, DictionaryError> {
        let options = usvg::Options {
            fontdb: Arc::clone(&self.fontdb),
            ..usvg::Options::default()
        };
        let tree =
            usvg::Tree::from_data(data, &options).map_err(|e| DictionaryError::Svg(e.to_string()))?;
        let size = tree.size();
        let width = target_width.max(1);
        let scale = width as f32 / size.width();
        let height = ((size.height() * scale).ceil() as u32).max(1);
        let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
            DictionaryError::Svg("could not allocate a pixel buffer".to_string())
        })?;
        resvg::render(
            &tree,
            tiny_skia::Transform::from_scale(scale, scale),
            &mut pixmap.as_mut(),
        );
        Ok(RasterImage {
            width,
            height,
            pixels: pixmap.take(),
        })
    }
}

/// A media lookup shared by every draw target wanting the same blob.
#[derive(Debug, Clone)]
pub(crate) struct DrawMediaGroupedRequest {
    pub path: String,
    pub dictionary: String,
    pub canvas_indexes: Vec<usize>,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub generation: u64,
}

/// Collapses draw targets sharing one `(path, dictionary)` identity into a
/// single lookup carrying all requesting canvas indices.
pub(crate) fn group_draw_requests(requests: Vec<DrawMediaRequest>) -> Vec<DrawMediaGroupedRequest> {
    let mut grouped: Vec<DrawMediaGroupedRequest> = Vec::new();
    let mut by_identity: HashMap<(String, String), usize> = HashMap::new();
    for request in requests {
        let identity = (request.path.clone(), request.dictionary.clone());
        match by_identity.get(&identity) {
            Some(&slot) => grouped[slot].canvas_indexes.push(request.canvas_index),
            None => {
                by_identity.insert(identity, grouped.len());
                grouped.push(DrawMediaGroupedRequest {
                    path: request.path,
                    dictionary: request.dictionary,
                    canvas_indexes: vec![request.canvas_index],
                    canvas_width: request.canvas_width,
                    canvas_height: request.canvas_height,
                    generation: request.generation,
                });
            }
        }
    }
    grouped
}

/// Renders one media item into its reply message.
pub(crate) fn render_media(
    rasterizer: &Rasterizer,
    media: DrawMedia,
) -> Result<DrawReply, DictionaryError> {
    if media.media_type == SVG_MEDIA_TYPE {
        let image = rasterizer.rasterize(&media.content, media.canvas_width)?;
        return Ok(DrawReply::DrawBufferToCanvases {
            buffer: image.pixels,
            width: image.width,
            height: image.height,
            canvas_indexes: media.canvas_indexes,
            generation: media.generation,
        });
    }
    match image::ImageFormat::from_mime_type(&media.media_type) {
        // Format-directed decode; the receiver scales onto each canvas.
        Some(format) => {
            let decoded = image::load_from_memory_with_format(&media.content, format)
                .map_err(|e| DictionaryError::Decode(e.to_string()))?;
            let (width, height) = (decoded.width(), decoded.height());
            Ok(DrawReply::DrawDecodedImageToCanvases {
                image: DecodedImage {
                    width,
                    height,
                    pixels: decoded.into_rgba8().into_raw(),
                },
                canvas_indexes: media.canvas_indexes,
                generation: media.generation,
            })
        }
        // Unrecognized media type: guess the container and resize into a
        // temporary surface sized to the canvas.
        None => {
            let decoded = image::load_from_memory(&media.content)
                .map_err(|e| DictionaryError::Decode(e.to_string()))?;
            let width = media.canvas_width.max(1);
            let height = media.canvas_height.max(1);
            let resized =
                decoded.resize_exact(width, height, image::imageops::FilterType::Lanczos3);
            Ok(DrawReply::DrawBufferToCanvases {
                buffer: resized.into_rgba8().into_raw(),
                width,
                height,
                canvas_indexes: media.canvas_indexes,
                generation: media.generation,
            })
        }
    }
}

/// Worker-side draw pipeline: group, fetch once per identity, rasterize
/// vector entries first, post each result back over the reply channel.
pub(crate) async fn perform(
    db: &DictionaryDatabase,
    rasterizer: &Rasterizer,
    requests: Vec<DrawMediaRequest>,
    reply: AsyncSender<DrawReply>,
) -> Result<(), DictionaryError> {
    let grouped = group_draw_requests(requests);
    let mut media_items = db.find_draw_media(&grouped).await?;

    // Vector rasterization is the slow path; schedule it first so it
    // overlaps with the raster decodes.
    media_items.sort_by_key(|media| media.media_type != SVG_MEDIA_TYPE);

    for media in media_items {
        let path = media.path.clone();
        let rasterizer = rasterizer.clone();
        let rendered = tokio::task::spawn_blocking(move || render_media(&rasterizer, media)).await?;
        match rendered {
            Ok(message) => {
                if reply.send(message).await.is_err() {
                    tracing::debug!("draw reply channel closed, dropping remaining work");
                    return Ok(());
                }
            }
            // One bad blob never aborts the rest of the batch.
            Err(e) => tracing::warn!(path = %path, error = %e, "failed to render media"),
        }
    }
    Ok(())
}
