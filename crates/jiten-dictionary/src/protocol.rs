use kanal::{AsyncReceiver, AsyncSender};

/// One draw target of a media draw batch, as sent to the database worker.
#[derive(Debug, Clone)]
pub struct DrawMediaRequest {
    pub path: String,
    pub dictionary: String,
    pub canvas_index: usize,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub generation: u64,
}

/// A decoded raster image; scaling onto the canvas happens at paint time.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Requests crossing into the database worker. Each draw batch carries its
/// own reply-channel endpoint.
pub enum WorkerRequest {
    DrawMedia {
        requests: Vec<DrawMediaRequest>,
        reply: AsyncSender<DrawReply>,
    },
    /// Splices a renderer-side request channel into the worker.
    Connect { port: AsyncReceiver<WorkerRequest> },
}

/// Replies posted back over a draw batch's reply channel. Pixel buffers are
/// moved, never copied, across the boundary.
pub enum DrawReply {
    DrawBufferToCanvases {
        buffer: Vec<u8>,
        width: u32,
        height: u32,
        canvas_indexes: Vec<usize>,
        generation: u64,
    },
    DrawDecodedImageToCanvases {
        image: DecodedImage,
        canvas_indexes: Vec<usize>,
        generation: u64,
    },
}
