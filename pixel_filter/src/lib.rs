//! Pixel Filter
//!
//! Batch per-pixel color filtering for JPEG/PNG/BMP files:
//! - BGRA pixel buffer with explicit row stride
//! - Grayscale, Sepia, Warm, Cold and Blur transforms
//! - Codec adapter (decode any supported container, encode PNG)
//! - Parallel batch coordinator with cooperative cancellation
//! - Event stream for front ends (log lines, progress, per-item results)
//! - Logging setup and end-of-run reporting

pub mod batch;
pub mod cancel;
pub mod codec;
pub mod events;
pub mod filter;
pub mod input;
pub mod logging;
pub mod pixel_buffer;
pub mod report;
pub mod thread_manager;

pub use batch::{
    BatchConfig, BatchCoordinator, BatchHandle, BatchStatus, BatchSummary, ItemError, ItemResult,
    Outcome, StartError, WorkItem,
};
pub use cancel::{CancelSignal, Cancelled};
pub use codec::{decode, encode, is_supported_extension, DecodeError, EncodeError};
pub use events::{BatchEvent, BatchListener, ChannelListener, FnListener, LogTag, ProcessedImage};
pub use filter::{apply, transform_pixel, FilterKind, UnknownFilter, BLUR_ATTENUATION};
pub use input::{collect_images, partition_inputs, resolve_inputs};
pub use pixel_buffer::{BufferError, PixelBuffer};
pub use report::print_summary_report;
