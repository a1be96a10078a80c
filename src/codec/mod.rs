//! Codec collaborator contracts
//!
//! Concrete decoders and encoders (hardware or software) live outside this
//! crate. The transcoders only drive them through these traits: bounded
//! timeout dequeues, frame hand-off and format negotiation.

use crate::error::Result;
use crate::types::{Dequeued, Frame, MediaFormat, Surface};

/// Decoder of one compressed track
pub trait Decoder: Send {
    /// Configure for the given source format, optionally rendering into `surface`.
    fn init(&mut self, format: &MediaFormat, surface: Option<Surface>) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;

    /// Wait up to `timeout_us` for a free input slot.
    fn dequeue_input_frame(&mut self, timeout_us: i64) -> Dequeued;

    /// Borrow the input slot with `tag` for filling.
    fn input_frame(&mut self, tag: usize) -> Option<Frame>;

    /// Return a filled input slot.
    fn queue_input_frame(&mut self, frame: Frame);

    /// Wait up to `timeout_us` for decoded output.
    fn dequeue_output_frame(&mut self, timeout_us: i64) -> Dequeued;

    fn output_frame(&mut self, tag: usize) -> Option<Frame>;

    /// Give a decoded frame back, rendering it to the output surface if `render`.
    fn release_output_frame(&mut self, frame: Frame, render: bool);

    fn output_format(&self) -> Option<MediaFormat>;

    fn stop(&mut self);

    fn release(&mut self);

    fn name(&self) -> Result<String>;
}

/// Encoder of one output track
pub trait Encoder: Send {
    fn init(&mut self, target_format: &MediaFormat) -> Result<()>;

    /// Surface the encoder reads its input from, for surface-based renderers.
    fn create_input_surface(&mut self) -> Option<Surface> {
        None
    }

    fn start(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;

    /// Mark the end of surface input.
    fn signal_end_of_input_stream(&mut self);

    fn dequeue_input_frame(&mut self, timeout_us: i64) -> Dequeued;

    fn input_frame(&mut self, tag: usize) -> Option<Frame>;

    fn queue_input_frame(&mut self, frame: Frame);

    fn dequeue_output_frame(&mut self, timeout_us: i64) -> Dequeued;

    fn output_frame(&mut self, tag: usize) -> Option<Frame>;

    fn release_output_frame(&mut self, frame: Frame);

    fn output_format(&self) -> Option<MediaFormat>;

    fn stop(&mut self);

    fn release(&mut self);

    fn name(&self) -> Result<String>;
}
