//! Frame renderers
//!
//! A renderer sits between a track's decoder and encoder. Surface renderers
//! (GPU filters for video) draw decoded frames into the encoder's input
//! surface; buffer renderers (audio) copy, transform and queue PCM into the
//! encoder's input slots.

mod audio;
mod frame_dropper;

use crate::codec::Encoder;
use crate::error::Result;
use crate::types::{Frame, MediaFormat, Surface};

pub use audio::AudioRenderer;
pub use frame_dropper::{DefaultFrameDropper, FrameDropper};

pub trait Renderer: Send {
    /// Prepare for rendering into `output_surface` (the encoder's input surface, if any).
    fn init(
        &mut self,
        output_surface: Option<Surface>,
        source_format: Option<&MediaFormat>,
        target_format: Option<&MediaFormat>,
    ) -> Result<()>;

    fn on_media_format_changed(
        &mut self,
        source_format: Option<&MediaFormat>,
        target_format: Option<&MediaFormat>,
    );

    /// Surface the decoder should render into; `None` for buffer renderers.
    fn input_surface(&self) -> Option<Surface>;

    /// Render one decoded frame at `presentation_time_ns`.
    ///
    /// `input` is `None` for surface renderers, whose frame already sits on
    /// the input surface. Buffer renderers queue their output into `encoder`.
    fn render_frame(
        &mut self,
        input: Option<&Frame>,
        presentation_time_ns: i64,
        encoder: &mut dyn Encoder,
    ) -> Result<()>;

    /// Retry handing over output that earlier `render_frame` calls could not
    /// fit into the encoder. Returns `true` once nothing is held back.
    fn drain_pending(&mut self, _encoder: &mut dyn Encoder) -> Result<bool> {
        Ok(true)
    }

    fn release(&mut self);

    fn has_filters(&self) -> bool {
        false
    }
}
