use std::fmt;

use crate::codec::{Decoder, Encoder};
use crate::io::{SharedMediaSource, SharedMediaTarget};
use crate::render::Renderer;
use crate::types::MediaFormat;

/// Wiring of one source track to one target track.
///
/// A transform without a target format is copied through untouched.
pub struct TrackTransform {
    pub source: SharedMediaSource,
    pub source_track: usize,
    pub target: SharedMediaTarget,
    pub target_track: usize,
    pub decoder: Option<Box<dyn Decoder>>,
    pub encoder: Option<Box<dyn Encoder>>,
    pub renderer: Option<Box<dyn Renderer>>,
    pub target_format: Option<MediaFormat>,
}

impl TrackTransform {
    pub fn builder(
        source: SharedMediaSource,
        source_track: usize,
        target: SharedMediaTarget,
    ) -> TrackTransformBuilder {
        TrackTransformBuilder {
            source,
            source_track,
            target,
            target_track: None,
            decoder: None,
            encoder: None,
            renderer: None,
            target_format: None,
        }
    }
}

impl fmt::Debug for TrackTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackTransform")
            .field("source_track", &self.source_track)
            .field("target_track", &self.target_track)
            .field("decoder", &self.decoder.is_some())
            .field("encoder", &self.encoder.is_some())
            .field("renderer", &self.renderer.is_some())
            .field("target_format", &self.target_format)
            .finish()
    }
}

pub struct TrackTransformBuilder {
    source: SharedMediaSource,
    source_track: usize,
    target: SharedMediaTarget,
    target_track: Option<usize>,
    decoder: Option<Box<dyn Decoder>>,
    encoder: Option<Box<dyn Encoder>>,
    renderer: Option<Box<dyn Renderer>>,
    target_format: Option<MediaFormat>,
}

impl TrackTransformBuilder {
    /// Defaults to the source track index.
    pub fn target_track(mut self, track: usize) -> Self {
        self.target_track = Some(track);
        self
    }

    pub fn decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Some(Box::new(decoder));
        self
    }

    pub fn encoder(mut self, encoder: impl Encoder + 'static) -> Self {
        self.encoder = Some(Box::new(encoder));
        self
    }

    pub fn renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    pub fn target_format(mut self, format: MediaFormat) -> Self {
        self.target_format = Some(format);
        self
    }

    pub fn build(self) -> TrackTransform {
        TrackTransform {
            target_track: self.target_track.unwrap_or(self.source_track),
            source: self.source,
            source_track: self.source_track,
            target: self.target,
            decoder: self.decoder,
            encoder: self.encoder,
            renderer: self.renderer,
            target_format: self.target_format,
        }
    }
}
