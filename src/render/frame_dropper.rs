//! Frame rate reduction for video tracks

/// Decides per decoded frame whether it should be rendered
pub trait FrameDropper: Send {
    fn should_render(&mut self) -> bool;
}

/// Drops frames evenly to go from `input_fps` down to `output_fps`.
///
/// The first frame is always rendered.
#[derive(Debug, Clone)]
pub struct DefaultFrameDropper {
    input_spf: f64,
    output_spf: f64,
    current_spf: f64,
    frame_count: u64,
}

impl DefaultFrameDropper {
    pub fn new(input_fps: u32, output_fps: u32) -> Self {
        Self {
            input_spf: 1.0 / input_fps.max(1) as f64,
            output_spf: 1.0 / output_fps.max(1) as f64,
            current_spf: 0.0,
            frame_count: 0,
        }
    }
}

impl FrameDropper for DefaultFrameDropper {
    fn should_render(&mut self) -> bool {
        self.current_spf += self.input_spf;
        let first = self.frame_count == 0;
        self.frame_count += 1;

        if first {
            true
        } else if self.current_spf > self.output_spf {
            self.current_spf -= self.output_spf;
            true
        } else {
            false
        }
    }
}
