use std::cell::RefCell;
use std::rc::Rc;

use crate::formats::{ScriptInstruction, Stage};
use crate::tween::Interpolator;

/// Drives one stage's embedded camera/fog script against the logical frame
/// clock. Renderers sample the three interpolators after each `update`; the
/// stage itself stays shared with whoever else holds the cache cell.
pub struct Background {
    stage: Rc<RefCell<Stage>>,
    pub position_interpolator: Interpolator<3>,
    pub position2_interpolator: Interpolator<3>,
    /// Fog parameters in stream order: blue, green, red, alpha, near, far.
    pub fog_interpolator: Interpolator<6>,
}

impl Background {
    pub fn new(stage: Rc<RefCell<Stage>>) -> Self {
        Self {
            stage,
            position_interpolator: Interpolator::new([0.0; 3]),
            position2_interpolator: Interpolator::new([0.0; 3]),
            fog_interpolator: Interpolator::new([0.0; 6]),
        }
    }

    pub fn stage(&self) -> &Rc<RefCell<Stage>> {
        &self.stage
    }

    /// Applies every script event scheduled for `frame`, in stream order,
    /// then advances all three interpolators. Call exactly once per logical
    /// frame.
    pub fn update(&mut self, frame: u32) {
        let instructions: Vec<ScriptInstruction> = {
            let stage = self.stage.borrow();
            stage
                .script
                .iter()
                .filter(|event| event.frame == frame)
                .map(|event| event.instruction)
                .collect()
        };
        for instruction in &instructions {
            self.apply(frame, instruction);
        }
        self.position_interpolator.update(frame);
        self.fog_interpolator.update(frame);
        self.position2_interpolator.update(frame);
    }

    fn apply(&mut self, frame: u32, instruction: &ScriptInstruction) {
        match *instruction {
            ScriptInstruction::ViewPosition { x, y, z } => {
                self.position_interpolator
                    .set_interpolation_end(frame, [x, y, z]);
            }
            ScriptInstruction::Color {
                r,
                g,
                b,
                a,
                start,
                end,
            } => {
                self.fog_interpolator.set_interpolation_end(
                    frame,
                    [b as f32, g as f32, r as f32, a as f32, start, end],
                );
            }
            ScriptInstruction::ViewPosition2 { x, y, z } => {
                self.position2_interpolator
                    .set_interpolation_end(frame, [x, y, z]);
            }
            ScriptInstruction::BeginInterpolateViewPosition2 { duration } => {
                let current = self.position2_interpolator.values();
                self.position2_interpolator
                    .set_interpolation_start(frame, current);
                self.position2_interpolator
                    .set_interpolation_end_frame(frame + duration);
            }
            ScriptInstruction::BeginInterpolateFog { duration } => {
                let current = self.fog_interpolator.values();
                self.fog_interpolator.set_interpolation_start(frame, current);
                self.fog_interpolator
                    .set_interpolation_end_frame(frame + duration);
            }
            // Carried through undecoded; nothing to evaluate.
            ScriptInstruction::Unknown { .. } => {}
        }
    }
}
