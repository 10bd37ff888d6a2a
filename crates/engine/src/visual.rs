use crate::tween::Formula;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
}

/// Mutable handle onto whatever the renderer shows for an entity. The
/// scheduled `fade`/`scale_in` setters start renderer-side tweens measured in
/// logical frames.
pub trait SpriteHandle {
    fn set_color(&mut self, r: u8, g: u8, b: u8);
    fn set_alpha(&mut self, alpha: u8);
    fn set_mirrored(&mut self, mirrored: bool);
    fn set_blend_mode(&mut self, mode: BlendMode);
    fn set_rescale(&mut self, x: f32, y: f32);
    fn fade(&mut self, duration: u32, alpha: u8, formula: Formula);
    fn scale_in(&mut self, duration: u32, x: f32, y: f32, formula: Formula);
}

/// Per-frame contract of the external animation script runner.
pub trait AnimationPlayback {
    /// Advances the animation one logical frame; `false` means it has
    /// naturally ended.
    fn advance_one_frame(&mut self) -> bool;
    fn interrupt(&mut self, signal_id: u16);
}

/// Instantiates the sprite + playback pair for one animation script index.
pub trait VisualFactory {
    fn instantiate(&mut self, script_index: u16)
        -> (Box<dyn SpriteHandle>, Box<dyn AnimationPlayback>);
}
