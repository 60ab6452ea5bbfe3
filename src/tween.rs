//! Time-based animation service, ticked once per frame by the viewer.

use web_time::Duration;

/// Anything that advances with frame time.
pub trait FrameUpdate {
    fn update(&mut self, dt: Duration);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    QuadraticInOut,
}

impl Easing {
    fn apply(self, t: f32) -> f32 {
        match self {
            Easing::Linear => t,
            Easing::QuadraticInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
        }
    }
}

/// Interpolates a scalar from `from` to `to` and reports every step.
pub struct Tween {
    from: f32,
    to: f32,
    duration: Duration,
    elapsed: Duration,
    easing: Easing,
    on_update: Box<dyn FnMut(f32)>,
}

impl Tween {
    pub fn new(from: f32, to: f32, duration: Duration, on_update: impl FnMut(f32) + 'static) -> Self {
        Self {
            from,
            to,
            duration,
            elapsed: Duration::ZERO,
            easing: Easing::Linear,
            on_update: Box::new(on_update),
        }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    /// Advances and reports the new value. Returns false once finished.
    fn step(&mut self, dt: Duration) -> bool {
        self.elapsed = (self.elapsed + dt).min(self.duration);
        let t = if self.duration.is_zero() {
            1.0
        } else {
            self.elapsed.as_secs_f32() / self.duration.as_secs_f32()
        };
        let value = self.from + (self.to - self.from) * self.easing.apply(t);
        (self.on_update)(value);
        self.elapsed < self.duration
    }
}

#[derive(Default)]
pub struct TweenGroup {
    tweens: Vec<Tween>,
}

impl TweenGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tween: Tween) {
        self.tweens.push(tween);
    }

    pub fn len(&self) -> usize {
        self.tweens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tweens.is_empty()
    }
}

impl FrameUpdate for TweenGroup {
    fn update(&mut self, dt: Duration) {
        self.tweens.retain_mut(|tween| tween.step(dt));
    }
}
