use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;

use crate::page::{ElementHandle, PageError, PageHandle};

/// Semantic action types, each with its own delay band. Uniform timing is
/// the easiest automation signature to detect, so every logical step samples
/// from a band instead of sleeping a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Reading,
    Thinking,
    BeforeTyping,
    AfterMove,
    AfterClick,
    Scrolling,
}

/// Delay band in seconds for an action type.
pub fn delay_band(kind: ActionKind) -> (f64, f64) {
    match kind {
        ActionKind::Reading => (2.0, 4.5),
        ActionKind::Thinking => (1.0, 3.0),
        ActionKind::BeforeTyping => (0.5, 1.2),
        ActionKind::AfterMove => (0.1, 0.3),
        ActionKind::AfterClick => (0.5, 1.5),
        ActionKind::Scrolling => (0.3, 0.8),
    }
}

/// Points along a quadratic bezier from `start` to `end` through `control`.
pub fn bezier_path(
    start: (f64, f64),
    control: (f64, f64),
    end: (f64, f64),
    steps: usize,
) -> Vec<(f64, f64)> {
    let mut points = Vec::with_capacity(steps + 1);
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let u = 1.0 - t;
        let x = u * u * start.0 + 2.0 * u * t * control.0 + t * t * end.0;
        let y = u * u * start.1 + 2.0 * u * t * control.1 + t * t * end.1;
        points.push((x, y));
    }
    points
}

/// Synthesizes human-like pointer movement, click pacing and typing cadence.
/// Owns only an RNG; all page state stays with the caller.
pub struct Humanizer {
    rng: Mutex<StdRng>,
    /// Multiplier on every sleep. 1.0 in production, 0.0 in tests.
    time_scale: f64,
}

impl Humanizer {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            time_scale: 1.0,
        }
    }

    /// Deterministic RNG for reproducible paths in tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            time_scale: 1.0,
        }
    }

    /// No sleeping at all; keeps test runtimes flat.
    pub fn instant() -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(0)),
            time_scale: 0.0,
        }
    }

    fn sample(&self, lo: f64, hi: f64) -> f64 {
        let mut rng = self.rng.lock().unwrap();
        rng.gen_range(lo..hi)
    }

    fn sample_usize(&self, lo: usize, hi: usize) -> usize {
        let mut rng = self.rng.lock().unwrap();
        rng.gen_range(lo..=hi)
    }

    fn chance(&self, p: f64) -> bool {
        let mut rng = self.rng.lock().unwrap();
        rng.gen_bool(p)
    }

    fn random_letter(&self) -> char {
        let mut rng = self.rng.lock().unwrap();
        rng.gen_range(b'a'..=b'z') as char
    }

    async fn sleep_secs(&self, secs: f64) {
        let scaled = secs * self.time_scale;
        if scaled > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(scaled)).await;
        }
    }

    /// Pause between logical steps, sampled from the band for the action.
    pub async fn pause(&self, kind: ActionKind) {
        let (lo, hi) = delay_band(kind);
        self.sleep_secs(self.sample(lo, hi)).await;
    }

    /// Move the pointer along a curved path into the element, then click it.
    /// Elements without a bounding box (hidden triggers) are clicked directly.
    pub async fn move_and_click(
        &self,
        page: &dyn PageHandle,
        element: &dyn ElementHandle,
    ) -> Result<(), PageError> {
        let Some(bounds) = element.bounding_box().await? else {
            element.click().await?;
            self.pause(ActionKind::AfterClick).await;
            return Ok(());
        };

        // Land somewhere inside the box, not dead center.
        let (cx, cy) = bounds.center();
        let target = (
            cx + self.sample(-bounds.width / 4.0, bounds.width / 4.0),
            cy + self.sample(-bounds.height / 4.0, bounds.height / 4.0),
        );
        // Approach from a random nearby point through a bowed control point.
        let start = (
            target.0 + self.sample(-200.0, 200.0),
            target.1 + self.sample(-200.0, 200.0),
        );
        let control = (
            (start.0 + target.0) / 2.0 + self.sample(-50.0, 50.0),
            (start.1 + target.1) / 2.0 + self.sample(-50.0, 50.0),
        );

        let steps = self.sample_usize(10, 20);
        for point in bezier_path(start, control, target, steps) {
            page.mouse_move(point.0, point.1).await?;
            self.sleep_secs(self.sample(0.005, 0.015)).await;
        }

        self.pause(ActionKind::AfterMove).await;
        element.click().await?;
        self.pause(ActionKind::AfterClick).await;
        Ok(())
    }

    /// Type character by character with word-boundary slowdowns and a 1%
    /// per-character chance of a corrected typo. The final value is always
    /// exactly `text`.
    pub async fn type_like_human(
        &self,
        element: &dyn ElementHandle,
        text: &str,
    ) -> Result<(), PageError> {
        element.click().await?;
        self.pause(ActionKind::BeforeTyping).await;

        for ch in text.chars() {
            if self.chance(0.01) {
                let wrong = self.random_letter();
                element.type_text(&wrong.to_string()).await?;
                self.sleep_secs(0.1).await;
                element.press_backspace().await?;
                self.sleep_secs(0.15).await;
            }

            element.type_text(&ch.to_string()).await?;

            let delay = if ch == ' ' {
                self.sample(0.12, 0.20)
            } else {
                self.sample(0.04, 0.12)
            };
            self.sleep_secs(delay).await;
        }
        Ok(())
    }
}

impl Default for Humanizer {
    fn default() -> Self {
        Self::new()
    }
}
