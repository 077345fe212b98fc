//! Frame-time driven quality levels
//!
//! The controller watches how long frames take and lowers the remote vehicle
//! interpolation budget when the client falls behind. It is an ordinary value
//! owned by the game and handed to whoever needs it.

use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityLevel {
    Low,
    Medium,
    High,
}

impl QualityLevel {
    /// Remote vehicles farther than this from the local vehicle are snapped
    /// to their latest snapshot instead of interpolated.
    pub fn visibility_radius(self) -> f32 {
        match self {
            QualityLevel::High => 200.0,
            QualityLevel::Medium => 150.0,
            QualityLevel::Low => 100.0,
        }
    }

    pub fn visual_update_interval(self) -> Duration {
        match self {
            QualityLevel::High => Duration::from_secs_f32(1.0 / 30.0),
            QualityLevel::Medium => Duration::from_secs_f32(1.0 / 20.0),
            QualityLevel::Low => Duration::from_secs_f32(1.0 / 15.0),
        }
    }
}

pub struct QualityController {
    samples: VecDeque<Duration>,
    max_samples: usize,
    min_samples: usize,
    target_frame: Duration,
    // Fractions of the frame budget
    medium_threshold: f32,
    low_threshold: f32,
    level: QualityLevel,
    locked: bool,
}

impl QualityController {
    pub fn new(target_fps: u32) -> Self {
        Self {
            samples: VecDeque::with_capacity(60),
            max_samples: 60,
            min_samples: 10,
            target_frame: Duration::from_secs_f32(1.0 / target_fps.max(1) as f32),
            medium_threshold: 1.1,
            low_threshold: 1.6,
            level: QualityLevel::High,
            locked: false,
        }
    }

    /// Controller pinned to one level regardless of frame times.
    pub fn fixed(level: QualityLevel) -> Self {
        let mut controller = Self::new(60);
        controller.level = level;
        controller.locked = true;
        controller
    }

    pub fn record_frame(&mut self, frame: Duration) {
        self.samples.push_back(frame);
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
        self.update_level();
    }

    fn update_level(&mut self) {
        if self.locked || self.samples.len() < self.min_samples {
            return;
        }

        let ratio = self.average_frame().as_secs_f32() / self.target_frame.as_secs_f32();
        self.level = if ratio < self.medium_threshold {
            QualityLevel::High
        } else if ratio < self.low_threshold {
            QualityLevel::Medium
        } else {
            QualityLevel::Low
        };
    }

    pub fn average_frame(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.samples.iter().sum();
        sum / self.samples.len() as u32
    }

    pub fn level(&self) -> QualityLevel {
        self.level
    }

    pub fn visibility_radius(&self) -> f32 {
        self.level.visibility_radius()
    }

    pub fn visual_update_interval(&self) -> Duration {
        self.level.visual_update_interval()
    }
}

impl Default for QualityController {
    fn default() -> Self {
        Self::new(60)
    }
}
