//! Drag activation constraints.
//!
//! A press only becomes a drag once its modality's constraint is met.
//! Pointers must travel past a minimum distance so clicks stay clicks.
//! Touches must be held for a delay without drifting past a tolerance, so a
//! scroll that happens to start on a card never picks it up.

use crm_core::ActivationConstraints;
use std::time::Duration;

/// Input device that produced a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputModality {
    /// Mouse or pen.
    Pointer,
    Touch,
}

/// State of a press since it began.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureSample {
    pub modality: InputModality,
    /// Horizontal displacement from the press point.
    pub dx: f64,
    /// Vertical displacement from the press point.
    pub dy: f64,
    /// Time since the press.
    pub held: Duration,
}

impl GestureSample {
    pub fn distance(&self) -> f64 {
        self.dx.hypot(self.dy)
    }
}

/// What a press should do given the latest sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Keep waiting for more samples.
    Pending,
    Activate,
    /// The press is something else (a scroll); stop tracking it.
    Abort,
}

/// Condition a press must meet to start a drag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivationConstraint {
    Distance { min: f64 },
    Delay { delay: Duration, tolerance: f64 },
}

impl ActivationConstraint {
    pub fn for_modality(modality: InputModality, config: &ActivationConstraints) -> Self {
        match modality {
            InputModality::Pointer => ActivationConstraint::Distance {
                min: config.pointer_distance,
            },
            InputModality::Touch => ActivationConstraint::Delay {
                delay: config.touch_delay,
                tolerance: config.touch_tolerance,
            },
        }
    }

    pub fn evaluate(&self, sample: &GestureSample) -> Activation {
        let distance = sample.distance();
        match *self {
            ActivationConstraint::Distance { min } if distance > min => Activation::Activate,
            ActivationConstraint::Distance { .. } => Activation::Pending,
            ActivationConstraint::Delay { tolerance, .. } if distance > tolerance => {
                Activation::Abort
            }
            ActivationConstraint::Delay { delay, .. } if sample.held >= delay => {
                Activation::Activate
            }
            ActivationConstraint::Delay { .. } => Activation::Pending,
        }
    }

    pub fn is_satisfied(&self, sample: &GestureSample) -> bool {
        self.evaluate(sample) == Activation::Activate
    }
}

/// Constraints for both modalities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivationPolicy {
    pointer: ActivationConstraint,
    touch: ActivationConstraint,
}

impl ActivationPolicy {
    pub fn new(config: &ActivationConstraints) -> Self {
        Self {
            pointer: ActivationConstraint::for_modality(InputModality::Pointer, config),
            touch: ActivationConstraint::for_modality(InputModality::Touch, config),
        }
    }

    pub fn constraint(&self, modality: InputModality) -> &ActivationConstraint {
        match modality {
            InputModality::Pointer => &self.pointer,
            InputModality::Touch => &self.touch,
        }
    }

    pub fn evaluate(&self, sample: &GestureSample) -> Activation {
        self.constraint(sample.modality).evaluate(sample)
    }
}

impl Default for ActivationPolicy {
    fn default() -> Self {
        Self::new(&ActivationConstraints::default())
    }
}
