//! scenarios.rs — injectable fault scenarios for the fix-feed simulator
//!
//! Each scenario exercises one recovery path in the backend's stream
//! controller. All of them are recoverable except DeniedAtStart, which is
//! the point of that scenario.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioType {
    /// Go silent periodically — the backend watchdog must force a restart
    Dropout,
    /// Report position-unavailable faults instead of fixes (backoff path)
    NoFix,
    /// Report permission-denied on the first epoch (terminal, no auto-retry)
    DeniedAtStart,
    /// Multiply the reported accuracy radius (bad sky view)
    LowAccuracy,
    /// Omit speed and heading from every fix (optional-field fallback path)
    NoMotionData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub active: Vec<ScenarioType>,
    /// Dropout window repeats every this many epochs...
    pub dropout_period_epochs: u32,
    /// ...and silences the first this many of them. Longer than the 15 s
    /// stall threshold at 1 Hz so the watchdog actually fires.
    pub dropout_duration_epochs: u32,
    pub no_fix_period_epochs: u32,
    pub no_fix_duration_epochs: u32,
    pub accuracy_multiplier: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            active: vec![],
            dropout_period_epochs: 90,
            dropout_duration_epochs: 25,
            no_fix_period_epochs: 60,
            no_fix_duration_epochs: 20,
            accuracy_multiplier: 6.0,
        }
    }
}

impl ScenarioConfig {
    pub fn has(&self, s: &ScenarioType) -> bool {
        self.active.contains(s)
    }

    pub fn is_dropped(&self, epoch: u32) -> bool {
        self.has(&ScenarioType::Dropout)
            && epoch % self.dropout_period_epochs < self.dropout_duration_epochs
    }

    pub fn is_no_fix(&self, epoch: u32) -> bool {
        self.has(&ScenarioType::NoFix)
            && epoch % self.no_fix_period_epochs < self.no_fix_duration_epochs
    }

    pub fn denies_at(&self, epoch: u32) -> bool {
        self.has(&ScenarioType::DeniedAtStart) && epoch == 0
    }

    pub fn accuracy_factor(&self) -> f64 {
        if self.has(&ScenarioType::LowAccuracy) {
            self.accuracy_multiplier
        } else {
            1.0
        }
    }

    pub fn include_motion(&self) -> bool {
        !self.has(&ScenarioType::NoMotionData)
    }
}

/// Predefined presets selectable from the CLI
pub fn preset(name: &str) -> Option<ScenarioConfig> {
    let sc = match name {
        "dropout" => ScenarioConfig {
            active: vec![ScenarioType::Dropout],
            ..Default::default()
        },
        "no-fix" => ScenarioConfig {
            active: vec![ScenarioType::NoFix],
            ..Default::default()
        },
        "denied" => ScenarioConfig {
            active: vec![ScenarioType::DeniedAtStart],
            ..Default::default()
        },
        "low-accuracy" => ScenarioConfig {
            active: vec![ScenarioType::LowAccuracy],
            ..Default::default()
        },
        "no-motion" => ScenarioConfig {
            active: vec![ScenarioType::NoMotionData],
            ..Default::default()
        },
        "default" => ScenarioConfig::default(),
        _ => return None,
    };
    Some(sc)
}
