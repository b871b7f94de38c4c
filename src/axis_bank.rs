/// Axis state store for the controller simulator
///
/// This module provides thread-safe storage for the state a GCS2 controller
/// keeps per axis: commanded target, reported position, servo state,
/// open-loop voltage, and reference status, plus the controller-wide
/// latched error code that `ERR?` reads and clears.
///
/// Axis entries are created on first access with zeroed defaults, matching
/// a freshly powered controller. Motion is modeled with a settle time: a
/// move records when the axis will report on-target, so a simulator-side
/// `WAC ONT?` genuinely blocks for a configurable duration.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::error::{GcsError, GcsResult};

/// Controller error code latched when a command addresses an axis that has
/// not been referenced (or has servo off) for a closed-loop move
const ERR_MOVE_WITHOUT_REF: i32 = 5;

/// Per-axis state
#[derive(Debug, Clone)]
struct AxisState {
    /// Position at the start of the motion in flight
    origin: f64,
    /// Commanded target position
    target: f64,
    /// Servo (closed-loop) state
    servo: bool,
    /// Commanded open-loop voltage
    voltage: f64,
    /// Whether the axis has been referenced
    referenced: bool,
    /// When the motion in flight settles, if any
    settles_at: Option<Instant>,
}

impl Default for AxisState {
    fn default() -> Self {
        Self {
            origin: 0.0,
            target: 0.0,
            servo: false,
            voltage: 0.0,
            referenced: false,
            settles_at: None,
        }
    }
}

impl AxisState {
    fn settled(&self) -> bool {
        match self.settles_at {
            Some(at) => Instant::now() >= at,
            None => true,
        }
    }

    fn position(&self) -> f64 {
        if self.settled() {
            self.target
        } else {
            self.origin
        }
    }
}

/// Thread-safe axis state store shared between simulator connections
#[derive(Debug, Clone)]
pub struct AxisBank {
    axes: Arc<RwLock<HashMap<String, AxisState>>>,
    last_error: Arc<RwLock<i32>>,
    settle_time: Duration,
}

impl AxisBank {
    /// Create a bank whose motions settle instantly
    pub fn new() -> Self {
        Self::with_settle_time(Duration::ZERO)
    }

    /// Create a bank whose motions take `settle_time` to report on-target
    pub fn with_settle_time(settle_time: Duration) -> Self {
        Self {
            axes: Arc::new(RwLock::new(HashMap::new())),
            last_error: Arc::new(RwLock::new(0)),
            settle_time,
        }
    }

    fn with_axis<T>(&self, axis: &str, f: impl FnOnce(&mut AxisState) -> T) -> GcsResult<T> {
        let mut axes = self
            .axes
            .write()
            .map_err(|_| GcsError::internal("failed to lock axis store"))?;
        Ok(f(axes.entry(axis.to_string()).or_default()))
    }

    /// Command an absolute closed-loop move
    ///
    /// Latches an error code and moves nothing if the axis is not ready
    /// (servo off or unreferenced), mirroring the silent-failure write
    /// semantics of the wire protocol.
    pub fn move_absolute(&self, axis: &str, target: f64) -> GcsResult<()> {
        let settle_time = self.settle_time;
        let ready = self.with_axis(axis, |state| {
            if !state.servo || !state.referenced {
                return false;
            }
            state.origin = state.position();
            state.target = target;
            state.settles_at = Some(Instant::now() + settle_time);
            true
        })?;
        if !ready {
            self.set_error(ERR_MOVE_WITHOUT_REF)?;
        }
        Ok(())
    }

    /// Command a relative closed-loop move
    pub fn move_relative(&self, axis: &str, delta: f64) -> GcsResult<()> {
        let target = self.with_axis(axis, |state| state.target + delta)?;
        self.move_absolute(axis, target)
    }

    /// Current reported position of an axis
    pub fn position(&self, axis: &str) -> GcsResult<f64> {
        self.with_axis(axis, |state| state.position())
    }

    /// Set the servo (closed-loop) state of an axis
    pub fn set_servo(&self, axis: &str, enabled: bool) -> GcsResult<()> {
        self.with_axis(axis, |state| state.servo = enabled)
    }

    /// Servo state of an axis
    pub fn servo(&self, axis: &str) -> GcsResult<bool> {
        self.with_axis(axis, |state| state.servo)
    }

    /// Reference an axis: drives it to the reference position (zero)
    pub fn find_reference(&self, axis: &str) -> GcsResult<()> {
        let settle_time = self.settle_time;
        self.with_axis(axis, |state| {
            state.origin = state.position();
            state.target = 0.0;
            state.referenced = true;
            state.settles_at = Some(Instant::now() + settle_time);
        })
    }

    /// Whether an axis has been referenced
    pub fn referenced(&self, axis: &str) -> GcsResult<bool> {
        self.with_axis(axis, |state| state.referenced)
    }

    /// Command an open-loop voltage on an axis
    pub fn set_voltage(&self, axis: &str, volts: f64) -> GcsResult<()> {
        self.with_axis(axis, |state| state.voltage = volts)
    }

    /// Commanded open-loop voltage of an axis
    pub fn voltage(&self, axis: &str) -> GcsResult<f64> {
        self.with_axis(axis, |state| state.voltage)
    }

    /// Whether the axis has settled on its commanded target
    pub fn on_target(&self, axis: &str) -> GcsResult<bool> {
        self.with_axis(axis, |state| state.settled())
    }

    /// Latch a controller error code
    pub fn set_error(&self, code: i32) -> GcsResult<()> {
        let mut last = self
            .last_error
            .write()
            .map_err(|_| GcsError::internal("failed to lock error latch"))?;
        *last = code;
        Ok(())
    }

    /// Read and clear the latched error code
    pub fn take_error(&self) -> GcsResult<i32> {
        let mut last = self
            .last_error
            .write()
            .map_err(|_| GcsError::internal("failed to lock error latch"))?;
        let code = *last;
        *last = 0;
        Ok(code)
    }

    /// Get axis bank statistics
    pub fn stats(&self) -> AxisBankStats {
        let (axes_count, moving_count) = self
            .axes
            .read()
            .map(|axes| {
                let moving = axes.values().filter(|state| !state.settled()).count();
                (axes.len(), moving)
            })
            .unwrap_or((0, 0));
        AxisBankStats {
            axes_count,
            moving_count,
        }
    }
}

impl Default for AxisBank {
    fn default() -> Self {
        Self::new()
    }
}

/// Axis bank statistics
#[derive(Debug, Clone)]
pub struct AxisBankStats {
    pub axes_count: usize,
    pub moving_count: usize,
}
