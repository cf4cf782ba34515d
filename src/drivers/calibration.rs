//! Two-point linear calibration from raw voltage to a physical unit.
//!
//! `physical = slope * voltage + intercept`, with slope and intercept derived
//! once when the calibration is built. Applying it is a single affine
//! transform with no allocation.
use serde::{Deserialize, Serialize};
use crate::drivers::DaqError;
/// Unit reported for channels that display raw voltage.
pub const VOLTS: &str = "V";
/// One reference reading: the physical value observed at a given voltage.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub value: f64,
    pub voltage: f64,
}
impl CalibrationPoint {
    pub fn new(value: f64, voltage: f64) -> Self {
        Self { value, voltage }
    }
}
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    point_a: CalibrationPoint,
    point_b: CalibrationPoint,
    unit: String,
    enabled: bool,
    slope: f64,
    intercept: f64,
}
impl Calibration {
    /// Validates the points and derives slope/intercept. The result is enabled.
    pub fn new(
        point_a: CalibrationPoint,
        point_b: CalibrationPoint,
        unit: impl Into<String>,
    ) -> Result<Self, DaqError> {
        let all_finite = [point_a.value, point_a.voltage, point_b.value, point_b.voltage]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(DaqError::InvalidCalibration(
                "calibration points must be finite".into(),
            ));
        }
        let voltage_span = point_b.voltage - point_a.voltage;
        if voltage_span == 0.0 {
            return Err(DaqError::InvalidCalibration(format!(
                "both points are at {} V",
                point_a.voltage
            )));
        }
        let slope = (point_b.value - point_a.value) / voltage_span;
        let intercept = point_a.value - slope * point_a.voltage;
        if !slope.is_finite() || !intercept.is_finite() {
            return Err(DaqError::InvalidCalibration(
                "calibration slope overflows".into(),
            ));
        }
        Ok(Self {
            point_a,
            point_b,
            unit: unit.into(),
            enabled: true,
            slope,
            intercept,
        })
    }
    pub fn point_a(&self) -> CalibrationPoint {
        self.point_a
    }
    pub fn point_b(&self) -> CalibrationPoint {
        self.point_b
    }
    pub fn unit(&self) -> &str {
        &self.unit
    }
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
    pub fn slope(&self) -> f64 {
        self.slope
    }
    pub fn intercept(&self) -> f64 {
        self.intercept
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    /// Human readable form of the transform, e.g. `psi = 25.0000 × V + -25.0000`.
    pub fn equation(&self) -> String {
        format!(
            "{} = {:.4} × V + {:.4}",
            self.unit, self.slope, self.intercept
        )
    }
}
/// Converts a raw reading; absent or disabled calibration passes it through.
#[inline]
pub fn apply(raw_voltage: f64, calibration: Option<&Calibration>) -> f64 {
    match calibration {
        Some(cal) if cal.enabled => cal.slope * raw_voltage + cal.intercept,
        _ => raw_voltage,
    }
}
/// Display unit matching what `apply` returns.
pub fn unit_for(calibration: Option<&Calibration>) -> &str {
    match calibration {
        Some(cal) if cal.enabled => &cal.unit,
        _ => VOLTS,
    }
}
