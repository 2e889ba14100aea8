//! Stanford Research Systems SR570 current preamplifier on an RS-232 line.
//!
//! The amplifier's `gain` is in volts per amp and its `offset` in volts at
//! the output. The instrument only offers sensitivities and input offset
//! currents of 1, 2 or 5 times a power of ten, so requested values are
//! rounded to the nearest step and the rounded value is what the class
//! block reports back.
//!
//! | Setting           | Range                     | Command       |
//! |-------------------|---------------------------|---------------|
//! | gain              | 1e3 to 1e12 V/A           | `SENS 0..27`  |
//! | offset current    | 1 pA to 5 mA              | `IOLV 0..29`  |
//! | bias voltage      | -5 V to +5 V, 1 mV steps  | `BSLV`/`BSON` |
//! | filter type       | 0 to 5                    | `FLTT`        |
//! | lowpass 3 dB      | 0.03 Hz to 1 MHz, 1-3 steps | `LFRQ 0..15` |
//! | highpass 3 dB     | 0.03 Hz to 10 kHz, 1-3 steps | `HFRQ 0..11` |
//!
//! The instrument-specific settings are sent when the record is opened.
//! Time constants are not supported; use the filter settings instead.

use mx_core::class::amplifier::{AmplifierOps, AmplifierState};
use mx_core::class::rs232;
use mx_core::{
    ClassState, DriverContext, DriverDescriptor, ErrorKind, FieldBlock, FieldDescriptor,
    FieldFlags, FieldKind, MxError, RecordClass, RecordDriver, RecordId, RecordRef,
    RefRequirement, Result, Superclass,
};
use tracing::debug;

/// Gain applied at open when none is configured.
pub const SR570_DEFAULT_GAIN: f64 = 1.0e6;

const MIN_OFFSET_CURRENT: f64 = 1.0e-12;
const MAX_SENSITIVITY_SETTING: i32 = 27;
const MAX_OFFSET_SETTING: i32 = 29;
const MAX_LOWPASS_SETTING: i32 = 15;
const MAX_HIGHPASS_SETTING: i32 = 11;

/// log10(sqrt(5 * 10)): above this fraction of a decade, 5 rounds up to 10.
const CROSSOVER_5_TO_10: f64 = 0.849485;
/// log10(sqrt(3 * 10)).
const CROSSOVER_3_TO_10: f64 = 0.738561;

/// Absorbs representation error in `log10` of exact powers of ten.
const LOG_EPSILON: f64 = 1.0e-9;

/// Mantissa and exponent of a value rounded to one of `mantissas`.
///
/// Each `(limit, mantissa)` pair rounds mantissas up to `limit` down to
/// `mantissa`; anything larger becomes `top`. A fractional decade past
/// `crossover` rounds up to the next power of ten.
fn round_decade(value: f64, crossover: f64, mantissas: &[(f64, i32)], top: i32) -> (i32, i32) {
    let log = value.log10();
    let mut exponent = (log + LOG_EPSILON).floor();
    if log - exponent >= crossover {
        exponent += 1.0;
    }
    let mantissa = value / 10f64.powf(exponent);
    let rounded = mantissas
        .iter()
        .find(|(limit, _)| mantissa <= *limit)
        .map_or(top, |(_, m)| *m);
    (rounded, exponent as i32)
}

/// Rounds to 1, 2 or 5 times a power of ten.
pub fn round_1_2_5(value: f64) -> (i32, i32) {
    round_decade(
        value,
        CROSSOVER_5_TO_10,
        &[(std::f64::consts::SQRT_2, 1), (10f64.sqrt(), 2)],
        5,
    )
}

/// Rounds to 1 or 3 times a power of ten.
pub fn round_1_3(value: f64) -> (i32, i32) {
    round_decade(value, CROSSOVER_3_TO_10, &[(3f64.sqrt(), 1)], 3)
}

fn decade_value(mantissa: i32, exponent: i32) -> f64 {
    f64::from(mantissa) * 10f64.powi(exponent)
}

/// `SENS` setting for a rounded gain.
pub fn sensitivity_setting(mantissa: i32, exponent: i32) -> i32 {
    let step = match mantissa {
        1 => 0,
        2 => -1,
        _ => -2,
    };
    step + 3 * (12 - exponent)
}

/// `IOLV` setting for a rounded offset current.
pub fn offset_current_setting(mantissa: i32, exponent: i32) -> i32 {
    let step = match mantissa {
        1 => 0,
        2 => 1,
        _ => 2,
    };
    step + 3 * (12 + exponent)
}

/// `LFRQ`/`HFRQ` setting for a rounded 3 dB point.
pub fn filter_setting(mantissa: i32, exponent: i32) -> i32 {
    let step = if mantissa == 3 { 0 } else { -1 };
    step + 2 * (2 + exponent)
}

#[derive(Debug)]
pub struct Sr570 {
    pub rs232: RecordRef,
    /// Volts.
    pub bias_voltage: f64,
    pub filter_type: i64,
    /// Hz.
    pub lowpass_filter_3db_point: f64,
    /// Hz.
    pub highpass_filter_3db_point: f64,
    /// 0 low noise, 1 high bandwidth, 2 low drift.
    pub gain_mode: i64,
    pub invert_signal: bool,
    pub blank_output: bool,
}

impl Default for Sr570 {
    fn default() -> Self {
        Self {
            rs232: RecordRef::default(),
            bias_voltage: 0.0,
            filter_type: 5,
            lowpass_filter_3db_point: 1.0e6,
            highpass_filter_3db_point: 0.03,
            gain_mode: 0,
            invert_signal: false,
            blank_output: false,
        }
    }
}

mx_core::field_accessors!(Sr570 {
    "rs232" => rs232,
    "bias_voltage" => bias_voltage,
    "filter_type" => filter_type,
    "lowpass_filter_3db_point" => lowpass_filter_3db_point,
    "highpass_filter_3db_point" => highpass_filter_3db_point,
    "gain_mode" => gain_mode,
    "invert_signal" => invert_signal,
    "blank_output" => blank_output,
});

impl Sr570 {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new(
            "rs232",
            FieldKind::Record(RefRequirement::class(Superclass::Interface, &[RecordClass::Rs232])),
            FieldBlock::Type,
        )
        .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("bias_voltage", FieldKind::Float, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("filter_type", FieldKind::Int, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("lowpass_filter_3db_point", FieldKind::Float, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("highpass_filter_3db_point", FieldKind::Float, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("gain_mode", FieldKind::Int, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("invert_signal", FieldKind::Bool, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("blank_output", FieldKind::Bool, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION),
    ];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("sr570", RecordClass::Amplifier, Self::FIELDS, || {
            Box::<Sr570>::default()
        })
    }

    fn line(&self, operation: &str) -> Result<RecordId> {
        self.rs232.id(operation)
    }

    fn command(&self, cx: &mut DriverContext<'_>, command: &str) -> Result<()> {
        let line = self.line("command")?;
        rs232::putline(cx.db(), line, command).map_err(|e| e.in_record(cx.record_name()))
    }

    /// Rounds and applies `state.gain`, then re-applies the offset for the
    /// new range.
    fn apply_gain(&self, cx: &mut DriverContext<'_>, state: &mut AmplifierState) -> Result<()> {
        const OP: &str = "set_gain";
        let requested = state.gain;
        if !requested.is_finite() || requested <= 0.0 {
            return Err(MxError::illegal_argument(
                OP,
                format!("gain {} is not a positive number", requested),
            ));
        }
        let (mantissa, exponent) = round_1_2_5(requested);
        let setting = sensitivity_setting(mantissa, exponent);
        if !(0..=MAX_SENSITIVITY_SETTING).contains(&setting) {
            return Err(MxError::illegal_argument(
                OP,
                format!("gain {} is outside the range 1e3 to 1e12", requested),
            ));
        }
        state.gain = decade_value(mantissa, exponent);
        debug!("'{}' gain {} rounded to {}", cx.record_name(), requested, state.gain);

        self.command(cx, &format!("SENS {}", setting))?;
        let offset = state.offset;
        self.apply_offset(cx, state, offset)
    }

    fn apply_offset(&self, cx: &mut DriverContext<'_>, state: &mut AmplifierState, offset: f64) -> Result<()> {
        const OP: &str = "set_offset";
        if !offset.is_finite() {
            return Err(MxError::illegal_argument(OP, format!("offset {} is not finite", offset)));
        }
        let current = -offset / state.gain;
        if current.abs() < MIN_OFFSET_CURRENT {
            self.command(cx, "IOON 0")?;
            state.offset = 0.0;
            return Ok(());
        }

        let (mantissa, exponent) = round_1_2_5(current.abs());
        let setting = offset_current_setting(mantissa, exponent);
        if !(0..=MAX_OFFSET_SETTING).contains(&setting) {
            let limit = 5.0e-3 * state.gain;
            return Err(MxError::illegal_argument(
                OP,
                format!("offset {} V is outside -{} V to {} V", offset, limit, limit),
            ));
        }

        self.command(cx, &format!("IOLV {}", setting))?;
        self.command(cx, if current > 0.0 { "IOSN 1" } else { "IOSN 0" })?;
        self.command(cx, "IOON 1")?;
        state.offset = -current.signum() * state.gain * decade_value(mantissa, exponent);
        Ok(())
    }

    fn apply_bias_voltage(&mut self, cx: &mut DriverContext<'_>) -> Result<()> {
        let millivolts = (1000.0 * self.bias_voltage).round();
        if !millivolts.is_finite() || millivolts.abs() > 5000.0 {
            return Err(MxError::would_exceed_limit(
                "open",
                format!("bias voltage {} V is outside -5 V to +5 V", self.bias_voltage),
            ));
        }
        let millivolts = millivolts as i32;
        self.command(cx, &format!("BSLV {}", millivolts))?;
        self.command(cx, if millivolts == 0 { "BSON 0" } else { "BSON 1" })?;
        self.bias_voltage = 0.001 * f64::from(millivolts);
        Ok(())
    }

    /// Rounds a 3 dB point and returns its command setting.
    fn filter_point(value: f64, max_setting: i32, name: &str) -> Result<(f64, i32)> {
        let out_of_range = || {
            MxError::would_exceed_limit("open", format!("{} of {} Hz is out of range", name, value))
        };
        if !value.is_finite() || value < 0.02 {
            return Err(out_of_range());
        }
        let (mantissa, exponent) = round_1_3(value);
        let setting = filter_setting(mantissa, exponent);
        if !(0..=max_setting).contains(&setting) {
            return Err(out_of_range());
        }
        Ok((decade_value(mantissa, exponent), setting))
    }

    fn apply_filters(&mut self, cx: &mut DriverContext<'_>) -> Result<()> {
        if !(0..=5).contains(&self.filter_type) {
            return Err(MxError::illegal_argument(
                "open",
                format!("filter type {} is outside 0 to 5", self.filter_type),
            ));
        }
        self.command(cx, &format!("FLTT {}", self.filter_type))?;

        let (lowpass, setting) = Self::filter_point(
            self.lowpass_filter_3db_point,
            MAX_LOWPASS_SETTING,
            "lowpass filter 3 dB point",
        )?;
        self.command(cx, &format!("LFRQ {}", setting))?;
        self.lowpass_filter_3db_point = lowpass;

        let (highpass, setting) = Self::filter_point(
            self.highpass_filter_3db_point,
            MAX_HIGHPASS_SETTING,
            "highpass filter 3 dB point",
        )?;
        self.command(cx, &format!("HFRQ {}", setting))?;
        self.highpass_filter_3db_point = highpass;
        Ok(())
    }
}

/// Treats an empty operation slot on the line as success.
fn tolerate_unsupported(result: Result<()>) -> Result<()> {
    match result {
        Err(err) if err.kind == ErrorKind::Unsupported => Ok(()),
        other => other,
    }
}

impl RecordDriver for Sr570 {
    fn open(&mut self, cx: &mut DriverContext<'_>, class: &mut ClassState) -> Result<()> {
        const OP: &str = "open";
        let line = self.line(OP)?;
        tolerate_unsupported(rs232::discard_unread_input(cx.db(), line))?;
        tolerate_unsupported(rs232::discard_unwritten_output(cx.db(), line))?;

        self.command(cx, "*RST")?;
        // Calibrated sensitivity and offset current.
        self.command(cx, "SUCM 0")?;
        self.command(cx, "IOUC 0")?;

        let state = class.amplifier_mut(OP)?;
        if state.gain <= 0.0 {
            state.gain = SR570_DEFAULT_GAIN;
        }
        self.apply_gain(cx, state)?;

        self.apply_bias_voltage(cx)?;
        self.apply_filters(cx)?;
        if !(0..=2).contains(&self.gain_mode) {
            return Err(MxError::illegal_argument(
                OP,
                format!("gain mode {} is outside 0 to 2", self.gain_mode),
            ));
        }
        self.command(cx, &format!("GNMD {}", self.gain_mode))?;
        self.command(cx, &format!("INVT {}", u8::from(self.invert_signal)))?;
        self.command(cx, &format!("BLNK {}", u8::from(self.blank_output)))
    }

    fn as_amplifier(&mut self) -> Option<&mut dyn AmplifierOps> {
        Some(self)
    }
}

impl AmplifierOps for Sr570 {
    fn set_gain(&mut self, cx: &mut DriverContext<'_>, state: &mut AmplifierState, _gain: f64) -> Result<()> {
        self.apply_gain(cx, state)
    }

    fn set_offset(&mut self, cx: &mut DriverContext<'_>, state: &mut AmplifierState, offset: f64) -> Result<()> {
        self.apply_offset(cx, state, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_1_2_5() {
        assert_eq!(round_1_2_5(1.0e6), (1, 6));
        assert_eq!(round_1_2_5(1.3e6), (1, 6));
        assert_eq!(round_1_2_5(2.9e6), (2, 6));
        assert_eq!(round_1_2_5(4.0e6), (5, 6));
        assert_eq!(round_1_2_5(8.0e6), (1, 7));
        assert_eq!(round_1_2_5(1.0e-12), (1, -12));
    }

    #[test]
    fn test_round_1_3() {
        assert_eq!(round_1_3(0.03), (3, -2));
        assert_eq!(round_1_3(1.0e6), (1, 6));
        assert_eq!(round_1_3(6.0), (1, 1));
    }

    #[test]
    fn test_command_settings() {
        assert_eq!(sensitivity_setting(1, 12), 0);
        assert_eq!(sensitivity_setting(1, 6), 18);
        assert_eq!(sensitivity_setting(1, 3), 27);
        assert_eq!(offset_current_setting(1, -12), 0);
        assert_eq!(offset_current_setting(5, -3), 29);
        assert_eq!(filter_setting(3, -2), 0);
        assert_eq!(filter_setting(1, 6), 15);
    }
}
