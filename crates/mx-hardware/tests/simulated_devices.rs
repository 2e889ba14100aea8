//! Simulated devices and chip drivers driven through the generic class API.
//!
//! Timing tests run the database on a `ManualClock`, so every move and
//! pulse edge lands exactly where the clock puts it.

use std::sync::Arc;
use std::time::Duration;

use mx_core::class::motor::{self, MOTOR_IS_BUSY};
use mx_core::class::pulse_generator::{self, PulseParameter};
use mx_core::class::{digital_input, digital_output, port_io};
use mx_core::{
    DriverRegistry, ErrorKind, FieldValue, LifecycleState, ManualClock, RecordDatabase, RecordId,
};
use mx_hardware::default_registry;

fn registry() -> DriverRegistry {
    default_registry().unwrap()
}

fn field(name: &str, value: FieldValue) -> (String, FieldValue) {
    (name.to_string(), value)
}

fn record_ref(name: &str) -> FieldValue {
    FieldValue::Record(name.to_string())
}

fn clocked_database() -> (RecordDatabase, ManualClock) {
    let clock = ManualClock::new();
    (RecordDatabase::with_clock(Arc::new(clock.clone())), clock)
}

// =============================================================================
// Registry
// =============================================================================

#[test]
fn test_default_registry_knows_every_driver() {
    let registry = registry();
    for type_name in [
        "soft_dio_controller",
        "controller_input",
        "controller_output",
        "soft_dinput",
        "soft_doutput",
        "soft_portio",
        "mc6821",
        "mc6821_in",
        "mc6821_out",
        "soft_aoutput",
        "soft_relay",
        "soft_motor",
        "gated_backlash",
        "soft_amplifier",
        "sr570",
        "soft_scaler",
        "soft_timer",
        "doutput_pulser",
        "soft_wvout",
        "network_wvout",
        "soft_vinput",
        "tcp232",
        "transport_rs232",
        "json_line_server",
        "loopback_server",
    ] {
        assert!(registry.contains(type_name), "missing driver '{}'", type_name);
    }
}

#[test]
fn test_registering_twice_is_rejected() {
    let mut registry = registry();
    assert!(mx_hardware::register_all_drivers(&mut registry).is_err());
}

// =============================================================================
// Controller ports
// =============================================================================

#[test]
fn test_controller_output_is_visible_on_input_of_same_port() {
    let registry = registry();
    let mut db = RecordDatabase::new();
    db.create_record(&registry, "ctrl", "soft_dio_controller", Vec::new())
        .unwrap();
    let dout = db
        .create_record(
            &registry,
            "dout",
            "controller_output",
            vec![field("controller", record_ref("ctrl")), field("port", FieldValue::Str("b".into()))],
        )
        .unwrap();
    let din = db
        .create_record(
            &registry,
            "din",
            "controller_input",
            vec![field("controller", record_ref("ctrl")), field("port", FieldValue::Str("B".into()))],
        )
        .unwrap();
    assert!(db.initialize().is_success());

    digital_output::write(&mut db, dout, 0x2a).unwrap();
    assert_eq!(digital_input::read(&mut db, din).unwrap(), 0x2a);
}

#[test]
fn test_full_width_output_value_survives_field_access() {
    let registry = registry();
    let mut db = RecordDatabase::new();
    let out = db.create_record(&registry, "mask", "soft_doutput", Vec::new()).unwrap();
    assert!(db.initialize().is_success());

    digital_output::write(&mut db, out, u64::MAX).unwrap();
    assert_eq!(db.read_field(out, "value").unwrap(), FieldValue::UInt(u64::MAX));
    assert!(db.summary(out).unwrap().contains("0xffffffffffffffff"));

    db.write_field(out, "value", FieldValue::UInt(1 << 63)).unwrap();
    assert_eq!(db.read_field(out, "value").unwrap(), FieldValue::UInt(1 << 63));
    assert_eq!(digital_output::read(&mut db, out).unwrap(), 1 << 63);

    let err = db.write_field(out, "value", FieldValue::Int(-1)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::IllegalArgument);
}

#[test]
fn test_unknown_controller_port_fails_validation() {
    let registry = registry();
    let mut db = RecordDatabase::new();
    db.create_record(&registry, "ctrl", "soft_dio_controller", Vec::new())
        .unwrap();
    db.create_record(
        &registry,
        "din",
        "controller_input",
        vec![field("controller", record_ref("ctrl")), field("port", FieldValue::Str("d".into()))],
    )
    .unwrap();

    let report = db.initialize();
    let failure = report.failure("din").unwrap();
    assert_eq!(failure.stage, "validate");
    assert_eq!(failure.error.kind, ErrorKind::IllegalArgument);
    assert_eq!(report.opened, vec!["ctrl".to_string()]);
}

// =============================================================================
// MC6821
// =============================================================================

fn pia_database(registry: &DriverRegistry) -> (RecordDatabase, RecordId) {
    let mut db = RecordDatabase::new();
    let pio = db.create_record(registry, "pio", "soft_portio", Vec::new()).unwrap();
    db.create_record(
        registry,
        "pia",
        "mc6821",
        vec![field("portio", record_ref("pio")), field("base_address", FieldValue::Int(0x300))],
    )
    .unwrap();
    (db, pio)
}

#[test]
fn test_mc6821_output_writes_port_a_data_register() {
    let registry = registry();
    let (mut db, pio) = pia_database(&registry);
    let out = db
        .create_record(
            &registry,
            "pia_a",
            "mc6821_out",
            vec![field("interface", record_ref("pia")), field("port", FieldValue::Str("a".into()))],
        )
        .unwrap();
    assert!(db.initialize().is_success());

    // Data register selected again after the direction was set.
    assert_ne!(port_io::inp8(&mut db, pio, 0x301).unwrap() & 0x04, 0);

    digital_output::write(&mut db, out, 0x15a).unwrap();
    assert_eq!(port_io::inp8(&mut db, pio, 0x300).unwrap(), 0x5a);
    assert_eq!(digital_output::read(&mut db, out).unwrap(), 0x5a);
}

#[test]
fn test_mc6821_input_reads_port_b() {
    let registry = registry();
    let (mut db, pio) = pia_database(&registry);
    let input = db
        .create_record(
            &registry,
            "pia_b",
            "mc6821_in",
            vec![field("interface", record_ref("pia")), field("port", FieldValue::Str("B".into()))],
        )
        .unwrap();
    assert!(db.initialize().is_success());

    port_io::outp8(&mut db, pio, 0x302, 0x3c).unwrap();
    assert_eq!(digital_input::read(&mut db, input).unwrap(), 0x3c);
}

#[test]
fn test_mc6821_port_on_a_non_chip_interface_is_type_mismatch() {
    let registry = registry();
    let (mut db, _pio) = pia_database(&registry);
    db.create_record(
        &registry,
        "bad",
        "mc6821_out",
        vec![field("interface", record_ref("pio")), field("port", FieldValue::Str("A".into()))],
    )
    .unwrap();

    let report = db.initialize();
    let failure = report.failure("bad").unwrap();
    assert_eq!(failure.error.kind, ErrorKind::TypeMismatch);
    assert_eq!(db.state(db.find("pia").unwrap()).unwrap(), LifecycleState::Opened);
}

#[test]
fn test_overlapping_mc6821_chips_conflict_on_open() {
    let registry = registry();
    let (mut db, _pio) = pia_database(&registry);
    db.create_record(
        &registry,
        "pia2",
        "mc6821",
        vec![field("portio", record_ref("pio")), field("base_address", FieldValue::Int(0x302))],
    )
    .unwrap();

    let report = db.initialize();
    assert_eq!(report.failure("pia2").unwrap().stage, "open");
    assert!(report.failure("pia").is_none());
}

// =============================================================================
// Soft motor
// =============================================================================

#[test]
fn test_soft_motor_moves_at_configured_speed() {
    let registry = registry();
    let (mut db, clock) = clocked_database();
    let theta = db
        .create_record(&registry, "theta", "soft_motor", vec![field("speed", FieldValue::Float(2.0))])
        .unwrap();
    assert!(db.initialize().is_success());

    motor::move_absolute(&mut db, theta, 4.0).unwrap();
    assert!(motor::is_busy(&mut db, theta).unwrap());

    clock.advance(Duration::from_secs(1));
    assert_eq!(motor::get_position(&mut db, theta).unwrap(), 2.0);
    assert_eq!(motor::get_status(&mut db, theta).unwrap() & MOTOR_IS_BUSY, MOTOR_IS_BUSY);

    clock.advance(Duration::from_secs(2));
    assert!(!motor::is_busy(&mut db, theta).unwrap());
    assert_eq!(motor::get_position(&mut db, theta).unwrap(), 4.0);
}

#[test]
fn test_soft_motor_respects_software_limits() {
    let registry = registry();
    let mut db = RecordDatabase::new();
    let theta = db
        .create_record(
            &registry,
            "theta",
            "soft_motor",
            vec![
                field("positive_limit", FieldValue::Float(10.0)),
                field("negative_limit", FieldValue::Float(-10.0)),
            ],
        )
        .unwrap();
    assert!(db.initialize().is_success());

    let err = motor::move_absolute(&mut db, theta, 20.0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::WouldExceedLimit);
    assert_eq!(motor::get_position(&mut db, theta).unwrap(), 0.0);
}

#[test]
fn test_backlash_leg_must_stay_inside_software_limits() {
    let registry = registry();
    let (mut db, clock) = clocked_database();
    let theta = db
        .create_record(
            &registry,
            "theta",
            "soft_motor",
            vec![
                field("speed", FieldValue::Float(100.0)),
                field("positive_limit", FieldValue::Float(10.0)),
                field("negative_limit", FieldValue::Float(-10.0)),
                field("backlash_correction", FieldValue::Float(5.0)),
            ],
        )
        .unwrap();
    assert!(db.initialize().is_success());

    // 8 is inside the limits but the backlash leg would reach 13.
    let err = motor::move_absolute(&mut db, theta, 8.0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::WouldExceedLimit);
    assert!(!motor::is_busy(&mut db, theta).unwrap());
    clock.advance(Duration::from_millis(200));
    assert_eq!(motor::get_position(&mut db, theta).unwrap(), 0.0);

    // Moving the other way needs no backlash leg.
    motor::move_absolute(&mut db, theta, -8.0).unwrap();
    clock.advance(Duration::from_millis(200));
    assert!(!motor::is_busy(&mut db, theta).unwrap());
    assert_eq!(motor::get_position(&mut db, theta).unwrap(), -8.0);
}

#[test]
fn test_soft_motor_cannot_redefine_position_while_moving() {
    let registry = registry();
    let (mut db, clock) = clocked_database();
    let theta = db
        .create_record(&registry, "theta", "soft_motor", vec![field("speed", FieldValue::Float(1.0))])
        .unwrap();
    assert!(db.initialize().is_success());

    motor::move_absolute(&mut db, theta, 5.0).unwrap();
    let err = motor::set_position(&mut db, theta, 0.0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotReady);

    clock.advance(Duration::from_secs(10));
    motor::set_position(&mut db, theta, 100.0).unwrap();
    assert_eq!(motor::get_position(&mut db, theta).unwrap(), 100.0);
}

// =============================================================================
// Gated backlash
// =============================================================================

#[test]
fn test_gate_is_held_through_backlash_leg_then_released() {
    let registry = registry();
    let (mut db, clock) = clocked_database();
    db.create_record(&registry, "theta", "soft_motor", vec![field("speed", FieldValue::Float(10.0))])
        .unwrap();
    let gate = db.create_record(&registry, "gate_bit", "soft_doutput", Vec::new()).unwrap();
    let gated = db
        .create_record(
            &registry,
            "theta_gated",
            "gated_backlash",
            vec![
                field("real_motor", record_ref("theta")),
                field("gate_record", record_ref("gate_bit")),
                field("gate_delay", FieldValue::Float(0.5)),
                field("backlash_correction", FieldValue::Float(1.0)),
            ],
        )
        .unwrap();
    assert!(db.initialize().is_success());
    assert_eq!(digital_output::read(&mut db, gate).unwrap(), 0);

    // First leg overshoots by the backlash with the gate on.
    motor::move_absolute(&mut db, gated, 5.0).unwrap();
    assert_eq!(digital_output::read(&mut db, gate).unwrap(), 1);

    // Real motor has stopped; the gate delay keeps the wrapper busy.
    clock.advance(Duration::from_secs(1));
    assert!(motor::is_busy(&mut db, gated).unwrap());
    assert_eq!(digital_output::read(&mut db, gate).unwrap(), 1);

    // Delay over: gate off and the final leg starts.
    clock.advance(Duration::from_secs(1));
    assert!(motor::is_busy(&mut db, gated).unwrap());
    assert_eq!(digital_output::read(&mut db, gate).unwrap(), 0);

    clock.advance(Duration::from_secs(1));
    assert!(!motor::is_busy(&mut db, gated).unwrap());
    assert_eq!(motor::get_position(&mut db, gated).unwrap(), 5.0);
    assert_eq!(digital_output::read(&mut db, gate).unwrap(), 0);
}

#[test]
fn test_move_against_backlash_direction_leaves_gate_off() {
    let registry = registry();
    let (mut db, clock) = clocked_database();
    db.create_record(&registry, "theta", "soft_motor", Vec::new()).unwrap();
    let gate = db.create_record(&registry, "gate_bit", "soft_doutput", Vec::new()).unwrap();
    let gated = db
        .create_record(
            &registry,
            "theta_gated",
            "gated_backlash",
            vec![
                field("real_motor", record_ref("theta")),
                field("gate_record", record_ref("gate_bit")),
                field("backlash_correction", FieldValue::Float(1.0)),
            ],
        )
        .unwrap();
    assert!(db.initialize().is_success());

    motor::move_absolute(&mut db, gated, -3.0).unwrap();
    assert_eq!(digital_output::read(&mut db, gate).unwrap(), 0);
    clock.advance(Duration::from_millis(10));
    assert!(!motor::is_busy(&mut db, gated).unwrap());
    assert_eq!(motor::get_position(&mut db, gated).unwrap(), -3.0);
}

// =============================================================================
// Digital output pulser
// =============================================================================

fn pulser_database(num_pulses: i64) -> (RecordDatabase, ManualClock, RecordId, RecordId) {
    let registry = registry();
    let (mut db, clock) = clocked_database();
    let out = db.create_record(&registry, "out", "soft_doutput", Vec::new()).unwrap();
    let pulser = db
        .create_record(
            &registry,
            "pulser",
            "doutput_pulser",
            vec![
                field("digital_output", record_ref("out")),
                field("pulse_width", FieldValue::Float(0.25)),
                field("pulse_period", FieldValue::Float(0.5)),
                field("num_pulses", FieldValue::Int(num_pulses)),
            ],
        )
        .unwrap();
    assert!(db.initialize().is_success());
    (db, clock, pulser, out)
}

#[test]
fn test_pulser_toggles_output_when_polled() {
    let (mut db, clock, pulser, out) = pulser_database(2);

    pulse_generator::trigger(&mut db, pulser).unwrap();
    assert_eq!(digital_output::read(&mut db, out).unwrap(), 1);

    let mut levels = Vec::new();
    for _ in 0..3 {
        clock.advance(Duration::from_millis(250));
        let busy = pulse_generator::is_busy(&mut db, pulser).unwrap();
        levels.push((digital_output::read(&mut db, out).unwrap(), busy));
    }
    assert_eq!(levels, vec![(0, true), (1, true), (0, false)]);
}

#[test]
fn test_pulser_advances_from_timer_callbacks() {
    let (mut db, clock, pulser, out) = pulser_database(1);

    pulse_generator::trigger(&mut db, pulser).unwrap();
    assert_eq!(digital_output::read(&mut db, out).unwrap(), 1);

    clock.advance(Duration::from_millis(300));
    assert!(db.process_callbacks() >= 1);
    assert_eq!(digital_output::read(&mut db, out).unwrap(), 0);
    assert!(!pulse_generator::is_busy(&mut db, pulser).unwrap());
}

#[test]
fn test_pulser_stop_forces_output_low() {
    let (mut db, _clock, pulser, out) = pulser_database(0);

    pulse_generator::start(&mut db, pulser).unwrap();
    assert_eq!(digital_output::read(&mut db, out).unwrap(), 1);
    pulse_generator::stop(&mut db, pulser).unwrap();
    assert_eq!(digital_output::read(&mut db, out).unwrap(), 0);
    assert!(!pulse_generator::is_busy(&mut db, pulser).unwrap());
}

#[test]
fn test_pulser_rejects_width_longer_than_period_and_pulse_mode() {
    let (mut db, _clock, pulser, _out) = pulser_database(1);

    pulse_generator::set_parameter(&mut db, pulser, PulseParameter::PulseWidth, 2.0).unwrap();
    let err = pulse_generator::trigger(&mut db, pulser).unwrap_err();
    assert_eq!(err.kind, ErrorKind::IllegalArgument);

    let err = pulse_generator::set_parameter(&mut db, pulser, PulseParameter::Mode, 1.0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::IllegalArgument);
    assert_eq!(
        pulse_generator::get_parameter(&mut db, pulser, PulseParameter::Mode).unwrap(),
        2.0
    );
}
