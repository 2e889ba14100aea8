//! End-to-end behaviour of the record framework with small in-test drivers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use mx_core::class::controller::{self, ControllerOps, ControllerState};
use mx_core::class::digital_input::{self, DigitalInputOps, DigitalInputState};
use mx_core::class::digital_output::{self, DigitalOutputOps};
use mx_core::class::waveform_output::{self, WaveformOutputOps, WaveformOutputState};
use mx_core::remote::{FieldServer, JsonLineClient, LoopbackTransport, RemoteField, RemoteFieldClient};
use mx_core::{
    ClassState, DriverContext, DriverDescriptor, DriverRegistry, ErrorKind, FieldBlock,
    FieldDescriptor, FieldFlags, FieldKind, FieldValue, LifecycleState, ManualClock, MxError,
    RecordClass, RecordDatabase, RecordDriver, RecordRef, RefRequirement, Result, Superclass, Tick,
    TimerKind,
};

// =============================================================================
// Test drivers
// =============================================================================

#[derive(Default)]
struct TestController;

mx_core::field_accessors!(TestController {});

impl RecordDriver for TestController {
    fn finish_record_initialization(
        &mut self,
        _cx: &mut DriverContext<'_>,
        class: &mut ClassState,
    ) -> Result<()> {
        class.controller_mut("finish_record_initialization")?.num_registers = 3;
        Ok(())
    }

    fn as_controller(&mut self) -> Option<&mut dyn ControllerOps> {
        Some(self)
    }
}

impl ControllerOps for TestController {
    fn write_register(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &ControllerState,
        _index: usize,
        _value: u64,
    ) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct PortInput {
    controller: RecordRef,
    port: String,
}

mx_core::field_accessors!(PortInput {
    "controller" => controller,
    "port" => port,
});

const PORT_INPUT_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new(
        "controller",
        FieldKind::Record(RefRequirement::class(Superclass::Interface, &[RecordClass::Controller])),
        FieldBlock::Type,
    )
    .flags(FieldFlags::IN_DESCRIPTION),
    FieldDescriptor::new("port", FieldKind::Str, FieldBlock::Type).flags(FieldFlags::IN_DESCRIPTION),
];

impl RecordDriver for PortInput {
    fn finish_record_initialization(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _class: &mut ClassState,
    ) -> Result<()> {
        let port = self.port.trim().to_ascii_uppercase();
        if !matches!(port.as_str(), "A" | "B" | "C") {
            return Err(MxError::illegal_argument(
                "finish_record_initialization",
                format!("unknown port '{}'", self.port),
            ));
        }
        self.port = port;
        Ok(())
    }

    fn as_digital_input(&mut self) -> Option<&mut dyn DigitalInputOps> {
        Some(self)
    }
}

impl DigitalInputOps for PortInput {
    fn read(&mut self, cx: &mut DriverContext<'_>, _state: &DigitalInputState) -> Result<u64> {
        let index = usize::from(self.port.as_bytes()[0] - b'A');
        let controller = self.controller.id("read")?;
        controller::read_register(cx.db(), controller, index)
    }
}

/// Requires a generic interface, so pointing it at a controller is a mismatch.
#[derive(Default)]
struct GenericOutput {
    interface: RecordRef,
}

mx_core::field_accessors!(GenericOutput { "interface" => interface });

const GENERIC_OUTPUT_FIELDS: &[FieldDescriptor] = &[FieldDescriptor::new(
    "interface",
    FieldKind::Record(RefRequirement::class(Superclass::Interface, &[RecordClass::Generic])),
    FieldBlock::Type,
)];

impl RecordDriver for GenericOutput {
    fn as_digital_output(&mut self) -> Option<&mut dyn DigitalOutputOps> {
        Some(self)
    }
}

impl DigitalOutputOps for GenericOutput {}

/// Digital output with only the default read slot.
#[derive(Default)]
struct ReadOnlyOutput;

mx_core::field_accessors!(ReadOnlyOutput {});

impl RecordDriver for ReadOnlyOutput {
    fn as_digital_output(&mut self) -> Option<&mut dyn DigitalOutputOps> {
        Some(self)
    }
}

impl DigitalOutputOps for ReadOnlyOutput {}

/// Calls back into its own record while an operation is running.
#[derive(Default)]
struct Reentrant;

mx_core::field_accessors!(Reentrant {});

impl RecordDriver for Reentrant {
    fn as_digital_input(&mut self) -> Option<&mut dyn DigitalInputOps> {
        Some(self)
    }
}

impl DigitalInputOps for Reentrant {
    fn read(&mut self, cx: &mut DriverContext<'_>, _state: &DigitalInputState) -> Result<u64> {
        let me = cx.record_id();
        digital_input::read(cx.db(), me)
    }
}

#[derive(Default)]
struct BrokenController;

mx_core::field_accessors!(BrokenController {});

impl RecordDriver for BrokenController {
    fn open(&mut self, _cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        Err(MxError::device_io("open", "no response from the bus"))
    }

    fn as_controller(&mut self) -> Option<&mut dyn ControllerOps> {
        Some(self)
    }
}

impl ControllerOps for BrokenController {}

/// Counts the ticks of a periodic timer.
#[derive(Default)]
struct Ticker {
    ticks: u64,
    closes: Arc<Mutex<u32>>,
}

mx_core::field_accessors!(Ticker { "ticks" => ticks });

const TICKER_FIELDS: &[FieldDescriptor] =
    &[FieldDescriptor::new("ticks", FieldKind::UInt, FieldBlock::Type).flags(FieldFlags::READ_ONLY)];

impl RecordDriver for Ticker {
    fn open(&mut self, cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        cx.start_timer(TimerKind::Periodic(Duration::from_millis(10)));
        Ok(())
    }

    fn close(&mut self, _cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        *self.closes.lock() += 1;
        Ok(())
    }

    fn on_tick(&mut self, _cx: &mut DriverContext<'_>, _class: &mut ClassState, _tick: Tick) -> Result<()> {
        self.ticks += 1;
        Ok(())
    }
}

/// Waveform output that keeps written channels in memory.
#[derive(Default)]
struct MemoryWaveform;

mx_core::field_accessors!(MemoryWaveform {});

impl RecordDriver for MemoryWaveform {
    fn as_waveform_output(&mut self) -> Option<&mut dyn WaveformOutputOps> {
        Some(self)
    }
}

impl WaveformOutputOps for MemoryWaveform {
    fn arm(&mut self, _cx: &mut DriverContext<'_>, _state: &WaveformOutputState) -> Result<()> {
        Ok(())
    }

    fn trigger(&mut self, _cx: &mut DriverContext<'_>, _state: &WaveformOutputState) -> Result<()> {
        Ok(())
    }

    fn write_channel(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _state: &WaveformOutputState,
        _channel: usize,
        _data: &[f64],
    ) -> Result<()> {
        Ok(())
    }
}

fn registry_with_closes(closes: Arc<Mutex<u32>>) -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    registry
        .register(DriverDescriptor::new("test_controller", RecordClass::Controller, &[], || {
            Box::new(TestController)
        }))
        .unwrap();
    registry
        .register(DriverDescriptor::new(
            "port_input",
            RecordClass::DigitalInput,
            PORT_INPUT_FIELDS,
            || Box::new(PortInput::default()),
        ))
        .unwrap();
    registry
        .register(DriverDescriptor::new(
            "generic_output",
            RecordClass::DigitalOutput,
            GENERIC_OUTPUT_FIELDS,
            || Box::new(GenericOutput::default()),
        ))
        .unwrap();
    registry
        .register(DriverDescriptor::new("read_only_output", RecordClass::DigitalOutput, &[], || {
            Box::new(ReadOnlyOutput)
        }))
        .unwrap();
    registry
        .register(DriverDescriptor::new("reentrant", RecordClass::DigitalInput, &[], || {
            Box::new(Reentrant)
        }))
        .unwrap();
    registry
        .register(DriverDescriptor::new("broken_controller", RecordClass::Controller, &[], || {
            Box::new(BrokenController)
        }))
        .unwrap();
    registry
        .register(DriverDescriptor::new("ticker", RecordClass::Generic, TICKER_FIELDS, move || {
            Box::new(Ticker {
                ticks: 0,
                closes: Arc::clone(&closes),
            })
        }))
        .unwrap();
    registry
        .register(DriverDescriptor::new("memory_wvout", RecordClass::WaveformOutput, &[], || {
            Box::new(MemoryWaveform)
        }))
        .unwrap();
    registry
}

fn registry() -> DriverRegistry {
    registry_with_closes(Arc::new(Mutex::new(0)))
}

fn field(name: &str, value: FieldValue) -> (String, FieldValue) {
    (name.to_string(), value)
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_digital_input_chain_reads_controller_register() {
    let registry = registry();
    let mut db = RecordDatabase::new();
    let ctrl = db
        .create_record(&registry, "ctrl", "test_controller", Vec::new())
        .unwrap();
    let din = db
        .create_record(
            &registry,
            "din",
            "port_input",
            vec![
                field("controller", FieldValue::Record("ctrl".into())),
                field("port", FieldValue::Str("a".into())),
            ],
        )
        .unwrap();

    let report = db.initialize();
    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(db.read_field(din, "port").unwrap(), FieldValue::Str("A".into()));

    controller::write_register(&mut db, ctrl, 0, 0x5a).unwrap();
    assert_eq!(digital_input::read(&mut db, din).unwrap(), 0x5a);
    assert_eq!(db.read_field(din, "value").unwrap(), FieldValue::Int(0x5a));
}

#[test]
fn test_unknown_port_fails_validation_only_for_that_record() {
    let registry = registry();
    let mut db = RecordDatabase::new();
    db.create_record(&registry, "ctrl", "test_controller", Vec::new())
        .unwrap();
    for (name, port) in [("good", "b"), ("bad", "q")] {
        db.create_record(
            &registry,
            name,
            "port_input",
            vec![
                field("controller", FieldValue::Record("ctrl".into())),
                field("port", FieldValue::Str(port.into())),
            ],
        )
        .unwrap();
    }

    let report = db.initialize();
    let failure = report.failure("bad").unwrap();
    assert_eq!(failure.stage, "validate");
    assert_eq!(failure.error.kind, ErrorKind::IllegalArgument);
    assert!(report.opened.contains(&"good".to_string()));
}

#[test]
fn test_reference_to_wrong_class_is_type_mismatch() {
    let registry = registry();
    let mut db = RecordDatabase::new();
    db.create_record(&registry, "ctrl", "test_controller", Vec::new())
        .unwrap();
    let dout = db
        .create_record(
            &registry,
            "dout",
            "generic_output",
            vec![field("interface", FieldValue::Record("ctrl".into()))],
        )
        .unwrap();

    let report = db.initialize();
    let failure = report.failure("dout").unwrap();
    assert_eq!(failure.stage, "validate");
    assert_eq!(failure.error.kind, ErrorKind::TypeMismatch);
    assert!(failure.error.message.contains("expected class generic"));
    assert!(failure.error.message.contains("actual class controller"));

    assert_eq!(db.state(dout).unwrap(), LifecycleState::Failed);
    let err = digital_output::read(&mut db, dout).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotReady);
}

#[test]
fn test_unknown_and_self_references_fail_linking() {
    let registry = registry();
    let mut db = RecordDatabase::new();
    db.create_record(
        &registry,
        "lost",
        "port_input",
        vec![
            field("controller", FieldValue::Record("nowhere".into())),
            field("port", FieldValue::Str("a".into())),
        ],
    )
    .unwrap();
    db.create_record(
        &registry,
        "loop",
        "port_input",
        vec![
            field("controller", FieldValue::Record("loop".into())),
            field("port", FieldValue::Str("a".into())),
        ],
    )
    .unwrap();

    let report = db.initialize();
    assert_eq!(report.failure("lost").unwrap().error.kind, ErrorKind::NotFound);
    assert_eq!(report.failure("loop").unwrap().error.kind, ErrorKind::IllegalArgument);
}

#[test]
fn test_empty_slot_is_unsupported_without_side_effect() {
    let registry = registry();
    let mut db = RecordDatabase::new();
    let dout = db
        .create_record(&registry, "dout", "read_only_output", Vec::new())
        .unwrap();
    assert!(db.initialize().is_success());

    let err = digital_output::write(&mut db, dout, 0xff).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unsupported);
    assert!(err.message.contains("digital_output"));
    assert!(err.message.contains("write"));
    assert_eq!(db.read_field(dout, "value").unwrap(), FieldValue::Int(0));
    assert_eq!(digital_output::read(&mut db, dout).unwrap(), 0);
}

#[test]
fn test_wrong_class_dispatch_is_type_mismatch() {
    let registry = registry();
    let mut db = RecordDatabase::new();
    let ctrl = db
        .create_record(&registry, "ctrl", "test_controller", Vec::new())
        .unwrap();
    assert!(db.initialize().is_success());

    let err = digital_input::read(&mut db, ctrl).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeMismatch);
}

#[test]
fn test_reentrant_dispatch_fails_closed() {
    let registry = registry();
    let mut db = RecordDatabase::new();
    let din = db.create_record(&registry, "din", "reentrant", Vec::new()).unwrap();
    assert!(db.initialize().is_success());

    let err = digital_input::read(&mut db, din).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CorruptState);

    // The body is back in place after the failed call.
    assert!(db.record(din).unwrap().body("test").is_ok());
}

#[test]
fn test_failed_dependency_fails_dependent_open() {
    let registry = registry();
    let mut db = RecordDatabase::new();
    db.create_record(&registry, "bus", "broken_controller", Vec::new())
        .unwrap();
    db.create_record(
        &registry,
        "din",
        "port_input",
        vec![
            field("controller", FieldValue::Record("bus".into())),
            field("port", FieldValue::Str("c".into())),
        ],
    )
    .unwrap();
    db.create_record(&registry, "other", "test_controller", Vec::new())
        .unwrap();

    let report = db.initialize();
    let bus = report.failure("bus").unwrap();
    assert_eq!((bus.stage, bus.error.kind), ("open", ErrorKind::DeviceIo));
    let din = report.failure("din").unwrap();
    assert_eq!((din.stage, din.error.kind), ("open", ErrorKind::CorruptState));
    assert!(din.error.message.contains("bus"));
    assert_eq!(report.opened, vec!["other".to_string()]);
}

#[test]
fn test_close_is_idempotent_and_releases_timers() {
    let closes = Arc::new(Mutex::new(0));
    let registry = registry_with_closes(Arc::clone(&closes));
    let clock = ManualClock::new();
    let mut db = RecordDatabase::with_clock(Arc::new(clock.clone()));
    let ticker = db.create_record(&registry, "ticker", "ticker", Vec::new()).unwrap();

    // Never opened: a no-op.
    db.close(ticker).unwrap();
    assert_eq!(*closes.lock(), 0);

    assert!(db.initialize().is_success());
    assert_eq!(db.scheduler().timers_owned_by(ticker), 1);

    db.close(ticker).unwrap();
    db.close(ticker).unwrap();
    assert_eq!(*closes.lock(), 1);
    assert_eq!(db.state(ticker).unwrap(), LifecycleState::Closed);
    assert_eq!(db.scheduler().timers_owned_by(ticker), 0);

    clock.advance(Duration::from_millis(50));
    assert_eq!(db.process_callbacks(), 0);
}

#[test]
fn test_periodic_ticks_follow_the_manual_clock() {
    let registry = registry();
    let clock = ManualClock::new();
    let mut db = RecordDatabase::with_clock(Arc::new(clock.clone()));
    let ticker = db.create_record(&registry, "ticker", "ticker", Vec::new()).unwrap();
    assert!(db.initialize().is_success());

    assert_eq!(db.process_callbacks(), 0);
    clock.advance(Duration::from_millis(10));
    assert_eq!(db.process_callbacks(), 1);
    clock.advance(Duration::from_millis(10));
    assert_eq!(db.process_callbacks(), 1);
    // Missed periods collapse into one firing.
    clock.advance(Duration::from_millis(45));
    assert_eq!(db.process_callbacks(), 1);

    assert_eq!(db.read_field(ticker, "ticks").unwrap(), FieldValue::Int(3));
    let err = db.write_field(ticker, "ticks", FieldValue::Int(0)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::PermissionDenied);
}

#[test]
fn test_field_round_trip_and_zero_fill() {
    let registry = registry();
    let mut db = RecordDatabase::new();
    let wv = db
        .create_record(
            &registry,
            "wv",
            "memory_wvout",
            vec![
                field("maximum_num_channels", FieldValue::Int(2)),
                field("maximum_num_steps", FieldValue::Int(4)),
            ],
        )
        .unwrap();
    assert!(db.initialize().is_success());

    db.write_field(wv, "frequency", FieldValue::Float(250.0)).unwrap();
    assert_eq!(db.read_field(wv, "frequency").unwrap(), FieldValue::Float(250.0));
    db.write_field(wv, "trigger_repeat", FieldValue::Int(3)).unwrap();
    assert_eq!(db.read_field(wv, "trigger_repeat").unwrap(), FieldValue::Int(3));

    db.write_field(wv, "channel_data", FieldValue::FloatArray(vec![1.0, 2.0]))
        .unwrap();
    assert_eq!(
        db.read_field(wv, "channel_data").unwrap(),
        FieldValue::FloatArray(vec![1.0, 2.0, 0.0, 0.0])
    );
    assert_eq!(db.read_field_element(wv, "channel_data", 1).unwrap(), FieldValue::Float(2.0));
    let err = db.read_field_element(wv, "channel_data", 4).unwrap_err();
    assert_eq!(err.kind, ErrorKind::OutOfRange);

    let err = db
        .write_field(wv, "channel_data", FieldValue::FloatArray(vec![0.0; 5]))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::OutOfRange);

    waveform_output::write_channel(&mut db, wv, 1, &[0.5]).unwrap();
    assert_eq!(
        waveform_output::read_channel(&mut db, wv, 1).unwrap(),
        vec![0.5]
    );

    let err = db.write_field(wv, "name", FieldValue::Str("other".into())).unwrap_err();
    assert_eq!(err.kind, ErrorKind::PermissionDenied);
}

#[test]
fn test_structure_and_summary_use_field_flags() {
    let registry = registry();
    let mut db = RecordDatabase::new();
    db.create_record(&registry, "ctrl", "test_controller", Vec::new())
        .unwrap();
    let din = db
        .create_record(
            &registry,
            "din",
            "port_input",
            vec![
                field("controller", FieldValue::Record("ctrl".into())),
                field("port", FieldValue::Str("b".into())),
            ],
        )
        .unwrap();
    assert!(db.initialize().is_success());

    let structure = db.print_structure(din).unwrap();
    assert!(structure.contains("din"));
    assert!(structure.contains("ctrl"));
    let summary = db.summary(din).unwrap();
    assert!(summary.contains("port_input"));
    assert!(!summary.contains('\n'));
}

#[test]
fn test_remote_field_access_through_loopback() {
    let registry = registry();
    let mut db = RecordDatabase::new();
    db.create_record(
        &registry,
        "wv",
        "memory_wvout",
        vec![
            field("maximum_num_channels", FieldValue::Int(3)),
            field("maximum_num_steps", FieldValue::Int(4)),
        ],
    )
    .unwrap();
    assert!(db.initialize().is_success());

    let server = Arc::new(Mutex::new(FieldServer::new(db)));
    let mut client = JsonLineClient::new(LoopbackTransport::new(Arc::clone(&server)));

    client
        .put(&RemoteField::new("wv", "channel_index"), &FieldValue::Int(2))
        .unwrap();
    client
        .put_array(
            &RemoteField::new("wv", "channel_data"),
            &FieldValue::FloatArray(vec![1.0, 2.0, 3.0]),
            &[4],
        )
        .unwrap();
    client
        .put(&RemoteField::new("wv", "arm"), &FieldValue::Bool(true))
        .unwrap();
    client
        .put(&RemoteField::new("wv", "trigger"), &FieldValue::Bool(true))
        .unwrap();

    let busy = client
        .get(&RemoteField::new("wv", "busy"), FieldKind::Bool)
        .unwrap();
    assert_eq!(busy, FieldValue::Bool(true));

    let data = client
        .get_array(&RemoteField::new("wv", "channel_data"), FieldKind::Float, &[4])
        .unwrap();
    assert_eq!(data, FieldValue::FloatArray(vec![1.0, 2.0, 3.0, 0.0]));

    let err = client
        .get(&RemoteField::new("missing", "busy"), FieldKind::Bool)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let server = server.lock();
    let wv = server.database().find("wv").unwrap();
    let stored = server
        .database()
        .with_class_state(wv, "test", |c| c.waveform_output("test").map(|s| s.channel(2)))
        .unwrap()
        .unwrap();
    assert_eq!(stored, vec![1.0, 2.0, 3.0, 0.0]);
}
