//! Instruments reached through a line or a peer: the SR570 preamplifier on a
//! scripted RS-232 transport, and the network waveform output against both a
//! recording peer and a real field server in the same process.

use std::sync::Arc;

use parking_lot::Mutex;

use mx_core::class::amplifier;
use mx_core::class::waveform_output::{self, WaveformParameter};
use mx_core::remote::{FieldServer, RecordingClient, RemoteCall};
use mx_core::{
    DriverRegistry, ErrorKind, FieldValue, MockTransport, MxError, RecordDatabase, RecordId,
};
use mx_hardware::default_registry;
use mx_hardware::drivers::{LoopbackServer, TransportRs232};

fn registry() -> DriverRegistry {
    default_registry().unwrap()
}

fn field(name: &str, value: FieldValue) -> (String, FieldValue) {
    (name.to_string(), value)
}

// =============================================================================
// SR570
// =============================================================================

const CRLF: &[u8] = b"\r\n";

fn sr570_database(extra: Vec<(String, FieldValue)>) -> (RecordDatabase, RecordId, MockTransport) {
    let registry = registry();
    let mut db = RecordDatabase::new();
    let line = db
        .create_record(&registry, "line", "transport_rs232", Vec::new())
        .unwrap();
    let mut fields = vec![field("rs232", FieldValue::Record("line".into()))];
    fields.extend(extra);
    let amp = db.create_record(&registry, "amp", "sr570", fields).unwrap();

    let mock = MockTransport::new();
    let transport = mock.clone();
    db.with_type_state_mut::<TransportRs232, _>(line, "attach", move |l| {
        l.attach(Box::new(transport))
    })
    .unwrap();
    (db, amp, mock)
}

#[test]
fn test_sr570_open_resets_and_configures() {
    let (mut db, amp, mock) = sr570_database(Vec::new());
    let report = db.initialize();
    assert!(report.is_success(), "{:?}", report.failures);

    assert_eq!(
        mock.written_lines(CRLF),
        vec![
            "*RST", "SUCM 0", "IOUC 0", "SENS 18", "IOON 0", "BSLV 0", "BSON 0", "FLTT 5",
            "LFRQ 15", "HFRQ 0", "GNMD 0", "INVT 0", "BLNK 0",
        ]
    );
    assert_eq!(amplifier::get_gain(&mut db, amp).unwrap(), 1.0e6);
}

#[test]
fn test_sr570_gain_is_rounded_to_available_sensitivity() {
    let (mut db, amp, mock) = sr570_database(Vec::new());
    assert!(db.initialize().is_success());
    let opened = mock.written_lines(CRLF).len();

    let applied = amplifier::set_gain(&mut db, amp, 3.0e7).unwrap();
    assert_eq!(applied, 2.0e7);
    assert_eq!(mock.written_lines(CRLF)[opened..], ["SENS 14", "IOON 0"]);
}

#[test]
fn test_sr570_offset_enables_input_offset_current() {
    let (mut db, amp, mock) = sr570_database(vec![field("gain", FieldValue::Float(2.0e7))]);
    assert!(db.initialize().is_success());
    let opened = mock.written_lines(CRLF).len();

    let applied = amplifier::set_offset(&mut db, amp, 0.02).unwrap();
    assert!((applied - 0.02).abs() < 1e-12, "offset {}", applied);
    assert_eq!(mock.written_lines(CRLF)[opened..], ["IOLV 9", "IOSN 0", "IOON 1"]);

    let opened = mock.written_lines(CRLF).len();
    amplifier::set_offset(&mut db, amp, 0.0).unwrap();
    assert_eq!(mock.written_lines(CRLF)[opened..], ["IOON 0"]);
}

#[test]
fn test_sr570_out_of_range_gain_keeps_previous_value() {
    let (mut db, amp, mock) = sr570_database(Vec::new());
    assert!(db.initialize().is_success());
    let opened = mock.written_lines(CRLF).len();

    let err = amplifier::set_gain(&mut db, amp, 1.0).unwrap_err();
    assert_eq!(err.kind, ErrorKind::IllegalArgument);
    assert_eq!(amplifier::get_gain(&mut db, amp).unwrap(), 1.0e6);
    assert_eq!(mock.written_lines(CRLF).len(), opened);

    let err = amplifier::set_time_constant(&mut db, amp, 0.1).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unsupported);
}

#[test]
fn test_sr570_rejects_bias_voltage_past_five_volts() {
    let (mut db, _amp, _mock) = sr570_database(vec![field("bias_voltage", FieldValue::Float(6.0))]);
    let report = db.initialize();
    let failure = report.failure("amp").unwrap();
    assert_eq!(failure.stage, "open");
    assert_eq!(failure.error.kind, ErrorKind::WouldExceedLimit);
}

#[test]
fn test_sr570_without_a_line_transport_fails_open() {
    let registry = registry();
    let mut db = RecordDatabase::new();
    db.create_record(&registry, "line", "transport_rs232", Vec::new())
        .unwrap();
    db.create_record(
        &registry,
        "amp",
        "sr570",
        vec![field("rs232", FieldValue::Record("line".into()))],
    )
    .unwrap();

    let report = db.initialize();
    assert_eq!(report.failure("line").unwrap().error.kind, ErrorKind::NotReady);
    assert!(report.failure("amp").is_some());
}

// =============================================================================
// Network waveform output
// =============================================================================

fn network_wvout_database() -> (RecordDatabase, RecordId, RecordId) {
    let registry = registry();
    let mut db = RecordDatabase::new();
    let server = db
        .create_record(&registry, "peer", "loopback_server", Vec::new())
        .unwrap();
    let wvout = db
        .create_record(
            &registry,
            "wv",
            "network_wvout",
            vec![
                field("server", FieldValue::Record("peer".into())),
                field("remote_record_name", FieldValue::Str("wvout1".into())),
                field("maximum_num_channels", FieldValue::Int(2)),
                field("maximum_num_steps", FieldValue::Int(4)),
            ],
        )
        .unwrap();
    (db, server, wvout)
}

#[test]
fn test_network_wvout_write_selects_channel_before_data() {
    let (mut db, server, wvout) = network_wvout_database();
    let client = RecordingClient::new();
    let peer = client.clone();
    db.with_type_state_mut::<LoopbackServer, _>(server, "attach", move |s| {
        s.attach_client(Box::new(peer))
    })
    .unwrap();
    assert!(db.initialize().is_success());

    waveform_output::write_channel(&mut db, wvout, 1, &[1.0, 2.0]).unwrap();
    assert_eq!(
        client.calls(),
        vec![
            RemoteCall::Put {
                field: "wvout1.channel_index".into(),
                value: FieldValue::Int(1),
            },
            RemoteCall::PutArray {
                field: "wvout1.channel_data".into(),
                value: FieldValue::FloatArray(vec![1.0, 2.0, 0.0, 0.0]),
                dims: vec![4],
            },
        ]
    );
}

#[test]
fn test_network_wvout_read_uses_remote_step_count() {
    let (mut db, server, wvout) = network_wvout_database();
    let client = RecordingClient::new();
    client.set("wvout1.current_num_steps", FieldValue::Int(2));
    client.set("wvout1.channel_data", FieldValue::FloatArray(vec![5.0, 6.0]));
    client.set("wvout1.busy", FieldValue::Bool(true));
    let peer = client.clone();
    db.with_type_state_mut::<LoopbackServer, _>(server, "attach", move |s| {
        s.attach_client(Box::new(peer))
    })
    .unwrap();
    assert!(db.initialize().is_success());

    assert_eq!(waveform_output::read_channel(&mut db, wvout, 0).unwrap(), vec![5.0, 6.0]);
    let fields: Vec<String> = client.calls().iter().map(|c| c.field().to_string()).collect();
    assert_eq!(
        fields,
        ["wvout1.channel_index", "wvout1.current_num_steps", "wvout1.channel_data"]
    );
    assert!(matches!(
        client.calls().last(),
        Some(RemoteCall::GetArray { dims, .. }) if dims == &vec![2]
    ));

    assert!(waveform_output::busy(&mut db, wvout).unwrap());
}

#[test]
fn test_network_wvout_propagates_peer_failures() {
    let (mut db, server, wvout) = network_wvout_database();
    let client = RecordingClient::new();
    client.fail("wvout1.arm", MxError::device_io("remote_put", "peer went away"));
    let peer = client.clone();
    db.with_type_state_mut::<LoopbackServer, _>(server, "attach", move |s| {
        s.attach_client(Box::new(peer))
    })
    .unwrap();
    assert!(db.initialize().is_success());

    let err = waveform_output::arm(&mut db, wvout).unwrap_err();
    assert_eq!(err.kind, ErrorKind::DeviceIo);
}

#[test]
fn test_network_wvout_drives_soft_wvout_on_field_server() {
    let registry = registry();

    let mut peer_db = RecordDatabase::new();
    peer_db
        .create_record(
            &registry,
            "wvout1",
            "soft_wvout",
            vec![
                field("maximum_num_channels", FieldValue::Int(2)),
                field("maximum_num_steps", FieldValue::Int(4)),
            ],
        )
        .unwrap();
    assert!(peer_db.initialize().is_success());
    let field_server = Arc::new(Mutex::new(FieldServer::new(peer_db)));

    let (mut db, server, wvout) = network_wvout_database();
    let shared = Arc::clone(&field_server);
    db.with_type_state_mut::<LoopbackServer, _>(server, "attach", move |s| {
        s.attach_field_server(shared)
    })
    .unwrap();
    assert!(db.initialize().is_success());

    waveform_output::write_channel(&mut db, wvout, 1, &[1.0, 2.0]).unwrap();
    assert_eq!(
        waveform_output::read_channel(&mut db, wvout, 1).unwrap(),
        vec![1.0, 2.0, 0.0, 0.0]
    );

    waveform_output::set_parameter(&mut db, wvout, WaveformParameter::Frequency, 100.0).unwrap();
    assert_eq!(
        waveform_output::get_parameter(&mut db, wvout, WaveformParameter::Frequency).unwrap(),
        100.0
    );

    waveform_output::start(&mut db, wvout).unwrap();
    assert!(waveform_output::busy(&mut db, wvout).unwrap());
    waveform_output::stop(&mut db, wvout).unwrap();
    assert!(!waveform_output::busy(&mut db, wvout).unwrap());
}
