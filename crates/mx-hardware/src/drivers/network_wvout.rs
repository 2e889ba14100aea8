//! Waveform output on a peer process, reached through a network server record.
//!
//! The driver keeps no device state of its own. Each class operation is
//! translated into field reads and writes on `remote_record_name` at the peer:
//!
//! | Operation       | Remote calls                                                  |
//! |-----------------|---------------------------------------------------------------|
//! | `arm`           | put `arm` = true                                              |
//! | `trigger`       | put `trigger` = true                                          |
//! | `stop`          | put `stop` = true                                             |
//! | `busy`          | get `busy`                                                    |
//! | `read_channel`  | put `channel_index`, get `current_num_steps`, get `channel_data` |
//! | `write_channel` | put `channel_index`, put `channel_data`                       |
//! | parameters      | get/put `frequency`, `trigger_mode`, `trigger_repeat`         |

use mx_core::class::network_server;
use mx_core::class::waveform_output::{WaveformOutputOps, WaveformOutputState, WaveformParameter};
use mx_core::remote::RemoteField;
use mx_core::{
    DriverContext, DriverDescriptor, FieldBlock, FieldDescriptor, FieldFlags, FieldKind,
    FieldType, FieldValue, RecordClass, RecordDriver, RecordRef, RefRequirement, Result,
    Superclass,
};

#[derive(Debug, Default)]
pub struct NetworkWaveformOutput {
    pub server: RecordRef,
    pub remote_record_name: String,
}

mx_core::field_accessors!(NetworkWaveformOutput {
    "server" => server,
    "remote_record_name" => remote_record_name,
});

impl NetworkWaveformOutput {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new(
            "server",
            FieldKind::Record(RefRequirement::class(
                Superclass::Server,
                &[RecordClass::NetworkServer],
            )),
            FieldBlock::Type,
        )
        .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
        FieldDescriptor::new("remote_record_name", FieldKind::Str, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
    ];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new(
            "network_wvout",
            RecordClass::WaveformOutput,
            Self::FIELDS,
            || Box::<NetworkWaveformOutput>::default(),
        )
    }

    fn remote(&self, field: &str) -> RemoteField {
        RemoteField::new(self.remote_record_name.as_str(), field)
    }

    fn put(&self, cx: &mut DriverContext<'_>, field: &str, value: FieldValue) -> Result<()> {
        let server = self.server.id("put")?;
        network_server::put(cx.db(), server, &self.remote(field), value)
    }

    fn get<T: FieldType>(&self, cx: &mut DriverContext<'_>, field: &str, kind: FieldKind) -> Result<T> {
        let server = self.server.id("get")?;
        let value = network_server::get(cx.db(), server, &self.remote(field), kind)?;
        T::from_value(value, field)
    }
}

impl RecordDriver for NetworkWaveformOutput {
    fn as_waveform_output(&mut self) -> Option<&mut dyn WaveformOutputOps> {
        Some(self)
    }
}

impl WaveformOutputOps for NetworkWaveformOutput {
    fn arm(&mut self, cx: &mut DriverContext<'_>, _state: &WaveformOutputState) -> Result<()> {
        self.put(cx, "arm", FieldValue::Bool(true))
    }

    fn trigger(&mut self, cx: &mut DriverContext<'_>, _state: &WaveformOutputState) -> Result<()> {
        self.put(cx, "trigger", FieldValue::Bool(true))
    }

    fn stop(&mut self, cx: &mut DriverContext<'_>, _state: &WaveformOutputState) -> Result<()> {
        self.put(cx, "stop", FieldValue::Bool(true))
    }

    fn busy(&mut self, cx: &mut DriverContext<'_>, _state: &WaveformOutputState) -> Result<bool> {
        self.get(cx, "busy", FieldKind::Bool)
    }

    fn read_channel(
        &mut self,
        cx: &mut DriverContext<'_>,
        _state: &WaveformOutputState,
        channel: usize,
    ) -> Result<Vec<f64>> {
        const OP: &str = "read_channel";
        self.put(cx, "channel_index", FieldValue::Int(channel as i64))?;
        let num_steps: usize = self.get(cx, "current_num_steps", FieldKind::UInt)?;

        let server = self.server.id(OP)?;
        let value = network_server::get_array(
            cx.db(),
            server,
            &self.remote("channel_data"),
            FieldKind::Float,
            &[num_steps],
        )?;
        Vec::<f64>::from_value(value, "channel_data")
    }

    fn write_channel(
        &mut self,
        cx: &mut DriverContext<'_>,
        state: &WaveformOutputState,
        channel: usize,
        data: &[f64],
    ) -> Result<()> {
        const OP: &str = "write_channel";
        self.put(cx, "channel_index", FieldValue::Int(channel as i64))?;

        let server = self.server.id(OP)?;
        network_server::put_array(
            cx.db(),
            server,
            &self.remote("channel_data"),
            FieldValue::FloatArray(data.to_vec()),
            &[state.maximum_num_steps],
        )
    }

    fn get_parameter(
        &mut self,
        cx: &mut DriverContext<'_>,
        _state: &WaveformOutputState,
        parameter: WaveformParameter,
    ) -> Result<f64> {
        self.get(cx, parameter.field(), FieldKind::Float)
    }

    fn set_parameter(
        &mut self,
        cx: &mut DriverContext<'_>,
        _state: &WaveformOutputState,
        parameter: WaveformParameter,
        value: f64,
    ) -> Result<()> {
        let value = match parameter {
            WaveformParameter::Frequency => FieldValue::Float(value),
            WaveformParameter::TriggerMode | WaveformParameter::TriggerRepeat => {
                FieldValue::Int(value as i64)
            }
        };
        self.put(cx, parameter.field(), value)
    }
}
