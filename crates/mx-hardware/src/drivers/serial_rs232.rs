//! RS-232 record on a local serial port.

use mx_core::class::rs232::Rs232Ops;
use mx_core::{
    ClassState, DriverContext, DriverDescriptor, FieldBlock, FieldDescriptor, FieldFlags,
    FieldKind, MxError, RecordClass, RecordDriver, Result,
};
use tracing::info;

use super::line_transport::TransportSlot;
use crate::serial::SerialTransport;

#[derive(Debug)]
pub struct SerialRs232 {
    pub port_name: String,
    pub baud_rate: u32,
    slot: TransportSlot,
}

impl Default for SerialRs232 {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 9600,
            slot: TransportSlot::default(),
        }
    }
}

mx_core::field_accessors!(SerialRs232 {
    "port_name" => port_name,
    "baud_rate" => baud_rate,
});

impl SerialRs232 {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("port_name", FieldKind::Str, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION.union(FieldFlags::IN_SUMMARY)),
        FieldDescriptor::new("baud_rate", FieldKind::UInt, FieldBlock::Type)
            .flags(FieldFlags::IN_DESCRIPTION),
    ];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("serial_rs232", RecordClass::Rs232, Self::FIELDS, || {
            Box::<SerialRs232>::default()
        })
    }
}

impl RecordDriver for SerialRs232 {
    fn finish_record_initialization(
        &mut self,
        _cx: &mut DriverContext<'_>,
        _class: &mut ClassState,
    ) -> Result<()> {
        if self.port_name.trim().is_empty() {
            return Err(MxError::illegal_argument(
                "finish_record_initialization",
                "serial port name is empty",
            ));
        }
        Ok(())
    }

    fn open(&mut self, cx: &mut DriverContext<'_>, class: &mut ClassState) -> Result<()> {
        let timeout = class.rs232("open")?.timeout();
        let transport = SerialTransport::open(&self.port_name, self.baud_rate, timeout)
            .map_err(|e| e.in_record(cx.record_name()))?;
        info!("'{}' opened {} at {} baud", cx.record_name(), self.port_name, self.baud_rate);
        self.slot.attach(Box::new(transport));
        Ok(())
    }

    fn close(&mut self, _cx: &mut DriverContext<'_>, _class: &mut ClassState) -> Result<()> {
        self.slot.detach();
        Ok(())
    }

    fn as_rs232(&mut self) -> Option<&mut dyn Rs232Ops> {
        Some(&mut self.slot)
    }
}
