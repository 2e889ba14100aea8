//! Port-I/O interfaces: an address space of 8-bit I/O ports.

use crate::context::DriverContext;
use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::record::RecordDriver;
use crate::types::{RecordClass, RecordId};

const CLASS: RecordClass = RecordClass::PortIo;

/// Operation slots of a port-I/O interface.
pub trait PortIoOps {
    fn inp8(&mut self, _cx: &mut DriverContext<'_>, _port: u64) -> Result<u8> {
        Err(MxError::unsupported(CLASS, "inp8"))
    }

    fn outp8(&mut self, _cx: &mut DriverContext<'_>, _port: u64, _value: u8) -> Result<()> {
        Err(MxError::unsupported(CLASS, "outp8"))
    }
}

fn contract<'a>(driver: &'a mut dyn RecordDriver, operation: &str) -> Result<&'a mut dyn PortIoOps> {
    driver
        .as_port_io()
        .ok_or_else(|| super::missing_contract(CLASS, operation))
}

/// Reads one byte from `port`.
pub fn inp8(db: &mut RecordDatabase, id: RecordId, port: u64) -> Result<u8> {
    const OP: &str = "inp8";
    db.dispatch(id, CLASS, OP, |cx, _, driver| contract(driver, OP)?.inp8(cx, port))
}

/// Writes one byte to `port`.
pub fn outp8(db: &mut RecordDatabase, id: RecordId, port: u64, value: u8) -> Result<()> {
    const OP: &str = "outp8";
    db.dispatch(id, CLASS, OP, |cx, _, driver| {
        contract(driver, OP)?.outp8(cx, port, value)
    })
}
