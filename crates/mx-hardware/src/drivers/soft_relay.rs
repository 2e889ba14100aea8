//! Simulated relay or shutter.
//!
//! With a nonzero `switching_time_ms` the relay reports
//! [`RelayStatus::Unknown`] until that long after each command, like a
//! shutter blade in transit.

use std::time::{Duration, Instant};

use mx_core::class::relay::{RelayCommand, RelayOps, RelayState, RelayStatus};
use mx_core::{
    DriverContext, DriverDescriptor, FieldBlock, FieldDescriptor, FieldFlags, FieldKind,
    RecordClass, RecordDriver, Result,
};
use tracing::debug;

#[derive(Debug, Default)]
pub struct SoftRelay {
    pub switching_time_ms: u64,
    settled_at: Option<Instant>,
}

mx_core::field_accessors!(SoftRelay { "switching_time_ms" => switching_time_ms });

impl SoftRelay {
    pub const FIELDS: &'static [FieldDescriptor] = &[FieldDescriptor::new(
        "switching_time_ms",
        FieldKind::UInt,
        FieldBlock::Type,
    )
    .flags(FieldFlags::IN_DESCRIPTION)];

    pub fn descriptor() -> DriverDescriptor {
        DriverDescriptor::new("soft_relay", RecordClass::Relay, Self::FIELDS, || {
            Box::<SoftRelay>::default()
        })
    }
}

impl RecordDriver for SoftRelay {
    fn as_relay(&mut self) -> Option<&mut dyn RelayOps> {
        Some(self)
    }
}

impl RelayOps for SoftRelay {
    fn relay_command(&mut self, cx: &mut DriverContext<'_>, _state: &RelayState, command: RelayCommand) -> Result<()> {
        debug!("'{}' {:?}", cx.record_name(), command);
        self.settled_at = Some(cx.now() + Duration::from_millis(self.switching_time_ms));
        Ok(())
    }

    fn get_relay_status(&mut self, cx: &mut DriverContext<'_>, state: &RelayState) -> Result<RelayStatus> {
        match self.settled_at {
            Some(at) if cx.now() < at => Ok(RelayStatus::Unknown),
            _ => Ok(state.command().into()),
        }
    }
}
