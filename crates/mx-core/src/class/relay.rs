//! Relays, shutters and other two-position switches.

use serde::{Deserialize, Serialize};

use crate::context::DriverContext;
use crate::database::RecordDatabase;
use crate::error::{MxError, Result};
use crate::field::{FieldBlock, FieldDescriptor, FieldFlags, FieldKind, FieldValue};
use crate::record::RecordDriver;
use crate::types::{RecordClass, RecordId};

use super::argument;

const CLASS: RecordClass = RecordClass::Relay;

/// Requested relay position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayCommand {
    Close,
    Open,
}

impl RelayCommand {
    pub fn code(self) -> i64 {
        match self {
            RelayCommand::Close => 0,
            RelayCommand::Open => 1,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(RelayCommand::Close),
            1 => Ok(RelayCommand::Open),
            other => Err(MxError::illegal_argument(
                "relay_command",
                format!("relay command {} is neither close (0) nor open (1)", other),
            )),
        }
    }
}

/// Reported relay position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayStatus {
    Closed,
    Open,
    /// Neither position is confirmed, e.g. while a shutter is moving.
    Unknown,
}

impl RelayStatus {
    pub fn code(self) -> i64 {
        match self {
            RelayStatus::Closed => 0,
            RelayStatus::Open => 1,
            RelayStatus::Unknown => 2,
        }
    }
}

impl From<RelayCommand> for RelayStatus {
    fn from(command: RelayCommand) -> Self {
        match command {
            RelayCommand::Close => RelayStatus::Closed,
            RelayCommand::Open => RelayStatus::Open,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayState {
    pub relay_command: i64,
    pub relay_status: i64,
}

impl Default for RelayState {
    fn default() -> Self {
        Self {
            relay_command: RelayCommand::Open.code(),
            relay_status: RelayStatus::Unknown.code(),
        }
    }
}

crate::field_accessors!(RelayState {
    "relay_command" => relay_command,
    "relay_status" => relay_status,
});

impl RelayState {
    pub const FIELDS: &'static [FieldDescriptor] = &[
        FieldDescriptor::new("relay_command", FieldKind::Int, FieldBlock::Class)
            .flags(FieldFlags::IN_DESCRIPTION),
        FieldDescriptor::new("relay_status", FieldKind::Int, FieldBlock::Class).flags(
            FieldFlags::IN_DESCRIPTION
                .union(FieldFlags::IN_SUMMARY)
                .union(FieldFlags::READ_ONLY),
        ),
    ];

    /// The last command issued.
    pub fn command(&self) -> RelayCommand {
        RelayCommand::from_code(self.relay_command).unwrap_or(RelayCommand::Open)
    }
}

/// Operation slots of a relay.
pub trait RelayOps {
    fn relay_command(&mut self, _cx: &mut DriverContext<'_>, _state: &RelayState, _command: RelayCommand) -> Result<()> {
        Err(MxError::unsupported(CLASS, "relay_command"))
    }

    /// Default handler: the position last commanded.
    fn get_relay_status(&mut self, _cx: &mut DriverContext<'_>, state: &RelayState) -> Result<RelayStatus> {
        Ok(state.command().into())
    }
}

fn contract<'a>(driver: &'a mut dyn RecordDriver, operation: &str) -> Result<&'a mut dyn RelayOps> {
    driver
        .as_relay()
        .ok_or_else(|| super::missing_contract(CLASS, operation))
}

/// Opens or closes the relay.
pub fn relay_command(db: &mut RecordDatabase, id: RecordId, command: RelayCommand) -> Result<()> {
    const OP: &str = "relay_command";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.relay_mut(OP)?;
        contract(driver, OP)?.relay_command(cx, state, command)?;
        state.relay_command = command.code();
        Ok(())
    })
}

/// Position reported by the relay, which may still be moving.
pub fn get_relay_status(db: &mut RecordDatabase, id: RecordId) -> Result<RelayStatus> {
    const OP: &str = "get_relay_status";
    db.dispatch(id, CLASS, OP, |cx, class, driver| {
        let state = class.relay_mut(OP)?;
        let status = contract(driver, OP)?.get_relay_status(cx, state)?;
        state.relay_status = status.code();
        Ok(status)
    })
}

pub(crate) fn process_get(db: &mut RecordDatabase, id: RecordId, field: &str) -> Result<()> {
    match field {
        "relay_status" => get_relay_status(db, id).map(|_| ()),
        _ => Ok(()),
    }
}

pub(crate) fn process_put(db: &mut RecordDatabase, id: RecordId, field: &str, value: &FieldValue) -> Result<bool> {
    match field {
        "relay_command" => {
            let command = RelayCommand::from_code(argument(value, field)?)?;
            relay_command(db, id, command).map(|_| true)
        }
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes() {
        assert_eq!(RelayCommand::from_code(0).unwrap(), RelayCommand::Close);
        assert_eq!(RelayCommand::from_code(1).unwrap(), RelayCommand::Open);
        assert!(RelayCommand::from_code(7).is_err());
        assert_eq!(RelayStatus::from(RelayCommand::Close), RelayStatus::Closed);
    }
}
