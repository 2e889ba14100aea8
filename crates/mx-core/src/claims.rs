//! Exclusive claims on shared bus resources.
//!
//! A device driver claims the interface record (or the port range) it drives
//! during `open`; the database releases every claim a record holds when the
//! record is closed. A second claim on a held resource fails with
//! `IllegalArgument` naming the current owner.

use std::collections::HashMap;

use crate::error::{MxError, Result};
use crate::types::RecordId;

/// A claimable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Exclusive use of a whole interface record.
    Record(RecordId),
    /// A range of addresses on a port-I/O record.
    PortRange {
        portio: RecordId,
        base: u64,
        len: u64,
    },
    /// One addressable channel (port, register) of an interface record.
    Channel { interface: RecordId, channel: u32 },
}

impl Resource {
    fn overlaps(&self, other: &Resource) -> bool {
        match (self, other) {
            (Resource::Record(a), Resource::Record(b)) => a == b,
            (
                Resource::PortRange { portio: pa, base: ba, len: la },
                Resource::PortRange { portio: pb, base: bb, len: lb },
            ) => pa == pb && *ba < bb.saturating_add(*lb) && *bb < ba.saturating_add(*la),
            (Resource::Channel { interface: a, .. }, Resource::Record(b))
            | (Resource::Record(b), Resource::Channel { interface: a, .. }) => a == b,
            (
                Resource::Channel { interface: ia, channel: ca },
                Resource::Channel { interface: ib, channel: cb },
            ) => ia == ib && ca == cb,
            _ => false,
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Record(id) => write!(f, "record {}", id),
            Resource::PortRange { portio, base, len } => {
                write!(f, "ports {:#x}..{:#x} of record {}", base, base.saturating_add(*len), portio)
            }
            Resource::Channel { interface, channel } => {
                write!(f, "channel {} of record {}", channel, interface)
            }
        }
    }
}

/// Table of held claims.
#[derive(Debug, Default)]
pub struct ResourceClaims {
    held: HashMap<Resource, RecordId>,
}

impl ResourceClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `resource` for `owner`. Re-claiming one's own resource is a no-op.
    pub fn claim(&mut self, owner: RecordId, resource: Resource) -> Result<()> {
        if let Some((held, holder)) = self
            .held
            .iter()
            .find(|(held, holder)| held.overlaps(&resource) && **holder != owner)
        {
            return Err(MxError::illegal_argument(
                "claim",
                format!(
                    "{} is already claimed by record {} (conflicts with {})",
                    resource, holder, held
                ),
            ));
        }
        self.held.insert(resource, owner);
        Ok(())
    }

    pub fn release(&mut self, owner: RecordId, resource: Resource) {
        if self.held.get(&resource) == Some(&owner) {
            self.held.remove(&resource);
        }
    }

    /// Releases every claim of `owner`, returning how many there were.
    pub fn release_all(&mut self, owner: RecordId) -> usize {
        let before = self.held.len();
        self.held.retain(|_, holder| *holder != owner);
        before - self.held.len()
    }

    pub fn holder(&self, resource: &Resource) -> Option<RecordId> {
        self.held
            .iter()
            .find(|(held, _)| held.overlaps(resource))
            .map(|(_, holder)| *holder)
    }

    pub fn count_for(&self, owner: RecordId) -> usize {
        self.held.values().filter(|h| **h == owner).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_exclusive_record_claim() {
        let mut claims = ResourceClaims::new();
        claims.claim(RecordId(1), Resource::Record(RecordId(0))).unwrap();
        claims.claim(RecordId(1), Resource::Record(RecordId(0))).unwrap();
        let err = claims
            .claim(RecordId(2), Resource::Record(RecordId(0)))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
        assert_eq!(claims.release_all(RecordId(1)), 1);
        claims.claim(RecordId(2), Resource::Record(RecordId(0))).unwrap();
    }

    #[test]
    fn test_channels_conflict_with_whole_record() {
        let mut claims = ResourceClaims::new();
        let bus = RecordId(0);
        claims
            .claim(RecordId(1), Resource::Channel { interface: bus, channel: 0 })
            .unwrap();
        claims
            .claim(RecordId(2), Resource::Channel { interface: bus, channel: 1 })
            .unwrap();
        assert!(claims
            .claim(RecordId(3), Resource::Channel { interface: bus, channel: 1 })
            .is_err());
        assert!(claims.claim(RecordId(3), Resource::Record(bus)).is_err());
        assert_eq!(
            claims.holder(&Resource::Channel { interface: bus, channel: 0 }),
            Some(RecordId(1))
        );
    }

    #[test]
    fn test_port_ranges_overlap() {
        let mut claims = ResourceClaims::new();
        let portio = RecordId(0);
        claims
            .claim(RecordId(1), Resource::PortRange { portio, base: 0x300, len: 4 })
            .unwrap();
        claims
            .claim(RecordId(2), Resource::PortRange { portio, base: 0x304, len: 4 })
            .unwrap();
        assert!(claims
            .claim(RecordId(3), Resource::PortRange { portio, base: 0x302, len: 4 })
            .is_err());
        assert!(claims
            .claim(
                RecordId(3),
                Resource::PortRange { portio: RecordId(9), base: 0x300, len: 4 }
            )
            .is_ok());
    }
}
