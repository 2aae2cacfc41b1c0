use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

use super::error::PgError;

pub const PORT_RANGE_LOW: u16 = 5450;
pub const PORT_RANGE_HIGH: u16 = 8542;

/// Find the lowest free port in `[PORT_RANGE_LOW, PORT_RANGE_HIGH)`, given
/// the set of ports the catalog already has allocated.
///
/// This is advisory, not atomic: the catalog lookup and the bind test below
/// happen without holding any lock against a second concurrent allocation,
/// so two callers can race and land on the same port. That's tolerated —
/// `pg_ctl start` fails loudly and the branch transitions to `FAILED`
/// rather than silently corrupting state.
pub fn allocate(taken: &[i32]) -> Result<u16, PgError> {
    for port in PORT_RANGE_LOW..PORT_RANGE_HIGH {
        if taken.contains(&i32::from(port)) {
            continue;
        }
        if port_is_free(port) {
            return Ok(port);
        }
    }
    Err(PgError::PortRangeExhausted { low: PORT_RANGE_LOW, high: PORT_RANGE_HIGH })
}

fn port_is_free(port: u16) -> bool {
    TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_ports_already_recorded_in_the_catalog() {
        let taken: Vec<i32> = (i32::from(PORT_RANGE_LOW)..i32::from(PORT_RANGE_LOW) + 3).collect();
        let port = allocate(&taken).unwrap();
        assert_eq!(port, PORT_RANGE_LOW + 3);
    }

    #[test]
    fn exhausted_range_is_reported() {
        let taken: Vec<i32> = (i32::from(PORT_RANGE_LOW)..i32::from(PORT_RANGE_HIGH)).collect();
        assert!(matches!(allocate(&taken), Err(PgError::PortRangeExhausted { .. })));
    }
}
