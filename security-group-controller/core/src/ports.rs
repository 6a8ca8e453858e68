use crate::RuleError;
use std::{fmt, num::NonZeroU16};

/// An inclusive range of ports. A single port is a range where `min == max`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortRange {
    pub min: NonZeroU16,
    pub max: NonZeroU16,
}

// === impl PortRange ===

impl PortRange {
    pub fn single(port: NonZeroU16) -> Self {
        Self {
            min: port,
            max: port,
        }
    }

    pub fn is_single(&self) -> bool {
        self.min == self.max
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            return self.min.fmt(f);
        }
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Parses a rule's port string: a single port, a comma separated list of
/// ports, or a single `low-high` range.
///
/// Each list entry yields its own single-port range, in the order given.
pub fn parse_ports(s: &str) -> Result<Vec<PortRange>, RuleError> {
    if s.contains(',') && s.contains('-') {
        return Err(RuleError::MixedPortSyntax(s.to_string()));
    }

    if let Some((lo, hi)) = s.split_once('-') {
        let min = parse_port(lo)?;
        let max = parse_port(hi)?;
        if min > max {
            return Err(RuleError::InvalidPortRange(s.to_string()));
        }
        return Ok(vec![PortRange { min, max }]);
    }

    s.split(',')
        .map(|p| parse_port(p).map(PortRange::single))
        .collect()
}

/// Parses a port number in [1, 65535] written without a sign, surrounding
/// whitespace, or leading zeros.
fn parse_port(s: &str) -> Result<NonZeroU16, RuleError> {
    let invalid = || RuleError::InvalidPort(s.to_string());
    if s.starts_with('0') || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    s.parse::<NonZeroU16>().map_err(|_| invalid())
}
