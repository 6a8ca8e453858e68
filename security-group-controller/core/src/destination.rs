use crate::{cidr, RuleError};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// Parses a rule destination into the network blocks it covers.
///
/// A bare address becomes a `/32`. A CIDR is passed through as written, host
/// bits included. An inclusive `start-end` range is decomposed into its
/// minimal CIDR cover.
pub fn parse_destination(s: &str) -> Result<Vec<Ipv4Net>, RuleError> {
    let invalid = || RuleError::InvalidDestination(s.to_string());

    if let Some((start, end)) = s.split_once('-') {
        let start = start.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        let end = end.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        return Ok(cidr::range_to_cidrs(start, end)?);
    }

    if s.contains('/') {
        let net = s.parse::<Ipv4Net>().map_err(|_| invalid())?;
        if net.prefix_len() == 0 {
            return Err(invalid());
        }
        return Ok(vec![net]);
    }

    let addr = s.parse::<Ipv4Addr>().map_err(|_| invalid())?;
    Ok(vec![Ipv4Net::from(addr)])
}
