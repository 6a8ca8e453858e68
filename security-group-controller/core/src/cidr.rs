use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("range start {start} must not be greater than range end {end}")]
pub struct InvertedRange {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
}

/// Decomposes the inclusive address range `[start, end]` into the minimal
/// list of CIDR blocks that cover it exactly, in ascending order.
///
/// Each step emits the largest block that is aligned on the current start
/// address and does not extend past `end`.
pub fn range_to_cidrs(start: Ipv4Addr, end: Ipv4Addr) -> Result<Vec<Ipv4Net>, InvertedRange> {
    if start > end {
        return Err(InvertedRange { start, end });
    }

    // Widened so that advancing past 255.255.255.255 cannot overflow.
    let mut cursor = u64::from(u32::from(start));
    let end = u64::from(u32::from(end));

    let mut nets = Vec::new();
    while cursor <= end {
        let align = if cursor == 0 {
            32
        } else {
            cursor.trailing_zeros().min(32)
        };
        let fit = 63 - (end - cursor + 1).leading_zeros();
        let host_bits = align.min(fit);

        let addr = Ipv4Addr::from(cursor as u32);
        let net = Ipv4Net::new(addr, (32 - host_bits) as u8).expect("prefix length must be <= 32");
        nets.push(net);

        cursor += 1 << host_bits;
    }

    Ok(nets)
}
