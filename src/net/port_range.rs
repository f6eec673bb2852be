//! Passive transfer port range
//!
//! Parses the `start-end` text used to bound FTP passive data ports.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::error::InvalidPortRange;

/// A validated port interval with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// Parse `start-end`. Exactly one dash, two base-10 numbers, and a
    /// strictly increasing pair; anything else is [`InvalidPortRange`].
    pub fn parse(text: &str) -> Result<Self, InvalidPortRange> {
        let segments: Vec<&str> = text.split('-').collect();
        if segments.len() != 2 {
            return Err(InvalidPortRange);
        }

        let start = parse_port(segments[0])?;
        let end = parse_port(segments[1])?;

        if start >= end {
            return Err(InvalidPortRange);
        }

        Ok(Self { start, end })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    /// Number of ports in the range, both bounds included
    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    /// Ports offered for passive transfers, both bounds included
    pub fn ports(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }
}

fn parse_port(segment: &str) -> Result<u16, InvalidPortRange> {
    // u16's parser tolerates a leading '+', plain digits only here
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InvalidPortRange);
    }
    segment.parse::<u16>().map_err(|_| InvalidPortRange)
}

impl FromStr for PortRange {
    type Err = InvalidPortRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
