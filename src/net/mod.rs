//! Network utilities
//!
//! Listen-address expansion and the passive transfer port range.

pub mod bind;
pub mod port_range;

pub use bind::{InterfaceSource, NetInterface, SystemInterfaces, describe_address};
pub use port_range::PortRange;
