//! Analysis zone construction
//!
//! - **builder**: radius buffer plus elevation band mask around a point
//! - **flow_split**: upstream / downstream sub-zones along the nearest waterway
//! - **dam_check**: distance from each dam to the waterway network

mod builder;
mod dam_check;
mod flow_split;

pub use builder::{build_zone, build_zones, zone_mask, ZoneConfig};
pub use dam_check::{validate_dams, DamCheckConfig, DamDistance, DamPolicy};
pub use flow_split::{split_flowline, split_zone, FlowSplit, FlowSplitConfig, SplitZones};
