//! Device identity and device-tree node view
//!
//! Parsing the device tree is the host's job. The test only needs the
//! compatible strings of the node it was bound to and the ordered list of
//! `memory-region` references, each naming a reserved-memory child node:
//!
//! ```text
//! reserved-memory {
//!     rmem_reserved: reserved@80000000 { reg = <0x80000000 0x100000>; };
//!     rmem_fixed:    fixed@90000000    { reg = <0x90000000 0x10000>; no-map; };
//! };
//!
//! transfer-test {
//!     compatible = "test-rmem-transfer";
//!     memory-region = <&rmem_reserved>, <&rmem_fixed>;
//! };
//! ```

/// Identity of a device in the host's driver model.
///
/// DMA channels belong to the DMA controller's device; coherent
/// allocations are always made on behalf of a specific device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceId(pub u32);

/// Parsed view of a device-tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceNode {
    /// Node name, used as the log prefix
    pub name: &'static str,
    /// `compatible` property, most specific first
    pub compatible: &'static [&'static str],
    /// `memory-region` references, in property order
    pub memory_regions: &'static [&'static str],
}

impl DeviceNode {
    /// Create a node view
    pub const fn new(
        name: &'static str,
        compatible: &'static [&'static str],
        memory_regions: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            compatible,
            memory_regions,
        }
    }

    /// Check whether any `compatible` entry equals `compat`
    pub fn is_compatible(&self, compat: &str) -> bool {
        self.compatible.iter().any(|c| *c == compat)
    }

    /// Name of the reserved-memory node referenced at `index`
    pub fn memory_region(&self, index: usize) -> Option<&'static str> {
        self.memory_regions.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE: DeviceNode = DeviceNode::new(
        "transfer-test",
        &["vendor,soc-rmem-test", "test-rmem-transfer"],
        &["rmem_reserved", "rmem_fixed"],
    );

    #[test]
    fn compatible_matches_any_entry() {
        assert!(NODE.is_compatible("test-rmem-transfer"));
        assert!(NODE.is_compatible("vendor,soc-rmem-test"));
        assert!(!NODE.is_compatible("test-rmem"));
    }

    #[test]
    fn memory_regions_are_indexed_in_order() {
        assert_eq!(NODE.memory_region(0), Some("rmem_reserved"));
        assert_eq!(NODE.memory_region(1), Some("rmem_fixed"));
        assert_eq!(NODE.memory_region(2), None);
    }
}
