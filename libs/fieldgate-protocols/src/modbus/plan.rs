//! Read-plan builder: catalog registers to minimal contiguous FC03 ranges
//!
//! Pure and I/O-free. Address-style detection is fixed per device for the
//! lifetime of one poll, then registers are coalesced per slave into ranges
//! bounded by the 125-register protocol limit.

use super::constants::MAX_REGISTERS_PER_READ;
use super::types::{AddressStyle, RegisterDef, SlaveIndex};

/// One register placed at its protocol address.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedItem {
    pub protocol_address: u16,
    pub register: RegisterDef,
}

/// One contiguous read: `count` registers from `start`, serving `items`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRange {
    pub start: u16,
    pub count: u16,
    pub items: Vec<PlannedItem>,
}

/// All reads planned against one unit id.
#[derive(Debug, Clone, PartialEq)]
pub struct SlaveReadPlan {
    pub unit_id: SlaveIndex,
    pub ranges: Vec<ReadRange>,
}

/// Resolve the address style for a device.
///
/// An explicitly configured style wins. Otherwise, one register at or above
/// 40001 makes the whole device 40001-based; a device that never reaches
/// 40001 is treated as 1-based.
pub fn detect_address_style(
    explicit: Option<AddressStyle>,
    addresses: impl IntoIterator<Item = i32>,
) -> AddressStyle {
    if let Some(style) = explicit {
        return style;
    }
    if addresses.into_iter().any(|address| address >= 40001) {
        AddressStyle::Offset40001
    } else {
        AddressStyle::OneBased
    }
}

/// Build the read plan for one device.
///
/// Registers whose protocol address falls outside `0..=0xFFFF` cannot be
/// read over the wire and are dropped from the plan.
pub fn build_read_plan(
    explicit_style: Option<AddressStyle>,
    slaves: &[(SlaveIndex, Vec<RegisterDef>)],
) -> Vec<SlaveReadPlan> {
    let style = detect_address_style(
        explicit_style,
        slaves
            .iter()
            .flat_map(|(_, registers)| registers.iter().map(|r| r.address)),
    );

    slaves
        .iter()
        .map(|(unit_id, registers)| {
            let mut items: Vec<PlannedItem> = registers
                .iter()
                .filter_map(|register| {
                    let address = style.to_protocol_address(register.address);
                    let protocol_address = u16::try_from(address).ok()?;
                    Some(PlannedItem {
                        protocol_address,
                        register: register.clone(),
                    })
                })
                .collect();
            items.sort_by_key(|item| item.protocol_address);

            SlaveReadPlan {
                unit_id: *unit_id,
                ranges: coalesce(items),
            }
        })
        .filter(|plan| !plan.ranges.is_empty())
        .collect()
}

fn range_end(item: &PlannedItem) -> u32 {
    item.protocol_address as u32 + item.register.length.max(1) as u32 - 1
}

fn coalesce(items: Vec<PlannedItem>) -> Vec<ReadRange> {
    let mut ranges = Vec::new();
    let mut iter = items.into_iter();

    let Some(first) = iter.next() else {
        return ranges;
    };

    let mut start = first.protocol_address;
    let mut end = range_end(&first);
    let mut current = vec![first];

    for item in iter {
        let item_end = range_end(&item);
        let contiguous = item.protocol_address as u32 <= end + 1;
        let span = item_end.max(end) - start as u32 + 1;

        if contiguous && span <= MAX_REGISTERS_PER_READ as u32 {
            end = end.max(item_end);
            current.push(item);
        } else {
            ranges.push(emit(start, end, std::mem::take(&mut current)));
            start = item.protocol_address;
            end = item_end;
            current.push(item);
        }
    }
    ranges.push(emit(start, end, current));

    ranges
}

fn emit(start: u16, end: u32, items: Vec<PlannedItem>) -> ReadRange {
    let count = (end - start as u32 + 1).min(MAX_REGISTERS_PER_READ as u32) as u16;
    ReadRange {
        start,
        count,
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::types::RegisterKind;
    use uuid::Uuid;

    fn register(address: i32, length: u16) -> RegisterDef {
        RegisterDef {
            address,
            length,
            kind: if length >= 2 {
                RegisterKind::Float32
            } else {
                RegisterKind::U16
            },
            scale: 1.0,
            word_swap: false,
            signal_id: Some(Uuid::new_v4()),
        }
    }

    fn plan_for(registers: Vec<RegisterDef>) -> Vec<ReadRange> {
        let plans = build_read_plan(None, &[(1, registers)]);
        assert_eq!(plans.len(), 1);
        plans.into_iter().next().expect("one slave").ranges
    }

    #[test]
    fn test_detect_style_explicit_wins() {
        let style = detect_address_style(Some(AddressStyle::ZeroBased), vec![40001]);
        assert_eq!(style, AddressStyle::ZeroBased);
    }

    #[test]
    fn test_detect_style_heuristic() {
        assert_eq!(
            detect_address_style(None, vec![3, 40002]),
            AddressStyle::Offset40001
        );
        assert_eq!(
            detect_address_style(None, vec![3, 200]),
            AddressStyle::OneBased
        );
    }

    #[test]
    fn test_coalescing_scenario() {
        // Catalog: 40001 len 1, 40002 len 2, 40005 len 1
        // Expect protocol ranges (0, 3) and (4, 1).
        let ranges = plan_for(vec![
            register(40001, 1),
            register(40002, 2),
            register(40005, 1),
        ]);

        assert_eq!(ranges.len(), 2);
        assert_eq!((ranges[0].start, ranges[0].count), (0, 3));
        assert_eq!(ranges[0].items.len(), 2);
        assert_eq!((ranges[1].start, ranges[1].count), (4, 1));
        assert_eq!(ranges[1].items.len(), 1);
    }

    #[test]
    fn test_adjacent_registers_merge() {
        // 40001 len 2 covers protocol 0..=1; 40003 starts exactly at end + 1.
        let ranges = plan_for(vec![register(40001, 2), register(40003, 1)]);
        assert_eq!(ranges.len(), 1);
        assert_eq!((ranges[0].start, ranges[0].count), (0, 3));
    }

    #[test]
    fn test_gap_splits_ranges() {
        let ranges = plan_for(vec![register(40001, 1), register(40010, 1)]);
        assert_eq!(ranges.len(), 2);
        assert_eq!((ranges[0].start, ranges[0].count), (0, 1));
        assert_eq!((ranges[1].start, ranges[1].count), (9, 1));
    }

    #[test]
    fn test_125_register_boundary() {
        // 126 contiguous single-word registers must split into 125 + 1.
        let registers: Vec<RegisterDef> =
            (0..126).map(|i| register(40001 + i, 1)).collect();
        let ranges = plan_for(registers);

        assert_eq!(ranges.len(), 2);
        assert_eq!((ranges[0].start, ranges[0].count), (0, 125));
        assert_eq!(ranges[0].items.len(), 125);
        assert_eq!((ranges[1].start, ranges[1].count), (125, 1));
    }

    #[test]
    fn test_plan_invariants() {
        let registers = vec![
            register(40001, 2),
            register(40002, 1), // overlaps the float above
            register(40050, 2),
            register(40120, 1),
            register(40121, 2),
        ];
        let ranges = plan_for(registers);

        let mut previous_end: Option<u32> = None;
        for range in &ranges {
            assert!((1..=125).contains(&range.count));
            let range_start = range.start as u32;
            let last = range_start + range.count as u32 - 1;
            if let Some(prev) = previous_end {
                assert!(range_start > prev, "ranges must be disjoint and increasing");
            }
            for item in &range.items {
                let item_start = item.protocol_address as u32;
                let item_end = item_start + item.register.length as u32 - 1;
                assert!(item_start >= range_start && item_end <= last);
            }
            previous_end = Some(last);
        }
    }

    #[test]
    fn test_overlapping_registers_share_window() {
        let ranges = plan_for(vec![register(40001, 2), register(40002, 1)]);
        assert_eq!(ranges.len(), 1);
        assert_eq!((ranges[0].start, ranges[0].count), (0, 2));
        assert_eq!(ranges[0].items.len(), 2);
    }

    #[test]
    fn test_out_of_range_addresses_dropped() {
        let plans = build_read_plan(
            Some(AddressStyle::ZeroBased),
            &[(1, vec![register(-5, 1), register(70000, 1)])],
        );
        assert!(plans.is_empty());
    }

    #[test]
    fn test_multiple_slaves() {
        let plans = build_read_plan(
            None,
            &[
                (1, vec![register(40001, 1)]),
                (2, vec![register(40001, 1), register(40002, 1)]),
            ],
        );

        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].unit_id, 1);
        assert_eq!(plans[1].unit_id, 2);
        assert_eq!((plans[1].ranges[0].start, plans[1].ranges[0].count), (0, 2));
    }
}
