use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

/// Something that needs `height` contiguous lanes over `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaneItem {
    pub id: u32,
    pub start: u64,
    pub end: u64,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LaneSlot {
    pub id: u32,
    pub lane_start: u32,
    pub lane_height: u32,
    pub start: u64,
    pub end: u64,
}

/// Placement order: start ascending, taller first on equal starts, then id.
pub fn layout_order(a: &LaneItem, b: &LaneItem) -> Ordering {
    a.start
        .cmp(&b.start)
        .then_with(|| b.height.cmp(&a.height))
        .then_with(|| a.id.cmp(&b.id))
}

/// Greedy first-fit lane allocator.
///
/// `frontiers[j]` is the end coordinate of the last item placed on lane `j`.
/// A lane is free for an item once its frontier is at or before the item's
/// start; lanes past the end of the vector are always free.
#[derive(Clone, Debug, Default)]
pub struct LanePacker {
    frontiers: Vec<u64>,
}

impl LanePacker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lane_count(&self) -> u32 {
        self.frontiers.len() as u32
    }

    pub fn frontiers(&self) -> &[u64] {
        &self.frontiers
    }

    fn busy(&self, lane: usize, start: u64) -> bool {
        self.frontiers.get(lane).is_some_and(|f| *f > start)
    }

    /// First lane index where `height` consecutive lanes are free at `start`.
    pub fn first_fit(&self, start: u64, height: u32) -> u32 {
        let h = height.max(1) as usize;
        let mut i = 0usize;
        'search: loop {
            for j in i..i + h {
                if self.busy(j, start) {
                    // Every candidate up to j overlaps lane j as well.
                    i = j + 1;
                    continue 'search;
                }
            }
            return i as u32;
        }
    }

    /// Places an item and advances the frontiers it occupies.
    pub fn place(&mut self, start: u64, end: u64, height: u32) -> u32 {
        debug_assert!(height > 0, "lane items must be at least one lane tall");
        debug_assert!(end > start, "lane items must have positive width");
        let i = self.first_fit(start, height) as usize;
        let top = i + height.max(1) as usize;
        if self.frontiers.len() < top {
            self.frontiers.resize(top, 0);
        }
        for f in &mut self.frontiers[i..top] {
            *f = end;
        }
        i as u32
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaneLayout {
    pub slots: Vec<LaneSlot>, // placement order
    pub lane_count: u32,
    lookup: HashMap<u32, usize>,
}

impl LaneLayout {
    pub fn slot(&self, id: u32) -> Option<&LaneSlot> {
        self.lookup.get(&id).map(|i| &self.slots[*i])
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Assigns every item a lane range. The result depends only on the set of
/// items, not on the order they are given in.
pub fn pack<I>(items: I) -> LaneLayout
where
    I: IntoIterator<Item = LaneItem>,
{
    let mut items: Vec<LaneItem> = items.into_iter().collect();
    items.sort_by(layout_order);
    let mut packer = LanePacker::new();
    let mut slots = Vec::with_capacity(items.len());
    let mut lookup = HashMap::with_capacity(items.len());
    for it in items {
        let lane_start = packer.place(it.start, it.end, it.height);
        lookup.insert(it.id, slots.len());
        slots.push(LaneSlot {
            id: it.id,
            lane_start,
            lane_height: it.height,
            start: it.start,
            end: it.end,
        });
    }
    LaneLayout {
        slots,
        lane_count: packer.lane_count(),
        lookup,
    }
}
