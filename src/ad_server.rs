//! Ad server inventory: the live slots registered on the page.
use std::sync::Arc;

use crate::sizes::Size;

/// A size registered on an ad server slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotSize {
    /// A rectangular size.
    Fixed(Size),
    /// "Fluid" size without width or height.
    Fluid,
}

impl From<Size> for SlotSize {
    fn from(value: Size) -> Self {
        SlotSize::Fixed(value)
    }
}

/// A live ad server slot (e.g., a GPT slot).
pub trait AdServerSlot: Send + Sync {
    /// Full ad unit path, e.g. `/1234/homepage/top`.
    fn ad_unit_path(&self) -> String;

    /// Id of the page element the slot renders into.
    fn element_id(&self) -> String;

    fn sizes(&self) -> Vec<SlotSize>;
}

/// Query for the slots currently registered on the ad server.
pub trait AdServer {
    fn slots(&self) -> Vec<Arc<dyn AdServerSlot>>;
}

/// Used when no ad server is configured. Reports no slots.
pub(crate) struct NoAdServer;
impl AdServer for NoAdServer {
    fn slots(&self) -> Vec<Arc<dyn AdServerSlot>> {
        Vec::new()
    }
}

impl<T: Fn() -> Vec<Arc<dyn AdServerSlot>>> AdServer for T {
    fn slots(&self) -> Vec<Arc<dyn AdServerSlot>> {
        self()
    }
}

/// Rectangular sizes registered on `slot`. Fluid sizes are skipped.
pub(crate) fn slot_sizes(slot: &dyn AdServerSlot) -> Vec<Size> {
    slot.sizes()
        .into_iter()
        .filter_map(|size| match size {
            SlotSize::Fixed(size) => Some(size),
            SlotSize::Fluid => {
                log::warn!(target: "ppi",
                           ad_unit_path:display = slot.ad_unit_path(),
                           element_id:display = slot.element_id();
                           "skipping fluid ad size for ad server slot");
                None
            }
        })
        .collect()
}
