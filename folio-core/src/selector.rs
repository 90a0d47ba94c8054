//! Type filters for listings.

use crate::EntryType;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Which entry types a listing returns.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntrySelector: u32 {
        const FOLDER = 1 << 0;
        const WORKSHEET = 1 << 1;
        const VIEWSHEET = 1 << 2;
        const SNAPSHOT = 1 << 3;
        const DASHBOARD = 1 << 4;
        const QUERY = 1 << 5;
        const SCRIPT = 1 << 6;
        const TABLE_STYLE = 1 << 7;
        const LIBRARY = 1 << 8;
        const SCHEDULE_TASK = 1 << 9;
        const DATA_SOURCE = 1 << 10;
        const DATA_MODEL = 1 << 11;
        const PHYSICAL = 1 << 12;
        const BOOKMARK = 1 << 13;

        const REPORTS = Self::WORKSHEET.bits()
            | Self::VIEWSHEET.bits()
            | Self::SNAPSHOT.bits()
            | Self::DASHBOARD.bits();
        const COMPONENTS = Self::SCRIPT.bits() | Self::TABLE_STYLE.bits() | Self::LIBRARY.bits();
    }
}

impl EntrySelector {
    /// The flag an entry type is selected by.
    pub fn for_type(entry_type: EntryType) -> Self {
        match entry_type {
            t if t.is_folder() => EntrySelector::FOLDER,
            EntryType::Worksheet => EntrySelector::WORKSHEET,
            EntryType::Viewsheet => EntrySelector::VIEWSHEET,
            EntryType::ViewsheetSnapshot => EntrySelector::SNAPSHOT,
            EntryType::Dashboard => EntrySelector::DASHBOARD,
            EntryType::Query => EntrySelector::QUERY,
            EntryType::Script => EntrySelector::SCRIPT,
            EntryType::TableStyle => EntrySelector::TABLE_STYLE,
            EntryType::Library => EntrySelector::LIBRARY,
            EntryType::ScheduleTask => EntrySelector::SCHEDULE_TASK,
            EntryType::DataSource => EntrySelector::DATA_SOURCE,
            EntryType::ViewsheetBookmark => EntrySelector::BOOKMARK,
            EntryType::PhysicalTable | EntryType::PhysicalColumn => EntrySelector::PHYSICAL,
            _ => EntrySelector::DATA_MODEL,
        }
    }

    pub fn matches(&self, entry_type: EntryType) -> bool {
        self.intersects(Self::for_type(entry_type))
    }
}

impl Default for EntrySelector {
    fn default() -> Self {
        EntrySelector::all()
    }
}
