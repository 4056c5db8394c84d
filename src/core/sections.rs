//! Time-bucket (section) validation for order and slot keys.
//!
//! Sections are user-configurable; a key minted against a since-removed
//! section must be dropped before it reaches a merge decision, never kept
//! "just in case".

use std::collections::BTreeSet;

use super::day::DayState;

/// Source of the currently configured section names.
pub trait SectionProvider {
    fn section_names(&self) -> Vec<String>;
}

/// Fixed section list, for tests and hosts with static configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticSections(pub Vec<String>);

impl StaticSections {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }
}

impl SectionProvider for StaticSections {
    fn section_names(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// Separator between an order key's base and its section suffix.
pub const ORDER_KEY_SEPARATOR: &str = "::";

/// The bucket for tasks not placed into any configured section. Always valid.
pub const UNPLACED_SECTION: &str = "none";

/// Snapshot of the configured sections, answering key validity.
#[derive(Clone, Debug)]
pub struct SectionValidator {
    names: BTreeSet<String>,
}

impl SectionValidator {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_provider(provider: &dyn SectionProvider) -> Self {
        Self::new(provider.section_names())
    }

    pub fn is_known_section(&self, name: &str) -> bool {
        name == UNPLACED_SECTION || self.names.contains(name)
    }

    /// An order key is valid when it carries no section suffix, or its suffix
    /// names a configured section.
    pub fn is_valid_order_key(&self, key: &str) -> bool {
        match key.rsplit_once(ORDER_KEY_SEPARATOR) {
            Some((_, suffix)) => self.is_known_section(suffix),
            None => true,
        }
    }

    /// A slot override is valid when its value names a configured section.
    pub fn is_valid_slot(&self, value: &str) -> bool {
        self.is_known_section(value)
    }

    /// Drop order/slot entries referencing unconfigured sections.
    ///
    /// Returns whether anything was removed.
    pub fn sanitize_day(&self, day: &mut DayState) -> bool {
        let before = day.orders.len()
            + day.order_meta.len()
            + day.slot_overrides.len()
            + day.slot_meta.len();

        day.orders.retain(|key, _| self.is_valid_order_key(key));
        day.order_meta.retain(|key, _| self.is_valid_order_key(key));
        day.slot_overrides
            .retain(|_, value| self.is_valid_slot(value));
        day.slot_meta
            .retain(|_, meta| self.is_valid_slot(&meta.value));

        let after = day.orders.len()
            + day.order_meta.len()
            + day.slot_overrides.len()
            + day.slot_meta.len();
        after != before
    }
}
