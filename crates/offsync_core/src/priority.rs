//! Priority rules mapping collections to processing classes.

use offsync_protocol::{PriorityClass, PriorityRule};

/// Ordered lookup table of [`PriorityRule`]s.
///
/// Rules are static configuration, not journaled state. The table is
/// consulted when ordering eligible queue heads: class first, then the
/// rule's position in the table, so two collections in the same class
/// still have a stable relative order.
#[derive(Debug, Clone)]
pub struct PriorityTable {
    rules: Vec<PriorityRule>,
}

impl PriorityTable {
    /// Builds a table from explicit rules, reassigning `order` to match
    /// their position.
    #[must_use]
    pub fn new(mut rules: Vec<PriorityRule>) -> Self {
        for (index, rule) in rules.iter_mut().enumerate() {
            rule.order = index as u32;
        }
        Self { rules }
    }

    /// Resolves a collection to its class and rule order.
    ///
    /// Collections without a rule fall in `Normal`, after every ruled
    /// collection of that class.
    #[must_use]
    pub fn class_for(&self, collection: &str) -> (PriorityClass, u32) {
        self.rules
            .iter()
            .find(|rule| rule.collection == collection)
            .map(|rule| (rule.priority, rule.order))
            .unwrap_or((PriorityClass::Normal, self.rules.len() as u32))
    }

    /// Returns the rules in table order.
    #[must_use]
    pub fn rules(&self) -> &[PriorityRule] {
        &self.rules
    }
}

impl Default for PriorityTable {
    /// The stock rule set for a construction-site deployment.
    fn default() -> Self {
        Self::new(vec![
            PriorityRule::new("safety_incidents", PriorityClass::Critical, 0, "life safety reports"),
            PriorityRule::new("daily_logs", PriorityClass::High, 1, "daily site logs"),
            PriorityRule::new("inspections", PriorityClass::High, 2, "inspection results"),
            PriorityRule::new("material_orders", PriorityClass::Normal, 3, "material requisitions"),
            PriorityRule::new("timesheets", PriorityClass::Normal, 4, "crew timesheets"),
            PriorityRule::new("photos", PriorityClass::Low, 5, "site photos"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_for_follows_table_order() {
        let table = PriorityTable::default();
        assert_eq!(table.class_for("safety_incidents").0, PriorityClass::Critical);
        let (daily_class, daily_order) = table.class_for("daily_logs");
        let (inspection_class, inspection_order) = table.class_for("inspections");
        assert_eq!(daily_class, inspection_class);
        assert!(daily_order < inspection_order);
    }

    #[test]
    fn unruled_collection_is_normal_and_last() {
        let table = PriorityTable::default();
        let (class, order) = table.class_for("punch_lists");
        assert_eq!(class, PriorityClass::Normal);
        assert!(order >= table.rules().len() as u32 - 1);
    }

    #[test]
    fn new_reassigns_order_from_position() {
        let rule_a = PriorityRule::new("a", PriorityClass::Low, 99, "");
        let rule_b = PriorityRule::new("b", PriorityClass::Low, 7, "");
        let table = PriorityTable::new(vec![rule_a, rule_b]);
        assert_eq!(table.class_for("a"), (PriorityClass::Low, 0));
        assert_eq!(table.class_for("b"), (PriorityClass::Low, 1));
    }
}
