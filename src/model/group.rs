use serde::{Deserialize, Serialize};

use crate::model::definition::{GroupId, ProcessDefinition};

/// Named set of definitions started and stopped together.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessGroup {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub sort_order: i32,
    /// Start this group when the supervisor launches.
    pub auto_start_on_launch: bool,
    pub processes: Vec<ProcessDefinition>,
}

impl Default for ProcessGroup {
    fn default() -> Self {
        Self {
            id: GroupId::new(),
            name: String::new(),
            description: String::new(),
            sort_order: 0,
            auto_start_on_launch: false,
            processes: Vec::new(),
        }
    }
}

impl ProcessGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a definition, stamping it with this group's id.
    pub fn with_process(mut self, def: ProcessDefinition) -> Self {
        self.processes.push(def.with_group(self.id));
        self
    }

    /// Definitions flagged to auto-start, in sort order.
    pub fn auto_start(&self) -> Vec<&ProcessDefinition> {
        let mut defs: Vec<&ProcessDefinition> = self
            .processes
            .iter()
            .filter(|d| d.auto_start_with_group)
            .collect();
        defs.sort_by_key(|d| d.sort_order);
        defs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_start_filters_and_sorts() {
        let mut b = ProcessDefinition::new("b", "true", "");
        b.sort_order = 2;
        let mut a = ProcessDefinition::new("a", "true", "");
        a.sort_order = 1;
        let skipped = ProcessDefinition::new("c", "true", "").with_auto_start(false);

        let group = ProcessGroup::new("g")
            .with_process(b)
            .with_process(a)
            .with_process(skipped);

        let names: Vec<&str> = group.auto_start().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(group.processes.iter().all(|d| d.group_id == Some(group.id)));
    }
}
