use std::collections::{HashMap, HashSet};

/// Current metadata values per thread, fed in timestamp order.
///
/// A value stays in effect until the next update of the same field on the
/// same thread; nothing reverts automatically.
#[derive(Debug, Default)]
pub struct MetadataTracker {
    tasks: HashMap<i32, HashMap<String, String>>,
    seen: HashSet<String>,
}

impl MetadataTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, tid: i32, field: &str, value: &str) {
        let fields = self.tasks.entry(tid).or_default();
        match fields.get_mut(field) {
            Some(current) => {
                current.clear();
                current.push_str(value);
            }
            None => {
                fields.insert(field.to_string(), value.to_string());
            }
        }
        if !self.seen.contains(field) {
            self.seen.insert(field.to_string());
        }
    }

    pub fn current(&self, tid: i32, field: &str) -> Option<&str> {
        self.tasks
            .get(&tid)
            .and_then(|fields| fields.get(field))
            .map(String::as_str)
    }

    pub fn snapshot(&self, tid: i32, fields: &[String]) -> Vec<Option<String>> {
        fields
            .iter()
            .map(|field| self.current(tid, field).map(str::to_string))
            .collect()
    }

    /// Whether any thread ever set `field`.
    pub fn is_known(&self, field: &str) -> bool {
        self.seen.contains(field)
    }
}
