use std::collections::HashMap;

/// Per-rule counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleStat {
    pub name: String,
    pub filter: Option<String>,
    pub found: u64,
    pub processed: u64,
    pub labeled: u64,
    pub marked_important: u64,
    pub archived: u64,
    pub errors: Vec<String>,
}

impl RuleStat {
    pub fn new(name: impl Into<String>, filter: Option<String>) -> Self {
        Self {
            name: name.into(),
            filter,
            ..Default::default()
        }
    }
}

/// Counter increments for one (record, rule) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatEvent {
    Found,
    Processed,
    Labeled,
    MarkedImportant,
    Archived,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub found: u64,
    pub processed: u64,
    pub labeled: u64,
    pub marked_important: u64,
    pub archived: u64,
}

impl RunTotals {
    pub fn from_stats<'a>(stats: impl IntoIterator<Item = &'a RuleStat>) -> Self {
        stats.into_iter().fold(Self::default(), |mut totals, stat| {
            totals.found += stat.found;
            totals.processed += stat.processed;
            totals.labeled += stat.labeled;
            totals.marked_important += stat.marked_important;
            totals.archived += stat.archived;
            totals
        })
    }
}

/// Sums per-rule counters, keyed by rule name, in rule configuration order.
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    stats: Vec<RuleStat>,
    index: HashMap<String, usize>,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule so it shows up in the output even with zero matches.
    pub fn register(&mut self, name: &str, filter: Option<String>) {
        if self.index.contains_key(name) {
            return;
        }
        self.index.insert(name.to_string(), self.stats.len());
        self.stats.push(RuleStat::new(name, filter));
    }

    fn entry(&mut self, name: &str) -> &mut RuleStat {
        self.register(name, None);
        let position = self.index[name];
        &mut self.stats[position]
    }

    pub fn record(&mut self, name: &str, event: StatEvent) {
        let stat = self.entry(name);
        match event {
            StatEvent::Found => stat.found += 1,
            StatEvent::Processed => stat.processed += 1,
            StatEvent::Labeled => stat.labeled += 1,
            StatEvent::MarkedImportant => stat.marked_important += 1,
            StatEvent::Archived => stat.archived += 1,
        }
    }

    pub fn record_error(&mut self, name: &str, error: impl Into<String>) {
        self.entry(name).errors.push(error.into());
    }

    pub fn totals(&self) -> RunTotals {
        RunTotals::from_stats(&self.stats)
    }

    pub fn into_stats(self) -> Vec<RuleStat> {
        self.stats
    }
}
