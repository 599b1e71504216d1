//! Run Timeline
//!
//! Tracks node start/end times during a run for timing reports. Nodes in
//! a loop are entered many times, so timings accumulate per node.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Node started executing
    Started,
    /// Node and its routing finished
    Completed,
    /// Node, its routing, or the engine failed
    Failed,
}

/// A single event in the run timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    /// ID of the node
    pub node_id: String,
    /// Type of event
    pub event_type: EventType,
    /// When the event occurred
    pub timestamp: Instant,
}

/// Accumulated timing of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeTiming {
    /// Number of times the node was entered
    pub visits: usize,
    /// Total time spent in the node
    pub total: Duration,
}

/// Records when each node of a run starts and finishes.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Records an event for a node.
    pub fn add_event(&mut self, node_id: impl Into<String>, event_type: EventType) {
        self.events.push(TimelineEvent {
            node_id: node_id.into(),
            event_type,
            timestamp: Instant::now(),
        });
    }

    /// Returns all recorded events.
    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Returns the total elapsed time since timeline creation.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Number of node executions started.
    pub fn steps(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type == EventType::Started)
            .count()
    }

    /// Returns visit counts and accumulated durations per node.
    ///
    /// A start without a matching end counts as a visit with no time.
    pub fn node_timings(&self) -> HashMap<String, NodeTiming> {
        let mut open: HashMap<&str, Instant> = HashMap::new();
        let mut timings: HashMap<String, NodeTiming> = HashMap::new();

        for event in &self.events {
            match event.event_type {
                EventType::Started => {
                    open.insert(&event.node_id, event.timestamp);
                    timings.entry(event.node_id.clone()).or_default().visits += 1;
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(start) = open.remove(event.node_id.as_str()) {
                        timings.entry(event.node_id.clone()).or_default().total +=
                            event.timestamp.duration_since(start);
                    }
                }
            }
        }

        timings
    }

    /// Renders a per-node timing table, slowest node first.
    pub fn summary(&self) -> String {
        let mut output = String::from("Node timings:\n");

        let mut timings: Vec<_> = self.node_timings().into_iter().collect();
        timings.sort_by(|a, b| b.1.total.cmp(&a.1.total).then_with(|| a.0.cmp(&b.0)));

        for (node_id, timing) in timings {
            output.push_str(&format!(
                "  {:16} {:>5} visit(s) {:>8.2?}\n",
                truncate(&node_id, 16),
                timing.visits,
                timing.total
            ));
        }

        output.push_str(&format!("  Total: {:.2?}\n", self.elapsed()));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncates a string to a maximum length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timeline_creation() {
        let timeline = ExecutionTimeline::new();
        assert!(timeline.get_events().is_empty());
        assert_eq!(timeline.steps(), 0);
    }

    #[test]
    fn test_timings_accumulate_across_visits() {
        let mut timeline = ExecutionTimeline::new();
        for _ in 0..3 {
            timeline.add_event("body", EventType::Started);
            thread::sleep(Duration::from_millis(5));
            timeline.add_event("body", EventType::Completed);
        }

        let timings = timeline.node_timings();
        assert_eq!(timings["body"].visits, 3);
        assert!(timings["body"].total >= Duration::from_millis(15));
        assert_eq!(timeline.steps(), 3);
    }

    #[test]
    fn test_failed_event_closes_visit() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("a", EventType::Started);
        thread::sleep(Duration::from_millis(5));
        timeline.add_event("a", EventType::Failed);

        let timings = timeline.node_timings();
        assert!(timings["a"].total >= Duration::from_millis(5));
        assert_eq!(timeline.get_events()[1].event_type, EventType::Failed);
    }

    #[test]
    fn test_unfinished_visit_has_no_time() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("a", EventType::Started);

        let timings = timeline.node_timings();
        assert_eq!(timings["a"].visits, 1);
        assert_eq!(timings["a"].total, Duration::ZERO);
    }

    #[test]
    fn test_summary_lists_nodes() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event("extract", EventType::Started);
        timeline.add_event("extract", EventType::Completed);
        timeline.add_event("a_very_long_node_identifier", EventType::Started);
        timeline.add_event("a_very_long_node_identifier", EventType::Completed);

        let summary = timeline.summary();
        assert!(summary.contains("extract"));
        assert!(summary.contains("a_very_long_n..."));
        assert!(summary.contains("Total:"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 12), "short");
        assert_eq!(truncate("exactly_twelv", 13), "exactly_twelv");
        assert_eq!(truncate("much_longer_than_that", 10), "much_lo...");
    }
}
