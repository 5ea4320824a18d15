//! Bounded ring buffer of agent output lines.
//!
//! Each agent owns one [`OutputBuffer`]. The agent's I/O task is the single
//! writer; any number of observers (UI polling, the strategy layer, tests)
//! snapshot it concurrently. Both paths take the same mutex, but only for a
//! bounded push/copy -- nothing holds it across I/O.
//!
//! Eviction is FIFO: at capacity, appending drops the oldest line. This is
//! observability, not a durability-critical log; losing the oldest output is
//! the accepted trade for a bounded memory footprint.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Default number of retained lines when config doesn't override it.
pub const DEFAULT_BUFFER_CAPACITY: usize = 500;

/// Append-only-until-capacity ring of decoded output lines.
pub struct OutputBuffer {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl OutputBuffer {
    /// Create a buffer retaining at most `capacity` lines (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append one complete line, evicting the oldest line at capacity.
    ///
    /// Only whole decoded lines are appended, so readers can never observe
    /// a torn/partial line.
    pub fn append(&self, line: String) {
        let mut lines = self.lines.lock().unwrap();
        if lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Copy of the most recent `min(max_lines, len)` lines, oldest first.
    ///
    /// Non-mutating and non-blocking: returns immediately with whatever is
    /// buffered, never waiting for new output.
    pub fn snapshot(&self, max_lines: usize) -> Vec<String> {
        let lines = self.lines.lock().unwrap();
        let start = lines.len().saturating_sub(max_lines);
        lines.iter().skip(start).cloned().collect()
    }

    /// Number of lines currently retained.
    pub fn len(&self) -> usize {
        self.lines.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_snapshot_preserve_order() {
        let buf = OutputBuffer::new(10);
        for i in 0..5 {
            buf.append(format!("line {i}"));
        }
        assert_eq!(
            buf.snapshot(100),
            vec!["line 0", "line 1", "line 2", "line 3", "line 4"]
        );
    }

    #[test]
    fn snapshot_returns_tail() {
        let buf = OutputBuffer::new(10);
        for i in 0..10 {
            buf.append(format!("line {i}"));
        }
        assert_eq!(buf.snapshot(3), vec!["line 7", "line 8", "line 9"]);
    }

    #[test]
    fn eviction_retains_most_recent_in_order() {
        let buf = OutputBuffer::new(4);
        for i in 0..9 {
            buf.append(format!("line {i}"));
        }
        assert_eq!(buf.len(), 4);
        assert_eq!(
            buf.snapshot(100),
            vec!["line 5", "line 6", "line 7", "line 8"]
        );
    }

    #[test]
    fn snapshot_of_empty_buffer_is_empty_not_error() {
        let buf = OutputBuffer::new(8);
        assert!(buf.snapshot(10).is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn snapshot_does_not_consume() {
        let buf = OutputBuffer::new(8);
        buf.append("once".to_string());
        assert_eq!(buf.snapshot(10).len(), 1);
        assert_eq!(buf.snapshot(10).len(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let buf = OutputBuffer::new(0);
        buf.append("kept".to_string());
        assert_eq!(buf.snapshot(10), vec!["kept"]);
    }
}
