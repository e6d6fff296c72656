//! Per-stream bookkeeping carried from input buffers to output buffers

use std::collections::VecDeque;

use omx_core::{BufferHeader, MarkData, MarkTarget};

#[derive(Debug, Default)]
pub struct StreamTracker {
    /// Marks from MarkBuffer waiting for the next input buffer
    queued_marks: VecDeque<MarkData>,
    /// Marks for downstream components waiting for an output buffer
    output_marks: VecDeque<MarkData>,
    /// Timestamp and tick count of each accepted input, oldest first
    timestamps: VecDeque<(i64, u32)>,
}

impl StreamTracker {
    pub fn queue_mark(&mut self, mark: MarkData) {
        self.queued_marks.push_back(mark);
    }

    /// An input buffer reached the component
    pub fn input_accepted(&mut self, header: &mut BufferHeader) {
        if header.mark.is_none() {
            header.mark = self.queued_marks.pop_front();
        }
        if header.filled_len > 0 {
            self.timestamps
                .push_back((header.timestamp, header.tick_count));
        }
    }

    /// An input buffer came back from the bridge. Returns a mark addressed
    /// to this component, which the caller reports as `EventMark`.
    pub fn input_consumed(&mut self, header: &mut BufferHeader) -> Option<MarkData> {
        let mark = header.mark.take()?;
        match mark.target {
            MarkTarget::ThisComponent => Some(mark),
            MarkTarget::Downstream(_) => {
                self.output_marks.push_back(mark);
                None
            }
        }
    }

    /// An output buffer came back from the bridge
    pub fn output_produced(&mut self, header: &mut BufferHeader) {
        if header.filled_len == 0 {
            return;
        }
        if let Some((timestamp, ticks)) = self.timestamps.pop_front() {
            header.timestamp = timestamp;
            header.tick_count = ticks;
        }
        if let Some(mark) = self.output_marks.pop_front() {
            header.mark = Some(mark);
        }
    }

    /// Input side was flushed; nothing accepted so far will produce output
    pub fn reset_input(&mut self) {
        self.timestamps.clear();
        self.output_marks.clear();
    }

    pub fn reset(&mut self) {
        self.queued_marks.clear();
        self.reset_input();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omx_core::{BufferId, BufferMemory, Direction, SpecVersion};

    fn header(port: Direction, filled: usize) -> BufferHeader {
        let mut h = BufferHeader::new(
            BufferId { port, serial: 0 },
            BufferMemory::Borrowed(vec![0; 16]),
            SpecVersion::COMPONENT,
        );
        h.filled_len = filled;
        h
    }

    #[test]
    fn test_timestamps_follow_fifo_order() {
        let mut tracker = StreamTracker::default();
        for ts in [100, 200] {
            let mut input = header(Direction::Input, 8);
            input.timestamp = ts;
            tracker.input_accepted(&mut input);
        }
        let mut out = header(Direction::Output, 4);
        tracker.output_produced(&mut out);
        assert_eq!(out.timestamp, 100);
        let mut out = header(Direction::Output, 4);
        tracker.output_produced(&mut out);
        assert_eq!(out.timestamp, 200);
    }

    #[test]
    fn test_marks() {
        let mut tracker = StreamTracker::default();
        tracker.queue_mark(MarkData::for_self(1));
        tracker.queue_mark(MarkData::downstream(9, 2));

        let mut first = header(Direction::Input, 8);
        tracker.input_accepted(&mut first);
        let mut second = header(Direction::Input, 8);
        tracker.input_accepted(&mut second);

        assert_eq!(
            tracker.input_consumed(&mut first),
            Some(MarkData::for_self(1))
        );
        assert_eq!(tracker.input_consumed(&mut second), None);

        let mut out = header(Direction::Output, 4);
        tracker.output_produced(&mut out);
        assert_eq!(out.mark, Some(MarkData::downstream(9, 2)));
    }

    #[test]
    fn test_empty_output_keeps_queue() {
        let mut tracker = StreamTracker::default();
        let mut input = header(Direction::Input, 8);
        input.timestamp = 42;
        tracker.input_accepted(&mut input);

        let mut empty = header(Direction::Output, 0);
        tracker.output_produced(&mut empty);
        assert_eq!(empty.timestamp, 0);

        let mut out = header(Direction::Output, 4);
        tracker.output_produced(&mut out);
        assert_eq!(out.timestamp, 42);
    }
}
