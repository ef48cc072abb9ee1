//! Stream reassembler: raw text chunks in, validated records out
//!
//! The transport delivers chunks with no alignment to line boundaries: a chunk
//! may end mid-token, hold several lines, or split a `\r\n` pair. Bytes are
//! carried over between `feed` calls and only complete lines are parsed, so
//! feeding a stream in one call or in arbitrary pieces yields the same
//! records in the same order.
//!
//! Line handling:
//! - blank lines are dropped
//! - `#` / `$` control lines are dropped from the data path and kept for
//!   observability
//! - the column header the device re-sends per batch is dropped
//! - 10 tokens parse as a record; 11 tokens drop the leading timestamp
//! - anything else (wrong count, bad token, NaN/inf) drops the line only
//! - a line longer than `max_line_bytes` is dropped whether it arrived whole
//!   or in pieces

use crate::types::{Record, FIELD_NAMES, RECORD_ARITY};
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// How many recent control lines are retained
const CONTROL_LINE_HISTORY: usize = 32;

/// A rejection is summarized at warn level every this many rejections
const REJECTION_WARN_INTERVAL: u64 = 100;

/// Header tokens recognized besides the 10 data field names
const EXTRA_HEADER_FIELDS: [&str; 4] = ["t_s", "timestamp", "label", "trial_id"];

/// Reassembler configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReassemblerConfig {
    /// Field delimiter
    pub delimiter: char,
    /// A partial line longer than this without a terminator is discarded
    pub max_line_bytes: usize,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            max_line_bytes: 1024,
        }
    }
}

/// Counters exposed for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReassemblerStats {
    pub bytes_fed: u64,
    pub lines_accepted: u64,
    pub lines_rejected: u64,
    pub headers_skipped: u64,
    pub control_lines: u64,
}

/// Why a complete line was discarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRejection {
    /// Token count was neither 10 nor 11
    FieldCount { found: usize },
    /// Token at this position is not a number
    NotNumeric { token: usize },
    /// Token at this position parsed to NaN or infinity
    NonFinite { token: usize },
    /// Line exceeded the configured maximum length, complete or not
    Oversized { bytes: usize },
}

impl std::fmt::Display for LineRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineRejection::FieldCount { found } => write!(
                f,
                "expected {} or {} fields, found {}",
                RECORD_ARITY,
                RECORD_ARITY + 1,
                found
            ),
            LineRejection::NotNumeric { token } => write!(f, "token {} is not numeric", token),
            LineRejection::NonFinite { token } => write!(f, "token {} is not finite", token),
            LineRejection::Oversized { bytes } => write!(f, "line of {} bytes exceeds the length limit", bytes),
        }
    }
}

/// Classification of one complete line
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Record(Record),
    Blank,
    Control(String),
    Header,
    Rejected(LineRejection),
}

/// Chunk-tolerant line reassembler with an output record queue
///
/// Single-owner; wrap in [`crate::stream::RecordSource`] to share between a
/// producer task and a consumer task.
#[derive(Debug)]
pub struct StreamReassembler {
    config: ReassemblerConfig,
    /// Bytes of the current, not yet terminated line
    carry: Vec<u8>,
    /// Drop bytes up to the next terminator (carry-over was discarded mid-line)
    resync: bool,
    active: bool,
    output: VecDeque<Record>,
    control_lines: VecDeque<String>,
    stats: ReassemblerStats,
}

impl StreamReassembler {
    pub fn new(config: ReassemblerConfig) -> Self {
        Self {
            config,
            carry: Vec::new(),
            resync: false,
            active: true,
            output: VecDeque::new(),
            control_lines: VecDeque::new(),
            stats: ReassemblerStats::default(),
        }
    }

    /// Append a chunk and process every complete line in it
    ///
    /// Returns the number of records enqueued by this call. Never blocks and
    /// never fails: malformed input only increments rejection counters.
    pub fn feed(&mut self, chunk: &[u8]) -> usize {
        self.stats.bytes_fed += chunk.len() as u64;
        let before = self.output.len();

        let mut line_start = 0;
        for (i, &byte) in chunk.iter().enumerate() {
            if byte != b'\n' && byte != b'\r' {
                continue;
            }

            let segment = &chunk[line_start..i];
            if self.resync {
                // The line under the carry-over was already lost; resume after it
                self.resync = false;
                self.carry.clear();
            } else if self.carry.len() + segment.len() > self.config.max_line_bytes {
                // Same limit as the carry-over guard below, whatever the chunking
                let bytes = self.carry.len() + segment.len();
                self.carry.clear();
                self.record_rejection(&LineRejection::Oversized { bytes }, "");
            } else {
                self.carry.extend_from_slice(segment);
                let line = std::mem::take(&mut self.carry);
                self.process_line(&line);
            }
            line_start = i + 1;
        }

        if !self.resync {
            self.carry.extend_from_slice(&chunk[line_start..]);
            if self.carry.len() > self.config.max_line_bytes {
                let bytes = self.carry.len();
                self.carry.clear();
                self.resync = true;
                self.record_rejection(&LineRejection::Oversized { bytes }, "");
            }
        }

        self.output.len().saturating_sub(before)
    }

    /// Parse one complete line without touching reassembler state
    pub fn parse_line(&self, line: &str) -> LineOutcome {
        let line = line.trim();
        if line.is_empty() {
            return LineOutcome::Blank;
        }
        if line.starts_with('#') || line.starts_with('$') {
            return LineOutcome::Control(line.to_string());
        }

        let tokens: Vec<&str> = line.split(self.config.delimiter).map(str::trim).collect();

        if is_header(&tokens) {
            return LineOutcome::Header;
        }

        let fields = match tokens.len() {
            n if n == RECORD_ARITY => &tokens[..],
            n if n == RECORD_ARITY + 1 => &tokens[1..],
            found => return LineOutcome::Rejected(LineRejection::FieldCount { found }),
        };
        // Token positions in rejections refer to the original line
        let offset = tokens.len() - fields.len();

        let mut values = [0.0f32; RECORD_ARITY];
        for (i, token) in fields.iter().enumerate() {
            let value: f32 = match token.parse() {
                Ok(v) => v,
                Err(_) => return LineOutcome::Rejected(LineRejection::NotNumeric { token: i + offset }),
            };
            if !value.is_finite() {
                return LineOutcome::Rejected(LineRejection::NonFinite { token: i + offset });
            }
            values[i] = value;
        }

        match Record::new(values) {
            Ok(record) => LineOutcome::Record(record),
            Err(_) => LineOutcome::Rejected(LineRejection::NonFinite { token: offset }),
        }
    }

    fn process_line(&mut self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        match self.parse_line(&text) {
            LineOutcome::Record(record) => {
                self.stats.lines_accepted += 1;
                if self.active {
                    self.output.push_back(record);
                }
            }
            LineOutcome::Blank => {}
            LineOutcome::Control(text) => {
                self.stats.control_lines += 1;
                debug!("Device control line: {}", text);
                if self.control_lines.len() == CONTROL_LINE_HISTORY {
                    self.control_lines.pop_front();
                }
                self.control_lines.push_back(text);
            }
            LineOutcome::Header => {
                self.stats.headers_skipped += 1;
                trace!("Skipped column header");
            }
            LineOutcome::Rejected(reason) => self.record_rejection(&reason, &text),
        }
    }

    fn record_rejection(&mut self, reason: &LineRejection, line: &str) {
        self.stats.lines_rejected += 1;
        let count = self.stats.lines_rejected;
        if count % REJECTION_WARN_INTERVAL == 0 {
            warn!("Dropped malformed telemetry line ({}); {} rejected so far", reason, count);
        } else {
            debug!("Dropped telemetry line ({}): {:?}", reason, line);
        }
    }

    /// Pop the oldest parsed record
    pub fn pop(&mut self) -> Option<Record> {
        self.output.pop_front()
    }

    /// Take every queued record in arrival order
    pub fn drain(&mut self) -> Vec<Record> {
        self.output.drain(..).collect()
    }

    /// Number of parsed records waiting to be consumed
    pub fn queue_size(&self) -> usize {
        self.output.len()
    }

    /// Enable or suppress record enqueuing
    ///
    /// Deactivating clears the output queue and the carry-over buffer. The
    /// next bytes may start mid-line, so everything up to the next terminator
    /// is skipped rather than parsed as a truncated line.
    pub fn set_active(&mut self, active: bool) {
        if !active && self.active {
            self.output.clear();
            if !self.carry.is_empty() {
                self.resync = true;
            }
            self.carry.clear();
        }
        self.active = active;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Take the control lines seen since the last call
    pub fn take_control_lines(&mut self) -> Vec<String> {
        self.control_lines.drain(..).collect()
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }

    /// Bytes currently held for an unterminated line
    pub fn pending_bytes(&self) -> usize {
        self.carry.len()
    }
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new(ReassemblerConfig::default())
    }
}

/// A line is a header when any token is a known column name
fn is_header(tokens: &[&str]) -> bool {
    tokens.iter().any(|token| {
        let token = token.to_ascii_lowercase();
        FIELD_NAMES.contains(&token.as_str()) || EXTRA_HEADER_FIELDS.contains(&token.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE_A: &str = "0.1,0.2,0.3,0.4,0.5,10.0,-5.0,0.01,0.02,0.98";
    const LINE_B: &str = "0.9,0.8,0.7,0.6,0.5,-170.0,80.0,-1.5,1.5,0.0";

    #[test]
    fn test_parses_complete_lines_only() {
        let mut reassembler = StreamReassembler::default();
        assert_eq!(reassembler.feed(format!("{}\n0.9,0.8", LINE_A).as_bytes()), 1);
        assert_eq!(reassembler.queue_size(), 1);
        assert!(reassembler.pending_bytes() > 0);

        assert_eq!(reassembler.feed(b",0.7,0.6,0.5,-170.0,80.0,-1.5,1.5,0.0\r\n"), 1);
        let records = reassembler.drain();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].flex(), [0.9, 0.8, 0.7, 0.6, 0.5]);
    }

    #[test]
    fn test_lone_carriage_return_terminates_line() {
        let mut reassembler = StreamReassembler::default();
        reassembler.feed(format!("{}\r{}\r", LINE_A, LINE_B).as_bytes());
        assert_eq!(reassembler.queue_size(), 2);
    }

    #[test]
    fn test_header_comment_and_blank_lines_skipped() {
        let mut reassembler = StreamReassembler::default();
        let input = format!(
            "flex1,flex2,flex3,flex4,flex5,roll_deg,pitch_deg,ax_g,ay_g,az_g\n\n# cal done\n$ rate 50\n{}\n",
            LINE_A
        );
        reassembler.feed(input.as_bytes());

        assert_eq!(reassembler.queue_size(), 1);
        let stats = reassembler.stats();
        assert_eq!(stats.headers_skipped, 1);
        assert_eq!(stats.control_lines, 2);
        assert_eq!(stats.lines_rejected, 0);
        assert_eq!(reassembler.take_control_lines(), vec!["# cal done", "$ rate 50"]);
        assert!(reassembler.take_control_lines().is_empty());
    }

    #[test]
    fn test_timestamp_variant_matches_plain_variant() {
        let reassembler = StreamReassembler::default();
        let plain = reassembler.parse_line(LINE_A);
        let stamped = reassembler.parse_line(&format!("12.345,{}", LINE_A));
        assert!(matches!(plain, LineOutcome::Record(_)));
        assert_eq!(plain, stamped);
    }

    #[test]
    fn test_rejections() {
        let reassembler = StreamReassembler::default();
        assert_eq!(
            reassembler.parse_line("1,2,3"),
            LineOutcome::Rejected(LineRejection::FieldCount { found: 3 })
        );
        assert_eq!(
            reassembler.parse_line("0.1,0.2,abc,0.4,0.5,10.0,-5.0,0.01,0.02,0.98"),
            LineOutcome::Rejected(LineRejection::NotNumeric { token: 2 })
        );
        assert_eq!(
            reassembler.parse_line("0.1,0.2,0.3,0.4,NaN,10.0,-5.0,0.01,0.02,0.98"),
            LineOutcome::Rejected(LineRejection::NonFinite { token: 4 })
        );
        assert_eq!(
            reassembler.parse_line("0,0.1,0.2,0.3,0.4,0.5,inf,-5.0,0.01,0.02,0.98"),
            LineOutcome::Rejected(LineRejection::NonFinite { token: 6 })
        );
    }

    #[test]
    fn test_oversized_partial_line_is_dropped_until_next_terminator() {
        let mut reassembler = StreamReassembler::new(ReassemblerConfig {
            delimiter: ',',
            max_line_bytes: 24,
        });
        reassembler.feed(&[b'7'; 40]);
        assert_eq!(reassembler.pending_bytes(), 0);
        assert_eq!(reassembler.stats().lines_rejected, 1);

        // Tail of the oversized line, then a good line
        reassembler.feed(format!("999\n{}\n", "1,1,1,1,1,1,1,1,1,1").as_bytes());
        assert_eq!(reassembler.queue_size(), 1);
    }

    #[test]
    fn test_complete_line_over_limit_is_rejected() {
        let mut reassembler = StreamReassembler::new(ReassemblerConfig {
            delimiter: ',',
            max_line_bytes: 24,
        });
        let long = "10,10,10,10,10,10,10,10,10,10";
        assert_eq!(reassembler.feed(format!("{}\n1,1,1,1,1,1,1,1,1,1\n", long).as_bytes()), 1);
        assert_eq!(reassembler.stats().lines_rejected, 1);
    }

    #[test]
    fn test_deactivate_clears_queue_and_resyncs() {
        let mut reassembler = StreamReassembler::default();
        reassembler.feed(format!("{}\n0.5,0.5", LINE_A).as_bytes());
        assert_eq!(reassembler.queue_size(), 1);

        reassembler.set_active(false);
        assert_eq!(reassembler.queue_size(), 0);
        assert_eq!(reassembler.pending_bytes(), 0);

        // Remainder of the interrupted line must not surface as a record
        reassembler.set_active(true);
        reassembler.feed(format!(",0.5,0.5,0.5,1,1,0,0,1\n{}\n", LINE_B).as_bytes());
        let records = reassembler.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].roll_deg(), -170.0);
    }

    #[test]
    fn test_inactive_reassembler_does_not_enqueue() {
        let mut reassembler = StreamReassembler::default();
        reassembler.set_active(false);
        reassembler.feed(format!("{}\n", LINE_A).as_bytes());
        assert_eq!(reassembler.queue_size(), 0);
        assert!(!reassembler.is_active());
    }

    #[test]
    fn test_split_utf8_sequence_in_control_line() {
        let mut reassembler = StreamReassembler::default();
        let line = "# calibración\n".as_bytes();
        let split = line.iter().position(|&b| b >= 0x80).unwrap() + 1;
        reassembler.feed(&line[..split]);
        reassembler.feed(&line[split..]);
        assert_eq!(reassembler.take_control_lines(), vec!["# calibración"]);
    }
}
