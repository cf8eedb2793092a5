//! Receiver-side frame reassembly.
//!
//! The computer end of the link sees a flat stream of Control Change
//! messages.  [`MessageReader`] cuts a raw MIDI byte stream into messages and
//! [`FrameAssembler`] rebuilds one [`DecodedFrame`] per `DataComplete`
//! marker, flagging sequence gaps and truncated frames along the way.
//!
//! The bridge itself never decodes; this module exists for the `monitor`
//! diagnostic and for verifying the wire stream in tests.

use tracing::{debug, warn};

use crate::protocol::codec::{button_id_from_wire, classify, join_7bit};
use crate::protocol::messages::{
    Controller, EventType, MidiMessage, BUTTON_STATE_DOWN, CONTROL_CHANGE, DATA_COMPLETE_VALUE,
};
use crate::protocol::sequence::next_sequence;

/// What a decoded frame describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Motion,
    Button { button_id: i8, down: bool },
}

/// A sequence discontinuity between two consecutive frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGap {
    pub expected: u8,
    pub received: u8,
}

/// One fully reassembled frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame {
    pub kind: FrameKind,
    /// Unsigned 16-bit coordinate as transmitted.
    pub x: u16,
    pub y: u16,
    pub pressure: u16,
    pub sequence: u8,
    /// Set when this frame's sequence does not follow the previous frame's.
    pub gap: Option<SequenceGap>,
}

/// Accumulates frame fields from a message stream.
///
/// Field values persist between frames the same way a receiver's registers
/// would, so a frame missing a data message still decodes using the last
/// value seen for that field.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    // x, y, pressure as [msb, mid, lsb]
    fields: [[u8; 3]; 3],
    sequence: u8,
    event_type: u8,
    button_id: u8,
    button_state: u8,
    /// `true` between an `EventType` and its `DataComplete`.
    in_frame: bool,
    last_sequence: Option<u8>,
    truncated: u64,
    rejected: u64,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one message; returns a frame when the message completes one.
    pub fn push(&mut self, msg: &MidiMessage) -> Option<DecodedFrame> {
        let (controller, value) = match classify(msg) {
            Ok(field) => field,
            Err(e) => {
                debug!("ignoring message {:02X?}: {e}", msg.as_bytes());
                self.rejected += 1;
                return None;
            }
        };

        match controller {
            Controller::XMsb => self.fields[0][0] = value,
            Controller::XMid => self.fields[0][1] = value,
            Controller::XLsb => self.fields[0][2] = value,
            Controller::YMsb => self.fields[1][0] = value,
            Controller::YMid => self.fields[1][1] = value,
            Controller::YLsb => self.fields[1][2] = value,
            Controller::PressureMsb => self.fields[2][0] = value,
            Controller::PressureMid => self.fields[2][1] = value,
            Controller::PressureLsb => self.fields[2][2] = value,
            Controller::Sequence => self.sequence = value,
            Controller::EventType => {
                if self.in_frame {
                    self.truncated += 1;
                    warn!("frame truncated: new EventType before DataComplete");
                }
                self.in_frame = true;
                self.event_type = value;
            }
            Controller::ButtonId => self.button_id = value,
            Controller::ButtonState => self.button_state = value,
            Controller::DataComplete => {
                if value == DATA_COMPLETE_VALUE {
                    return Some(self.complete());
                }
            }
        }
        None
    }

    /// Feeds a batch of messages and collects every completed frame.
    pub fn push_all<'a, I>(&mut self, messages: I) -> Vec<DecodedFrame>
    where
        I: IntoIterator<Item = &'a MidiMessage>,
    {
        messages.into_iter().filter_map(|m| self.push(m)).collect()
    }

    /// Frames cut short by a new `EventType` before their `DataComplete`.
    pub fn truncated_frames(&self) -> u64 {
        self.truncated
    }

    /// Messages that did not belong to the frame grammar.
    pub fn rejected_messages(&self) -> u64 {
        self.rejected
    }

    fn complete(&mut self) -> DecodedFrame {
        self.in_frame = false;

        let gap = match self.last_sequence {
            Some(last) if next_sequence(last) != self.sequence => {
                let gap = SequenceGap {
                    expected: next_sequence(last),
                    received: self.sequence,
                };
                warn!(
                    "packet loss detected (expected sequence {}, received {})",
                    gap.expected, gap.received
                );
                Some(gap)
            }
            _ => None,
        };
        self.last_sequence = Some(self.sequence);

        let kind = if self.event_type == EventType::Motion as u8 {
            FrameKind::Motion
        } else {
            FrameKind::Button {
                button_id: button_id_from_wire(self.button_id),
                down: self.button_state == BUTTON_STATE_DOWN,
            }
        };

        let [x, y, p] = self.fields;
        DecodedFrame {
            kind,
            x: join_7bit(x[0], x[1], x[2]),
            y: join_7bit(y[0], y[1], y[2]),
            pressure: join_7bit(p[0], p[1], p[2]),
            sequence: self.sequence,
            gap,
        }
    }
}

/// Splits a raw MIDI byte stream into 3-byte Control Change messages.
///
/// Status bytes resynchronise the reader, running status is honoured for
/// Control Change, and anything else (other channel messages, realtime and
/// system bytes) is skipped.
#[derive(Debug, Default)]
pub struct MessageReader {
    status: Option<u8>,
    data: Vec<u8>,
}

impl MessageReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes `bytes` and returns every message they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<MidiMessage> {
        let mut out = Vec::new();
        for &byte in bytes {
            if byte >= 0xF8 {
                // Realtime bytes may interleave anywhere without breaking a message.
                continue;
            }
            if byte & 0x80 != 0 {
                self.data.clear();
                self.status = (byte & 0xF0 == CONTROL_CHANGE).then_some(byte);
                continue;
            }
            let Some(status) = self.status else {
                continue;
            };
            self.data.push(byte);
            if self.data.len() == 2 {
                out.push(MidiMessage::from_bytes([status, self.data[0], self.data[1]]));
                self.data.clear();
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::encode_event;
    use crate::protocol::messages::ProtocolEvent;
    use crate::protocol::sequence::SequenceCounter;

    fn motion(x: i16, y: i16, pressure: i16) -> ProtocolEvent {
        ProtocolEvent::Motion { x, y, pressure }
    }

    #[test]
    fn test_assembles_motion_frame() {
        // Arrange
        let seq = SequenceCounter::new();
        let frame = encode_event(&motion(1000, -2, 32767), &seq);
        let mut asm = FrameAssembler::new();

        // Act
        let frames = asm.push_all(&frame);

        // Assert
        assert_eq!(
            frames,
            vec![DecodedFrame {
                kind: FrameKind::Motion,
                x: 1000,
                y: 65534,
                pressure: 32767,
                sequence: 1,
                gap: None,
            }]
        );
    }

    #[test]
    fn test_assembles_button_frame_with_mapped_id() {
        let seq = SequenceCounter::new();
        let event = ProtocolEvent::Button {
            x: 5,
            y: 6,
            pressure: 7,
            button_id: -1,
            down: true,
        };
        let mut asm = FrameAssembler::new();

        let frames = asm.push_all(&encode_event(&event, &seq));

        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].kind,
            FrameKind::Button {
                button_id: -1,
                down: true
            }
        );
    }

    #[test]
    fn test_reports_sequence_gap() {
        // Arrange – frame 2 is encoded but never delivered
        let seq = SequenceCounter::new();
        let first = encode_event(&motion(0, 0, 0), &seq);
        let _lost = encode_event(&motion(0, 0, 0), &seq);
        let third = encode_event(&motion(0, 0, 0), &seq);
        let mut asm = FrameAssembler::new();

        // Act
        let a = asm.push_all(&first);
        let b = asm.push_all(&third);

        // Assert
        assert_eq!(a[0].gap, None);
        assert_eq!(
            b[0].gap,
            Some(SequenceGap {
                expected: 2,
                received: 3
            })
        );
    }

    #[test]
    fn test_sequence_wrap_is_not_a_gap() {
        let seq = SequenceCounter::starting_at(126);
        let mut asm = FrameAssembler::new();
        for _ in 0..4 {
            let frames = asm.push_all(&encode_event(&motion(0, 0, 0), &seq));
            assert_eq!(frames[0].gap, None);
        }
    }

    #[test]
    fn test_counts_truncated_frame() {
        let seq = SequenceCounter::new();
        let partial = encode_event(&motion(1, 1, 1), &seq);
        let whole = encode_event(&motion(2, 2, 2), &seq);
        let mut asm = FrameAssembler::new();

        asm.push_all(&partial[..5]);
        let frames = asm.push_all(&whole);

        assert_eq!(asm.truncated_frames(), 1);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].x, 2);
    }

    #[test]
    fn test_ignores_foreign_messages() {
        let mut asm = FrameAssembler::new();
        assert!(asm.push(&MidiMessage::from_bytes([0x90, 60, 100])).is_none());
        assert!(asm.push(&MidiMessage::control_change(0, 64, 1)).is_none());
        assert_eq!(asm.rejected_messages(), 2);
    }

    #[test]
    fn test_data_complete_other_than_127_does_not_close_frame() {
        let mut asm = FrameAssembler::new();
        assert!(asm
            .push(&MidiMessage::control_change(1, 30, 0))
            .is_none());
    }

    // ── MessageReader ─────────────────────────────────────────────────────────

    #[test]
    fn test_reader_splits_concatenated_messages() {
        let mut reader = MessageReader::new();
        let msgs = reader.feed(&[0xB1, 20, 0, 0xB0, 1, 5]);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].as_bytes(), &[0xB0, 1, 5]);
    }

    #[test]
    fn test_reader_handles_split_reads() {
        let mut reader = MessageReader::new();
        assert!(reader.feed(&[0xB0, 1]).is_empty());
        let msgs = reader.feed(&[5]);
        assert_eq!(msgs, vec![MidiMessage::from_bytes([0xB0, 1, 5])]);
    }

    #[test]
    fn test_reader_applies_running_status() {
        let mut reader = MessageReader::new();
        let msgs = reader.feed(&[0xB0, 1, 5, 2, 6]);
        assert_eq!(
            msgs,
            vec![
                MidiMessage::from_bytes([0xB0, 1, 5]),
                MidiMessage::from_bytes([0xB0, 2, 6]),
            ]
        );
    }

    #[test]
    fn test_reader_skips_realtime_and_non_cc() {
        let mut reader = MessageReader::new();
        let msgs = reader.feed(&[0x90, 60, 100, 0xB1, 0xF8, 30, 127]);
        assert_eq!(msgs, vec![MidiMessage::from_bytes([0xB1, 30, 127])]);
    }
}
