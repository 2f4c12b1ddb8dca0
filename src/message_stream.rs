//! Generic Message Stream frame parser and built-in handlers.
//!
//! `FrameParser` reproduces `nearby_message_stream_Read` exactly, including
//! the "truncate but still fire" behavior when a declared length exceeds the
//! per-peer buffer. Send-side framing reproduces `nearby_message_stream_Send`/
//! `SendAck`/`SendNack`.

use heapless::Vec;

use crate::error::Result;
use crate::hal::{BleHal, PeerId};

pub const HEADER_SIZE: usize = 4;
pub const MAX_PAYLOAD: usize = 128;

pub const GROUP_ACKNOWLEDGEMENT: u8 = 0xFF;
pub const ACK_CODE: u8 = 1;
pub const NACK_CODE: u8 = 2;

pub const GROUP_DEVICE_INFORMATION_EVENT: u8 = 3;
pub const CODE_MODEL_ID: u8 = 1;
pub const CODE_BLE_ADDRESS_UPDATED: u8 = 2;
pub const CODE_BATTERY_LEVEL: u8 = 3;
pub const CODE_BATTERY_TIME: u8 = 9;
pub const CODE_ACTIVE_COMPONENT_REQUEST: u8 = 5;
pub const CODE_ACTIVE_COMPONENT_RESPONSE: u8 = 6;
pub const CODE_CAPABILITIES: u8 = 7;
pub const CODE_PLATFORM_TYPE: u8 = 8;
pub const CODE_SESSION_NONCE: u8 = 10;

pub const GROUP_DEVICE_ACTION_EVENT: u8 = 4;
pub const CODE_RING: u8 = 1;

pub const GROUP_SASS: u8 = 7;

/// A fully received frame.
#[derive(Clone, Copy)]
pub struct Message<'a> {
    pub group: u8,
    pub code: u8,
    pub data: &'a [u8],
}

/// Per-peer incremental byte-accumulation parser.
pub struct FrameParser {
    bytes_read: usize,
    group: u8,
    code: u8,
    length: usize,
    buf: Vec<u8, MAX_PAYLOAD>,
}

impl FrameParser {
    pub fn new() -> Self {
        FrameParser {
            bytes_read: 0,
            group: 0,
            code: 0,
            length: 0,
            buf: Vec::new(),
        }
    }

    /// Feeds one byte. Returns `Some(message)` exactly when a full frame
    /// completes — including a truncated one, matching the reference parser.
    pub fn push_byte(&mut self, byte: u8) -> Option<(u8, u8, Vec<u8, MAX_PAYLOAD>)> {
        let available_space = MAX_PAYLOAD;
        match self.bytes_read {
            0 => self.group = byte,
            1 => self.code = byte,
            2 => self.length = (byte as usize) << 8,
            3 => self.length += byte as usize,
            _ => {
                let offset = self.bytes_read - HEADER_SIZE;
                if offset < self.length && offset < available_space {
                    if offset == self.buf.len() {
                        self.buf.push(byte).ok();
                    } else if offset < self.buf.len() {
                        self.buf[offset] = byte;
                    }
                }
            }
        }
        self.bytes_read += 1;

        if self.bytes_read - HEADER_SIZE == self.length {
            if self.length > available_space {
                self.length = available_space;
            }
            let group = self.group;
            let code = self.code;
            let mut out: Vec<u8, MAX_PAYLOAD> = Vec::new();
            out.extend_from_slice(&self.buf[..self.length.min(self.buf.len())]).ok();
            self.buf.clear();
            self.length = 0;
            self.bytes_read = 0;
            return Some((group, code, out));
        }
        None
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends one framed message: 4-byte header, then payload if non-empty.
pub fn send<H: BleHal>(hal: &mut H, peer: PeerId, group: u8, code: u8, payload: &[u8]) -> Result<()> {
    let mut header = [0u8; HEADER_SIZE];
    header[0] = group;
    header[1] = code;
    header[2] = (payload.len() >> 8) as u8;
    header[3] = payload.len() as u8;
    hal.send_message_stream(peer, &header)?;
    if !payload.is_empty() {
        hal.send_message_stream(peer, payload)?;
    }
    Ok(())
}

pub fn send_ack<H: BleHal>(hal: &mut H, peer: PeerId, orig_group: u8, orig_code: u8) -> Result<()> {
    send(hal, peer, GROUP_ACKNOWLEDGEMENT, ACK_CODE, &[orig_group, orig_code])
}

pub fn send_nack<H: BleHal>(
    hal: &mut H,
    peer: PeerId,
    orig_group: u8,
    orig_code: u8,
    fail_reason: u8,
) -> Result<()> {
    send(
        hal,
        peer,
        GROUP_ACKNOWLEDGEMENT,
        NACK_CODE,
        &[fail_reason, orig_group, orig_code],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut FrameParser, bytes: &[u8]) -> Option<(u8, u8, Vec<u8, MAX_PAYLOAD>)> {
        let mut result = None;
        for &b in bytes {
            if let Some(r) = parser.push_byte(b) {
                result = Some(r);
            }
        }
        result
    }

    #[test]
    fn parses_a_simple_frame() {
        let mut parser = FrameParser::new();
        let (group, code, data) = feed(&mut parser, &[3, 1, 0, 2, 0xAA, 0xBB]).unwrap();
        assert_eq!(group, 3);
        assert_eq!(code, 1);
        assert_eq!(&data[..], &[0xAA, 0xBB]);
    }

    #[test]
    fn zero_length_frame_fires_immediately_after_header() {
        let mut parser = FrameParser::new();
        let (group, code, data) = feed(&mut parser, &[5, 9, 0, 0]).unwrap();
        assert_eq!((group, code), (5, 9));
        assert!(data.is_empty());
    }

    #[test]
    fn truncates_oversized_length_but_still_fires() {
        let mut parser = FrameParser::new();
        let big_len = (MAX_PAYLOAD + 10) as u16;
        let mut bytes = alloc_header(1, 2, big_len);
        for i in 0..(MAX_PAYLOAD + 10) {
            bytes.push((i % 256) as u8);
        }
        let (_, _, data) = feed(&mut parser, &bytes).unwrap();
        assert_eq!(data.len(), MAX_PAYLOAD);
    }

    #[test]
    fn parser_resets_after_each_frame() {
        let mut parser = FrameParser::new();
        feed(&mut parser, &[3, 1, 0, 1, 0xAA]);
        let (group, code, data) = feed(&mut parser, &[4, 2, 0, 1, 0xBB]).unwrap();
        assert_eq!((group, code), (4, 2));
        assert_eq!(&data[..], &[0xBB]);
    }

    fn alloc_header(group: u8, code: u8, len: u16) -> std::vec::Vec<u8> {
        std::vec![group, code, (len >> 8) as u8, len as u8]
    }
}
