//! Wire codec: packet header/body layout, checksum, and encode/decode.
//!
//! Base header, 14 bytes, all multi-byte fields big-endian:
//! `packet_type(1) | channel_type(1) | seq_no(4) | timestamp(4) | length(2) | checksum(2)`.
//! ACK/SACK append a 10-byte feedback block: `ack_no(4) | recv_window(2) | echo_timestamp(4)`.
//! SACK further appends `num_blocks(2) | (sack_start(4), sack_end(4)) x N`.
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use smallvec::SmallVec;
use std::io::Cursor;

const BASE_HEADER_LEN: usize = 14;
const FEEDBACK_BLOCK_LEN: usize = 10;
const SACK_ENTRY_LEN: usize = 8;

/// Largest number of SACK blocks this codec will decode from one packet.
/// Guards against a malformed `num_blocks` claiming an unreasonable count.
const MAX_DECODABLE_SACK_BLOCKS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Data,
    Ack,
    Sack,
}

impl PacketType {
    fn to_byte(self) -> u8 {
        match self {
            PacketType::Data => 0,
            PacketType::Ack => 1,
            PacketType::Sack => 2,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(PacketType::Data),
            1 => Some(PacketType::Ack),
            2 => Some(PacketType::Sack),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    Reliable,
    Unreliable,
}

impl ChannelType {
    fn to_byte(self) -> u8 {
        match self {
            ChannelType::Reliable => 0,
            ChannelType::Unreliable => 1,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(ChannelType::Reliable),
            1 => Some(ChannelType::Unreliable),
            _ => None,
        }
    }
}

/// An inclusive range of received-but-not-contiguous sequence numbers.
pub type SackBlock = (u32, u32);

/// A decoded or to-be-encoded packet. The closed `{Data, Ack, Sack}` variant
/// set replaces the source's attribute-presence duck typing (see design notes).
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Data {
        channel: ChannelType,
        seq_no: u32,
        timestamp: u32,
        payload: Vec<u8>,
    },
    Ack {
        channel: ChannelType,
        seq_no: u32,
        timestamp: u32,
        ack_no: u32,
        recv_window: u16,
        echo_timestamp: u32,
    },
    Sack {
        channel: ChannelType,
        seq_no: u32,
        timestamp: u32,
        ack_no: u32,
        recv_window: u16,
        echo_timestamp: u32,
        blocks: SmallVec<[SackBlock; 4]>,
    },
}

impl Packet {
    pub fn channel(&self) -> ChannelType {
        match self {
            Packet::Data { channel, .. } => *channel,
            Packet::Ack { channel, .. } => *channel,
            Packet::Sack { channel, .. } => *channel,
        }
    }

    pub fn seq_no(&self) -> u32 {
        match self {
            Packet::Data { seq_no, .. } => *seq_no,
            Packet::Ack { seq_no, .. } => *seq_no,
            Packet::Sack { seq_no, .. } => *seq_no,
        }
    }
}

/// Why a received datagram was rejected. All variants are silent-drop,
/// counted conditions (see error handling design) — callers should fold
/// these into a single `malformed` counter, not surface them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    TooShort,
    ChecksumMismatch,
    UnknownPacketType,
    UnknownChannelType,
    LengthMismatch,
    TooManySackBlocks,
    Truncated,
}

/// The 16-bit ones'-complement checksum over `data` (checksum field assumed
/// already zeroed by the caller). A recomputed value of 0 is legal precisely
/// when the pre-complement sum was 0xFFFF.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        sum = sum.wrapping_add(u16::from_be_bytes([word[0], word[1]]) as u32);
    }
    if let [last] = chunks.remainder() {
        sum = sum.wrapping_add((*last as u32) << 8);
    }
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Encodes `packet` into a freshly allocated datagram, including checksum.
pub fn encode(packet: &Packet) -> Vec<u8> {
    let mut buf = Vec::with_capacity(BASE_HEADER_LEN + FEEDBACK_BLOCK_LEN + 64);
    encode_into(packet, &mut buf);
    buf
}

/// Encodes `packet` into the caller-provided buffer (cleared first), so hot
/// send paths can reuse one scratch buffer across calls.
pub fn encode_into(packet: &Packet, buf: &mut Vec<u8>) {
    buf.clear();

    let (packet_type, channel, seq_no, timestamp, length) = match packet {
        Packet::Data {
            channel,
            seq_no,
            timestamp,
            payload,
        } => (PacketType::Data, *channel, *seq_no, *timestamp, payload.len() as u16),
        Packet::Ack {
            channel,
            seq_no,
            timestamp,
            ..
        } => (PacketType::Ack, *channel, *seq_no, *timestamp, 0u16),
        Packet::Sack {
            channel,
            seq_no,
            timestamp,
            ..
        } => (PacketType::Sack, *channel, *seq_no, *timestamp, 0u16),
    };

    buf.push(packet_type.to_byte());
    buf.push(channel.to_byte());
    buf.write_u32::<BigEndian>(seq_no).unwrap();
    buf.write_u32::<BigEndian>(timestamp).unwrap();
    buf.write_u16::<BigEndian>(length).unwrap();
    buf.write_u16::<BigEndian>(0).unwrap(); // checksum placeholder

    match packet {
        Packet::Data { .. } => {}
        Packet::Ack {
            ack_no,
            recv_window,
            echo_timestamp,
            ..
        } => {
            buf.write_u32::<BigEndian>(*ack_no).unwrap();
            buf.write_u16::<BigEndian>(*recv_window).unwrap();
            buf.write_u32::<BigEndian>(*echo_timestamp).unwrap();
        }
        Packet::Sack {
            ack_no,
            recv_window,
            echo_timestamp,
            blocks,
            ..
        } => {
            buf.write_u32::<BigEndian>(*ack_no).unwrap();
            buf.write_u16::<BigEndian>(*recv_window).unwrap();
            buf.write_u32::<BigEndian>(*echo_timestamp).unwrap();
            buf.write_u16::<BigEndian>(blocks.len() as u16).unwrap();
            for (start, end) in blocks {
                buf.write_u32::<BigEndian>(*start).unwrap();
                buf.write_u32::<BigEndian>(*end).unwrap();
            }
        }
    }

    if let Packet::Data { payload, .. } = packet {
        buf.extend_from_slice(payload);
    }

    let sum = checksum(buf);
    buf[12..14].copy_from_slice(&sum.to_be_bytes());
}

/// Decodes a received datagram into a typed [`Packet`], verifying the
/// checksum first. Any pathology — corrupt checksum, inconsistent length,
/// unknown type/channel byte, truncated tail — is reported as a
/// [`DecodeError`] rather than a panic; the caller counts and drops.
pub fn decode(data: &[u8]) -> Result<Packet, DecodeError> {
    if data.len() < BASE_HEADER_LEN {
        return Err(DecodeError::TooShort);
    }

    let claimed_checksum = u16::from_be_bytes([data[12], data[13]]);
    let mut zeroed = data.to_vec();
    zeroed[12] = 0;
    zeroed[13] = 0;
    if checksum(&zeroed) != claimed_checksum {
        return Err(DecodeError::ChecksumMismatch);
    }

    let mut cursor = Cursor::new(data);
    let packet_type_byte = cursor.read_u8().map_err(|_| DecodeError::Truncated)?;
    let channel_byte = cursor.read_u8().map_err(|_| DecodeError::Truncated)?;
    let seq_no = cursor.read_u32::<BigEndian>().map_err(|_| DecodeError::Truncated)?;
    let timestamp = cursor.read_u32::<BigEndian>().map_err(|_| DecodeError::Truncated)?;
    let length = cursor.read_u16::<BigEndian>().map_err(|_| DecodeError::Truncated)?;
    let _checksum = cursor.read_u16::<BigEndian>().map_err(|_| DecodeError::Truncated)?;

    let packet_type = PacketType::from_byte(packet_type_byte).ok_or(DecodeError::UnknownPacketType)?;
    let channel = ChannelType::from_byte(channel_byte).ok_or(DecodeError::UnknownChannelType)?;

    match packet_type {
        PacketType::Data => {
            let payload_start = BASE_HEADER_LEN;
            if data.len() < payload_start + length as usize {
                return Err(DecodeError::LengthMismatch);
            }
            if data.len() != payload_start + length as usize {
                return Err(DecodeError::LengthMismatch);
            }
            let payload = data[payload_start..].to_vec();
            Ok(Packet::Data {
                channel,
                seq_no,
                timestamp,
                payload,
            })
        }
        PacketType::Ack => {
            if length != 0 {
                return Err(DecodeError::LengthMismatch);
            }
            if data.len() != BASE_HEADER_LEN + FEEDBACK_BLOCK_LEN {
                return Err(DecodeError::LengthMismatch);
            }
            let ack_no = cursor.read_u32::<BigEndian>().map_err(|_| DecodeError::Truncated)?;
            let recv_window = cursor.read_u16::<BigEndian>().map_err(|_| DecodeError::Truncated)?;
            let echo_timestamp = cursor.read_u32::<BigEndian>().map_err(|_| DecodeError::Truncated)?;
            Ok(Packet::Ack {
                channel,
                seq_no,
                timestamp,
                ack_no,
                recv_window,
                echo_timestamp,
            })
        }
        PacketType::Sack => {
            if length != 0 {
                return Err(DecodeError::LengthMismatch);
            }
            if data.len() < BASE_HEADER_LEN + FEEDBACK_BLOCK_LEN + 2 {
                return Err(DecodeError::Truncated);
            }
            let ack_no = cursor.read_u32::<BigEndian>().map_err(|_| DecodeError::Truncated)?;
            let recv_window = cursor.read_u16::<BigEndian>().map_err(|_| DecodeError::Truncated)?;
            let echo_timestamp = cursor.read_u32::<BigEndian>().map_err(|_| DecodeError::Truncated)?;
            let num_blocks = cursor.read_u16::<BigEndian>().map_err(|_| DecodeError::Truncated)? as usize;

            if num_blocks > MAX_DECODABLE_SACK_BLOCKS {
                return Err(DecodeError::TooManySackBlocks);
            }
            let expected_len = BASE_HEADER_LEN + FEEDBACK_BLOCK_LEN + 2 + num_blocks * SACK_ENTRY_LEN;
            if data.len() != expected_len {
                return Err(DecodeError::LengthMismatch);
            }

            let mut blocks = SmallVec::with_capacity(num_blocks);
            for _ in 0..num_blocks {
                let start = cursor.read_u32::<BigEndian>().map_err(|_| DecodeError::Truncated)?;
                let end = cursor.read_u32::<BigEndian>().map_err(|_| DecodeError::Truncated)?;
                blocks.push((start, end));
            }

            Ok(Packet::Sack {
                channel,
                seq_no,
                timestamp,
                ack_no,
                recv_window,
                echo_timestamp,
                blocks,
            })
        }
    }
}
