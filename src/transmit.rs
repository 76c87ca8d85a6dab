//! Target transmission over UDP.
//!
//! One datagram per target, fire and forget: no acknowledgment, no retry,
//! no ordering across sends. Success means the local send succeeded, not
//! that the peer received anything.

use std::io;
use std::net::{SocketAddr, UdpSocket};

use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian};
use log::info;
use thiserror::Error;

use crate::geom::MmPoint;

/// Byte order of the encoded fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Native,
    Little,
    Big,
}

/// Width of the two encoded fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    F64,
    F32,
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("invalid packet layout '{0}': expected an optional byte-order prefix (<, > or =) followed by 2d or 2f")]
    Invalid(String),
    #[error("datagram is {got} bytes, layout expects {expected}")]
    SizeMismatch { got: usize, expected: usize },
}

/// Wire layout of a target datagram: two floating-point fields, (x_mm, y_mm)
/// in that order.
///
/// The descriptor follows the format-string convention the receiver tooling
/// uses: an optional byte-order prefix (`<` little, `>` big, `=` native)
/// followed by `2d` (two f64, 16 bytes) or `2f` (two f32, 8 bytes). The
/// default is `2d` in native order. Sender and receiver agree on the
/// descriptor out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketLayout {
    pub order: Endianness,
    pub width: FieldWidth,
}

impl Default for PacketLayout {
    fn default() -> Self {
        Self { order: Endianness::Native, width: FieldWidth::F64 }
    }
}

impl PacketLayout {
    pub fn parse(descriptor: &str) -> Result<Self, LayoutError> {
        let (order, rest) = match descriptor.as_bytes().first() {
            Some(b'<') => (Endianness::Little, &descriptor[1..]),
            Some(b'>') => (Endianness::Big, &descriptor[1..]),
            Some(b'=') => (Endianness::Native, &descriptor[1..]),
            _ => (Endianness::Native, descriptor),
        };
        let width = match rest {
            "2d" => FieldWidth::F64,
            "2f" => FieldWidth::F32,
            _ => return Err(LayoutError::Invalid(descriptor.to_string())),
        };
        Ok(Self { order, width })
    }

    /// Encoded datagram size in bytes.
    pub fn size(&self) -> usize {
        match self.width {
            FieldWidth::F64 => 16,
            FieldWidth::F32 => 8,
        }
    }

    pub fn encode(&self, mm: MmPoint) -> Vec<u8> {
        fn pair<E: ByteOrder>(width: FieldWidth, mm: MmPoint) -> Vec<u8> {
            match width {
                FieldWidth::F64 => {
                    let mut buf = vec![0u8; 16];
                    E::write_f64(&mut buf[..8], mm.x);
                    E::write_f64(&mut buf[8..], mm.y);
                    buf
                }
                FieldWidth::F32 => {
                    let mut buf = vec![0u8; 8];
                    E::write_f32(&mut buf[..4], mm.x as f32);
                    E::write_f32(&mut buf[4..], mm.y as f32);
                    buf
                }
            }
        }
        match self.order {
            Endianness::Native => pair::<NativeEndian>(self.width, mm),
            Endianness::Little => pair::<LittleEndian>(self.width, mm),
            Endianness::Big => pair::<BigEndian>(self.width, mm),
        }
    }

    /// Decode a datagram back into a coordinate pair; used by the debug
    /// receiver and round-trip tests.
    pub fn decode(&self, buf: &[u8]) -> Result<MmPoint, LayoutError> {
        if buf.len() != self.size() {
            return Err(LayoutError::SizeMismatch { got: buf.len(), expected: self.size() });
        }
        fn pair<E: ByteOrder>(width: FieldWidth, buf: &[u8]) -> MmPoint {
            match width {
                FieldWidth::F64 => MmPoint::new(E::read_f64(&buf[..8]), E::read_f64(&buf[8..])),
                FieldWidth::F32 => {
                    MmPoint::new(f64::from(E::read_f32(&buf[..4])), f64::from(E::read_f32(&buf[4..])))
                }
            }
        }
        Ok(match self.order {
            Endianness::Native => pair::<NativeEndian>(self.width, buf),
            Endianness::Little => pair::<LittleEndian>(self.width, buf),
            Endianness::Big => pair::<BigEndian>(self.width, buf),
        })
    }
}

/// Sink for selected targets.
///
/// The session talks to this seam so registry logic can be exercised
/// without a socket; `UdpTransmitter` is the production implementation.
pub trait TargetSink {
    fn send(&mut self, mm: MmPoint) -> io::Result<()>;
}

/// Sends target coordinates as UDP datagrams to a fixed peer.
pub struct UdpTransmitter {
    socket: UdpSocket,
    peer: SocketAddr,
    layout: PacketLayout,
}

impl UdpTransmitter {
    /// Bind the local side of the channel. The socket is non-blocking: a
    /// slow or failed send must never stall the capture loop.
    pub fn bind(local: SocketAddr, peer: SocketAddr, layout: PacketLayout) -> io::Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket, peer, layout })
    }

}

impl TargetSink for UdpTransmitter {
    fn send(&mut self, mm: MmPoint) -> io::Result<()> {
        let packet = self.layout.encode(mm);
        let written = self.socket.send_to(&packet, self.peer)?;
        if written != packet.len() {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "short datagram write"));
        }
        info!(
            "Target (x = {:.3} mm, y = {:.3} mm) sent to {}",
            mm.x, mm.y, self.peer
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_default_descriptor() {
        let layout = PacketLayout::parse("2d").unwrap();
        assert_eq!(layout, PacketLayout::default());
        assert_eq!(layout.size(), 16);
    }

    #[test]
    fn test_parse_prefixed_descriptors() {
        assert_eq!(
            PacketLayout::parse(">2d").unwrap(),
            PacketLayout { order: Endianness::Big, width: FieldWidth::F64 }
        );
        assert_eq!(
            PacketLayout::parse("<2f").unwrap(),
            PacketLayout { order: Endianness::Little, width: FieldWidth::F32 }
        );
        assert_eq!(
            PacketLayout::parse("=2d").unwrap(),
            PacketLayout { order: Endianness::Native, width: FieldWidth::F64 }
        );
    }

    #[test]
    fn test_parse_rejects_junk() {
        assert!(PacketLayout::parse("").is_err());
        assert!(PacketLayout::parse("3d").is_err());
        assert!(PacketLayout::parse("2x").is_err());
        assert!(PacketLayout::parse("?2d").is_err());
        assert!(PacketLayout::parse("2dd").is_err());
    }

    #[test]
    fn test_default_layout_is_16_bytes() {
        let packet = PacketLayout::default().encode(MmPoint::new(8.8, 10.0));
        assert_eq!(packet.len(), 16);
    }

    #[test]
    fn test_f32_layout_is_8_bytes() {
        let layout = PacketLayout::parse("2f").unwrap();
        assert_eq!(layout.encode(MmPoint::new(1.0, 2.0)).len(), 8);
    }

    #[test]
    fn test_native_f64_round_trip_is_exact() {
        let layout = PacketLayout::default();
        let sent = MmPoint::new(8.8, -10.0);
        let got = layout.decode(&layout.encode(sent)).unwrap();
        assert_eq!(got, sent);
    }

    #[test]
    fn test_big_endian_field_order() {
        let layout = PacketLayout::parse(">2d").unwrap();
        let packet = layout.encode(MmPoint::new(1.0, 2.0));
        assert_eq!(&packet[..8], &1.0f64.to_be_bytes());
        assert_eq!(&packet[8..], &2.0f64.to_be_bytes());
    }

    #[test]
    fn test_f32_round_trip_within_tolerance() {
        let layout = PacketLayout::parse("<2f").unwrap();
        let sent = MmPoint::new(8.8, 10.0);
        let got = layout.decode(&layout.encode(sent)).unwrap();
        assert!((got.x - sent.x).abs() < 1e-6);
        assert!((got.y - sent.y).abs() < 1e-6);
    }

    #[test]
    fn test_decode_rejects_wrong_size() {
        let layout = PacketLayout::default();
        assert!(layout.decode(&[0u8; 8]).is_err());
        assert!(layout.decode(&[]).is_err());
    }

    #[test]
    fn test_udp_loopback_send() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let peer = receiver.local_addr().unwrap();

        let mut tx =
            UdpTransmitter::bind("127.0.0.1:0".parse().unwrap(), peer, PacketLayout::default())
                .unwrap();
        tx.send(MmPoint::new(8.8, 10.0)).unwrap();

        let mut buf = [0u8; 64];
        let (n, _from) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(n, 16);
        let got = PacketLayout::default().decode(&buf[..n]).unwrap();
        assert_eq!(got, MmPoint::new(8.8, 10.0));
    }
}
