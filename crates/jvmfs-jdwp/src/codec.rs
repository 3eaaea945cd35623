//! JDWP packet framing and payload (de)serialization.
//!
//! All integers are big-endian. A packet is an 11 byte header followed by
//! the payload: `u32 length`, `u32 id`, `u8 flags`, then `u16 error_code`
//! for replies or `u8 command_set, u8 command` for commands.

use crate::types::{JdwpError, JdwpIdSizes, JdwpValue, Location, ObjectId, ReferenceTypeId, Result};

pub const HANDSHAKE: &[u8] = b"JDWP-Handshake";
pub const HEADER_LEN: usize = 11;
pub const FLAG_REPLY: u8 = 0x80;

pub fn encode_command(id: u32, command_set: u8, command: u8, payload: &[u8]) -> Vec<u8> {
    let length = HEADER_LEN + payload.len();
    let mut buf = Vec::with_capacity(length);
    buf.extend_from_slice(&(length as u32).to_be_bytes());
    buf.extend_from_slice(&id.to_be_bytes());
    buf.push(0);
    buf.push(command_set);
    buf.push(command);
    buf.extend_from_slice(payload);
    buf
}

pub fn encode_reply(id: u32, error_code: u16, payload: &[u8]) -> Vec<u8> {
    let length = HEADER_LEN + payload.len();
    let mut buf = Vec::with_capacity(length);
    buf.extend_from_slice(&(length as u32).to_be_bytes());
    buf.extend_from_slice(&id.to_be_bytes());
    buf.push(FLAG_REPLY);
    buf.extend_from_slice(&error_code.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

pub struct JdwpReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> JdwpReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.buf.len() {
            return Err(JdwpError::Protocol("unexpected end of packet".to_string()));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_id(&mut self, size: usize) -> Result<u64> {
        let bytes = self.take(size)?;
        let mut value = 0u64;
        for byte in bytes {
            value = (value << 8) | u64::from(*byte);
        }
        Ok(value)
    }

    pub fn read_object_id(&mut self, sizes: &JdwpIdSizes) -> Result<ObjectId> {
        self.read_id(sizes.object_id)
    }

    pub fn read_reference_type_id(&mut self, sizes: &JdwpIdSizes) -> Result<ReferenceTypeId> {
        self.read_id(sizes.reference_type_id)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|err| JdwpError::Protocol(format!("invalid UTF-8 in string: {err}")))
    }

    pub fn read_location(&mut self, sizes: &JdwpIdSizes) -> Result<Location> {
        Ok(Location {
            type_tag: self.read_u8()?,
            class_id: self.read_reference_type_id(sizes)?,
            method_id: self.read_id(sizes.method_id)?,
            index: self.read_u64()?,
        })
    }

    /// Read a value for a known tag byte. Tags follow the JDWP `Tag`
    /// constants; anything that is not a primitive is an object id.
    pub fn read_value(&mut self, tag: u8, sizes: &JdwpIdSizes) -> Result<JdwpValue> {
        Ok(match tag {
            b'Z' => JdwpValue::Boolean(self.read_u8()? != 0),
            b'B' => JdwpValue::Byte(self.read_u8()? as i8),
            b'C' => JdwpValue::Char(self.read_u16()?),
            b'S' => JdwpValue::Short(self.read_u16()? as i16),
            b'I' => JdwpValue::Int(self.read_i32()?),
            b'J' => JdwpValue::Long(self.read_i64()?),
            b'F' => JdwpValue::Float(f32::from_bits(self.read_u32()?)),
            b'D' => JdwpValue::Double(f64::from_bits(self.read_u64()?)),
            b'V' => JdwpValue::Void,
            _ => JdwpValue::Object {
                tag,
                id: self.read_object_id(sizes)?,
            },
        })
    }
}

#[derive(Default)]
pub struct JdwpWriter {
    buf: Vec<u8>,
}

impl JdwpWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_id(&mut self, value: u64, size: usize) {
        let bytes = value.to_be_bytes();
        let start = bytes.len().saturating_sub(size);
        self.buf.extend_from_slice(&bytes[start..]);
    }

    pub fn write_object_id(&mut self, value: ObjectId, sizes: &JdwpIdSizes) {
        self.write_id(value, sizes.object_id);
    }

    pub fn write_reference_type_id(&mut self, value: ReferenceTypeId, sizes: &JdwpIdSizes) {
        self.write_id(value, sizes.reference_type_id);
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn write_location(&mut self, location: &Location, sizes: &JdwpIdSizes) {
        self.write_u8(location.type_tag);
        self.write_reference_type_id(location.class_id, sizes);
        self.write_id(location.method_id, sizes.method_id);
        self.write_u64(location.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_packet_layout() {
        let packet = encode_command(7, 1, 4, &[0xaa, 0xbb]);
        assert_eq!(packet.len(), 13);
        assert_eq!(&packet[0..4], &13u32.to_be_bytes());
        assert_eq!(&packet[4..8], &7u32.to_be_bytes());
        assert_eq!(packet[8], 0);
        assert_eq!(packet[9], 1);
        assert_eq!(packet[10], 4);
        assert_eq!(&packet[11..], &[0xaa, 0xbb]);
    }

    #[test]
    fn reply_packet_layout() {
        let packet = encode_reply(42, 21, b"ok");
        assert_eq!(packet[8], FLAG_REPLY);
        assert_eq!(u16::from_be_bytes(packet[9..11].try_into().unwrap()), 21);
        assert_eq!(&packet[11..], b"ok");
    }

    #[test]
    fn ids_use_negotiated_widths() {
        let sizes = JdwpIdSizes {
            object_id: 4,
            ..JdwpIdSizes::default()
        };
        let mut w = JdwpWriter::new();
        w.write_object_id(0x0102_0304, &sizes);
        let buf = w.into_vec();
        assert_eq!(buf, vec![0x01, 0x02, 0x03, 0x04]);

        let mut r = JdwpReader::new(&buf);
        assert_eq!(r.read_object_id(&sizes).unwrap(), 0x0102_0304);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn string_round_trip() {
        let mut w = JdwpWriter::new();
        w.write_string("Ljava/lang/String;");
        let buf = w.into_vec();
        let mut r = JdwpReader::new(&buf);
        assert_eq!(r.read_string().unwrap(), "Ljava/lang/String;");
    }

    #[test]
    fn location_round_trip() {
        let sizes = JdwpIdSizes::default();
        let loc = Location {
            type_tag: 1,
            class_id: 42,
            method_id: 7,
            index: 0,
        };
        let mut w = JdwpWriter::new();
        w.write_location(&loc, &sizes);
        let buf = w.into_vec();
        let mut r = JdwpReader::new(&buf);
        assert_eq!(r.read_location(&sizes).unwrap(), loc);
    }

    #[test]
    fn truncated_payload_is_a_protocol_error() {
        let mut r = JdwpReader::new(&[0x00, 0x01]);
        assert!(matches!(r.read_u32(), Err(JdwpError::Protocol(_))));
    }
}
