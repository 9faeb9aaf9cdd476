use byteorder::{BigEndian, ByteOrder as Endian, LittleEndian};
use std::str;

/// The byte order used for every multi-byte integer inside a schema cache.
///
/// The order is chosen when the cache is written and recorded in its header,
/// so a reader on any host can load the file verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    /// The byte order of the host this code runs on.
    pub fn native() -> ByteOrder {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// The opposite convention.
    pub fn swapped(self) -> ByteOrder {
        match self {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        }
    }

    /// Parses `little`, `big`, `native` or `swapped` (the opposite of native).
    pub fn from_name(name: &str) -> Option<ByteOrder> {
        match name {
            "little" | "le" => Some(ByteOrder::Little),
            "big" | "be" => Some(ByteOrder::Big),
            "native" => Some(ByteOrder::native()),
            "swapped" => Some(ByteOrder::native().swapped()),
            _ => None,
        }
    }
}

/// A byte buffer meant for reading fixed-width data in a given byte order.
///
/// Example usage:
///
/// ```
/// use gschema_format::{ByteBuffer, ByteOrder};
/// let mut bb = ByteBuffer::new(&[0, 0, 0, 42, 0, 0, 0, 2, 104, 105], ByteOrder::Big);
/// assert_eq!(bb.read_u32(), Ok(42));
/// assert_eq!(bb.read_string(), Ok("hi"));
/// ```
///
pub struct ByteBuffer<'a> {
    data: &'a [u8],
    index: usize,
    order: ByteOrder,
}

impl<'a> ByteBuffer<'a> {
    /// Create a new ByteBuffer that wraps the provided byte slice. The lifetime
    /// of the returned ByteBuffer must not outlive the lifetime of the byte
    /// slice.
    pub fn new(data: &'a [u8], order: ByteOrder) -> ByteBuffer<'a> {
        ByteBuffer {
            data,
            index: 0,
            order,
        }
    }

    /// Retrieves the underlying byte slice.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Retrieves the current index into the underlying byte slice.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Moves the read position. Fails if `index` lies past the end of the data.
    pub fn seek(&mut self, index: usize) -> Result<(), ()> {
        if index > self.data.len() {
            Err(())
        } else {
            self.index = index;
            Ok(())
        }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Try to read a boolean value starting at the current index.
    pub fn read_bool(&mut self) -> Result<bool, ()> {
        match self.read_byte() {
            Ok(0) => Ok(false),
            Ok(1) => Ok(true),
            _ => Err(()),
        }
    }

    /// Try to read a byte starting at the current index.
    pub fn read_byte(&mut self) -> Result<u8, ()> {
        if self.index >= self.data.len() {
            Err(())
        } else {
            let value = self.data[self.index];
            self.index += 1;
            Ok(value)
        }
    }

    /// Try to read `len` bytes starting at the current index.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ()> {
        let end = self.index.checked_add(len).ok_or(())?;
        if end > self.data.len() {
            Err(())
        } else {
            let value = &self.data[self.index..end];
            self.index = end;
            Ok(value)
        }
    }

    pub fn read_u16(&mut self) -> Result<u16, ()> {
        let bytes = self.read_bytes(2)?;
        Ok(match self.order {
            ByteOrder::Little => LittleEndian::read_u16(bytes),
            ByteOrder::Big => BigEndian::read_u16(bytes),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32, ()> {
        let bytes = self.read_bytes(4)?;
        Ok(match self.order {
            ByteOrder::Little => LittleEndian::read_u32(bytes),
            ByteOrder::Big => BigEndian::read_u32(bytes),
        })
    }

    pub fn read_u64(&mut self) -> Result<u64, ()> {
        let bytes = self.read_bytes(8)?;
        Ok(match self.order {
            ByteOrder::Little => LittleEndian::read_u64(bytes),
            ByteOrder::Big => BigEndian::read_u64(bytes),
        })
    }

    pub fn read_i16(&mut self) -> Result<i16, ()> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32, ()> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_i64(&mut self) -> Result<i64, ()> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f64(&mut self) -> Result<f64, ()> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Try to read a length-prefixed UTF-8 string starting at the current
    /// index. The string aliases the underlying memory.
    pub fn read_string(&mut self) -> Result<&'a str, ()> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        str::from_utf8(bytes).map_err(|_| ())
    }
}

/// A byte buffer meant for writing fixed-width data in a given byte order.
///
/// ```
/// use gschema_format::{ByteBufferMut, ByteOrder};
/// let mut bb = ByteBufferMut::new(ByteOrder::Big);
/// bb.write_u16(258);
/// assert_eq!(bb.data(), [1, 2]);
/// ```
pub struct ByteBufferMut {
    data: Vec<u8>,
    order: ByteOrder,
}

impl ByteBufferMut {
    pub fn new(order: ByteOrder) -> ByteBufferMut {
        ByteBufferMut {
            data: vec![],
            order,
        }
    }

    pub fn data(self) -> Vec<u8> {
        self.data
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn write_bool(&mut self, value: bool) {
        self.data.push(if value { 1 } else { 0 });
    }

    pub fn write_byte(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_bytes(&mut self, value: &[u8]) {
        self.data.extend_from_slice(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        let mut bytes = [0; 2];
        match self.order {
            ByteOrder::Little => LittleEndian::write_u16(&mut bytes, value),
            ByteOrder::Big => BigEndian::write_u16(&mut bytes, value),
        }
        self.data.extend_from_slice(&bytes);
    }

    pub fn write_u32(&mut self, value: u32) {
        let mut bytes = [0; 4];
        match self.order {
            ByteOrder::Little => LittleEndian::write_u32(&mut bytes, value),
            ByteOrder::Big => BigEndian::write_u32(&mut bytes, value),
        }
        self.data.extend_from_slice(&bytes);
    }

    pub fn write_u64(&mut self, value: u64) {
        let mut bytes = [0; 8];
        match self.order {
            ByteOrder::Little => LittleEndian::write_u64(&mut bytes, value),
            ByteOrder::Big => BigEndian::write_u64(&mut bytes, value),
        }
        self.data.extend_from_slice(&bytes);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_u16(value as u16);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_u64(value as u64);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    /// Writes a `u32` length followed by the UTF-8 bytes, without terminator.
    pub fn write_string(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.data.extend_from_slice(value.as_bytes());
    }

    /// Overwrites a previously written `u32` at `offset`.
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        let slot = &mut self.data[offset..offset + 4];
        match self.order {
            ByteOrder::Little => LittleEndian::write_u32(slot, value),
            ByteOrder::Big => BigEndian::write_u32(slot, value),
        }
    }

    /// Pads with zero bytes until the length is a multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) {
        while self.data.len() % alignment != 0 {
            self.data.push(0);
        }
    }
}

#[cfg(test)]
fn write_once(order: ByteOrder, cb: fn(&mut ByteBufferMut)) -> Vec<u8> {
    let mut bb = ByteBufferMut::new(order);
    cb(&mut bb);
    bb.data()
}

#[test]
fn read_bool() {
    let read = |bytes| ByteBuffer::new(bytes, ByteOrder::Little).read_bool();
    assert_eq!(read(&[]), Err(()));
    assert_eq!(read(&[0]), Ok(false));
    assert_eq!(read(&[1]), Ok(true));
    assert_eq!(read(&[2]), Err(()));
}

#[test]
fn read_bytes() {
    let read = |bytes, len| ByteBuffer::new(bytes, ByteOrder::Little).read_bytes(len);
    assert_eq!(read(&[], 0), Ok(vec![].as_slice()));
    assert_eq!(read(&[], 1), Err(()));
    assert_eq!(read(&[0], 0), Ok(vec![].as_slice()));
    assert_eq!(read(&[0], 1), Ok(vec![0].as_slice()));
    assert_eq!(read(&[0, 1], 1), Ok(vec![0].as_slice()));
    assert_eq!(read(&[0, 1], usize::MAX), Err(()));
}

#[test]
fn read_u32_in_both_orders() {
    let bytes = [1, 2, 3, 4];
    assert_eq!(ByteBuffer::new(&bytes, ByteOrder::Little).read_u32(), Ok(0x0403_0201));
    assert_eq!(ByteBuffer::new(&bytes, ByteOrder::Big).read_u32(), Ok(0x0102_0304));
    assert_eq!(ByteBuffer::new(&bytes[..3], ByteOrder::Big).read_u32(), Err(()));
}

#[test]
fn read_signed() {
    assert_eq!(ByteBuffer::new(&[0xff, 0xff], ByteOrder::Little).read_i16(), Ok(-1));
    assert_eq!(ByteBuffer::new(&[0xff, 0xff, 0xff, 0xfe], ByteOrder::Big).read_i32(), Ok(-2));
    assert_eq!(
        ByteBuffer::new(&[0, 0, 0, 0, 0, 0, 0, 0x80], ByteOrder::Little).read_i64(),
        Ok(i64::MIN)
    );
}

#[test]
fn read_string() {
    let read = |bytes| {
        let mut bb = ByteBuffer::new(bytes, ByteOrder::Little);
        bb.read_string().map(|s| s.to_owned())
    };
    assert_eq!(read(&[]), Err(()));
    assert_eq!(read(&[0, 0, 0, 0]), Ok("".to_owned()));
    assert_eq!(read(&[1, 0, 0, 0, 97]), Ok("a".to_owned()));
    assert_eq!(read(&[2, 0, 0, 0, 97]), Err(()));
    assert_eq!(read(&[4, 0, 0, 0, 240, 159, 141, 149]), Ok("🍕".to_owned()));
    assert_eq!(read(&[1, 0, 0, 0, 0xff]), Err(()));
}

#[test]
fn seek() {
    let mut bb = ByteBuffer::new(&[1, 2, 3], ByteOrder::Little);
    assert_eq!(bb.seek(2), Ok(()));
    assert_eq!(bb.read_byte(), Ok(3));
    assert_eq!(bb.seek(4), Err(()));
    assert_eq!(bb.index(), 3);
}

#[test]
fn write_integers() {
    assert_eq!(write_once(ByteOrder::Little, |bb| bb.write_u16(0x0102)), [2, 1]);
    assert_eq!(write_once(ByteOrder::Big, |bb| bb.write_u16(0x0102)), [1, 2]);
    assert_eq!(write_once(ByteOrder::Little, |bb| bb.write_i32(-1)), [255, 255, 255, 255]);
    assert_eq!(
        write_once(ByteOrder::Big, |bb| bb.write_u64(0x0102_0304_0506_0708)),
        [1, 2, 3, 4, 5, 6, 7, 8]
    );
    assert_eq!(
        write_once(ByteOrder::Little, |bb| bb.write_u64(0x0102_0304_0506_0708)),
        [8, 7, 6, 5, 4, 3, 2, 1]
    );
}

#[test]
fn write_f64() {
    assert_eq!(write_once(ByteOrder::Big, |bb| bb.write_f64(1.0)), [0x3f, 0xf0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(write_once(ByteOrder::Little, |bb| bb.write_f64(-0.0)), [0, 0, 0, 0, 0, 0, 0, 0x80]);
}

#[test]
fn write_string() {
    assert_eq!(write_once(ByteOrder::Little, |bb| bb.write_string("")), [0, 0, 0, 0]);
    assert_eq!(write_once(ByteOrder::Big, |bb| bb.write_string("ab")), [0, 0, 0, 2, 97, 98]);
}

#[test]
fn patch_and_align() {
    let mut bb = ByteBufferMut::new(ByteOrder::Big);
    bb.write_u32(0);
    bb.write_byte(9);
    bb.align(8);
    bb.patch_u32(0, 7);
    assert_eq!(bb.data(), [0, 0, 0, 7, 9, 0, 0, 0]);
}

#[test]
fn write_then_read_sequence() {
    for order in [ByteOrder::Little, ByteOrder::Big] {
        let mut out = ByteBufferMut::new(order);
        out.write_f64(123.456);
        out.write_string("🍕");
        out.write_u32(123456789);
        out.write_i16(-300);
        let data = out.data();

        let mut bb = ByteBuffer::new(&data, order);
        assert_eq!(bb.read_f64(), Ok(123.456));
        assert_eq!(bb.read_string(), Ok("🍕"));
        assert_eq!(bb.read_u32(), Ok(123456789));
        assert_eq!(bb.read_i16(), Ok(-300));
        assert_eq!(bb.index(), data.len());
    }
}

#[test]
fn byte_order_names() {
    assert_eq!(ByteOrder::from_name("little"), Some(ByteOrder::Little));
    assert_eq!(ByteOrder::from_name("big"), Some(ByteOrder::Big));
    assert_eq!(ByteOrder::from_name("native"), Some(ByteOrder::native()));
    assert_eq!(ByteOrder::from_name("middle"), None);
    assert_eq!(ByteOrder::Little.swapped(), ByteOrder::Big);
}
