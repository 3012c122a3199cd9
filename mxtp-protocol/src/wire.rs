use crate::error::ProtocolError;
use bytes::{Buf, BufMut};

macro_rules! try_get_impl {
    ($try_getter: ident, $ty:ty, $getter: ident) => {
        fn $try_getter(&mut self) -> Result<$ty, ProtocolError> {
            if self.remaining() < size_of::<$ty>() {
                return Err(ProtocolError::Truncated {
                    needed: size_of::<$ty>(),
                    remaining: self.remaining(),
                });
            }
            Ok(self.$getter())
        }
    }
}

/// Bounds-checked reads from a wire buffer. All multi-byte values are network
///  byte order (BE); there is no trust in lengths declared inside the buffer.
pub trait WireBuf: Buf {
    try_get_impl!(try_get_u8, u8, get_u8);
    try_get_impl!(try_get_u16, u16, get_u16);
    try_get_impl!(try_get_u32, u32, get_u32);
    try_get_impl!(try_get_i32, i32, get_i32);
    try_get_impl!(try_get_f32, f32, get_f32);

    fn try_get_bytes(&mut self, n: usize) -> Result<Vec<u8>, ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::Truncated { needed: n, remaining: self.remaining() });
        }
        let mut result = vec![0u8; n];
        self.copy_to_slice(&mut result);
        Ok(result)
    }

    fn try_get_ascii(&mut self, n: usize) -> Result<String, ProtocolError> {
        let raw = self.try_get_bytes(n)?;
        if !raw.is_ascii() {
            return Err(ProtocolError::Malformed("expected ASCII characters"));
        }
        // safe: ASCII is a subset of UTF-8
        Ok(String::from_utf8(raw).expect("ASCII was just verified"))
    }

    /// A string prefixed with its length as an i32 (BE). The string itself is
    ///  UTF-8 and *not* null-terminated.
    fn try_get_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.try_get_i32()?;
        if len < 0 {
            return Err(ProtocolError::Malformed("negative string length"));
        }
        let raw = self.try_get_bytes(len as usize)?;
        String::from_utf8(raw).map_err(|_| ProtocolError::Malformed("string is not valid UTF-8"))
    }
}

pub trait WireBufMut: BufMut {
    fn put_string(&mut self, s: &str) {
        self.put_i32(s.len() as i32);
        self.put_slice(s.as_bytes());
    }
}

impl <T: Buf> WireBuf for T {
}

impl <T: BufMut> WireBufMut for T {
}
