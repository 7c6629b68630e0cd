//! Traits for encoding and decoding objects to and from their wire format.

use bytes::{BufMut, Bytes, BytesMut};

use crate::packet::InadequateBufferSize;

/// A trait for types decodable from a wire format, without any additional information.
pub trait WireDecode<T>: Sized {
    /// The error type returned on a failed decode.
    type Error;

    /// Decodes an object from the provided data, such as a [`bytes::Buf`].
    ///
    /// The buffer is advanced by as many bytes as necessary to decode the object.
    /// Bytes are consumed regardless of whether or not decoding fails.
    fn decode(data: &mut T) -> Result<Self, Self::Error>;
}

/// A trait for types decodable from a wire format, *with* additional information.
///
/// In contrast to [`WireDecode`], this trait allows the implementing type to specify
/// additional data that should be passed to the decode calls, by means of the
/// associated type [`Self::Context`].
pub trait WireDecodeWithContext<T>: Sized {
    /// The error type returned on a failed decode.
    type Error;
    /// Data that should be provided to calls to decode.
    type Context;

    /// Decodes an object from the provided data, with additional context.
    ///
    /// Callers must provide the required contextual information, as specified by
    /// [`Self::Context`]. This may be, for example, the length of the data comprising
    /// the object or the type of the object signalled elsewhere.
    ///
    /// The buffer is advanced by as many bytes as necessary to decode the object.
    /// Bytes are consumed regardless of whether or not decoding fails.
    fn decode_with_context(data: &mut T, context: Self::Context) -> Result<Self, Self::Error>;
}

/// A trait for types encodable to a wire format.
pub trait WireEncode {
    /// The error type returned on a failed encode.
    type Error: std::fmt::Debug + From<InadequateBufferSize>;

    /// The length of the encoded object in bytes.
    fn encoded_length(&self) -> usize;

    /// Encodes the object to the buffer, without checking the buffer's capacity.
    ///
    /// Implementations may panic if the buffer has fewer than
    /// [`Self::encoded_length()`] bytes of remaining capacity.
    fn encode_to_unchecked<T: BufMut>(&self, buffer: &mut T);

    /// Encodes the object to the provided buffer, after checking its capacity.
    fn encode_to<T: BufMut>(&self, buffer: &mut T) -> Result<(), Self::Error> {
        if buffer.remaining_mut() < self.encoded_length() {
            return Err(InadequateBufferSize.into());
        }
        self.encode_to_unchecked(buffer);
        Ok(())
    }

    /// Encodes the object to a freshly allocated buffer.
    fn encode_to_bytes(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(self.encoded_length());
        self.encode_to_unchecked(&mut buffer);
        buffer.freeze()
    }
}

macro_rules! bounded_uint {
    (
        $(#[$outer:meta])*
        pub struct $name:ident($type:ty : $bits:literal);
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash)]
        pub struct $name($type);

        impl $name {
            /// The number of bits useable for an instance of this type.
            pub const BITS: u32 = $bits;

            /// The maximum possible value for an instance of this type.
            pub const MAX: Self = Self((1 << $bits) - 1);

            /// Create a new instance if the value is at most `Self::MAX.get()`.
            pub const fn new(value: $type) -> Option<Self> {
                if value <= Self::MAX.0 {
                    Some(Self(value))
                } else {
                    None
                }
            }

            /// Create a new instance with the provided value.
            ///
            /// # Safety
            ///
            /// The value should be at most `Self::MAX.get()`.
            pub const fn new_unchecked(value: $type) -> Self {
                debug_assert!(value <= Self::MAX.0);
                Self(value)
            }

            /// Get the value of this instance as its underlying type.
            #[inline]
            pub const fn get(&self) -> $type {
                self.0
            }
        }
    };
}
pub(crate) use bounded_uint;

#[cfg(test)]
mod tests {
    use super::*;

    bounded_uint! {
        /// A 6-bit test value.
        pub struct TestValue(u8: 6);
    }

    #[test]
    fn bounded_range() {
        assert_eq!(TestValue::new(63), Some(TestValue::MAX));
        assert_eq!(TestValue::new(64), None);
        assert_eq!(TestValue::new_unchecked(17).get(), 17);
    }
}
