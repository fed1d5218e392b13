//! Element types, layouts and quantization tags.

use core::fmt;

/// Element data type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    U8,
    S8,
    U16,
    S16,
    U32,
    S32,
    F16,
    F32,
}

impl DataType {
    /// Every supported type, narrowest first.
    pub const ALL: [Self; 8] = [
        Self::U8,
        Self::S8,
        Self::U16,
        Self::S16,
        Self::U32,
        Self::S32,
        Self::F16,
        Self::F32,
    ];

    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 | Self::F16 => 2,
            Self::U32 | Self::S32 | Self::F32 => 4,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::F16 | Self::F32)
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, Self::S8 | Self::S16 | Self::S32 | Self::F16 | Self::F32)
    }

    /// Inclusive value range of an integer type, `None` for floats.
    pub const fn int_range(self) -> Option<(i64, i64)> {
        match self {
            Self::U8 => Some((0, u8::MAX as i64)),
            Self::S8 => Some((i8::MIN as i64, i8::MAX as i64)),
            Self::U16 => Some((0, u16::MAX as i64)),
            Self::S16 => Some((i16::MIN as i64, i16::MAX as i64)),
            Self::U32 => Some((0, u32::MAX as i64)),
            Self::S32 => Some((i32::MIN as i64, i32::MAX as i64)),
            Self::F16 | Self::F32 => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::S8 => "s8",
            Self::U16 => "u16",
            Self::S16 => "s16",
            Self::U32 => "u32",
            Self::S32 => "s32",
            Self::F16 => "f16",
            Self::F32 => "f32",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rust element types that map onto a [`DataType`].
pub trait Element: bytemuck::Pod + Send + Sync {
    const DATA_TYPE: DataType;
}

macro_rules! impl_element {
    ($($ty:ty => $dt:ident),* $(,)?) => {
        $(impl Element for $ty {
            const DATA_TYPE: DataType = DataType::$dt;
        })*
    };
}

impl_element! {
    u8 => U8,
    i8 => S8,
    u16 => U16,
    i16 => S16,
    u32 => U32,
    i32 => S32,
    half::f16 => F16,
    f32 => F32,
}

/// Memory layout of 4D feature maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataLayout {
    /// `[batch, channels, height, width]`.
    #[default]
    Nchw,
    /// `[batch, height, width, channels]`.
    Nhwc,
}

impl DataLayout {
    /// Indices of the (height, width) dimensions in a rank 4 shape.
    pub const fn spatial_dims(self) -> (usize, usize) {
        match self {
            Self::Nchw => (2, 3),
            Self::Nhwc => (1, 2),
        }
    }
}

/// Affine quantization parameters: `real = scale * (q - offset)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizationInfo {
    pub scale: f32,
    pub offset: i32,
}

impl QuantizationInfo {
    pub const fn new(scale: f32, offset: i32) -> Self {
        Self { scale, offset }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_rust_types() {
        assert_eq!(DataType::U8.size(), size_of::<u8>());
        assert_eq!(DataType::F16.size(), size_of::<half::f16>());
        assert_eq!(DataType::S32.size(), size_of::<i32>());
        assert_eq!(<f32 as Element>::DATA_TYPE, DataType::F32);
    }

    #[test]
    fn integer_ranges() {
        assert_eq!(DataType::U8.int_range(), Some((0, 255)));
        assert_eq!(DataType::S16.int_range(), Some((-32768, 32767)));
        assert_eq!(DataType::F32.int_range(), None);
    }
}
