//! Tensor descriptors and caller-owned tensor buffers.
//!
//! # Descriptors
//!
//! A [`TensorDescriptor`] describes a strided buffer without owning it:
//! shape (outermost first), element strides, [`DataType`], [`DataLayout`],
//! optional [`QuantizationInfo`] and [`Padding`]. Padding reserves halo space
//! around the two innermost dimensions; the logical element `[0, .., 0]`
//! sits at the *origin*, which is offset into the buffer by the padding.
//!
//! # Tensors
//!
//! A [`Tensor`] pairs a descriptor with shared storage. Cloning a tensor
//! shares the buffer. Kernels reach the bytes through a [`TensorAccess`];
//! host reads and writes block until every launch still touching the buffer
//! has finished, so results of a queued backend are never observed early.
//!
//! ## Example
//!
//! ```rust
//! use briny_exec::dtype::DataType;
//! use briny_exec::tensors::{Tensor, TensorDescriptor};
//!
//! let desc = TensorDescriptor::new([2, 2], DataType::F32);
//! let t = Tensor::from_slice(desc, &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
//! assert_eq!(t.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
//! ```

use crate::allocator::Block;
use crate::dtype::{DataLayout, DataType, Element, QuantizationInfo};
use crate::error::{ConfigError, TensorError};
use crate::window::Window;
use briny::prelude::*;
use core::fmt;
use core::ptr::NonNull;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Halo elements around the two innermost dimensions.
///
/// `top`/`bottom` apply to the second-innermost dimension, `left`/`right` to
/// the innermost one. Rank 1 tensors only accept `left`/`right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Padding {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

impl Padding {
    pub const NONE: Self = Self::uniform(0);

    pub const fn uniform(n: usize) -> Self {
        Self {
            top: n,
            bottom: n,
            left: n,
            right: n,
        }
    }

    /// Narrowest side; the border size every side can provide.
    pub fn min_side(&self) -> usize {
        self.top.min(self.bottom).min(self.left).min(self.right)
    }
}

/// Shape, strides, type and layout of a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorDescriptor {
    shape: Vec<usize>,
    strides: Vec<usize>,
    data_type: DataType,
    layout: DataLayout,
    quantization: Option<QuantizationInfo>,
    padding: Padding,
}

impl TensorDescriptor {
    /// Dense row-major descriptor without padding.
    pub fn new(shape: impl Into<Vec<usize>>, data_type: DataType) -> Self {
        let shape = shape.into();
        let mut desc = Self {
            strides: Vec::new(),
            shape,
            data_type,
            layout: DataLayout::default(),
            quantization: None,
            padding: Padding::NONE,
        };
        desc.strides = desc.dense_strides();
        desc
    }

    /// Reserves halo space. Dense strides are recomputed over the padded
    /// extents; strides set with [`with_strides`](Self::with_strides) are kept.
    #[must_use]
    pub fn with_padding(mut self, padding: Padding) -> Self {
        let dense = self.strides == self.dense_strides();
        self.padding = padding;
        if dense {
            self.strides = self.dense_strides();
        }
        self
    }

    /// Replaces the strides (in elements).
    #[must_use]
    pub fn with_strides(mut self, strides: impl Into<Vec<usize>>) -> Self {
        self.strides = strides.into();
        self
    }

    #[must_use]
    pub fn with_layout(mut self, layout: DataLayout) -> Self {
        self.layout = layout;
        self
    }

    #[must_use]
    pub fn with_quantization(mut self, info: QuantizationInfo) -> Self {
        self.quantization = Some(info);
        self
    }

    /// Same geometry, another element type.
    #[must_use]
    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub const fn data_type(&self) -> DataType {
        self.data_type
    }

    pub const fn layout(&self) -> DataLayout {
        self.layout
    }

    pub const fn quantization(&self) -> Option<QuantizationInfo> {
        self.quantization
    }

    pub const fn padding(&self) -> Padding {
        self.padding
    }

    /// Number of logical elements.
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Halo before and after each dimension.
    pub(crate) fn halo(&self, dim: usize) -> (usize, usize) {
        let rank = self.rank();
        if dim + 1 == rank {
            (self.padding.left, self.padding.right)
        } else if dim + 2 == rank {
            (self.padding.top, self.padding.bottom)
        } else {
            (0, 0)
        }
    }

    fn padded_extent(&self, dim: usize) -> usize {
        let (lo, hi) = self.halo(dim);
        self.shape[dim] + lo + hi
    }

    fn dense_strides(&self) -> Vec<usize> {
        let mut strides = vec![0; self.rank()];
        let mut acc: usize = 1;
        for dim in (0..self.rank()).rev() {
            strides[dim] = acc;
            // an empty dimension still gets distinct strides outside it
            acc = acc.saturating_mul(self.padded_extent(dim).max(1));
        }
        strides
    }

    /// Elements from the buffer start to the logical origin.
    pub(crate) fn origin_offset(&self) -> usize {
        (0..self.rank())
            .map(|d| self.halo(d).0 * self.strides[d])
            .sum()
    }

    /// Element offset of `coords` relative to the origin, `None` if the
    /// position lies outside the allocated (padded) extent.
    pub fn offset_of(&self, coords: &[isize]) -> Option<isize> {
        if coords.len() != self.rank() {
            return None;
        }
        let mut offset = 0isize;
        for (dim, &c) in coords.iter().enumerate() {
            let (lo, hi) = self.halo(dim);
            if c < -(lo as isize) || c >= (self.shape[dim] + hi) as isize {
                return None;
            }
            offset += c * self.strides[dim] as isize;
        }
        Some(offset)
    }

    /// Bytes the buffer behind this descriptor must hold.
    pub fn byte_size(&self) -> usize {
        if (0..self.rank()).any(|d| self.padded_extent(d) == 0) {
            return 0;
        }
        let last: usize = (0..self.rank())
            .map(|d| (self.padded_extent(d) - 1) * self.strides[d])
            .sum();
        (last + 1) * self.data_type.size()
    }

    /// The window of logical positions.
    pub fn window(&self) -> Window {
        Window::from_shape(&self.shape)
    }

    /// Checks internal consistency, describing the first problem found.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.problem()
            .map_or(Ok(()), |reason| Err(ConfigError::InvalidDescriptor { reason }))
    }

    fn problem(&self) -> Option<String> {
        let rank = self.rank();
        if rank == 0 {
            return Some("rank 0 tensors are not supported".into());
        }
        if self.strides.len() != rank {
            return Some(format!(
                "{} strides given for rank {rank}",
                self.strides.len()
            ));
        }
        if rank == 1 && (self.padding.top != 0 || self.padding.bottom != 0) {
            return Some("rank 1 tensors cannot carry top/bottom padding".into());
        }
        if let Some(q) = self.quantization {
            if !(q.scale.is_finite() && q.scale > 0.0) {
                return Some(format!("quantization scale {} must be positive", q.scale));
            }
        }
        // An empty tensor addresses no element, so nothing can overlap.
        if (0..rank).any(|d| self.padded_extent(d) == 0) {
            return None;
        }
        // Every dimension must step over the full padded span of the
        // dimensions inside it, otherwise two positions share an element.
        let mut order: Vec<usize> = (0..rank).collect();
        order.sort_by_key(|&d| (self.strides[d], core::cmp::Reverse(d)));
        let mut span = 1usize;
        for &d in &order {
            let extent = self.padded_extent(d);
            if extent <= 1 {
                continue;
            }
            if self.strides[d] < span {
                return Some(format!(
                    "stride {} of dimension {d} overlaps inner dimensions",
                    self.strides[d]
                ));
            }
            span = match self.strides[d].checked_mul(extent) {
                Some(s) => s,
                None => return Some("buffer size overflows".into()),
            };
        }
        if span.checked_mul(self.data_type.size()).is_none() {
            return Some("buffer size overflows".into());
        }
        None
    }
}

impl Validate for TensorDescriptor {
    fn validate(&self) -> Result<(), ValidationError> {
        match self.problem() {
            None => Ok(()),
            Some(_) => Err(ValidationError),
        }
    }
}

impl fmt::Display for TensorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.data_type, self.shape)
    }
}

/// Buffer bytes plus the count of launches still reading or writing them.
struct Storage {
    block: Block,
    in_flight: Mutex<usize>,
    idle: Condvar,
}

impl Storage {
    fn new(block: Block) -> Arc<Self> {
        Arc::new(Self {
            block,
            in_flight: Mutex::new(0),
            idle: Condvar::new(),
        })
    }
}

/// Keeps a tensor marked busy while a launch may touch it.
pub(crate) struct DeviceUse {
    storage: Arc<Storage>,
}

impl Drop for DeviceUse {
    fn drop(&mut self) {
        let mut n = self.storage.in_flight.lock();
        *n -= 1;
        if *n == 0 {
            self.storage.idle.notify_all();
        }
    }
}

impl fmt::Debug for DeviceUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceUse")
    }
}

/// A caller-owned buffer with its descriptor.
#[derive(Clone)]
pub struct Tensor {
    desc: Arc<TensorDescriptor>,
    storage: Arc<Storage>,
}

impl Tensor {
    /// Allocates a zero-filled tensor.
    ///
    /// # Errors
    /// Returns [`TensorError::Descriptor`] if the descriptor is inconsistent
    /// and [`TensorError::Alloc`] if the buffer cannot be allocated.
    pub fn zeros(desc: TensorDescriptor) -> Result<Self, TensorError> {
        desc.check()?;
        let desc = TrustedData::new(desc)
            .map_err(|_| ConfigError::InvalidDescriptor {
                reason: "descriptor failed validation".into(),
            })?
            .into_inner();
        let block = Block::zeroed(desc.byte_size())?;
        Ok(Self::with_block(desc, block))
    }

    /// Allocates a tensor and fills its logical elements from `data`
    /// (row-major). Padding stays zero.
    pub fn from_slice<T: Element>(desc: TensorDescriptor, data: &[T]) -> Result<Self, TensorError> {
        let tensor = Self::zeros(desc)?;
        tensor.copy_from_slice(data)?;
        Ok(tensor)
    }

    /// Wraps an allocated block; `block` must hold `desc.byte_size()` bytes.
    pub(crate) fn with_block(desc: TensorDescriptor, block: Block) -> Self {
        debug_assert!(block.len() >= desc.byte_size());
        Self {
            desc: Arc::new(desc),
            storage: Storage::new(block),
        }
    }

    pub fn descriptor(&self) -> &TensorDescriptor {
        &self.desc
    }

    pub fn shape(&self) -> &[usize] {
        self.desc.shape()
    }

    pub fn data_type(&self) -> DataType {
        self.desc.data_type()
    }

    /// Whether both handles refer to the same buffer.
    pub fn shares_buffer(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Overwrites the logical elements with `data` (row-major).
    ///
    /// Blocks until no launch is using the buffer.
    pub fn copy_from_slice<T: Element>(&self, data: &[T]) -> Result<(), TensorError> {
        self.check_host_access::<T>(data.len())?;
        let _idle = self.wait_idle();
        let access = self.access();
        let mut values = data.iter();
        self.desc.window().for_each(|coords| {
            if let Some(&v) = values.next() {
                access.write(coords, v);
            }
        });
        Ok(())
    }

    /// Copies the logical elements out (row-major).
    ///
    /// Blocks until no launch is using the buffer.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>, TensorError> {
        self.check_host_access::<T>(self.desc.num_elements())?;
        let _idle = self.wait_idle();
        let access = self.access();
        let mut out = Vec::with_capacity(self.desc.num_elements());
        self.desc
            .window()
            .for_each(|coords| out.push(access.read::<T>(coords)));
        Ok(out)
    }

    fn check_host_access<T: Element>(&self, len: usize) -> Result<(), TensorError> {
        if T::DATA_TYPE != self.data_type() {
            return Err(TensorError::Type {
                expected: self.data_type(),
                actual: T::DATA_TYPE,
            });
        }
        let expected = self.desc.num_elements();
        if len != expected {
            return Err(TensorError::Length {
                expected,
                actual: len,
            });
        }
        Ok(())
    }

    /// Holds the in-flight lock once no launch uses the buffer, so none can
    /// start while the host copies.
    fn wait_idle(&self) -> parking_lot::MutexGuard<'_, usize> {
        let mut n = self.storage.in_flight.lock();
        while *n > 0 {
            self.storage.idle.wait(&mut n);
        }
        n
    }

    /// Marks the buffer busy until the returned guard is dropped.
    pub(crate) fn begin_use(&self) -> DeviceUse {
        *self.storage.in_flight.lock() += 1;
        DeviceUse {
            storage: Arc::clone(&self.storage),
        }
    }

    /// Raw element access for kernels.
    pub(crate) fn access(&self) -> TensorAccess {
        let offset = self.desc.origin_offset() * self.data_type().size();
        let base = self.storage.block.as_ptr();
        // SAFETY: the origin lies inside the block, which holds
        // `byte_size()` bytes for this descriptor.
        let origin = if self.storage.block.is_empty() {
            base
        } else {
            unsafe { base.add(offset) }
        };
        TensorAccess {
            origin,
            desc: Arc::clone(&self.desc),
            _storage: Arc::clone(&self.storage),
        }
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("desc", &*self.desc)
            .field("bytes", &self.storage.block.len())
            .finish()
    }
}

/// Bounds-checked element access handed to kernel bodies.
///
/// Positions are logical coordinates; negative values and values past the
/// extent address the halo. Concurrent writers must touch disjoint positions,
/// which the window partitioner guarantees for kernels that write only inside
/// their partition.
#[derive(Clone)]
pub struct TensorAccess {
    origin: NonNull<u8>,
    desc: Arc<TensorDescriptor>,
    _storage: Arc<Storage>,
}

// SAFETY: the storage is kept alive by `_storage`; disjointness of concurrent
// writes is a scheduling invariant.
unsafe impl Send for TensorAccess {}
unsafe impl Sync for TensorAccess {}

impl TensorAccess {
    pub fn descriptor(&self) -> &TensorDescriptor {
        &self.desc
    }

    pub fn shape(&self) -> &[usize] {
        self.desc.shape()
    }

    pub fn data_type(&self) -> DataType {
        self.desc.data_type()
    }

    fn element_ptr(&self, coords: &[isize]) -> *mut u8 {
        let offset = self.desc.offset_of(coords).unwrap_or_else(|| {
            panic!(
                "position {coords:?} is outside the allocated extent of {}",
                self.desc
            )
        });
        // SAFETY: `offset_of` only accepts positions inside the padded extent.
        unsafe {
            self.origin
                .as_ptr()
                .offset(offset * self.desc.data_type().size() as isize)
        }
    }

    /// # Panics
    /// Panics if `T` has the wrong size or the position is out of bounds.
    #[inline]
    pub fn read<T: Element>(&self, coords: &[isize]) -> T {
        assert_eq!(size_of::<T>(), self.desc.data_type().size(), "element size mismatch");
        // SAFETY: bounds checked by `element_ptr`; `T` is `Pod`.
        unsafe { self.element_ptr(coords).cast::<T>().read_unaligned() }
    }

    /// # Panics
    /// Panics if `T` has the wrong size or the position is out of bounds.
    #[inline]
    pub fn write<T: Element>(&self, coords: &[isize], value: T) {
        assert_eq!(size_of::<T>(), self.desc.data_type().size(), "element size mismatch");
        // SAFETY: bounds checked by `element_ptr`; disjoint per partition.
        unsafe { self.element_ptr(coords).cast::<T>().write_unaligned(value) }
    }

    /// Copies one element from `src` at `from` to `self` at `to`.
    ///
    /// # Panics
    /// Panics if the element types differ in size or a position is out of bounds.
    #[inline]
    pub fn copy_element(&self, to: &[isize], src: &TensorAccess, from: &[isize]) {
        let size = self.desc.data_type().size();
        assert_eq!(size, src.desc.data_type().size(), "element size mismatch");
        let s = src.element_ptr(from);
        let d = self.element_ptr(to);
        // SAFETY: both ranges are in bounds; `copy` tolerates overlap.
        unsafe { core::ptr::copy(s, d, size) }
    }
}

impl fmt::Debug for TensorAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorAccess").field("desc", &*self.desc).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_strides_are_row_major() {
        let d = TensorDescriptor::new([2, 3, 4], DataType::F32);
        assert_eq!(d.strides(), &[12, 4, 1]);
        assert_eq!(d.byte_size(), 96);
        assert!(d.check().is_ok());
    }

    #[test]
    fn padding_moves_the_origin() {
        let d = TensorDescriptor::new([2, 3], DataType::U8).with_padding(Padding::uniform(1));
        assert_eq!(d.strides(), &[5, 1]);
        assert_eq!(d.origin_offset(), 6);
        assert_eq!(d.byte_size(), 20);
        assert_eq!(d.offset_of(&[-1, -1]), Some(-6));
        assert_eq!(d.offset_of(&[2, 3]), Some(13));
        assert_eq!(d.offset_of(&[3, 0]), None);
    }

    #[test]
    fn overlapping_strides_are_rejected() {
        let d = TensorDescriptor::new([2, 3], DataType::F32).with_strides([2, 1]);
        assert!(matches!(d.check(), Err(ConfigError::InvalidDescriptor { .. })));
        assert!(d.validate().is_err());

        let strided = TensorDescriptor::new([2, 3], DataType::F32).with_strides([8, 1]);
        assert!(strided.check().is_ok());
        assert_eq!(strided.byte_size(), (8 + 2 + 1) * 4);
    }

    #[test]
    fn empty_extents_are_valid() {
        for shape in [[4, 0], [0, 3]] {
            let d = TensorDescriptor::new(shape, DataType::F32);
            assert!(d.check().is_ok(), "{shape:?}");
            assert_eq!(d.byte_size(), 0);
            let t = Tensor::zeros(d).unwrap();
            assert!(t.to_vec::<f32>().unwrap().is_empty());
        }
        assert_eq!(TensorDescriptor::new([4, 0], DataType::F32).strides(), &[1, 1]);
    }

    #[test]
    fn padding_keeps_explicit_strides() {
        let strided = TensorDescriptor::new([2, 3], DataType::U8)
            .with_strides([16, 1])
            .with_padding(Padding::uniform(1));
        assert_eq!(strided.strides(), &[16, 1]);
        assert!(strided.check().is_ok());

        let dense = TensorDescriptor::new([2, 3], DataType::U8).with_padding(Padding::uniform(1));
        assert_eq!(dense.strides(), &[5, 1]);
    }

    #[test]
    fn rank_one_rejects_vertical_padding() {
        let d = TensorDescriptor::new([4], DataType::F32).with_padding(Padding {
            top: 1,
            ..Padding::NONE
        });
        assert!(d.check().is_err());
    }

    #[test]
    fn host_copies_skip_padding() {
        let d = TensorDescriptor::new([2, 2], DataType::S16).with_padding(Padding::uniform(2));
        let t = Tensor::from_slice(d, &[1i16, -2, 3, -4]).unwrap();
        assert_eq!(t.to_vec::<i16>().unwrap(), vec![1, -2, 3, -4]);
        assert_eq!(t.access().read::<i16>(&[-2, -2]), 0);
    }

    #[test]
    fn host_access_checks_type_and_length() {
        let t = Tensor::zeros(TensorDescriptor::new([3], DataType::F32)).unwrap();
        assert!(matches!(t.to_vec::<u8>(), Err(TensorError::Type { .. })));
        assert!(matches!(
            t.copy_from_slice(&[1.0f32]),
            Err(TensorError::Length { expected: 3, actual: 1 })
        ));
    }

    #[test]
    fn host_read_waits_for_device_use() {
        let t = Tensor::from_slice(TensorDescriptor::new([1], DataType::U32), &[0u32]).unwrap();
        let guard = t.begin_use();
        let access = t.access();
        let reader = {
            let t = t.clone();
            std::thread::spawn(move || t.to_vec::<u32>().unwrap())
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        access.write(&[0], 7u32);
        drop(guard);
        assert_eq!(reader.join().unwrap(), vec![7]);
    }

    #[test]
    fn clones_share_the_buffer() {
        let a = Tensor::zeros(TensorDescriptor::new([2], DataType::U8)).unwrap();
        let b = a.clone();
        let c = Tensor::zeros(TensorDescriptor::new([2], DataType::U8)).unwrap();
        assert!(a.shares_buffer(&b));
        assert!(!a.shares_buffer(&c));
    }

    #[test]
    #[should_panic(expected = "outside the allocated extent")]
    fn out_of_bounds_access_panics() {
        let t = Tensor::zeros(TensorDescriptor::new([2], DataType::U8)).unwrap();
        t.access().read::<u8>(&[2]);
    }
}
