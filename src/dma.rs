// Hardware Zip Accelerator Streaming Bridge
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! DMA-visible memory region and buffer handles.
//!
//! A session reserves one region and carves it into fixed slots (input
//! staging, output staging, hardware context). Slots are plain offset and
//! capacity pairs; device addresses are derived from the region's bus base.

use crate::error::{ZipError, ZipResult};
use std::ptr::NonNull;

/// Alignment of every slot inside a region.
pub const SLOT_ALIGN: usize = 64;

/// Slack reserved at the end of a region for allocator alignment.
pub const REGION_SLACK: usize = 4096;

#[inline]
const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Handle to a fixed-capacity buffer inside a [`DmaRegion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufSlot {
    /// Byte offset from the start of the region.
    pub offset: usize,
    /// Capacity in bytes.
    pub capacity: usize,
}

impl BufSlot {
    /// One past the last byte of the slot.
    #[inline]
    pub const fn end(&self) -> usize {
        self.offset + self.capacity
    }
}

/// Placement of the three session buffers inside one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaLayout {
    pub input: BufSlot,
    pub output: BufSlot,
    pub ctx: BufSlot,
    /// Bytes to reserve for the whole region.
    pub region_size: usize,
}

impl DmaLayout {
    /// Lay out input, output and context buffers back to back.
    pub fn new(in_capacity: usize, out_capacity: usize, ctx_size: usize) -> Self {
        let input = BufSlot {
            offset: 0,
            capacity: in_capacity,
        };
        let output = BufSlot {
            offset: align_up(input.end(), SLOT_ALIGN),
            capacity: out_capacity,
        };
        let ctx = BufSlot {
            offset: align_up(output.end(), SLOT_ALIGN),
            capacity: ctx_size,
        };
        Self {
            input,
            output,
            ctx,
            region_size: ctx.end() + REGION_SLACK,
        }
    }
}

enum Backing {
    Heap,
    #[cfg(target_os = "linux")]
    Mapped,
}

/// Owned, zero-initialised memory region shared with the accelerator.
///
/// The region is accessed through raw pointers only, so the accelerator (or
/// its software emulation) may read and write it by address while a
/// descriptor is in flight.
pub struct DmaRegion {
    ptr: NonNull<u8>,
    len: usize,
    backing: Backing,
    /// Device-visible address of byte 0.
    bus_base: u64,
}

// SAFETY: DmaRegion exclusively owns its memory; the pointer is never shared
// with another region and is released exactly once in Drop.
unsafe impl Send for DmaRegion {}

impl DmaRegion {
    /// Allocate a heap-backed region. The bus base is the virtual address.
    pub fn heap(size: usize) -> ZipResult<Self> {
        if size == 0 {
            return Err(ZipError::DmaReservation { size });
        }
        let boxed = vec![0u8; size].into_boxed_slice();
        let raw = Box::into_raw(boxed) as *mut u8;
        let ptr = NonNull::new(raw).ok_or(ZipError::DmaReservation { size })?;
        Ok(Self {
            ptr,
            len: size,
            backing: Backing::Heap,
            bus_base: raw as u64,
        })
    }

    /// Map a page-aligned anonymous region.
    #[cfg(target_os = "linux")]
    pub fn anonymous(size: usize) -> ZipResult<Self> {
        if size == 0 {
            return Err(ZipError::DmaReservation { size });
        }

        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if addr == libc::MAP_FAILED {
            log::warn!(
                "mmap of {} bytes failed: {}",
                size,
                std::io::Error::last_os_error()
            );
            return Err(ZipError::DmaReservation { size });
        }

        let ptr = NonNull::new(addr as *mut u8).ok_or(ZipError::DmaReservation { size })?;
        Ok(Self {
            ptr,
            len: size,
            backing: Backing::Mapped,
            bus_base: addr as u64,
        })
    }

    /// Allocate a region (heap-backed on this platform).
    #[cfg(not(target_os = "linux"))]
    pub fn anonymous(size: usize) -> ZipResult<Self> {
        Self::heap(size)
    }

    /// Region length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Virtual address of byte 0.
    #[inline]
    pub fn virt_base(&self) -> u64 {
        self.ptr.as_ptr() as u64
    }

    /// Device-visible address of byte 0.
    #[inline]
    pub fn bus_base(&self) -> u64 {
        self.bus_base
    }

    /// Override the device-visible base (after physical translation).
    pub fn set_bus_base(&mut self, bus_base: u64) {
        self.bus_base = bus_base;
    }

    /// Carve a slot, checking it lies inside the region.
    pub fn slot(&self, offset: usize, capacity: usize) -> ZipResult<BufSlot> {
        let slot = BufSlot { offset, capacity };
        if slot.end() > self.len {
            return Err(ZipError::InvalidConfig(format!(
                "slot {}..{} outside region of {} bytes",
                slot.offset,
                slot.end(),
                self.len
            )));
        }
        Ok(slot)
    }

    /// Device-visible address of `offset` bytes into `slot`.
    #[inline]
    pub fn bus_addr(&self, slot: BufSlot, offset: usize) -> u64 {
        debug_assert!(offset <= slot.capacity);
        self.bus_base + (slot.offset + offset) as u64
    }

    /// Borrow the bytes of a slot.
    pub fn bytes(&self, slot: BufSlot) -> &[u8] {
        assert!(slot.end() <= self.len, "slot outside region");
        // SAFETY: bounds checked above; the memory is owned and initialised.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(slot.offset), slot.capacity) }
    }

    /// Mutably borrow the bytes of a slot.
    pub fn bytes_mut(&mut self, slot: BufSlot) -> &mut [u8] {
        assert!(slot.end() <= self.len, "slot outside region");
        // SAFETY: bounds checked above; `&mut self` guarantees exclusivity.
        unsafe {
            std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(slot.offset), slot.capacity)
        }
    }
}

impl std::fmt::Debug for DmaRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaRegion")
            .field("virt_base", &format_args!("{:#x}", self.virt_base()))
            .field("bus_base", &format_args!("{:#x}", self.bus_base))
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for DmaRegion {
    fn drop(&mut self) {
        match self.backing {
            Backing::Heap => unsafe {
                let slice = std::ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len);
                drop(Box::from_raw(slice));
            },
            #[cfg(target_os = "linux")]
            Backing::Mapped => unsafe {
                libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len);
            },
        }
    }
}
