//! Segmented emulated address space for the 32-bit guest.
//!
//! The address space is a small ordered table of non-overlapping segments,
//! each a contiguous page-rounded mapping with one protection type. The
//! table is populated while the ELF image is loaded and the stack is
//! created, then stays fixed for the life of the machine: the core loop
//! never unmaps or reprotects.
//!
//! Every access path returns `Result`; a fault names the kind of violation
//! and the offending address, and renders as the user-facing diagnostic.

use bitflags::bitflags;
use strato_elf::{ElfImage, SegFlags};
use thiserror::Error;

/// Default cursor for mappings that do not request an address.
pub const MAP_CURSOR_BASE: u32 = 0x0804_5000;
/// Fixed base of the guest stack mapping.
pub const STACK_TOP: u32 = 0x7fff_0000;
/// Stack size: four pages.
pub const STACK_SIZE: u32 = 0x4000;
/// High-byte mask identifying stack addresses for the fast path.
pub const STACK_MASK: u32 = 0x7f00_0000;

/// Error numbers carried by [`MemFault::errnum`].
pub const ENONE: i32 = 0;
pub const ESEGFAULT: i32 = 1;
pub const EPROT: i32 = 2;

/// Host page size, used for rounding mappings.
pub fn host_page_size() -> u32 {
    // SAFETY: sysconf is a pure query.
    let v = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if v <= 0 {
        4096
    } else {
        v as u32
    }
}

bitflags! {
    /// Requested protection for a mapping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Prot: u32 {
        const READ = 1;
        const WRITE = 2;
        const EXEC = 4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MapFlags: u32 {
        const STACK = 1;
    }
}

/// Protection type of a mapped segment. Stack segments are distinct so the
/// fast path and diagnostics can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    RoData,
    RwData,
    XoCode,
    RxCode,
    RwxCode,
    RwStack,
    RwxStack,
}

impl SegmentKind {
    fn from_prot(prot: Prot, stack: bool) -> SegmentKind {
        let w = prot.contains(Prot::WRITE);
        let x = prot.contains(Prot::EXEC);
        let r = prot.contains(Prot::READ);
        if stack {
            if x {
                SegmentKind::RwxStack
            } else {
                SegmentKind::RwStack
            }
        } else if x && w {
            SegmentKind::RwxCode
        } else if x && r {
            SegmentKind::RxCode
        } else if x {
            SegmentKind::XoCode
        } else if w {
            SegmentKind::RwData
        } else {
            SegmentKind::RoData
        }
    }

    pub fn is_readable(self) -> bool {
        self != SegmentKind::XoCode
    }

    pub fn is_writable(self) -> bool {
        matches!(
            self,
            SegmentKind::RwData | SegmentKind::RwxCode | SegmentKind::RwStack | SegmentKind::RwxStack
        )
    }

    pub fn is_executable(self) -> bool {
        matches!(
            self,
            SegmentKind::XoCode | SegmentKind::RxCode | SegmentKind::RwxCode | SegmentKind::RwxStack
        )
    }
}

/// A guest memory access fault. `Display` renders the diagnostics the run
/// loop reports before halting the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemFault {
    #[error("Segmentation Fault at 0x{addr:08x}")]
    Segfault { addr: u32 },
    #[error("attempted read at non-readable segment at 0x{addr:08x}")]
    NonReadable { addr: u32 },
    #[error("attempted write at non-writable segment at 0x{addr:08x}")]
    NonWritable { addr: u32 },
    #[error("attempted to execute code from a non-executable segment at 0x{addr:08x}")]
    NonExecutable { addr: u32 },
}

impl MemFault {
    pub fn addr(self) -> u32 {
        match self {
            MemFault::Segfault { addr }
            | MemFault::NonReadable { addr }
            | MemFault::NonWritable { addr }
            | MemFault::NonExecutable { addr } => addr,
        }
    }

    pub fn errnum(self) -> i32 {
        match self {
            MemFault::Segfault { .. } => ESEGFAULT,
            _ => EPROT,
        }
    }
}

/// A mapping request that could not be honored. These are host-fatal: they
/// only happen while the image is being loaded.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("refusing to map an empty segment")]
    EmptyMapping,
    #[error("file span larger than the mapping it populates")]
    BadFileSpan,
    #[error("mapping at 0x{vaddr:08x} overlaps an existing segment")]
    Overlap { vaddr: u32 },
    #[error("reading segment contents: {0}")]
    Io(#[from] std::io::Error),
}

/// Positioned-read source for populating the head of a new mapping.
pub struct FileSource<'a> {
    pub image: &'a ElfImage,
    pub offset: u32,
    pub filesz: u32,
}

#[derive(Debug)]
struct Segment {
    start: u32,
    limit: u32,
    kind: SegmentKind,
    bytes: Vec<u8>,
}

/// The emulated MMU: segment table plus the cached stack segment index.
#[derive(Debug)]
pub struct Mmu {
    segments: Vec<Segment>,
    stack: Option<usize>,
    cursor: u32,
    page_size: u32,
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}

impl Mmu {
    pub fn new() -> Mmu {
        Mmu {
            segments: Vec::new(),
            stack: None,
            cursor: MAP_CURSOR_BASE,
            page_size: host_page_size(),
        }
    }

    /// Create a new segment.
    ///
    /// `memsz` is rounded up to the page size. A `vaddr` of zero allocates
    /// at the running cursor, which always advances past the new mapping.
    /// When `source` is given, the first `filesz` bytes are populated by a
    /// positioned read from the executable. Returns the chosen address.
    pub fn map(
        &mut self,
        vaddr: u32,
        memsz: u32,
        prot: Prot,
        flags: MapFlags,
        source: Option<FileSource<'_>>,
    ) -> Result<u32, MapError> {
        if memsz == 0 {
            return Err(MapError::EmptyMapping);
        }

        // Align the base down; the lead-in bytes shift the contents within
        // the mapping so `vaddr` still addresses the first content byte.
        let (vaddr, head) = if vaddr == 0 {
            (self.cursor, 0)
        } else {
            let aligned = vaddr & !(self.page_size - 1);
            (aligned, vaddr - aligned)
        };
        let memsz = (memsz + head + self.page_size - 1) & !(self.page_size - 1);
        self.cursor = vaddr + memsz;
        let limit = vaddr + memsz;

        if self
            .segments
            .iter()
            .any(|s| vaddr < s.limit && s.start < limit)
        {
            return Err(MapError::Overlap { vaddr });
        }

        let mut bytes = vec![0u8; memsz as usize];
        if let Some(src) = source {
            if src.filesz == 0 || src.filesz > memsz - head {
                return Err(MapError::BadFileSpan);
            }
            let start = head as usize;
            src.image
                .read_at(&mut bytes[start..start + src.filesz as usize], src.offset)?;
        }

        let kind = SegmentKind::from_prot(prot, flags.contains(MapFlags::STACK));
        self.segments.push(Segment {
            start: vaddr,
            limit,
            kind,
            bytes,
        });
        if flags.contains(MapFlags::STACK) {
            self.stack = Some(self.segments.len() - 1);
        }

        Ok(vaddr)
    }

    /// Map every `PT_LOAD` segment of the executable.
    pub fn map_loadable(&mut self, image: &ElfImage) -> Result<(), MapError> {
        for seg in image.loadable() {
            let mut prot = Prot::empty();
            if seg.flags.contains(SegFlags::R) {
                prot |= Prot::READ;
            }
            if seg.flags.contains(SegFlags::W) {
                prot |= Prot::WRITE;
            }
            if seg.flags.contains(SegFlags::X) {
                prot |= Prot::EXEC;
            }

            let source = (seg.filesz > 0).then_some(FileSource {
                image,
                offset: seg.offset,
                filesz: seg.filesz,
            });
            self.map(seg.vaddr, seg.memsz, prot, MapFlags::empty(), source)?;
        }
        Ok(())
    }

    /// Map the fixed stack range and return the initial stack pointer
    /// (one past the top of the mapping).
    pub fn create_stack(&mut self, exec: bool) -> Result<u32, MapError> {
        let mut prot = Prot::READ | Prot::WRITE;
        if exec {
            prot |= Prot::EXEC;
        }
        self.map(STACK_TOP, STACK_SIZE, prot, MapFlags::STACK, None)?;
        Ok(STACK_TOP + STACK_SIZE)
    }

    /// Locate the segment containing `vaddr`. Stack addresses short-circuit
    /// to the cached stack segment; everything else is a linear scan.
    fn lookup(&self, vaddr: u32) -> Option<&Segment> {
        if (vaddr & STACK_MASK) == STACK_MASK {
            let seg = &self.segments[self.stack?];
            return (vaddr >= seg.start && vaddr < seg.limit).then_some(seg);
        }
        self.segments
            .iter()
            .find(|s| vaddr >= s.start && vaddr < s.limit)
    }

    fn lookup_mut(&mut self, vaddr: u32) -> Option<&mut Segment> {
        if (vaddr & STACK_MASK) == STACK_MASK {
            let idx = self.stack?;
            let seg = &mut self.segments[idx];
            return (vaddr >= seg.start && vaddr < seg.limit).then_some(seg);
        }
        self.segments
            .iter_mut()
            .find(|s| vaddr >= s.start && vaddr < s.limit)
    }

    /// Protection type of the segment holding `vaddr`, if any.
    pub fn ptr_type(&self, vaddr: u32) -> Option<SegmentKind> {
        self.lookup(vaddr).map(|s| s.kind)
    }

    /// Fetch one instruction byte. Only executable segments may supply
    /// instruction bytes.
    pub fn fetch(&self, vaddr: u32) -> Result<u8, MemFault> {
        let seg = self
            .lookup(vaddr)
            .ok_or(MemFault::Segfault { addr: vaddr })?;
        if !seg.kind.is_executable() {
            return Err(MemFault::NonExecutable { addr: vaddr });
        }
        Ok(seg.bytes[(vaddr - seg.start) as usize])
    }

    fn read_span(&self, vaddr: u32, len: usize) -> Result<&[u8], MemFault> {
        let seg = self
            .lookup(vaddr)
            .ok_or(MemFault::Segfault { addr: vaddr })?;
        if !seg.kind.is_readable() {
            return Err(MemFault::NonReadable { addr: vaddr });
        }
        let off = (vaddr - seg.start) as usize;
        seg.bytes
            .get(off..off + len)
            .ok_or(MemFault::Segfault { addr: vaddr })
    }

    fn write_span(&mut self, vaddr: u32, bytes: &[u8]) -> Result<(), MemFault> {
        let seg = self
            .lookup_mut(vaddr)
            .ok_or(MemFault::Segfault { addr: vaddr })?;
        if !seg.kind.is_writable() {
            return Err(MemFault::NonWritable { addr: vaddr });
        }
        let off = (vaddr - seg.start) as usize;
        let dst = seg
            .bytes
            .get_mut(off..off + bytes.len())
            .ok_or(MemFault::Segfault { addr: vaddr })?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    pub fn read8(&self, vaddr: u32) -> Result<u8, MemFault> {
        Ok(self.read_span(vaddr, 1)?[0])
    }

    pub fn read16(&self, vaddr: u32) -> Result<u16, MemFault> {
        let b = self.read_span(vaddr, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read32(&self, vaddr: u32) -> Result<u32, MemFault> {
        let b = self.read_span(vaddr, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read64(&self, vaddr: u32) -> Result<u64, MemFault> {
        let b = self.read_span(vaddr, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn write8(&mut self, vaddr: u32, v: u8) -> Result<(), MemFault> {
        self.write_span(vaddr, &[v])
    }

    pub fn write16(&mut self, vaddr: u32, v: u16) -> Result<(), MemFault> {
        self.write_span(vaddr, &v.to_le_bytes())
    }

    pub fn write32(&mut self, vaddr: u32, v: u32) -> Result<(), MemFault> {
        self.write_span(vaddr, &v.to_le_bytes())
    }

    pub fn write64(&mut self, vaddr: u32, v: u64) -> Result<(), MemFault> {
        self.write_span(vaddr, &v.to_le_bytes())
    }

    /// Borrow `len` readable bytes starting at `vaddr`.
    pub fn slice(&self, vaddr: u32, len: u32) -> Result<&[u8], MemFault> {
        self.read_span(vaddr, len as usize)
    }
}
