//! Read-only view of a 32-bit x86 Linux ELF executable.
//!
//! [`ElfImage::open`] validates the file identification, walks the program
//! headers, and keeps only what the rest of the emulator needs: the
//! `PT_LOAD` segment table, the entry point, the executable-stack flag from
//! `PT_GNU_STACK`, and the open file handle so segment contents can be read
//! with positioned reads when they are mapped.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use thiserror::Error;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const ELFCLASS32: u8 = 1;
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ELFOSABI_SYSV: u8 = 0;
const ET_EXEC: u16 = 2;
const EM_386: u16 = 3;

const PT_LOAD: u32 = 1;
const PT_GNU_STACK: u32 = 0x6474_e551;

bitflags! {
    /// Program-header segment permission flags (`p_flags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegFlags: u32 {
        const X = 1;
        const W = 2;
        const R = 4;
    }
}

/// One `PT_LOAD` program header, reduced to the fields the MMU consumes.
#[derive(Debug, Clone, Copy)]
pub struct LoadSegment {
    /// Offset of the segment contents from the beginning of the file.
    pub offset: u32,
    /// Virtual address the segment wants to live at.
    pub vaddr: u32,
    /// Number of content bytes present in the file.
    pub filesz: u32,
    /// Size of the segment in memory (zero-filled past `filesz`).
    pub memsz: u32,
    pub flags: SegFlags,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("emulator: {0}: {1}")]
    Io(PathBuf, #[source] io::Error),
    #[error("emulator: file is not an ELF")]
    NotElf,
    #[error("emulator: file is not an executable")]
    NotAnExecutable,
    #[error("emulator: unsupported {0}")]
    Unsupported(&'static str),
}

/// Parsed executable: identification checked, loadable segments collected,
/// file handle retained for positioned reads.
#[derive(Debug)]
pub struct ElfImage {
    file: File,
    path: PathBuf,
    loadable: Vec<LoadSegment>,
    entry: u32,
    exec_stack: bool,
}

fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

impl ElfImage {
    /// Open and validate `path` as a little-endian System V ELF32 executable
    /// for EM_386.
    ///
    /// Anything else is rejected: wrong magic is [`LoadError::NotElf`],
    /// a relocatable or shared object is [`LoadError::NotAnExecutable`],
    /// and a 64-bit class, foreign ABI, or foreign machine is
    /// [`LoadError::Unsupported`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<ElfImage, LoadError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| LoadError::Io(path.clone(), e))?;

        // The ELF32 header is 52 bytes.
        let mut ehdr = [0u8; 52];
        file.read_exact_at(&mut ehdr, 0)
            .map_err(|_| LoadError::NotElf)?;

        if ehdr[..4] != ELF_MAGIC {
            return Err(LoadError::NotElf);
        }
        match ehdr[4] {
            ELFCLASS32 => {}
            ELFCLASS64 => return Err(LoadError::Unsupported("64-bit binaries")),
            _ => return Err(LoadError::Unsupported("ELF class")),
        }
        if ehdr[5] != ELFDATA2LSB {
            return Err(LoadError::Unsupported("big-endian binaries"));
        }
        if ehdr[7] != ELFOSABI_SYSV {
            return Err(LoadError::Unsupported("ABI"));
        }
        if u16_at(&ehdr, 16) != ET_EXEC {
            return Err(LoadError::NotAnExecutable);
        }
        if u16_at(&ehdr, 18) != EM_386 {
            return Err(LoadError::Unsupported("architecture"));
        }

        let entry = u32_at(&ehdr, 24);
        let phoff = u32_at(&ehdr, 28) as u64;
        let phentsize = u16_at(&ehdr, 42) as u64;
        let phnum = u16_at(&ehdr, 44);

        let mut loadable = Vec::new();
        let mut exec_stack = false;

        let mut off = phoff;
        for _ in 0..phnum {
            let mut phdr = [0u8; 32];
            file.read_exact_at(&mut phdr, off)
                .map_err(|e| LoadError::Io(path.clone(), e))?;
            off += phentsize;

            let p_type = u32_at(&phdr, 0);
            let flags = SegFlags::from_bits_truncate(u32_at(&phdr, 24));

            if p_type == PT_LOAD {
                loadable.push(LoadSegment {
                    offset: u32_at(&phdr, 4),
                    vaddr: u32_at(&phdr, 8),
                    filesz: u32_at(&phdr, 16),
                    memsz: u32_at(&phdr, 20),
                    flags,
                });
            } else if p_type == PT_GNU_STACK {
                exec_stack = flags.contains(SegFlags::X);
            }
        }

        Ok(ElfImage {
            file,
            path,
            loadable,
            entry,
            exec_stack,
        })
    }

    pub fn loadable(&self) -> &[LoadSegment] {
        &self.loadable
    }

    pub fn entry_point(&self) -> u32 {
        self.entry
    }

    /// Whether `PT_GNU_STACK` asked for an executable stack.
    pub fn exec_stack(&self) -> bool {
        self.exec_stack
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Positioned read of segment contents from the underlying file.
    pub fn read_at(&self, buf: &mut [u8], offset: u32) -> io::Result<()> {
        self.file.read_exact_at(buf, offset as u64)
    }
}
