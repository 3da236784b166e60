//! Synthetic ELF32 executables with a symbol table, for resolver tests.

const SHT_NULL: u32 = 0;
const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const SHT_DYNSYM: u32 = 11;

pub const STT_OBJECT: u8 = 1;
pub const STT_FUNC: u8 = 2;

pub struct Sym {
    pub name: &'static str,
    pub value: u32,
    pub size: u32,
    pub kind: u8,
}

pub struct SymbolicElfBuilder {
    pub entry: u32,
    /// `(vaddr, memsz)` of each PT_LOAD; contents are zero-filled.
    pub segments: Vec<(u32, u32)>,
    pub symbols: Vec<Sym>,
    /// Emit the symbols as `.dynsym` instead of `.symtab`.
    pub dynsym_only: bool,
}

impl SymbolicElfBuilder {
    pub fn new() -> SymbolicElfBuilder {
        SymbolicElfBuilder {
            entry: 0x0804_9000,
            segments: Vec::new(),
            symbols: Vec::new(),
            dynsym_only: false,
        }
    }

    pub fn segment(mut self, vaddr: u32, memsz: u32) -> Self {
        self.segments.push((vaddr, memsz));
        self
    }

    pub fn func(mut self, name: &'static str, value: u32, size: u32) -> Self {
        self.symbols.push(Sym {
            name,
            value,
            size,
            kind: STT_FUNC,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let phnum = self.segments.len() as u16;
        let phoff = 52u32;
        let symtab_off = phoff + 32 * phnum as u32;

        // Symbol table: one null entry plus ours.
        let mut symtab = vec![0u8; 16];
        let mut strtab = vec![0u8];
        for s in &self.symbols {
            let name_off = strtab.len() as u32;
            strtab.extend_from_slice(s.name.as_bytes());
            strtab.push(0);

            symtab.extend_from_slice(&name_off.to_le_bytes());
            symtab.extend_from_slice(&s.value.to_le_bytes());
            symtab.extend_from_slice(&s.size.to_le_bytes());
            symtab.push(s.kind); // st_info: type in the low nibble
            symtab.push(0); // st_other
            symtab.extend_from_slice(&0u16.to_le_bytes()); // st_shndx
        }

        let strtab_off = symtab_off + symtab.len() as u32;
        let shoff = strtab_off + strtab.len() as u32;

        let mut out = Vec::new();
        out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 1, 1, 1, 0]);
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        out.extend_from_slice(&3u16.to_le_bytes()); // EM_386
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&self.entry.to_le_bytes());
        out.extend_from_slice(&phoff.to_le_bytes());
        out.extend_from_slice(&shoff.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&52u16.to_le_bytes());
        out.extend_from_slice(&32u16.to_le_bytes());
        out.extend_from_slice(&phnum.to_le_bytes());
        out.extend_from_slice(&40u16.to_le_bytes());
        out.extend_from_slice(&3u16.to_le_bytes()); // null, symtab, strtab
        out.extend_from_slice(&0u16.to_le_bytes());
        assert_eq!(out.len(), 52);

        for &(vaddr, memsz) in &self.segments {
            out.extend_from_slice(&1u32.to_le_bytes()); // PT_LOAD
            out.extend_from_slice(&0u32.to_le_bytes()); // p_offset
            out.extend_from_slice(&vaddr.to_le_bytes());
            out.extend_from_slice(&vaddr.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes()); // p_filesz
            out.extend_from_slice(&memsz.to_le_bytes());
            out.extend_from_slice(&5u32.to_le_bytes()); // R+X
            out.extend_from_slice(&0x1000u32.to_le_bytes());
        }

        out.extend_from_slice(&symtab);
        out.extend_from_slice(&strtab);

        // Section headers: null, symtab/dynsym, strtab.
        let symtab_type = if self.dynsym_only { SHT_DYNSYM } else { SHT_SYMTAB };
        let shdr = |sh_type: u32, off: u32, size: u32, link: u32, entsize: u32| {
            let mut h = Vec::new();
            h.extend_from_slice(&0u32.to_le_bytes()); // sh_name
            h.extend_from_slice(&sh_type.to_le_bytes());
            h.extend_from_slice(&0u32.to_le_bytes()); // sh_flags
            h.extend_from_slice(&0u32.to_le_bytes()); // sh_addr
            h.extend_from_slice(&off.to_le_bytes());
            h.extend_from_slice(&size.to_le_bytes());
            h.extend_from_slice(&link.to_le_bytes());
            h.extend_from_slice(&0u32.to_le_bytes()); // sh_info
            h.extend_from_slice(&0u32.to_le_bytes());
            h.extend_from_slice(&entsize.to_le_bytes());
            h
        };
        out.extend_from_slice(&shdr(SHT_NULL, 0, 0, 0, 0));
        out.extend_from_slice(&shdr(symtab_type, symtab_off, symtab.len() as u32, 2, 16));
        out.extend_from_slice(&shdr(SHT_STRTAB, strtab_off, strtab.len() as u32, 0, 0));

        out
    }

    pub fn write_temp(&self) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().expect("tempfile");
        f.write_all(&self.build()).expect("write elf");
        f.flush().expect("flush");
        f
    }
}

pub fn host_page_size() -> u32 {
    // SAFETY: sysconf is a pure query.
    let v = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if v <= 0 {
        4096
    } else {
        v as u32
    }
}
