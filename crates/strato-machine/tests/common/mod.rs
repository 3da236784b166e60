//! Full synthetic ELF32 executables: loadable contents, optional symbols,
//! optional executable-stack marker.

pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;

pub struct ProgramBuilder {
    pub entry: u32,
    segments: Vec<(u32, u32, Vec<u8>)>, // vaddr, flags, contents
    symbols: Vec<(&'static str, u32, u32)>, // name, value, size
    exec_stack: Option<bool>,
}

impl ProgramBuilder {
    pub fn at(entry: u32) -> ProgramBuilder {
        ProgramBuilder {
            entry,
            segments: Vec::new(),
            symbols: Vec::new(),
            exec_stack: None,
        }
    }

    pub fn text(mut self, vaddr: u32, code: &[u8]) -> Self {
        self.segments.push((vaddr, PF_R | PF_X, code.to_vec()));
        self
    }

    pub fn data(mut self, vaddr: u32, bytes: &[u8]) -> Self {
        self.segments.push((vaddr, PF_R | PF_W, bytes.to_vec()));
        self
    }

    pub fn rodata(mut self, vaddr: u32, bytes: &[u8]) -> Self {
        self.segments.push((vaddr, PF_R, bytes.to_vec()));
        self
    }

    pub fn func(mut self, name: &'static str, value: u32, size: u32) -> Self {
        self.symbols.push((name, value, size));
        self
    }

    pub fn exec_stack(mut self, on: bool) -> Self {
        self.exec_stack = Some(on);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let phnum = self.segments.len() as u16 + self.exec_stack.is_some() as u16;
        let phoff = 52u32;
        let mut data_off = phoff + 32 * phnum as u32;

        // Content layout.
        let mut contents = Vec::new();
        let mut offsets = Vec::new();
        for (_, _, bytes) in &self.segments {
            offsets.push(data_off);
            contents.extend_from_slice(bytes);
            data_off += bytes.len() as u32;
        }

        // Symbol and string tables.
        let mut symtab = vec![0u8; 16];
        let mut strtab = vec![0u8];
        for &(name, value, size) in &self.symbols {
            let name_off = strtab.len() as u32;
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
            symtab.extend_from_slice(&name_off.to_le_bytes());
            symtab.extend_from_slice(&value.to_le_bytes());
            symtab.extend_from_slice(&size.to_le_bytes());
            symtab.push(2); // STT_FUNC
            symtab.push(0);
            symtab.extend_from_slice(&0u16.to_le_bytes());
        }
        let symtab_off = data_off;
        let strtab_off = symtab_off + symtab.len() as u32;
        let shoff = strtab_off + strtab.len() as u32;

        let mut out = Vec::new();
        out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 1, 1, 1, 0]);
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&3u16.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&self.entry.to_le_bytes());
        out.extend_from_slice(&phoff.to_le_bytes());
        out.extend_from_slice(&shoff.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&52u16.to_le_bytes());
        out.extend_from_slice(&32u16.to_le_bytes());
        out.extend_from_slice(&phnum.to_le_bytes());
        out.extend_from_slice(&40u16.to_le_bytes());
        out.extend_from_slice(&3u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        assert_eq!(out.len(), 52);

        for (i, (vaddr, flags, bytes)) in self.segments.iter().enumerate() {
            out.extend_from_slice(&1u32.to_le_bytes()); // PT_LOAD
            out.extend_from_slice(&offsets[i].to_le_bytes());
            out.extend_from_slice(&vaddr.to_le_bytes());
            out.extend_from_slice(&vaddr.to_le_bytes());
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&flags.to_le_bytes());
            out.extend_from_slice(&0x1000u32.to_le_bytes());
        }
        if let Some(exec) = self.exec_stack {
            let flags = if exec { PF_R | PF_W | PF_X } else { PF_R | PF_W };
            out.extend_from_slice(&0x6474_e551u32.to_le_bytes()); // PT_GNU_STACK
            out.extend_from_slice(&[0u8; 12]);
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&flags.to_le_bytes());
            out.extend_from_slice(&0x10u32.to_le_bytes());
        }

        out.extend_from_slice(&contents);
        out.extend_from_slice(&symtab);
        out.extend_from_slice(&strtab);

        let shdr = |sh_type: u32, off: u32, size: u32, link: u32, entsize: u32| {
            let mut h = Vec::new();
            h.extend_from_slice(&0u32.to_le_bytes());
            h.extend_from_slice(&sh_type.to_le_bytes());
            h.extend_from_slice(&[0u8; 8]);
            h.extend_from_slice(&off.to_le_bytes());
            h.extend_from_slice(&size.to_le_bytes());
            h.extend_from_slice(&link.to_le_bytes());
            h.extend_from_slice(&0u32.to_le_bytes());
            h.extend_from_slice(&0u32.to_le_bytes());
            h.extend_from_slice(&entsize.to_le_bytes());
            h
        };
        out.extend_from_slice(&shdr(0, 0, 0, 0, 0));
        out.extend_from_slice(&shdr(2, symtab_off, symtab.len() as u32, 2, 16));
        out.extend_from_slice(&shdr(3, strtab_off, strtab.len() as u32, 0, 0));

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
