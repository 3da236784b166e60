//! Builder for minimal synthetic ELF32 executables used by the tests.

pub const PT_LOAD: u32 = 1;
pub const PT_GNU_STACK: u32 = 0x6474_e551;

pub struct SyntheticSegment {
    pub p_type: u32,
    pub vaddr: u32,
    pub memsz: u32,
    pub flags: u32,
    pub data: Vec<u8>,
}

pub struct ElfBuilder {
    pub class: u8,
    pub data_encoding: u8,
    pub abi: u8,
    pub e_type: u16,
    pub machine: u16,
    pub entry: u32,
    pub segments: Vec<SyntheticSegment>,
}

impl ElfBuilder {
    pub fn exe() -> ElfBuilder {
        ElfBuilder {
            class: 1,
            data_encoding: 1,
            abi: 0,
            e_type: 2,
            machine: 3,
            entry: 0x0804_9000,
            segments: Vec::new(),
        }
    }

    pub fn segment(mut self, vaddr: u32, flags: u32, data: &[u8]) -> Self {
        self.segments.push(SyntheticSegment {
            p_type: PT_LOAD,
            vaddr,
            memsz: data.len() as u32,
            flags,
            data: data.to_vec(),
        });
        self
    }

    pub fn gnu_stack(mut self, flags: u32) -> Self {
        self.segments.push(SyntheticSegment {
            p_type: PT_GNU_STACK,
            vaddr: 0,
            memsz: 0,
            flags,
            data: Vec::new(),
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let phoff = 52u32;
        let phentsize = 32u32;
        let phnum = self.segments.len() as u32;
        let mut data_off = phoff + phentsize * phnum;

        let mut out = Vec::new();
        // e_ident
        out.extend_from_slice(&[0x7f, b'E', b'L', b'F']);
        out.push(self.class);
        out.push(self.data_encoding);
        out.push(1); // EV_CURRENT
        out.push(self.abi);
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&self.e_type.to_le_bytes());
        out.extend_from_slice(&self.machine.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes()); // e_version
        out.extend_from_slice(&self.entry.to_le_bytes());
        out.extend_from_slice(&phoff.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
        out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        out.extend_from_slice(&52u16.to_le_bytes()); // e_ehsize
        out.extend_from_slice(&(phentsize as u16).to_le_bytes());
        out.extend_from_slice(&(phnum as u16).to_le_bytes());
        out.extend_from_slice(&40u16.to_le_bytes()); // e_shentsize
        out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
        assert_eq!(out.len(), 52);

        // Program headers.
        let mut offsets = Vec::new();
        for seg in &self.segments {
            let off = if seg.data.is_empty() { 0 } else { data_off };
            offsets.push(off);
            data_off += seg.data.len() as u32;

            out.extend_from_slice(&seg.p_type.to_le_bytes());
            out.extend_from_slice(&off.to_le_bytes());
            out.extend_from_slice(&seg.vaddr.to_le_bytes());
            out.extend_from_slice(&seg.vaddr.to_le_bytes()); // p_paddr
            out.extend_from_slice(&(seg.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&seg.memsz.to_le_bytes());
            out.extend_from_slice(&seg.flags.to_le_bytes());
            out.extend_from_slice(&0x1000u32.to_le_bytes()); // p_align
        }

        // Segment contents.
        for seg in &self.segments {
            out.extend_from_slice(&seg.data);
        }

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
