/// General-purpose register indices matching the IA-32 ModR/M encoding.
///
/// The same index names a 32-bit register (EAX), its 16-bit alias (AX) and,
/// for the first four, the low byte (AL). The high-byte registers (AH..BH)
/// occupy encodings 4..7 of the 8-bit register file and are views into bits
/// 8..16 of the first four registers; see [`Reg8`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reg32 {
    Eax = 0,
    Ecx = 1,
    Edx = 2,
    Ebx = 3,
    Esp = 4,
    Ebp = 5,
    Esi = 6,
    Edi = 7,
}

impl Reg32 {
    /// Decode a 3-bit register field.
    #[inline]
    pub fn from_encoding(v: u8) -> Reg32 {
        match v & 7 {
            0 => Reg32::Eax,
            1 => Reg32::Ecx,
            2 => Reg32::Edx,
            3 => Reg32::Ebx,
            4 => Reg32::Esp,
            5 => Reg32::Ebp,
            6 => Reg32::Esi,
            7 => Reg32::Edi,
            _ => unreachable!(),
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name32(self) -> &'static str {
        ["eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi"][self.index()]
    }

    pub fn name16(self) -> &'static str {
        ["ax", "cx", "dx", "bx", "sp", "bp", "si", "di"][self.index()]
    }
}

/// 8-bit register file: AL CL DL BL AH CH DH BH, in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reg8 {
    Al = 0,
    Cl = 1,
    Dl = 2,
    Bl = 3,
    Ah = 4,
    Ch = 5,
    Dh = 6,
    Bh = 7,
}

impl Reg8 {
    #[inline]
    pub fn from_encoding(v: u8) -> Reg8 {
        match v & 7 {
            0 => Reg8::Al,
            1 => Reg8::Cl,
            2 => Reg8::Dl,
            3 => Reg8::Bl,
            4 => Reg8::Ah,
            5 => Reg8::Ch,
            6 => Reg8::Dh,
            7 => Reg8::Bh,
            _ => unreachable!(),
        }
    }

    /// The 32-bit register this byte register is a view into.
    #[inline]
    pub fn backing(self) -> Reg32 {
        Reg32::from_encoding(self as u8 & 3)
    }

    /// True for AH CH DH BH, which alias bits 8..16 of their backing register.
    #[inline]
    pub fn is_high(self) -> bool {
        self as u8 >= 4
    }

    pub fn name(self) -> &'static str {
        ["al", "cl", "dl", "bl", "ah", "ch", "dh", "bh"][self as usize]
    }
}

/// Segment registers in the ModR/M `reg` field encoding used by
/// `MOV sreg, r/m16` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SegReg {
    Es = 0,
    Cs = 1,
    Ss = 2,
    Ds = 3,
    Fs = 4,
    Gs = 5,
}

impl SegReg {
    #[inline]
    pub fn from_encoding(v: u8) -> Option<SegReg> {
        match v & 7 {
            0 => Some(SegReg::Es),
            1 => Some(SegReg::Cs),
            2 => Some(SegReg::Ss),
            3 => Some(SegReg::Ds),
            4 => Some(SegReg::Fs),
            5 => Some(SegReg::Gs),
            _ => None,
        }
    }

    /// Segment register selected by an override prefix byte, if any.
    #[inline]
    pub fn from_prefix(byte: u8) -> Option<SegReg> {
        match byte {
            0x26 => Some(SegReg::Es),
            0x2e => Some(SegReg::Cs),
            0x36 => Some(SegReg::Ss),
            0x3e => Some(SegReg::Ds),
            0x64 => Some(SegReg::Fs),
            0x65 => Some(SegReg::Gs),
            _ => None,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        ["es", "cs", "ss", "ds", "fs", "gs"][self.index()]
    }
}
