use strato_mmu::{MapFlags, Mmu, Prot};

pub const CODE_BASE: u32 = 0x0804_8000;

/// Map one RWX page at [`CODE_BASE`] and copy `bytes` to its start.
pub fn code_mmu(bytes: &[u8]) -> Mmu {
    let mut mmu = Mmu::new();
    mmu.map(
        CODE_BASE,
        0x1000,
        Prot::READ | Prot::WRITE | Prot::EXEC,
        MapFlags::empty(),
        None,
    )
    .expect("map code");
    for (i, b) in bytes.iter().enumerate() {
        mmu.write8(CODE_BASE + i as u32, *b).expect("write code");
    }
    mmu
}
