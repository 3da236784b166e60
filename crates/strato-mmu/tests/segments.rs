mod common;

use common::ElfBuilder;
use strato_elf::ElfImage;
use strato_mmu::{
    host_page_size, MapFlags, MemFault, Mmu, Prot, SegmentKind, EPROT, ESEGFAULT, STACK_SIZE,
    STACK_TOP,
};

const PF_X: u32 = 1;
const PF_W: u32 = 2;
const PF_R: u32 = 4;

fn rw_segment(mmu: &mut Mmu, vaddr: u32) {
    mmu.map(vaddr, 0x1000, Prot::READ | Prot::WRITE, MapFlags::empty(), None)
        .expect("map");
}

#[test]
fn read_write_round_trips_at_every_width() {
    let mut mmu = Mmu::new();
    rw_segment(&mut mmu, 0x0804_a000);

    mmu.write8(0x0804_a000, 0xab).unwrap();
    mmu.write16(0x0804_a010, 0xbeef).unwrap();
    mmu.write32(0x0804_a020, 0xdead_beef).unwrap();
    mmu.write64(0x0804_a030, 0x0123_4567_89ab_cdef).unwrap();

    assert_eq!(mmu.read8(0x0804_a000).unwrap(), 0xab);
    assert_eq!(mmu.read16(0x0804_a010).unwrap(), 0xbeef);
    assert_eq!(mmu.read32(0x0804_a020).unwrap(), 0xdead_beef);
    assert_eq!(mmu.read64(0x0804_a030).unwrap(), 0x0123_4567_89ab_cdef);
}

#[test]
fn values_are_little_endian_in_memory() {
    let mut mmu = Mmu::new();
    rw_segment(&mut mmu, 0x0804_a000);

    mmu.write32(0x0804_a000, 0x1122_3344).unwrap();
    assert_eq!(mmu.read8(0x0804_a000).unwrap(), 0x44);
    assert_eq!(mmu.read8(0x0804_a003).unwrap(), 0x11);
}

#[test]
fn unmapped_access_is_a_segfault() {
    let mut mmu = Mmu::new();
    rw_segment(&mut mmu, 0x0804_a000);

    let err = mmu.read32(0xdead_beef).unwrap_err();
    assert_eq!(err, MemFault::Segfault { addr: 0xdead_beef });
    assert_eq!(err.errnum(), ESEGFAULT);

    assert!(mmu.write8(0x1000, 0).is_err());
    assert!(mmu.fetch(0x4000_0000).is_err());
}

#[test]
fn read_only_data_rejects_writes_and_keeps_bytes() {
    let mut mmu = Mmu::new();
    let base = 0x0804_8000;
    mmu.map(base, 0x1000, Prot::READ, MapFlags::empty(), None)
        .unwrap();

    for (addr, res) in [
        (base, mmu.write8(base, 0x55).map(|_| 0)),
        (base + 4, mmu.write32(base + 4, 0x5555_5555).map(|_| 0)),
        (base + 8, mmu.write64(base + 8, 0x5555).map(|_| 0)),
    ] {
        let err = res.unwrap_err();
        assert_eq!(err, MemFault::NonWritable { addr });
        assert_eq!(err.errnum(), EPROT);
    }

    // Backing bytes must be untouched.
    assert_eq!(mmu.read64(base).unwrap(), 0);
    assert_eq!(mmu.read32(base + 4).unwrap(), 0);
}

#[test]
fn fetch_requires_an_executable_segment() {
    let mut mmu = Mmu::new();
    rw_segment(&mut mmu, 0x0804_a000);
    mmu.map(0x0804_8000, 0x1000, Prot::READ | Prot::EXEC, MapFlags::empty(), None)
        .unwrap();

    assert_eq!(mmu.fetch(0x0804_8000).unwrap(), 0);
    assert_eq!(
        mmu.fetch(0x0804_a000).unwrap_err(),
        MemFault::NonExecutable { addr: 0x0804_a000 }
    );
}

#[test]
fn access_straddling_the_segment_end_faults() {
    let mut mmu = Mmu::new();
    rw_segment(&mut mmu, 0x0804_a000);
    let last = 0x0804_a000 + host_page_size() - 2;

    mmu.write16(last, 0x1234).unwrap();
    assert!(mmu.read32(last).is_err());
    assert!(mmu.write32(last, 0).is_err());
}

#[test]
fn stack_occupies_the_fixed_range_and_uses_the_fast_path() {
    let mut mmu = Mmu::new();
    let sp = mmu.create_stack(false).unwrap();
    assert_eq!(sp, STACK_TOP + STACK_SIZE);

    assert_eq!(mmu.ptr_type(STACK_TOP), Some(SegmentKind::RwStack));
    mmu.write32(sp - 4, 0xcafe_babe).unwrap();
    assert_eq!(mmu.read32(sp - 4).unwrap(), 0xcafe_babe);

    // A stack-masked address outside the mapping must still fault instead
    // of falling back to the linear scan.
    assert!(mmu.read8(0x7f00_0000).is_err());
    assert!(mmu.read8(STACK_TOP + STACK_SIZE + 0x1000).is_err());
}

#[test]
fn executable_stack_flag_selects_the_rwx_kind() {
    let mut mmu = Mmu::new();
    mmu.create_stack(true).unwrap();
    assert_eq!(mmu.ptr_type(STACK_TOP), Some(SegmentKind::RwxStack));
    assert_eq!(mmu.fetch(STACK_TOP).unwrap(), 0);
}

#[test]
fn map_loadable_populates_file_contents_and_zero_fill() {
    let f = ElfBuilder::exe()
        .segment(0x0804_8000, PF_R | PF_X, b"\xb8\x05\x00\x00\x00\xf4")
        .segment(0x0804_a000, PF_R | PF_W, b"\x11\x22")
        .write_temp();
    let image = ElfImage::open(f.path()).expect("open");

    let mut mmu = Mmu::new();
    mmu.map_loadable(&image).expect("map_loadable");

    assert_eq!(mmu.ptr_type(0x0804_8000), Some(SegmentKind::RxCode));
    assert_eq!(mmu.fetch(0x0804_8000).unwrap(), 0xb8);
    assert_eq!(mmu.fetch(0x0804_8005).unwrap(), 0xf4);

    assert_eq!(mmu.ptr_type(0x0804_a000), Some(SegmentKind::RwData));
    assert_eq!(mmu.read16(0x0804_a000).unwrap(), 0x2211);
    // Past filesz, the mapping is zero-filled.
    assert_eq!(mmu.read32(0x0804_a002).unwrap(), 0);
}

#[test]
fn slices_come_from_readable_segments_only() {
    let f = ElfBuilder::exe()
        .segment(0x0804_8000, PF_R | PF_X, b"hello")
        .write_temp();
    let image = ElfImage::open(f.path()).expect("open");

    let mut mmu = Mmu::new();
    mmu.map_loadable(&image).unwrap();

    assert_eq!(mmu.slice(0x0804_8000, 5).unwrap(), b"hello");
    assert!(mmu.slice(0x0700_0000, 1).is_err());
}
