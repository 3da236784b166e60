mod common;

use common::ElfBuilder;
use strato_elf::{ElfImage, LoadError, SegFlags};

const PF_X: u32 = 1;
const PF_W: u32 = 2;
const PF_R: u32 = 4;

#[test]
fn opens_minimal_executable() {
    let f = ElfBuilder::exe()
        .segment(0x0804_8000, PF_R | PF_X, b"\x90\x90\xc3")
        .segment(0x0804_a000, PF_R | PF_W, b"\x01\x02\x03\x04")
        .write_temp();

    let image = ElfImage::open(f.path()).expect("open");
    assert_eq!(image.entry_point(), 0x0804_9000);
    assert_eq!(image.loadable().len(), 2);

    let text = &image.loadable()[0];
    assert_eq!(text.vaddr, 0x0804_8000);
    assert_eq!(text.filesz, 3);
    assert_eq!(text.memsz, 3);
    assert_eq!(text.flags, SegFlags::R | SegFlags::X);

    let data = &image.loadable()[1];
    assert_eq!(data.flags, SegFlags::R | SegFlags::W);
}

#[test]
fn positioned_reads_return_segment_bytes() {
    let f = ElfBuilder::exe()
        .segment(0x0804_8000, PF_R | PF_X, b"\xb8\x05\x00\x00\x00")
        .write_temp();

    let image = ElfImage::open(f.path()).expect("open");
    let seg = image.loadable()[0];

    let mut buf = vec![0u8; seg.filesz as usize];
    image.read_at(&mut buf, seg.offset).expect("read_at");
    assert_eq!(buf, b"\xb8\x05\x00\x00\x00");
}

#[test]
fn gnu_stack_selects_exec_stack_flag() {
    let f = ElfBuilder::exe()
        .segment(0x0804_8000, PF_R | PF_X, b"\xc3")
        .gnu_stack(PF_R | PF_W)
        .write_temp();
    assert!(!ElfImage::open(f.path()).expect("open").exec_stack());

    let f = ElfBuilder::exe()
        .segment(0x0804_8000, PF_R | PF_X, b"\xc3")
        .gnu_stack(PF_R | PF_W | PF_X)
        .write_temp();
    assert!(ElfImage::open(f.path()).expect("open").exec_stack());
}

#[test]
fn rejects_non_elf() {
    use std::io::Write;
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(b"#!/bin/sh\necho hello\n").unwrap();
    f.flush().unwrap();

    assert!(matches!(
        ElfImage::open(f.path()),
        Err(LoadError::NotElf)
    ));
}

#[test]
fn rejects_wrong_class_machine_abi_and_type() {
    let mut b = ElfBuilder::exe().segment(0x0804_8000, PF_R | PF_X, b"\xc3");
    b.class = 2; // ELFCLASS64
    assert!(matches!(
        ElfImage::open(b.write_temp().path()),
        Err(LoadError::Unsupported(_))
    ));

    let mut b = ElfBuilder::exe().segment(0x0804_8000, PF_R | PF_X, b"\xc3");
    b.machine = 0x3e; // EM_X86_64
    assert!(matches!(
        ElfImage::open(b.write_temp().path()),
        Err(LoadError::Unsupported(_))
    ));

    let mut b = ElfBuilder::exe().segment(0x0804_8000, PF_R | PF_X, b"\xc3");
    b.abi = 9; // not SYSV
    assert!(matches!(
        ElfImage::open(b.write_temp().path()),
        Err(LoadError::Unsupported(_))
    ));

    let mut b = ElfBuilder::exe().segment(0x0804_8000, PF_R | PF_X, b"\xc3");
    b.e_type = 3; // ET_DYN
    assert!(matches!(
        ElfImage::open(b.write_temp().path()),
        Err(LoadError::NotAnExecutable)
    ));
}
