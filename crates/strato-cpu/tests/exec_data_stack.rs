mod common;

use common::{setup, DATA_BASE};
use strato_x86::{Reg32, Reg8, SegReg, FLAG_CF};

#[test]
fn push_pop_round_trips_register_and_esp() {
    // push eax ; pop eax
    let mut h = setup(&[0x50, 0x58]);
    h.st.write32(Reg32::Eax, 0x1234_5678);
    let sp0 = h.st.read32(Reg32::Esp);

    h.exec_steps(2);
    assert_eq!(h.st.read32(Reg32::Eax), 0x1234_5678);
    assert_eq!(h.st.read32(Reg32::Esp), sp0);
}

#[test]
fn push_writes_below_the_old_stack_pointer() {
    let mut h = setup(&[0x55]); // push ebp
    let sp0 = h.st.read32(Reg32::Esp);
    h.st.write32(Reg32::Ebp, 0xaabb_ccdd);

    h.exec_steps(1);
    assert_eq!(h.st.read32(Reg32::Esp), sp0 - 4);
    assert_eq!(h.mmu.read32(sp0 - 4).unwrap(), 0xaabb_ccdd);
}

#[test]
fn push_immediates_sign_extend_the_short_form() {
    // push 0xffffffff via 6a ff ; push 0x12345678
    let mut h = setup(&[0x6a, 0xff, 0x68, 0x78, 0x56, 0x34, 0x12]);
    let sp0 = h.st.read32(Reg32::Esp);

    h.exec_steps(2);
    assert_eq!(h.mmu.read32(sp0 - 4).unwrap(), 0xffff_ffff);
    assert_eq!(h.mmu.read32(sp0 - 8).unwrap(), 0x1234_5678);
}

#[test]
fn segment_register_push_moves_esp_by_four_but_writes_two_bytes() {
    // push ds ; pop es
    let mut h = setup(&[0x1e, 0x07]);
    h.st.set_sreg(SegReg::Ds, 0x2b);
    let sp0 = h.st.read32(Reg32::Esp);

    h.exec_steps(1);
    assert_eq!(h.st.read32(Reg32::Esp), sp0 - 4);
    assert_eq!(h.mmu.read16(sp0 - 4).unwrap(), 0x2b);

    h.exec_steps(1);
    assert_eq!(h.st.read32(Reg32::Esp), sp0);
    assert_eq!(h.st.sreg(SegReg::Es), 0x2b);
}

#[test]
fn pusha_popa_round_trip() {
    let mut h = setup(&[0x60, 0x61]);
    h.st.write32(Reg32::Eax, 1);
    h.st.write32(Reg32::Ebx, 2);
    h.st.write32(Reg32::Esi, 3);
    let sp0 = h.st.read32(Reg32::Esp);

    h.exec_steps(1);
    assert_eq!(h.st.read32(Reg32::Esp), sp0 - 32);
    h.st.write32(Reg32::Eax, 99);

    h.exec_steps(1);
    assert_eq!(h.st.read32(Reg32::Esp), sp0);
    assert_eq!(h.st.read32(Reg32::Eax), 1);
    assert_eq!(h.st.read32(Reg32::Esi), 3);
}

#[test]
fn pushf_popf_preserve_arithmetic_flags() {
    // stc ; pushf ; clc ; popf
    let mut h = setup(&[0xf9, 0x9c, 0xf8, 0x9d]);
    h.exec_steps(4);
    assert!(h.st.flag(FLAG_CF));
}

#[test]
fn enter_and_leave_pair() {
    // enter 0x10, 0 ; leave
    let mut h = setup(&[0xc8, 0x10, 0x00, 0x00, 0xc9]);
    let sp0 = h.st.read32(Reg32::Esp);
    let bp0 = h.st.read32(Reg32::Ebp);

    h.exec_steps(1);
    assert_eq!(h.st.read32(Reg32::Ebp), sp0 - 4);
    assert_eq!(h.st.read32(Reg32::Esp), sp0 - 4 - 0x10);

    h.exec_steps(1);
    assert_eq!(h.st.read32(Reg32::Esp), sp0);
    assert_eq!(h.st.read32(Reg32::Ebp), bp0);
}

#[test]
fn mov_between_memory_and_registers() {
    let mut h = setup(&[
        // mov dword ptr [DATA_BASE], 0xcafebabe
        0xc7, 0x05, 0x00, 0xa0, 0x04, 0x08, 0xbe, 0xba, 0xfe, 0xca,
        // mov eax, [DATA_BASE]
        0xa1, 0x00, 0xa0, 0x04, 0x08,
        // mov [DATA_BASE+4], eax
        0xa3, 0x04, 0xa0, 0x04, 0x08,
    ]);
    h.exec_steps(3);
    assert_eq!(h.st.read32(Reg32::Eax), 0xcafe_babe);
    assert_eq!(h.mmu.read32(DATA_BASE + 4).unwrap(), 0xcafe_babe);
}

#[test]
fn mov_through_sib_addressing() {
    // mov ebx, DATA_BASE ; mov ecx, 4 ; mov [ebx+ecx*2], edx
    let mut h = setup(&[
        0xbb, 0x00, 0xa0, 0x04, 0x08, //
        0xb9, 0x04, 0x00, 0x00, 0x00, //
        0x89, 0x14, 0x4b,
    ]);
    h.st.write32(Reg32::Edx, 0x5555_aaaa);
    h.exec_steps(3);
    assert_eq!(h.mmu.read32(DATA_BASE + 8).unwrap(), 0x5555_aaaa);
}

#[test]
fn segment_register_moves() {
    // mov ecx, 0x2b ; mov ds, cx ; mov dx, ds
    let mut h = setup(&[0xb9, 0x2b, 0x00, 0x00, 0x00, 0x8e, 0xd9, 0x8c, 0xda]);
    h.exec_steps(3);
    assert_eq!(h.st.sreg(SegReg::Ds), 0x2b);
    assert_eq!(h.st.read16(Reg32::Edx), 0x2b);
}

#[test]
fn movzx_and_movsx() {
    // mov bl, 0x80 ; movzx eax, bl ; movsx ecx, bl
    let mut h = setup(&[0xb3, 0x80, 0x0f, 0xb6, 0xc3, 0x0f, 0xbe, 0xcb]);
    h.exec_steps(3);
    assert_eq!(h.st.read32(Reg32::Eax), 0x80);
    assert_eq!(h.st.read32(Reg32::Ecx), 0xffff_ff80);
}

#[test]
fn lea_computes_without_touching_memory() {
    // mov ebx, 0x1000 ; lea eax, [ebx+ebx*2+8]
    let mut h = setup(&[0xbb, 0x00, 0x10, 0x00, 0x00, 0x8d, 0x44, 0x5b, 0x08]);
    h.exec_steps(2);
    assert_eq!(h.st.read32(Reg32::Eax), 0x3008);
}

#[test]
fn xchg_swaps_both_directions() {
    // mov eax, 1 ; mov ebx, 2 ; xchg eax, ebx ; xchg eax, ecx (91-style)
    let mut h = setup(&[
        0xb8, 0x01, 0x00, 0x00, 0x00, //
        0xbb, 0x02, 0x00, 0x00, 0x00, //
        0x87, 0xd8, // xchg eax, ebx
        0x91, // xchg eax, ecx
    ]);
    h.exec_steps(3);
    assert_eq!(h.st.read32(Reg32::Eax), 2);
    assert_eq!(h.st.read32(Reg32::Ebx), 1);
    h.exec_steps(1);
    assert_eq!(h.st.read32(Reg32::Eax), 0);
    assert_eq!(h.st.read32(Reg32::Ecx), 2);
}

#[test]
fn byte_register_immediates_land_in_the_right_half() {
    // mov ah, 0x12 ; mov al, 0x34
    let mut h = setup(&[0xb4, 0x12, 0xb0, 0x34]);
    h.exec_steps(2);
    assert_eq!(h.st.read16(Reg32::Eax), 0x1234);
    assert_eq!(h.st.read8(Reg8::Ah), 0x12);
    assert_eq!(h.st.read8(Reg8::Al), 0x34);
}
