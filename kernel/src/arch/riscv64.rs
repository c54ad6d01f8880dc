//! RV64 supervisor-mode support: boot entry, trap entry, context switch and CSR access.

use core::arch::{asm, global_asm};

use riscv::register::{satp, sie, sstatus, stvec, time};

use super::Hart;
use crate::processes::registers::TaskContext;

/// SBI TIME extension ("TIME").
const SBI_EXT_TIME: usize = 0x5449_4D45;
const SBI_TIME_SET_TIMER: usize = 0;

global_asm!(
    r#"
    .section .text.entry
    .globl _start
_start:
    la sp, __boot_stack_top
    call kmain
1:
    wfi
    j 1b

    .section .bss.stack, "aw", @nobits
    .align 12
__boot_stack:
    .space 4096 * 16
    .globl __boot_stack_top
__boot_stack_top:
"#
);

// Trap frame layout: x1..x31 at 8 * (n - 1), then sepc, sstatus, scause, stval.
global_asm!(
    r#"
    .section .text
    .globl __trap_entry
    .align 4
__trap_entry:
    addi sp, sp, -288
    sd x1, 0(sp)
    sd x3, 16(sp)
    sd x4, 24(sp)
    sd x5, 32(sp)
    sd x6, 40(sp)
    sd x7, 48(sp)
    sd x8, 56(sp)
    sd x9, 64(sp)
    sd x10, 72(sp)
    sd x11, 80(sp)
    sd x12, 88(sp)
    sd x13, 96(sp)
    sd x14, 104(sp)
    sd x15, 112(sp)
    sd x16, 120(sp)
    sd x17, 128(sp)
    sd x18, 136(sp)
    sd x19, 144(sp)
    sd x20, 152(sp)
    sd x21, 160(sp)
    sd x22, 168(sp)
    sd x23, 176(sp)
    sd x24, 184(sp)
    sd x25, 192(sp)
    sd x26, 200(sp)
    sd x27, 208(sp)
    sd x28, 216(sp)
    sd x29, 224(sp)
    sd x30, 232(sp)
    sd x31, 240(sp)
    addi t0, sp, 288
    sd t0, 8(sp)
    csrr t0, sepc
    sd t0, 248(sp)
    csrr t0, sstatus
    sd t0, 256(sp)
    csrr t0, scause
    sd t0, 264(sp)
    csrr t0, stval
    sd t0, 272(sp)

    mv a0, sp
    call trap_handler

    ld t0, 248(sp)
    csrw sepc, t0
    ld t0, 256(sp)
    csrw sstatus, t0
    ld x1, 0(sp)
    ld x3, 16(sp)
    ld x4, 24(sp)
    ld x5, 32(sp)
    ld x6, 40(sp)
    ld x7, 48(sp)
    ld x8, 56(sp)
    ld x9, 64(sp)
    ld x10, 72(sp)
    ld x11, 80(sp)
    ld x12, 88(sp)
    ld x13, 96(sp)
    ld x14, 104(sp)
    ld x15, 112(sp)
    ld x16, 120(sp)
    ld x17, 128(sp)
    ld x18, 136(sp)
    ld x19, 144(sp)
    ld x20, 152(sp)
    ld x21, 160(sp)
    ld x22, 168(sp)
    ld x23, 176(sp)
    ld x24, 184(sp)
    ld x25, 192(sp)
    ld x26, 200(sp)
    ld x27, 208(sp)
    ld x28, 216(sp)
    ld x29, 224(sp)
    ld x30, 232(sp)
    ld x31, 240(sp)
    addi sp, sp, 288
    sret
"#
);

// a0 = context to save into, a1 = context to resume. Only ra, sp and s0..s11 move.
global_asm!(
    r#"
    .section .text
    .globl __switch_context
    .align 2
__switch_context:
    sd ra, 0(a0)
    sd sp, 8(a0)
    sd s0, 16(a0)
    sd s1, 24(a0)
    sd s2, 32(a0)
    sd s3, 40(a0)
    sd s4, 48(a0)
    sd s5, 56(a0)
    sd s6, 64(a0)
    sd s7, 72(a0)
    sd s8, 80(a0)
    sd s9, 88(a0)
    sd s10, 96(a0)
    sd s11, 104(a0)
    mv a0, a1

    .globl __load_context
__load_context:
    ld ra, 0(a0)
    ld sp, 8(a0)
    ld s0, 16(a0)
    ld s1, 24(a0)
    ld s2, 32(a0)
    ld s3, 40(a0)
    ld s4, 48(a0)
    ld s5, 56(a0)
    ld s6, 64(a0)
    ld s7, 72(a0)
    ld s8, 80(a0)
    ld s9, 88(a0)
    ld s10, 96(a0)
    ld s11, 104(a0)
    ret
"#
);

extern "C" {
    fn __trap_entry();
    fn __switch_context(prev: *mut TaskContext, next: *const TaskContext);
    fn __load_context(next: *const TaskContext) -> !;
}

/// Saves the callee-saved state into `prev` and resumes `next`. Returns when
/// someone switches back to `prev`.
///
/// # Safety
///
/// Both pointers must reference live contexts; `next` must hold a resumable state.
pub unsafe fn switch_context(prev: *mut TaskContext, next: *const TaskContext) {
    __switch_context(prev, next)
}

/// Resumes `next`, abandoning the current stack.
///
/// # Safety
///
/// `next` must hold a resumable state.
pub unsafe fn load_context(next: *const TaskContext) -> ! {
    __load_context(next)
}

/// Executes a closure with supervisor interrupts disabled, restoring the previous
/// enable state afterwards.
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let enabled = sstatus::read().sie();
    if enabled {
        unsafe { sstatus::clear_sie() }
    }
    let result = f();
    if enabled {
        unsafe { sstatus::set_sie() }
    }
    result
}

pub fn trap_entry() -> usize {
    __trap_entry as *const () as usize
}

/// The hart this kernel runs on.
#[derive(Debug, Default, Clone, Copy)]
pub struct Riscv64Hart;

impl Hart for Riscv64Hart {
    fn set_trap_vector(&self, entry: usize) {
        unsafe { stvec::write(entry, stvec::TrapMode::Direct) }
    }

    fn enable_timer_interrupt(&self) {
        unsafe { sie::set_stimer() }
    }

    fn enable_interrupts(&self) {
        unsafe { sstatus::set_sie() }
    }

    fn set_timer(&self, interval: u64) {
        let deadline = time::read() as u64 + interval;
        unsafe {
            asm!(
                "ecall",
                inlateout("a0") deadline as usize => _,
                lateout("a1") _,
                in("a6") SBI_TIME_SET_TIMER,
                in("a7") SBI_EXT_TIME,
            );
        }
    }

    fn write_satp(&self, bits: u64) {
        unsafe {
            satp::write(bits as usize);
            riscv::asm::sfence_vma_all();
        }
    }

    fn wait_for_interrupt(&self) {
        riscv::asm::wfi();
    }
}

