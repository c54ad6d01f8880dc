//! Trap frame layout and `scause` decoding.

use core::fmt;

use crate::constants::trap::{
    CAUSE_INTERRUPT, IRQ_SUPERVISOR_EXTERNAL, IRQ_SUPERVISOR_SOFTWARE, IRQ_SUPERVISOR_TIMER,
};

/// Register state pushed by the assembly trap entry.
///
/// `regs[n - 1]` holds `xn`; `x0` is not stored.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub regs: [u64; 31],
    pub sepc: u64,
    pub sstatus: u64,
    pub scause: u64,
    pub stval: u64,
}

impl TrapFrame {
    pub fn with_cause(scause: u64, stval: u64, sepc: u64) -> Self {
        TrapFrame {
            sepc,
            scause,
            stval,
            ..Default::default()
        }
    }

    pub fn trap(&self) -> Trap {
        Trap::from_scause(self.scause)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    Interrupt(Interrupt),
    Exception(Exception),
}

impl Trap {
    pub fn from_scause(scause: u64) -> Trap {
        let code = scause & !CAUSE_INTERRUPT;
        if scause & CAUSE_INTERRUPT != 0 {
            Trap::Interrupt(Interrupt::from_code(code))
        } else {
            Trap::Exception(Exception::from_code(code))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    SupervisorSoftware,
    SupervisorTimer,
    SupervisorExternal,
    Unknown(u64),
}

impl Interrupt {
    pub fn from_code(code: u64) -> Interrupt {
        match code {
            IRQ_SUPERVISOR_SOFTWARE => Interrupt::SupervisorSoftware,
            IRQ_SUPERVISOR_TIMER => Interrupt::SupervisorTimer,
            IRQ_SUPERVISOR_EXTERNAL => Interrupt::SupervisorExternal,
            other => Interrupt::Unknown(other),
        }
    }

    pub fn code(&self) -> u64 {
        match *self {
            Interrupt::SupervisorSoftware => IRQ_SUPERVISOR_SOFTWARE,
            Interrupt::SupervisorTimer => IRQ_SUPERVISOR_TIMER,
            Interrupt::SupervisorExternal => IRQ_SUPERVISOR_EXTERNAL,
            Interrupt::Unknown(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    InstructionMisaligned,
    InstructionFault,
    IllegalInstruction,
    Breakpoint,
    LoadMisaligned,
    LoadFault,
    StoreMisaligned,
    StoreFault,
    UserEnvCall,
    SupervisorEnvCall,
    InstructionPageFault,
    LoadPageFault,
    StorePageFault,
    Unknown(u64),
}

impl Exception {
    pub fn from_code(code: u64) -> Exception {
        match code {
            0 => Exception::InstructionMisaligned,
            1 => Exception::InstructionFault,
            2 => Exception::IllegalInstruction,
            3 => Exception::Breakpoint,
            4 => Exception::LoadMisaligned,
            5 => Exception::LoadFault,
            6 => Exception::StoreMisaligned,
            7 => Exception::StoreFault,
            8 => Exception::UserEnvCall,
            9 => Exception::SupervisorEnvCall,
            12 => Exception::InstructionPageFault,
            13 => Exception::LoadPageFault,
            15 => Exception::StorePageFault,
            other => Exception::Unknown(other),
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Exception::InstructionMisaligned => "instruction address misaligned",
            Exception::InstructionFault => "instruction access fault",
            Exception::IllegalInstruction => "illegal instruction",
            Exception::Breakpoint => "breakpoint",
            Exception::LoadMisaligned => "load address misaligned",
            Exception::LoadFault => "load access fault",
            Exception::StoreMisaligned => "store/AMO address misaligned",
            Exception::StoreFault => "store/AMO access fault",
            Exception::UserEnvCall => "environment call from U-mode",
            Exception::SupervisorEnvCall => "environment call from S-mode",
            Exception::InstructionPageFault => "instruction page fault",
            Exception::LoadPageFault => "load page fault",
            Exception::StorePageFault => "store/AMO page fault",
            Exception::Unknown(code) => return write!(f, "unknown exception {}", code),
        };
        f.write_str(name)
    }
}
