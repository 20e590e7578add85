//! System bus
//!
//! Ties the CPU to the chip, the 128 bytes of RIOT RAM and the cartridge.
//! The CPU itself is a collaborator: anything implementing [`Cpu`] can drive
//! the bus, one access per cycle.
//!
//! Memory Map (13 address lines, upper bits ignored):
//! - A12 set: cartridge ROM
//! - A12 clear, A7 clear: TIA registers
//! - A12 clear, A7 set, A9 clear: RAM
//! - A12 clear, A7 set, A9 set: PIA I/O (reads 0, writes ignored)

use log::trace;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cartridge::Cartridge;
use crate::tia::{Tia, CLOCKS_PER_CPU_CYCLE};
use crate::util::div_ceil;

/// Size of the RIOT RAM
pub const RAM_SIZE: usize = 0x80;

/// Memory access interface seen by the CPU
pub trait Bus {
    fn peek(&mut self, addr: u16) -> u8;

    fn poke(&mut self, addr: u16, value: u8);
}

/// A CPU core driving the bus
///
/// Each call to `step` may perform any number of bus accesses; every access
/// costs one cycle.
pub trait Cpu: Clone + Serialize + DeserializeOwned {
    fn reset(&mut self, bus: &mut dyn Bus);

    fn step(&mut self, bus: &mut dyn Bus);
}

/// Everything on the bus except the CPU
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemBus {
    /// CPU cycles since reset
    cycles: u64,

    tia: Tia,

    ram: Vec<u8>,

    cartridge: Cartridge,

    /// The current CPU step touched the bus
    accessed: bool,
}

impl SystemBus {
    pub fn new(cartridge: Cartridge) -> Self {
        SystemBus {
            cycles: 0,
            tia: Tia::new(),
            ram: vec![0; RAM_SIZE],
            cartridge,
            accessed: false,
        }
    }

    pub fn reset(&mut self) {
        self.cycles = 0;
        self.ram.fill(0);
        self.tia.reset();
        self.accessed = false;
    }

    /// Bring the chip up to the current cycle
    pub fn sync(&mut self) {
        self.tia.advance(self.cycles * CLOCKS_PER_CPU_CYCLE);
    }

    fn begin_access(&mut self) {
        self.sync();
        self.accessed = true;
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Burn `cycles` CPU cycles without a bus access
    pub fn idle(&mut self, cycles: u64) {
        self.cycles += cycles;
    }

    pub fn tia(&self) -> &Tia {
        &self.tia
    }

    pub fn tia_mut(&mut self) -> &mut Tia {
        &mut self.tia
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cartridge
    }
}

fn is_cartridge(addr: u16) -> bool {
    addr & 0x1000 != 0
}

fn is_tia(addr: u16) -> bool {
    addr & 0x0080 == 0
}

fn is_ram(addr: u16) -> bool {
    addr & 0x0200 == 0
}

impl SystemBus {
    fn read(&mut self, addr: u16) -> u8 {
        if is_cartridge(addr) {
            self.cartridge.peek(addr)
        } else if is_tia(addr) {
            self.tia.peek(addr)
        } else if is_ram(addr) {
            self.ram[(addr & 0x7f) as usize]
        } else {
            trace!("Read from unmapped I/O: ${:04X}", addr);
            0
        }
    }

    fn write(&mut self, addr: u16, value: u8) {
        if is_cartridge(addr) {
            trace!("Write to cartridge ROM ignored: ${:04X}", addr);
            self.tia.set_data_bus(value);
        } else if is_tia(addr) {
            self.tia.poke(addr, value);
        } else if is_ram(addr) {
            self.ram[(addr & 0x7f) as usize] = value;
            self.tia.set_data_bus(value);
        } else {
            trace!("Write to unmapped I/O ignored: ${:04X}", addr);
            self.tia.set_data_bus(value);
        }
    }

    /// Read without spending a cycle or syncing the chip
    pub fn peek_quiet(&mut self, addr: u16) -> u8 {
        self.read(addr)
    }

    /// Write without spending a cycle; a WSYNC strobe does not halt the CPU
    pub fn poke_quiet(&mut self, addr: u16, value: u8) {
        self.write(addr, value);
        self.tia.take_wsync_halt();
    }
}

impl Bus for SystemBus {
    fn peek(&mut self, addr: u16) -> u8 {
        self.begin_access();

        let value = self.read(addr);

        self.tia.set_data_bus(value);
        self.cycles += 1;
        value
    }

    fn poke(&mut self, addr: u16, value: u8) {
        self.begin_access();
        let start = self.cycles;

        self.write(addr, value);

        self.cycles = start + 1;

        // WSYNC: stall until the chip starts the next line
        if self.tia.take_wsync_halt() {
            let remaining = self.tia.clocks_to_line_end() as u64;
            self.cycles = start + div_ceil(remaining, CLOCKS_PER_CPU_CYCLE).max(1);
        }
    }
}

/// CPU plus bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct System<C: Cpu> {
    cpu: C,
    bus: SystemBus,
}

impl<C: Cpu> System<C> {
    pub fn new(cpu: C, cartridge: Cartridge) -> Self {
        System {
            cpu,
            bus: SystemBus::new(cartridge),
        }
    }

    /// Power-on reset of the bus devices, then the CPU
    pub fn reset(&mut self) {
        self.bus.reset();
        self.cpu.reset(&mut self.bus);
    }

    /// Run one CPU step and return the cycles it took
    pub fn step(&mut self) -> u64 {
        let start = self.bus.cycles;
        self.bus.accessed = false;

        self.cpu.step(&mut self.bus);

        if !self.bus.accessed {
            self.bus.cycles += 1;
        }
        self.bus.sync();

        self.bus.cycles - start
    }

    pub fn cycles(&self) -> u64 {
        self.bus.cycles
    }

    pub fn cpu(&self) -> &C {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut C {
        &mut self.cpu
    }

    pub fn bus(&self) -> &SystemBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SystemBus {
        &mut self.bus
    }

    pub fn tia(&self) -> &Tia {
        &self.bus.tia
    }

    pub fn tia_mut(&mut self) -> &mut Tia {
        &mut self.bus.tia
    }
}
