use e6502_core::core::bus::InterruptState;
use e6502_core::core::machine::Machine;
use e6502_core::core::{Bus, BusMaster};
use e6502_core::device::space::{CPU_RAM_SIZE, SpaceId, Spaces};
use e6502_core::device::vgc::{self, GFX_HEIGHT, GFX_WIDTH, Vgc};
use e6502_core::device::{Blitter, Dma, Fio, IntervalTimer, MusicEngine, Sid, Xmc};
use log::debug;

use crate::registry::MachineEntry;

/// Native display resolution.
pub const DISPLAY_WIDTH: u32 = GFX_WIDTH as u32;
pub const DISPLAY_HEIGHT: u32 = GFX_HEIGHT as u32;

/// System ROM size (`C000-FFFF`).
pub const ROM_SIZE: usize = 0x4000;

/// The e6502 fantasy computer's bus-and-coprocessor substrate.
///
/// Owns the 64 KiB flat address space, the 16 KiB ROM, and every
/// memory-mapped device. The 6502 core is an external collaborator that
/// drives the machine through the [`Bus`] implementation and samples
/// `check_interrupts` at instruction boundaries; the host loop calls
/// [`Machine::on_frame`] at 60 Hz.
///
/// # Memory map
///
/// | Range       | Owner                                             |
/// |-------------|---------------------------------------------------|
/// | `0000-9FFF` | Flat RAM (zero page, stack, vectors, BASIC RAM)   |
/// | `A000-A01F` | VGC register file                                 |
/// | `A040-A0BF` | Sprite registers (16 x 8)                         |
/// | `AA00-B1CF` | Character RAM (80 x 25)                           |
/// | `B1D0-B99F` | Color RAM                                         |
/// | `B9A0-B9EF` | FIO registers                                     |
/// | `BA00-BA3F` | XMC registers                                     |
/// | `BA40-BA4F` | Interval timer                                    |
/// | `BA50-BA56` | Music status (read-only)                          |
/// | `BA60-BA7F` | DMA controller                                    |
/// | `BA80-BA9F` | Blitter                                           |
/// | `BC00-BFFF` | XRAM windows (4 x 256, flat RAM when unmapped)    |
/// | `C000-FFFF` | ROM (writes discarded)                            |
/// | `D400-D41C` | SID1 (write-intercepted, reads as 0)              |
/// | `D420-D43C` | SID2 (write-intercepted, reads as 0)              |
///
/// Unhandled addresses fall through to flat RAM.
pub struct E6502System {
    ram: [u8; CPU_RAM_SIZE],
    rom: [u8; ROM_SIZE],

    vgc: Vgc,
    dma: Dma,
    blitter: Blitter,
    xmc: Xmc,
    fio: Fio,
    timer: IntervalTimer,
    sids: [Sid; 2],
    music: MusicEngine,
}

impl E6502System {
    /// Cold start: every device comes up in its defined default state.
    pub fn new() -> Self {
        Self {
            ram: [0; CPU_RAM_SIZE],
            rom: [0; ROM_SIZE],
            vgc: Vgc::new(),
            dma: Dma::new(),
            blitter: Blitter::new(),
            xmc: Xmc::new(),
            fio: Fio::new(),
            timer: IntervalTimer::new(),
            sids: [Sid::new(), Sid::new()],
            music: MusicEngine::new(),
        }
    }

    /// Load ROM from a byte slice at the given offset.
    /// Offset is relative to the start of the ROM region (0 = address 0xC000).
    pub fn load_rom(&mut self, offset: usize, data: &[u8]) {
        if offset >= ROM_SIZE {
            return;
        }
        let end = (offset + data.len()).min(ROM_SIZE);
        let len = end - offset;
        self.rom[offset..end].copy_from_slice(&data[..len]);
    }

    /// Point the file I/O controller at a host backing directory.
    pub fn set_disk_dir(&mut self, path: impl Into<std::path::PathBuf>) {
        self.fio.set_root(path);
    }

    // --- Inspection API (renderer/debugger; no side effects) ---

    pub fn vgc(&self) -> &Vgc {
        &self.vgc
    }

    pub fn xmc(&self) -> &Xmc {
        &self.xmc
    }

    pub fn music(&self) -> &MusicEngine {
        &self.music
    }

    /// Host access to the music engine (PLAY/SOUND entry points).
    pub fn music_mut(&mut self) -> &mut MusicEngine {
        &mut self.music
    }

    // --- Device command plumbing ---

    /// Assemble the unified-space borrows and run a strobed DMA command.
    fn run_dma(&mut self, cmd: u8) {
        let xbank = self.xmc.xbank();
        let (chars, colors, gfx, shapes) = self.vgc.space_bufs_mut();
        let mut spaces = Spaces {
            ram: &mut self.ram,
            chars,
            colors,
            gfx,
            shapes,
            xram: self.xmc.xram_mut(),
            xbank,
        };
        self.dma.execute(cmd, &mut spaces);
    }

    fn run_blitter(&mut self, cmd: u8) {
        let xbank = self.xmc.xbank();
        let (chars, colors, gfx, shapes) = self.vgc.space_bufs_mut();
        let mut spaces = Spaces {
            ram: &mut self.ram,
            chars,
            colors,
            gfx,
            shapes,
            xram: self.xmc.xram_mut(),
            xbank,
        };
        self.blitter.execute(cmd, &mut spaces);
    }

    /// Complete a VGC MEMREAD/MEMWRITE command, which reaches spaces the
    /// VGC does not own. A bad space id is silently ignored (the VGC has
    /// no error channel).
    fn run_vgc_mem(&mut self, cmd: u8) {
        let params = self.vgc.params();
        let Some(space) = SpaceId::from_u8(params[0]) else {
            return;
        };
        let offset = u32::from_le_bytes([params[1], params[2], params[3], 0]) as usize;
        let xbank = self.xmc.xbank();
        let result = {
            let (chars, colors, gfx, shapes) = self.vgc.space_bufs_mut();
            let mut spaces = Spaces {
                ram: &mut self.ram,
                chars,
                colors,
                gfx,
                shapes,
                xram: self.xmc.xram_mut(),
                xbank,
            };
            match cmd {
                vgc::CMD_MEMREAD => Some(spaces.read(space, offset)),
                vgc::CMD_MEMWRITE => {
                    spaces.write(space, offset, params[4]);
                    None
                }
                _ => None,
            }
        };
        if let Some(value) = result {
            self.vgc.set_param(4, value);
        }
    }
}

impl Bus for E6502System {
    type Address = u16;
    type Data = u8;

    fn read(&mut self, master: BusMaster, addr: u16) -> u8 {
        match addr {
            0xA000..=0xA01F => self.vgc.read_register(master, (addr - 0xA000) as u8),
            0xA040..=0xA0BF => self.vgc.sprite_reg_read((addr - 0xA040) as u8),
            0xAA00..=0xB1CF => self.vgc.chars()[(addr - 0xAA00) as usize],
            0xB1D0..=0xB99F => self.vgc.colors()[(addr - 0xB1D0) as usize],
            0xB9A0..=0xB9EF => self.fio.read_register((addr - 0xB9A0) as u8),
            0xBA00..=0xBA3F => self.xmc.read_register((addr - 0xBA00) as u8),
            0xBA40..=0xBA4F => self.timer.read_register(master, (addr - 0xBA40) as u8),
            0xBA50..=0xBA56 => self.music.status_byte((addr - 0xBA50) as u8),
            0xBA60..=0xBA7F => self.dma.read_register((addr - 0xBA60) as u8),
            0xBA80..=0xBA9F => self.blitter.read_register((addr - 0xBA80) as u8),
            0xBC00..=0xBFFF => {
                let window = ((addr - 0xBC00) >> 8) as usize;
                self.xmc
                    .window_read(window, addr as u8)
                    .unwrap_or(self.ram[addr as usize])
            }
            // SID registers are write-only; carve-outs take precedence
            // over the surrounding ROM.
            0xD400..=0xD41C => self.sids[0].read((addr - 0xD400) as u8),
            0xD420..=0xD43C => self.sids[1].read((addr - 0xD420) as u8),
            0xC000..=0xFFFF => self.rom[(addr - 0xC000) as usize],
            _ => self.ram[addr as usize],
        }
    }

    fn write(&mut self, _master: BusMaster, addr: u16, data: u8) {
        match addr {
            0xA000..=0xA01F => {
                if let Some(cmd) = self.vgc.write_register((addr - 0xA000) as u8, data) {
                    self.run_vgc_mem(cmd);
                }
            }
            0xA040..=0xA0BF => self.vgc.sprite_reg_write((addr - 0xA040) as u8, data),
            0xAA00..=0xB1CF => self.vgc.chars_mut()[(addr - 0xAA00) as usize] = data,
            0xB1D0..=0xB99F => self.vgc.colors_mut()[(addr - 0xB1D0) as usize] = data,
            0xB9A0..=0xB9EF => {
                if let Some(cmd) = self.fio.write_register((addr - 0xB9A0) as u8, data) {
                    self.fio.execute(cmd, &mut self.ram);
                }
            }
            0xBA00..=0xBA3F => {
                if let Some(cmd) = self.xmc.write_register((addr - 0xBA00) as u8, data) {
                    self.xmc.execute(cmd, &mut self.ram);
                }
            }
            0xBA40..=0xBA4F => self.timer.write_register((addr - 0xBA40) as u8, data),
            0xBA50..=0xBA56 => {} // music status is read-only
            0xBA60..=0xBA7F => {
                if let Some(cmd) = self.dma.write_register((addr - 0xBA60) as u8, data) {
                    self.run_dma(cmd);
                }
            }
            0xBA80..=0xBA9F => {
                if let Some(cmd) = self.blitter.write_register((addr - 0xBA80) as u8, data) {
                    self.run_blitter(cmd);
                }
            }
            0xBC00..=0xBFFF => {
                let window = ((addr - 0xBC00) >> 8) as usize;
                if !self.xmc.window_write(window, addr as u8, data) {
                    self.ram[addr as usize] = data;
                }
            }
            0xD400..=0xD41C => self.sids[0].write((addr - 0xD400) as u8, data),
            0xD420..=0xD43C => self.sids[1].write((addr - 0xD420) as u8, data),
            0xC000..=0xFFFF => {} // ROM: ignored
            _ => self.ram[addr as usize] = data,
        }
    }

    fn check_interrupts(&self) -> InterruptState {
        InterruptState {
            irq: self.timer.irq(),
            nmi: false,
        }
    }
}

impl Machine for E6502System {
    fn display_size(&self) -> (u32, u32) {
        (DISPLAY_WIDTH, DISPLAY_HEIGHT)
    }

    /// The frame tick, in the architected order: video counters and
    /// latches (including the pending copper swap and collision masks),
    /// then one music frame, then the interval timer.
    fn on_frame(&mut self) {
        self.vgc.begin_frame();
        self.music.frame(&mut self.sids);
        self.timer.on_frame();
    }

    fn render_frame(&self, buffer: &mut [u8]) {
        self.vgc.render(buffer);
    }

    fn fill_audio(&mut self, buffer: &mut [f32]) -> usize {
        for sample in buffer.iter_mut() {
            *sample = (self.sids[0].sample() + self.sids[1].sample()) * 0.5;
        }
        buffer.len()
    }

    /// Warm start: transfer engines, FIO, timer, music, and SID state
    /// reset; RAM, ROM, VGC video memory, and XRAM contents are
    /// deliberately preserved.
    fn reset(&mut self) {
        debug!("warm reset: device registers cleared, video memory and XRAM preserved");
        self.dma.reset();
        self.blitter.reset();
        self.fio.reset();
        self.timer.reset();
        self.music.reset();
        for sid in &mut self.sids {
            sid.reset();
        }
    }
}

impl Default for E6502System {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Machine registry
// ---------------------------------------------------------------------------

fn create_machine(rom: &[u8]) -> Box<dyn Machine> {
    let mut system = E6502System::new();
    system.load_rom(0, rom);
    Box::new(system)
}

inventory::submit! {
    MachineEntry::new("e6502", create_machine)
}
