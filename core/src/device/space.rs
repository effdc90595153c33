use crate::device::vgc::{CHAR_RAM_SIZE, GFX_SIZE, SHAPE_RAM_SIZE};
use crate::device::xmc::{BANK_SIZE, XRAM_SIZE};

/// Size of the CPU-visible flat address space.
pub const CPU_RAM_SIZE: usize = 0x10000;

/// Start of the ROM region in the CPU address space. Space-0 writes at or
/// above this address are discarded.
pub const ROM_BASE: usize = 0xC000;

/// One of the six unified memory spaces addressable by the DMA controller,
/// the blitter, and the VGC's memory I/O commands.
///
/// | Id | Space        | Size (bytes) |
/// |----|--------------|--------------|
/// | 0  | CPU RAM      | 65536        |
/// | 1  | Character RAM| 2000         |
/// | 2  | Color RAM    | 2000         |
/// | 3  | Graphics bitmap | 32000     |
/// | 4  | Sprite shapes| 32768        |
/// | 5  | XRAM (banked)| 65536 window |
///
/// Addresses within each space are zero-based byte offsets. Space 5 views
/// the expansion RAM through the XMC's bank register: the bank forms the
/// high byte of a 24-bit XRAM address, giving each bank a 64 KiB window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpaceId {
    CpuRam = 0,
    CharRam = 1,
    ColorRam = 2,
    Gfx = 3,
    Shapes = 4,
    Xram = 5,
}

impl SpaceId {
    /// Decode a space id byte. Ids above 5 are invalid.
    pub fn from_u8(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::CpuRam),
            1 => Some(Self::CharRam),
            2 => Some(Self::ColorRam),
            3 => Some(Self::Gfx),
            4 => Some(Self::Shapes),
            5 => Some(Self::Xram),
            _ => None,
        }
    }
}

/// Mutable borrows of every memory arena reachable through the unified
/// spaces, assembled by the board for the duration of one device command.
///
/// The XMC bank is sampled once when the bundle is built; changing `XBANK`
/// mid-transfer therefore cannot be observed, matching the one-shot command
/// model.
pub struct Spaces<'a> {
    pub ram: &'a mut [u8; CPU_RAM_SIZE],
    pub chars: &'a mut [u8; CHAR_RAM_SIZE],
    pub colors: &'a mut [u8; CHAR_RAM_SIZE],
    pub gfx: &'a mut [u8; GFX_SIZE],
    pub shapes: &'a mut [u8; SHAPE_RAM_SIZE],
    /// Full 512 KiB expansion RAM backing store.
    pub xram: &'a mut [u8],
    /// Bank used for space 5 addressing, masked to the valid range.
    pub xbank: u8,
}

impl Spaces<'_> {
    /// Addressable length of a space. Space 5 reports one bank's window.
    pub fn len(&self, space: SpaceId) -> usize {
        match space {
            SpaceId::CpuRam => CPU_RAM_SIZE,
            SpaceId::CharRam | SpaceId::ColorRam => CHAR_RAM_SIZE,
            SpaceId::Gfx => GFX_SIZE,
            SpaceId::Shapes => SHAPE_RAM_SIZE,
            SpaceId::Xram => BANK_SIZE,
        }
    }

    fn xram_index(&self, offset: usize) -> usize {
        // Masking the bank keeps the 24-bit address inside the 512 KiB store.
        (((self.xbank as usize) << 16) | (offset & 0xFFFF)) % XRAM_SIZE
    }

    /// Read one byte. Out-of-range offsets read as 0.
    pub fn read(&self, space: SpaceId, offset: usize) -> u8 {
        if offset >= self.len(space) {
            return 0;
        }
        match space {
            SpaceId::CpuRam => self.ram[offset],
            SpaceId::CharRam => self.chars[offset],
            SpaceId::ColorRam => self.colors[offset],
            SpaceId::Gfx => self.gfx[offset],
            SpaceId::Shapes => self.shapes[offset],
            SpaceId::Xram => self.xram[self.xram_index(offset)],
        }
    }

    /// Write one byte. Out-of-range offsets and space-0 ROM addresses are
    /// silently discarded.
    pub fn write(&mut self, space: SpaceId, offset: usize, value: u8) {
        if offset >= self.len(space) {
            return;
        }
        match space {
            SpaceId::CpuRam => {
                if offset < ROM_BASE {
                    self.ram[offset] = value;
                }
            }
            SpaceId::CharRam => self.chars[offset] = value,
            SpaceId::ColorRam => self.colors[offset] = value,
            SpaceId::Gfx => self.gfx[offset] = value,
            SpaceId::Shapes => self.shapes[offset] = value,
            SpaceId::Xram => {
                let index = self.xram_index(offset);
                self.xram[index] = value;
            }
        }
    }
}
