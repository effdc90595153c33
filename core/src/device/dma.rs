use crate::device::space::{ROM_BASE, SpaceId, Spaces};
use log::debug;

// Status register values shared by the transfer engines.
pub const STATUS_IDLE: u8 = 0;
pub const STATUS_BUSY: u8 = 1;
pub const STATUS_OK: u8 = 2;
pub const STATUS_ERROR: u8 = 3;

/// Validation errors for the DMA controller and the blitter, encoded into
/// the error register. On any error no byte is transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XferError {
    BadCmd = 1,
    BadSpace = 2,
    Range = 3,
    BadArgs = 4,
    WriteProt = 5,
}

impl XferError {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Validate one linear access against a space: decode the id, bounds-check
/// `offset + len`, and reject writes that would touch ROM in space 0.
pub(crate) fn check_range(
    spaces: &Spaces<'_>,
    space_id: u8,
    offset: u32,
    len: usize,
    write: bool,
) -> Result<SpaceId, XferError> {
    let space = SpaceId::from_u8(space_id).ok_or(XferError::BadSpace)?;
    let end = offset as usize + len;
    if end > spaces.len(space) {
        return Err(XferError::Range);
    }
    if write && space == SpaceId::CpuRam && end > ROM_BASE {
        return Err(XferError::WriteProt);
    }
    Ok(space)
}

pub const CMD_COPY: u8 = 1;
pub const CMD_FILL: u8 = 2;

/// DMA controller: linear block copy and fill across the unified memory
/// spaces.
///
/// # Register map (offsets from `BA60`)
///
/// | Offset | Name      | Description                                  |
/// |--------|-----------|----------------------------------------------|
/// | 0x00   | CMD       | Write strobes: 1 = COPY, 2 = FILL            |
/// | 0x01   | STATUS    | 0 idle, 1 busy, 2 ok, 3 error (read-only)    |
/// | 0x02   | ERR       | `XferError` code, 0 = none (read-only)       |
/// | 0x03   | SRC_SPACE | Source space id (0-5)                        |
/// | 0x04-6 | SRC_ADDR  | 24-bit source offset, lo/mid/hi              |
/// | 0x07   | DST_SPACE | Destination space id                         |
/// | 0x08-A | DST_ADDR  | 24-bit destination offset                    |
/// | 0x0B-D | LEN       | 24-bit transfer length                       |
/// | 0x0E   | VALUE     | Fill byte                                    |
///
/// Transfers complete before the strobing write returns, so the CPU never
/// observes the busy state; the status register moves straight to ok or
/// error. Overlapping same-space copies behave like `memmove`. The XMC
/// bank for space 5 is sampled once when the board assembles the space
/// borrows for the command.
pub struct Dma {
    status: u8,
    err: u8,
    src_space: u8,
    src_addr: u32,
    dst_space: u8,
    dst_addr: u32,
    len: u32,
    value: u8,
}

impl Dma {
    pub fn new() -> Self {
        Self {
            status: STATUS_IDLE,
            err: 0,
            src_space: 0,
            src_addr: 0,
            dst_space: 0,
            dst_addr: 0,
            len: 0,
            value: 0,
        }
    }

    /// Read a register (offset 0x00-0x1F).
    pub fn read_register(&self, offset: u8) -> u8 {
        match offset {
            0x01 => self.status,
            0x02 => self.err,
            0x03 => self.src_space,
            0x04 => self.src_addr as u8,
            0x05 => (self.src_addr >> 8) as u8,
            0x06 => (self.src_addr >> 16) as u8,
            0x07 => self.dst_space,
            0x08 => self.dst_addr as u8,
            0x09 => (self.dst_addr >> 8) as u8,
            0x0A => (self.dst_addr >> 16) as u8,
            0x0B => self.len as u8,
            0x0C => (self.len >> 8) as u8,
            0x0D => (self.len >> 16) as u8,
            0x0E => self.value,
            _ => 0,
        }
    }

    /// Write a register. A write to CMD returns the command byte for the
    /// board to execute with the assembled space borrows.
    pub fn write_register(&mut self, offset: u8, value: u8) -> Option<u8> {
        match offset {
            0x00 => return Some(value),
            0x03 => self.src_space = value,
            0x04 => self.src_addr = (self.src_addr & 0xFF_FF00) | value as u32,
            0x05 => self.src_addr = (self.src_addr & 0xFF_00FF) | ((value as u32) << 8),
            0x06 => self.src_addr = (self.src_addr & 0x00_FFFF) | ((value as u32) << 16),
            0x07 => self.dst_space = value,
            0x08 => self.dst_addr = (self.dst_addr & 0xFF_FF00) | value as u32,
            0x09 => self.dst_addr = (self.dst_addr & 0xFF_00FF) | ((value as u32) << 8),
            0x0A => self.dst_addr = (self.dst_addr & 0x00_FFFF) | ((value as u32) << 16),
            0x0B => self.len = (self.len & 0xFF_FF00) | value as u32,
            0x0C => self.len = (self.len & 0xFF_00FF) | ((value as u32) << 8),
            0x0D => self.len = (self.len & 0x00_FFFF) | ((value as u32) << 16),
            0x0E => self.value = value,
            _ => {}
        }
        None
    }

    /// Execute a strobed command and update the status/error pair.
    pub fn execute(&mut self, cmd: u8, spaces: &mut Spaces<'_>) {
        match self.run(cmd, spaces) {
            Ok(()) => {
                self.status = STATUS_OK;
                self.err = 0;
            }
            Err(e) => {
                debug!("dma command {cmd} rejected: {e:?}");
                self.status = STATUS_ERROR;
                self.err = e.code();
            }
        }
    }

    pub fn status(&self) -> (u8, u8) {
        (self.status, self.err)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn run(&self, cmd: u8, spaces: &mut Spaces<'_>) -> Result<(), XferError> {
        match cmd {
            CMD_COPY => self.copy(spaces),
            CMD_FILL => self.fill(spaces),
            _ => Err(XferError::BadCmd),
        }
    }

    fn copy(&self, spaces: &mut Spaces<'_>) -> Result<(), XferError> {
        if self.len == 0 {
            return Err(XferError::BadArgs);
        }
        let len = self.len as usize;
        let src = check_range(spaces, self.src_space, self.src_addr, len, false)?;
        let dst = check_range(spaces, self.dst_space, self.dst_addr, len, true)?;

        let (src_off, dst_off) = (self.src_addr as usize, self.dst_addr as usize);
        if src == dst && dst_off > src_off {
            // Overlap-safe: copy backward when the destination is above
            // the source in the same space.
            for i in (0..len).rev() {
                let byte = spaces.read(src, src_off + i);
                spaces.write(dst, dst_off + i, byte);
            }
        } else {
            for i in 0..len {
                let byte = spaces.read(src, src_off + i);
                spaces.write(dst, dst_off + i, byte);
            }
        }
        Ok(())
    }

    fn fill(&self, spaces: &mut Spaces<'_>) -> Result<(), XferError> {
        if self.len == 0 {
            return Err(XferError::BadArgs);
        }
        let len = self.len as usize;
        let dst = check_range(spaces, self.dst_space, self.dst_addr, len, true)?;
        for i in 0..len {
            spaces.write(dst, self.dst_addr as usize + i, self.value);
        }
        Ok(())
    }
}

impl Default for Dma {
    fn default() -> Self {
        Self::new()
    }
}
