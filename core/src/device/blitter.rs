use crate::device::dma::{STATUS_ERROR, STATUS_IDLE, STATUS_OK, XferError, check_range};
use crate::device::space::Spaces;
use log::debug;

pub const CMD_COPY: u8 = 1;
pub const CMD_FILL: u8 = 2;

/// MODE bit 1: color-key transparency in copy mode.
pub const MODE_COLOR_KEY: u8 = 0x02;

/// Blitter: 2-D rectangular copy and fill across the unified memory
/// spaces, row by row with independent source and destination strides.
///
/// # Register map (offsets from `BA80`)
///
/// | Offset | Name       | Description                                 |
/// |--------|------------|---------------------------------------------|
/// | 0x00   | CMD        | Write strobes: 1 = COPY, 2 = FILL           |
/// | 0x01   | STATUS     | 0 idle, 2 ok, 3 error (read-only)           |
/// | 0x02   | ERR        | `XferError` code, 0 = none (read-only)      |
/// | 0x03   | MODE       | Bit 1: color-key enable                     |
/// | 0x04   | KEY        | Color-key byte                              |
/// | 0x05   | SRC_SPACE  | Source space id                             |
/// | 0x06-8 | SRC_ADDR   | 24-bit source offset                        |
/// | 0x09-A | SRC_STRIDE | 16-bit source row stride                    |
/// | 0x0B   | DST_SPACE  | Destination space id                        |
/// | 0x0C-E | DST_ADDR   | 24-bit destination offset                   |
/// | 0x0F-10| DST_STRIDE | 16-bit destination row stride               |
/// | 0x11-12| WIDTH      | 16-bit rectangle width in bytes             |
/// | 0x13-14| HEIGHT     | 16-bit rectangle height in rows             |
/// | 0x15   | VALUE      | Fill byte                                   |
///
/// The whole rectangle is validated against both spaces before any byte
/// moves. When source and destination share a space and their footprints
/// overlap, each row is staged through a temporary buffer so destination
/// writes never alias pending source reads. Color-key mode skips source
/// bytes equal to KEY; fills ignore the key.
pub struct Blitter {
    status: u8,
    err: u8,
    mode: u8,
    key: u8,
    src_space: u8,
    src_addr: u32,
    src_stride: u16,
    dst_space: u8,
    dst_addr: u32,
    dst_stride: u16,
    width: u16,
    height: u16,
    value: u8,
}

impl Blitter {
    pub fn new() -> Self {
        Self {
            status: STATUS_IDLE,
            err: 0,
            mode: 0,
            key: 0,
            src_space: 0,
            src_addr: 0,
            src_stride: 0,
            dst_space: 0,
            dst_addr: 0,
            dst_stride: 0,
            width: 0,
            height: 0,
            value: 0,
        }
    }

    /// Read a register (offset 0x00-0x1F).
    pub fn read_register(&self, offset: u8) -> u8 {
        match offset {
            0x01 => self.status,
            0x02 => self.err,
            0x03 => self.mode,
            0x04 => self.key,
            0x05 => self.src_space,
            0x06 => self.src_addr as u8,
            0x07 => (self.src_addr >> 8) as u8,
            0x08 => (self.src_addr >> 16) as u8,
            0x09 => self.src_stride as u8,
            0x0A => (self.src_stride >> 8) as u8,
            0x0B => self.dst_space,
            0x0C => self.dst_addr as u8,
            0x0D => (self.dst_addr >> 8) as u8,
            0x0E => (self.dst_addr >> 16) as u8,
            0x0F => self.dst_stride as u8,
            0x10 => (self.dst_stride >> 8) as u8,
            0x11 => self.width as u8,
            0x12 => (self.width >> 8) as u8,
            0x13 => self.height as u8,
            0x14 => (self.height >> 8) as u8,
            0x15 => self.value,
            _ => 0,
        }
    }

    /// Write a register. A write to CMD returns the command byte for the
    /// board to execute with the assembled space borrows.
    pub fn write_register(&mut self, offset: u8, value: u8) -> Option<u8> {
        match offset {
            0x00 => return Some(value),
            0x03 => self.mode = value,
            0x04 => self.key = value,
            0x05 => self.src_space = value,
            0x06 => self.src_addr = (self.src_addr & 0xFF_FF00) | value as u32,
            0x07 => self.src_addr = (self.src_addr & 0xFF_00FF) | ((value as u32) << 8),
            0x08 => self.src_addr = (self.src_addr & 0x00_FFFF) | ((value as u32) << 16),
            0x09 => self.src_stride = (self.src_stride & 0xFF00) | value as u16,
            0x0A => self.src_stride = (self.src_stride & 0x00FF) | ((value as u16) << 8),
            0x0B => self.dst_space = value,
            0x0C => self.dst_addr = (self.dst_addr & 0xFF_FF00) | value as u32,
            0x0D => self.dst_addr = (self.dst_addr & 0xFF_00FF) | ((value as u32) << 8),
            0x0E => self.dst_addr = (self.dst_addr & 0x00_FFFF) | ((value as u32) << 16),
            0x0F => self.dst_stride = (self.dst_stride & 0xFF00) | value as u16,
            0x10 => self.dst_stride = (self.dst_stride & 0x00FF) | ((value as u16) << 8),
            0x11 => self.width = (self.width & 0xFF00) | value as u16,
            0x12 => self.width = (self.width & 0x00FF) | ((value as u16) << 8),
            0x13 => self.height = (self.height & 0xFF00) | value as u16,
            0x14 => self.height = (self.height & 0x00FF) | ((value as u16) << 8),
            0x15 => self.value = value,
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
                debug!("blitter command {cmd} rejected: {e:?}");
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

    /// Highest offset (exclusive) a rectangle walk touches.
    fn rect_extent(offset: u32, stride: u16, width: u16, height: u16) -> usize {
        offset as usize + (height as usize - 1) * stride as usize + width as usize
    }

    fn copy(&self, spaces: &mut Spaces<'_>) -> Result<(), XferError> {
        if self.width == 0 || self.height == 0 {
            return Err(XferError::BadArgs);
        }
        let src_extent = Self::rect_extent(self.src_addr, self.src_stride, self.width, self.height)
            - self.src_addr as usize;
        let dst_extent = Self::rect_extent(self.dst_addr, self.dst_stride, self.width, self.height)
            - self.dst_addr as usize;
        let src = check_range(spaces, self.src_space, self.src_addr, src_extent, false)?;
        let dst = check_range(spaces, self.dst_space, self.dst_addr, dst_extent, true)?;

        let color_key = (self.mode & MODE_COLOR_KEY != 0).then_some(self.key);
        let overlap = src == dst && {
            let (s0, s1) = (self.src_addr as usize, self.src_addr as usize + src_extent);
            let (d0, d1) = (self.dst_addr as usize, self.dst_addr as usize + dst_extent);
            s0 < d1 && d0 < s1
        };

        let width = self.width as usize;
        let height = self.height as usize;
        let mut row_buf = vec![0u8; if overlap { width } else { 0 }];
        // Overlap-safe row order: walk backward when the destination sits
        // above the source in the same space, so a row's write never lands
        // in a later row's unread source range. Same direction rule as the
        // DMA controller's 1-D copy.
        let backward = overlap && self.dst_addr > self.src_addr;
        for step in 0..height {
            let row = if backward { height - 1 - step } else { step };
            let src_row = self.src_addr as usize + row * self.src_stride as usize;
            let dst_row = self.dst_addr as usize + row * self.dst_stride as usize;
            if overlap {
                // Stage the source row so destination writes cannot alias
                // pending source reads.
                for (i, byte) in row_buf.iter_mut().enumerate() {
                    *byte = spaces.read(src, src_row + i);
                }
                for (i, &byte) in row_buf.iter().enumerate() {
                    if color_key != Some(byte) {
                        spaces.write(dst, dst_row + i, byte);
                    }
                }
            } else {
                for i in 0..width {
                    let byte = spaces.read(src, src_row + i);
                    if color_key != Some(byte) {
                        spaces.write(dst, dst_row + i, byte);
                    }
                }
            }
        }
        Ok(())
    }

    fn fill(&self, spaces: &mut Spaces<'_>) -> Result<(), XferError> {
        if self.width == 0 || self.height == 0 {
            return Err(XferError::BadArgs);
        }
        let extent = Self::rect_extent(self.dst_addr, self.dst_stride, self.width, self.height)
            - self.dst_addr as usize;
        let dst = check_range(spaces, self.dst_space, self.dst_addr, extent, true)?;
        for row in 0..self.height as usize {
            let dst_row = self.dst_addr as usize + row * self.dst_stride as usize;
            for i in 0..self.width as usize {
                spaces.write(dst, dst_row + i, self.value);
            }
        }
        Ok(())
    }
}

impl Default for Blitter {
    fn default() -> Self {
        Self::new()
    }
}
