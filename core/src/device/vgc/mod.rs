pub mod compositor;
pub mod copper;
pub mod draw;
pub mod font;
pub mod sprites;

pub use compositor::{FrameSnapshot, PALETTE};
pub use copper::{COPPER_LIST_CAP, COPPER_LISTS, Copper, CopperEvent};
pub use sprites::{SPRITE_COUNT, SpriteFrame, SpriteRegs};

use crate::core::BusMaster;
use log::trace;

// Canvas and memory geometry.
pub const GFX_WIDTH: usize = 320;
pub const GFX_HEIGHT: usize = 200;
/// Graphics bitmap bytes: two 4-bit pixels per byte, low nibble = left.
pub const GFX_SIZE: usize = GFX_WIDTH * GFX_HEIGHT / 2;
pub const CHAR_COLS: usize = 80;
pub const CHAR_ROWS: usize = 25;
pub const CHAR_RAM_SIZE: usize = CHAR_COLS * CHAR_ROWS;
pub const SHAPE_SLOTS: usize = 256;
/// Bytes per sprite shape slot: 16x16 pixels at 4 bpp.
pub const SHAPE_BYTES: usize = 128;
pub const SHAPE_RAM_SIZE: usize = SHAPE_SLOTS * SHAPE_BYTES;

// Register file offsets within A000-A01F.
pub const REG_MODE: u8 = 0x00;
pub const REG_BGCOLOR: u8 = 0x01;
pub const REG_SCROLLX_LO: u8 = 0x02;
pub const REG_SCROLLX_HI: u8 = 0x03;
pub const REG_SCROLLY: u8 = 0x04;
pub const REG_CURSOR_X: u8 = 0x05;
pub const REG_CURSOR_Y: u8 = 0x06;
pub const REG_CURSOR_EN: u8 = 0x07;
pub const REG_FRAME: u8 = 0x08;
pub const REG_COLL_SEL: u8 = 0x09;
pub const REG_COLL_LO: u8 = 0x0A;
pub const REG_COLL_HI: u8 = 0x0B;
pub const REG_BUMP: u8 = 0x0C;
pub const REG_COMMAND: u8 = 0x10;
pub const REG_P0: u8 = 0x11;

// Command bytes written to REG_COMMAND. Drawing commands use the current
// drawing color except FILL, which carries its own.
pub const CMD_PLOT: u8 = 0x01;
pub const CMD_UNPLOT: u8 = 0x02;
pub const CMD_LINE: u8 = 0x03;
pub const CMD_RECT: u8 = 0x04;
pub const CMD_FILL: u8 = 0x05;
pub const CMD_CIRCLE: u8 = 0x06;
pub const CMD_PAINT: u8 = 0x07;
pub const CMD_GCLS: u8 = 0x08;
pub const CMD_GCOLOR: u8 = 0x09;
pub const CMD_POINT: u8 = 0x0A;
pub const CMD_SPRDEF: u8 = 0x0B;
pub const CMD_SPRROW: u8 = 0x0C;
pub const CMD_SPRPOS: u8 = 0x0D;
pub const CMD_SPRENA: u8 = 0x0E;
pub const CMD_SPRDIS: u8 = 0x0F;
pub const CMD_SPRCLR: u8 = 0x10;
pub const CMD_SPRPRI: u8 = 0x11;
pub const CMD_SPRFLIP: u8 = 0x12;
pub const CMD_SPRCOPY: u8 = 0x13;
pub const CMD_SPRSHAPE: u8 = 0x14;
pub const CMD_MEMREAD: u8 = 0x19;
pub const CMD_MEMWRITE: u8 = 0x1A;
pub const CMD_COP_ADD: u8 = 0x1B;
pub const CMD_COP_CLEAR: u8 = 0x1C;
pub const CMD_COP_ENABLE: u8 = 0x1D;
pub const CMD_COP_DISABLE: u8 = 0x1E;
pub const CMD_COP_LIST: u8 = 0x20;
pub const CMD_COP_USE: u8 = 0x21;
pub const CMD_COP_LIST_END: u8 = 0x22;

/// Video graphics controller.
///
/// Exposes the register file at `A000-A01F` and the 16 sprite register
/// blocks at `A040-A0BF`. Commands execute synchronously on the write to
/// [`REG_COMMAND`]; parameters come from P0..P13 (`A011..A01E`). Memory
/// I/O commands (MEMREAD/MEMWRITE) reach spaces the VGC does not own, so
/// [`Vgc::write_register`] hands them back to the board, which assembles
/// the unified-space borrows and completes the command before the CPU's
/// next instruction.
///
/// Invalid indices (sprite >= 16, row >= 16, copper list >= 128) silently
/// ignore the command; there is no error channel. Coordinates clip
/// silently to the 320x200 canvas.
pub struct Vgc {
    // Register file
    mode: u8,
    bg_color: u8,
    scroll_x: u16,
    scroll_y: u8,
    cursor_x: u8,
    cursor_y: u8,
    cursor_on: bool,
    frame: u8,
    params: [u8; 14],
    draw_color: u8,
    def_slot: u8,

    // Video memory
    chars: [u8; CHAR_RAM_SIZE],
    colors: [u8; CHAR_RAM_SIZE],
    gfx: Box<[u8; GFX_SIZE]>,
    shapes: Box<[u8; SHAPE_RAM_SIZE]>,
    sprites: [SpriteRegs; SPRITE_COUNT],

    copper: Copper,

    // Collision accumulators and CPU-visible read latches
    coll_masks: [u16; SPRITE_COUNT],
    bump_bits: u16,
    coll_latch: u16,
    bump_latch: bool,

    snapshot: FrameSnapshot,
}

impl Vgc {
    pub fn new() -> Self {
        Self {
            mode: 0,
            bg_color: 0,
            scroll_x: 0,
            scroll_y: 0,
            cursor_x: 0,
            cursor_y: 0,
            cursor_on: false,
            frame: 0,
            params: [0; 14],
            draw_color: 15,
            def_slot: 0,
            chars: [0; CHAR_RAM_SIZE],
            colors: [0; CHAR_RAM_SIZE],
            gfx: Box::new([0; GFX_SIZE]),
            shapes: Box::new([0; SHAPE_RAM_SIZE]),
            sprites: [SpriteRegs::default(); SPRITE_COUNT],
            copper: Copper::new(),
            coll_masks: [0; SPRITE_COUNT],
            bump_bits: 0,
            coll_latch: 0,
            bump_latch: false,
            snapshot: FrameSnapshot::new(),
        }
    }

    // --- Register file ---

    /// Read a register at `A000 + offset`. CPU reads of the collision
    /// latches are destructive; host reads are not.
    pub fn read_register(&mut self, master: BusMaster, offset: u8) -> u8 {
        match offset {
            REG_MODE => self.mode,
            REG_BGCOLOR => self.bg_color,
            REG_SCROLLX_LO => self.scroll_x as u8,
            REG_SCROLLX_HI => (self.scroll_x >> 8) as u8,
            REG_SCROLLY => self.scroll_y,
            REG_CURSOR_X => self.cursor_x,
            REG_CURSOR_Y => self.cursor_y,
            REG_CURSOR_EN => self.cursor_on as u8,
            REG_FRAME => self.frame,
            REG_COLL_LO => self.coll_latch as u8,
            REG_COLL_HI => {
                let value = (self.coll_latch >> 8) as u8;
                if master == BusMaster::Cpu {
                    self.coll_latch = 0;
                }
                value
            }
            REG_BUMP => {
                let value = self.bump_latch as u8;
                if master == BusMaster::Cpu {
                    self.bump_latch = false;
                }
                value
            }
            0x11..=0x1E => self.params[(offset - REG_P0) as usize],
            _ => 0,
        }
    }

    /// Write a register at `A000 + offset`. A write to [`REG_COMMAND`]
    /// executes the command immediately; `Some(cmd)` is returned for the
    /// memory I/O commands the board must complete with space access.
    pub fn write_register(&mut self, offset: u8, value: u8) -> Option<u8> {
        match offset {
            REG_MODE => self.mode = value & 0x03,
            REG_BGCOLOR => self.bg_color = value & 0x0F,
            REG_SCROLLX_LO => self.scroll_x = (self.scroll_x & 0xFF00) | value as u16,
            REG_SCROLLX_HI => self.scroll_x = (self.scroll_x & 0x00FF) | ((value as u16) << 8),
            REG_SCROLLY => self.scroll_y = value,
            REG_CURSOR_X => self.cursor_x = value,
            REG_CURSOR_Y => self.cursor_y = value,
            REG_CURSOR_EN => self.cursor_on = value & 1 != 0,
            REG_COLL_SEL => {
                let n = (value & 0x0F) as usize;
                self.coll_latch = self.coll_masks[n];
                self.coll_masks[n] = 0;
            }
            REG_BUMP => {
                let n = value & 0x0F;
                self.bump_latch = self.bump_bits & (1 << n) != 0;
                self.bump_bits &= !(1 << n);
            }
            REG_COMMAND => return self.execute(value),
            0x11..=0x1E => self.params[(offset - REG_P0) as usize] = value,
            _ => {}
        }
        None
    }

    /// Read one byte of a sprite register block (`A040 + offset`).
    pub fn sprite_reg_read(&self, offset: u8) -> u8 {
        let offset = offset as usize;
        if offset < SPRITE_COUNT * 8 {
            self.sprites[offset / 8].0[offset % 8]
        } else {
            0
        }
    }

    /// Write one byte of a sprite register block (`A040 + offset`).
    pub fn sprite_reg_write(&mut self, offset: u8, value: u8) {
        let offset = offset as usize;
        if offset < SPRITE_COUNT * 8 {
            self.sprites[offset / 8].0[offset % 8] = value;
        }
    }

    // --- Parameter helpers ---

    fn p8(&self, index: usize) -> u8 {
        self.params[index]
    }

    fn p16(&self, index: usize) -> u16 {
        u16::from_le_bytes([self.params[index], self.params[index + 1]])
    }

    /// Signed 16-bit coordinate parameter (lo/hi pair).
    fn coord(&self, index: usize) -> i32 {
        self.p16(index) as i16 as i32
    }

    pub fn params(&self) -> [u8; 14] {
        self.params
    }

    pub fn set_param(&mut self, index: usize, value: u8) {
        self.params[index] = value;
    }

    // --- Command execution ---

    /// The "text foreground": color-RAM low nibble at the cursor cell.
    fn text_fg_at_cursor(&self) -> u8 {
        let col = (self.cursor_x as usize).min(CHAR_COLS - 1);
        let row = (self.cursor_y as usize).min(CHAR_ROWS - 1);
        self.colors[row * CHAR_COLS + col] & 0x0F
    }

    fn execute(&mut self, cmd: u8) -> Option<u8> {
        trace!("vgc command {cmd:#04x}");
        match cmd {
            CMD_PLOT => {
                let (x, y, color) = (self.coord(0), self.coord(2), self.draw_color);
                draw::set_pixel(&mut self.gfx, x, y, color)
            }
            CMD_UNPLOT => {
                let (x, y) = (self.coord(0), self.coord(2));
                draw::set_pixel(&mut self.gfx, x, y, 0)
            }
            CMD_LINE => {
                let (x0, y0, x1, y1, color) =
                    (self.coord(0), self.coord(2), self.coord(4), self.coord(6), self.draw_color);
                draw::line(&mut self.gfx, x0, y0, x1, y1, color)
            }
            CMD_RECT => {
                let (x0, y0, x1, y1, color) =
                    (self.coord(0), self.coord(2), self.coord(4), self.coord(6), self.draw_color);
                draw::rect(&mut self.gfx, x0, y0, x1, y1, color)
            }
            CMD_FILL => {
                let (x0, y0, x1, y1, color) =
                    (self.coord(0), self.coord(2), self.coord(4), self.coord(6), self.p8(8));
                draw::fill_rect(&mut self.gfx, x0, y0, x1, y1, color)
            }
            CMD_CIRCLE => {
                let (x, y, r, color) =
                    (self.coord(0), self.coord(2), self.coord(4), self.draw_color);
                draw::circle(&mut self.gfx, x, y, r, color)
            }
            CMD_PAINT => {
                let (x, y, color) = (self.coord(0), self.coord(2), self.draw_color);
                draw::paint(&mut self.gfx, x, y, color)
            }
            CMD_GCLS => {
                let color = self.p8(0);
                draw::clear(&mut self.gfx, color)
            }
            CMD_GCOLOR => {
                let color = self.p8(0) & 0x0F;
                self.draw_color = if color == 0 {
                    self.text_fg_at_cursor()
                } else {
                    color
                };
            }
            CMD_POINT => {
                self.params[4] = draw::get_pixel(&self.gfx, self.coord(0), self.coord(2));
            }
            CMD_SPRDEF => {
                self.def_slot = self.p8(0);
                let base = self.def_slot as usize * SHAPE_BYTES;
                self.shapes[base..base + SHAPE_BYTES].fill(0);
            }
            CMD_SPRROW => {
                let row = self.p8(0) as usize;
                if row < 16 {
                    let base = self.def_slot as usize * SHAPE_BYTES + row * 8;
                    let row_bytes: [u8; 8] = self.params[1..9].try_into().unwrap_or([0; 8]);
                    self.shapes[base..base + 8].copy_from_slice(&row_bytes);
                }
            }
            CMD_SPRPOS => {
                let n = self.p8(0) as usize;
                if n < SPRITE_COUNT {
                    let x = self.p16(1) as i16;
                    let y = self.p16(3) as i16;
                    self.sprites[n].set_x(x);
                    self.sprites[n].set_y(y);
                }
            }
            CMD_SPRENA => {
                let n = self.p8(0) as usize;
                if n < SPRITE_COUNT {
                    self.sprites[n].0[5] |= sprites::FLAG_ENABLE;
                }
            }
            CMD_SPRDIS => {
                let n = self.p8(0) as usize;
                if n < SPRITE_COUNT {
                    self.sprites[n].0[5] &= !sprites::FLAG_ENABLE;
                }
            }
            CMD_SPRCLR => {
                let n = self.p8(0) as usize;
                if n < SPRITE_COUNT {
                    self.sprites[n] = SpriteRegs::default();
                }
            }
            CMD_SPRPRI => {
                let n = self.p8(0) as usize;
                if n < SPRITE_COUNT {
                    self.sprites[n].0[6] = self.p8(1).min(2);
                }
            }
            CMD_SPRFLIP => {
                let n = self.p8(0) as usize;
                if n < SPRITE_COUNT {
                    let flags = self.sprites[n].0[5];
                    self.sprites[n].0[5] = (flags & !0x03) | (self.p8(1) & 0x03);
                }
            }
            CMD_SPRCOPY => {
                let src = self.p8(0) as usize * SHAPE_BYTES;
                let dst = self.p8(1) as usize * SHAPE_BYTES;
                self.shapes.copy_within(src..src + SHAPE_BYTES, dst);
            }
            CMD_SPRSHAPE => {
                let n = self.p8(0) as usize;
                if n < SPRITE_COUNT {
                    self.sprites[n].0[4] = self.p8(1);
                }
            }
            CMD_MEMREAD | CMD_MEMWRITE => return Some(cmd),
            CMD_COP_ADD => {
                let x = self.p16(0) as u32;
                let y = self.p8(2) as u32;
                let register = self.p16(3);
                let value = self.p8(5);
                self.copper.add(y * GFX_WIDTH as u32 + x, register, value);
            }
            CMD_COP_CLEAR => self.copper.clear(),
            CMD_COP_ENABLE => self.copper.set_enabled(true),
            CMD_COP_DISABLE => self.copper.set_enabled(false),
            CMD_COP_LIST => self.copper.set_target(self.p8(0)),
            CMD_COP_USE => self.copper.schedule_active(self.p8(0)),
            CMD_COP_LIST_END => self.copper.end_target(),
            _ => {} // unknown command: silently ignored
        }
        None
    }

    // --- Frame tick ---

    /// Frame-boundary update: advance the frame counter, apply a pending
    /// copper swap, latch the snapshot, rebuild the priority maps, and
    /// accumulate this frame's collision masks.
    pub fn begin_frame(&mut self) {
        self.frame = self.frame.wrapping_add(1);
        self.copper.begin_frame();

        let snap = &mut self.snapshot;
        snap.mode = self.mode;
        snap.bg = self.bg_color;
        snap.scroll_x = self.scroll_x;
        snap.scroll_y = self.scroll_y;
        snap.cursor_x = self.cursor_x;
        snap.cursor_y = self.cursor_y;
        snap.cursor_on = self.cursor_on;
        snap.chars = self.chars;
        snap.colors = self.colors;
        snap.gfx.copy_from_slice(&self.gfx[..]);
        snap.copper_on = self.copper.enabled();
        snap.copper_events = self.copper.active_events().to_vec();
        snap.sprites.latch(&self.sprites, &self.shapes);
        snap.sprites.build_maps();

        let masks = snap.sprites.sprite_collisions();
        for (accum, mask) in self.coll_masks.iter_mut().zip(masks) {
            *accum |= mask;
        }
        self.bump_bits |= snap
            .sprites
            .background_collisions(&snap.gfx[..], snap.scroll_x, snap.scroll_y);
    }

    /// Composite the latched frame into an RGB24 buffer.
    pub fn render(&self, buffer: &mut [u8]) {
        compositor::render(&self.snapshot, buffer);
    }

    // --- Memory and inspection accessors ---

    /// Split borrows of the VGC-owned unified spaces (char RAM, color RAM,
    /// graphics bitmap, sprite shapes) for a `Spaces` bundle.
    pub fn space_bufs_mut(
        &mut self,
    ) -> (
        &mut [u8; CHAR_RAM_SIZE],
        &mut [u8; CHAR_RAM_SIZE],
        &mut [u8; GFX_SIZE],
        &mut [u8; SHAPE_RAM_SIZE],
    ) {
        (
            &mut self.chars,
            &mut self.colors,
            &mut self.gfx,
            &mut self.shapes,
        )
    }

    pub fn chars(&self) -> &[u8; CHAR_RAM_SIZE] {
        &self.chars
    }

    pub fn chars_mut(&mut self) -> &mut [u8; CHAR_RAM_SIZE] {
        &mut self.chars
    }

    pub fn colors(&self) -> &[u8; CHAR_RAM_SIZE] {
        &self.colors
    }

    pub fn colors_mut(&mut self) -> &mut [u8; CHAR_RAM_SIZE] {
        &mut self.colors
    }

    pub fn gfx(&self) -> &[u8; GFX_SIZE] {
        &self.gfx
    }

    pub fn shapes(&self) -> &[u8; SHAPE_RAM_SIZE] {
        &self.shapes
    }

    pub fn sprite_regs(&self, n: usize) -> SpriteRegs {
        self.sprites[n]
    }

    pub fn frame_count(&self) -> u8 {
        self.frame
    }

    pub fn copper(&self) -> &Copper {
        &self.copper
    }
}

impl Default for Vgc {
    fn default() -> Self {
        Self::new()
    }
}
