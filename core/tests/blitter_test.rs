use e6502_core::device::blitter::{self, Blitter};
use e6502_core::device::dma::{STATUS_ERROR, STATUS_OK, XferError};
use e6502_core::device::space::{CPU_RAM_SIZE, Spaces};
use e6502_core::device::vgc::{CHAR_RAM_SIZE, GFX_SIZE, SHAPE_RAM_SIZE};
use e6502_core::device::xmc::XRAM_SIZE;

struct Arenas {
    ram: Box<[u8; CPU_RAM_SIZE]>,
    chars: [u8; CHAR_RAM_SIZE],
    colors: [u8; CHAR_RAM_SIZE],
    gfx: Box<[u8; GFX_SIZE]>,
    shapes: Box<[u8; SHAPE_RAM_SIZE]>,
    xram: Vec<u8>,
}

impl Arenas {
    fn new() -> Self {
        Self {
            ram: Box::new([0; CPU_RAM_SIZE]),
            chars: [0; CHAR_RAM_SIZE],
            colors: [0; CHAR_RAM_SIZE],
            gfx: Box::new([0; GFX_SIZE]),
            shapes: Box::new([0; SHAPE_RAM_SIZE]),
            xram: vec![0; XRAM_SIZE],
        }
    }

    fn spaces(&mut self) -> Spaces<'_> {
        Spaces {
            ram: &mut self.ram,
            chars: &mut self.chars,
            colors: &mut self.colors,
            gfx: &mut self.gfx,
            shapes: &mut self.shapes,
            xram: &mut self.xram,
            xbank: 0,
        }
    }
}

fn set24(blt: &mut Blitter, base: u8, value: u32) {
    blt.write_register(base, value as u8);
    blt.write_register(base + 1, (value >> 8) as u8);
    blt.write_register(base + 2, (value >> 16) as u8);
}

fn set16(blt: &mut Blitter, base: u8, value: u16) {
    blt.write_register(base, value as u8);
    blt.write_register(base + 1, (value >> 8) as u8);
}

#[allow(clippy::too_many_arguments)]
fn program(
    blt: &mut Blitter,
    src_space: u8,
    src: u32,
    src_stride: u16,
    dst_space: u8,
    dst: u32,
    dst_stride: u16,
    width: u16,
    height: u16,
) {
    blt.write_register(0x05, src_space);
    set24(blt, 0x06, src);
    set16(blt, 0x09, src_stride);
    blt.write_register(0x0B, dst_space);
    set24(blt, 0x0C, dst);
    set16(blt, 0x0F, dst_stride);
    set16(blt, 0x11, width);
    set16(blt, 0x13, height);
}

fn strobe(blt: &mut Blitter, cmd: u8, spaces: &mut Spaces<'_>) {
    let pending = blt.write_register(0x00, cmd).expect("CMD strobe");
    blt.execute(pending, spaces);
}

#[test]
fn test_rect_copy_with_strides() {
    let mut arenas = Arenas::new();
    // 3 rows x 5 cols in RAM at stride 10.
    for row in 0..3 {
        for col in 0..5 {
            arenas.ram[0x1000 + row * 10 + col] = (row * 16 + col) as u8 + 1;
        }
    }
    let mut blt = Blitter::new();
    program(&mut blt, 0, 0x1000, 10, 0, 0x2000, 20, 5, 3);
    strobe(&mut blt, blitter::CMD_COPY, &mut arenas.spaces());

    assert_eq!(blt.status(), (STATUS_OK, 0));
    for row in 0..3 {
        for col in 0..5 {
            assert_eq!(
                arenas.ram[0x2000 + row * 20 + col],
                arenas.ram[0x1000 + row * 10 + col],
                "row {row} col {col}"
            );
        }
        // Bytes past the rectangle width are untouched.
        assert_eq!(arenas.ram[0x2000 + row * 20 + 5], 0);
    }
}

#[test]
fn test_fill_rect_with_value() {
    let mut arenas = Arenas::new();
    let mut blt = Blitter::new();
    program(&mut blt, 0, 0, 0, 1, 80, 80, 40, 5);
    blt.write_register(0x15, 0x20);
    strobe(&mut blt, blitter::CMD_FILL, &mut arenas.spaces());

    assert_eq!(blt.status(), (STATUS_OK, 0));
    for row in 1..6 {
        for col in 0..40 {
            assert_eq!(arenas.chars[row * 80 + col], 0x20);
        }
        assert_eq!(arenas.chars[row * 80 + 40], 0);
    }
    assert_eq!(arenas.chars[0], 0);
}

#[test]
fn test_color_key_skips_matching_bytes() {
    let mut arenas = Arenas::new();
    arenas.ram[0x1000] = 7;
    arenas.ram[0x1001] = 0xFE; // key
    arenas.ram[0x1002] = 9;
    arenas.ram[0x2000] = 0x11;
    arenas.ram[0x2001] = 0x22;
    arenas.ram[0x2002] = 0x33;

    let mut blt = Blitter::new();
    program(&mut blt, 0, 0x1000, 3, 0, 0x2000, 3, 3, 1);
    blt.write_register(0x03, blitter::MODE_COLOR_KEY);
    blt.write_register(0x04, 0xFE);
    strobe(&mut blt, blitter::CMD_COPY, &mut arenas.spaces());

    assert_eq!(arenas.ram[0x2000], 7);
    assert_eq!(arenas.ram[0x2001], 0x22); // key byte skipped
    assert_eq!(arenas.ram[0x2002], 9);
}

#[test]
fn test_scroll_up_overlapping_copy() {
    let mut arenas = Arenas::new();
    // Char RAM rows tagged with their row index.
    for row in 0..25 {
        for col in 0..80 {
            arenas.chars[row * 80 + col] = row as u8;
        }
    }
    let mut blt = Blitter::new();
    // Shift rows 1..25 up one row: classic overlapping scroll.
    program(&mut blt, 1, 80, 80, 1, 0, 80, 80, 24);
    strobe(&mut blt, blitter::CMD_COPY, &mut arenas.spaces());

    assert_eq!(blt.status(), (STATUS_OK, 0));
    for row in 0..24 {
        assert!(
            arenas.chars[row * 80..row * 80 + 80]
                .iter()
                .all(|&b| b == row as u8 + 1),
            "row {row}"
        );
    }
    // The last row keeps its old contents until software clears it.
    assert!(arenas.chars[24 * 80..].iter().all(|&b| b == 24));
}

#[test]
fn test_scroll_down_overlapping_copy() {
    let mut arenas = Arenas::new();
    for row in 0..25 {
        for col in 0..80 {
            arenas.chars[row * 80 + col] = row as u8;
        }
    }
    let mut blt = Blitter::new();
    // Shift rows 0..24 down one row: destination above source, the mirror
    // of the scroll-up case. A forward row walk would overwrite row 1's
    // source with row 0 before reading it.
    program(&mut blt, 1, 0, 80, 1, 80, 80, 80, 24);
    strobe(&mut blt, blitter::CMD_COPY, &mut arenas.spaces());

    assert_eq!(blt.status(), (STATUS_OK, 0));
    for row in 1..25 {
        assert!(
            arenas.chars[row * 80..row * 80 + 80]
                .iter()
                .all(|&b| b == row as u8 - 1),
            "row {row}"
        );
    }
    // Row 0 keeps its old contents until software clears it.
    assert!(arenas.chars[..80].iter().all(|&b| b == 0));
}

#[test]
fn test_zero_width_or_height_rejected() {
    let mut arenas = Arenas::new();
    let mut blt = Blitter::new();
    program(&mut blt, 0, 0, 1, 0, 0x100, 1, 0, 4);
    strobe(&mut blt, blitter::CMD_COPY, &mut arenas.spaces());
    assert_eq!(blt.status(), (STATUS_ERROR, XferError::BadArgs.code()));

    program(&mut blt, 0, 0, 1, 0, 0x100, 1, 4, 0);
    strobe(&mut blt, blitter::CMD_COPY, &mut arenas.spaces());
    assert_eq!(blt.status(), (STATUS_ERROR, XferError::BadArgs.code()));
}

#[test]
fn test_rect_extent_validated_before_transfer() {
    let mut arenas = Arenas::new();
    let mut blt = Blitter::new();
    // Last row would run past the end of char RAM.
    program(&mut blt, 0, 0, 80, 1, 1960, 80, 80, 2);
    strobe(&mut blt, blitter::CMD_COPY, &mut arenas.spaces());
    assert_eq!(blt.status(), (STATUS_ERROR, XferError::Range.code()));
    assert!(arenas.chars.iter().all(|&b| b == 0));
}

#[test]
fn test_rom_rect_write_protected() {
    let mut arenas = Arenas::new();
    let mut blt = Blitter::new();
    program(&mut blt, 1, 0, 8, 0, 0xBFF0, 8, 8, 3);
    strobe(&mut blt, blitter::CMD_COPY, &mut arenas.spaces());
    assert_eq!(blt.status(), (STATUS_ERROR, XferError::WriteProt.code()));
    assert_eq!(arenas.ram[0xBFF0], 0);
}

#[test]
fn test_bad_space_rejected() {
    let mut arenas = Arenas::new();
    let mut blt = Blitter::new();
    program(&mut blt, 7, 0, 1, 0, 0, 1, 1, 1);
    strobe(&mut blt, blitter::CMD_COPY, &mut arenas.spaces());
    assert_eq!(blt.status(), (STATUS_ERROR, XferError::BadSpace.code()));
}

#[test]
fn test_fill_ignores_color_key() {
    let mut arenas = Arenas::new();
    let mut blt = Blitter::new();
    program(&mut blt, 0, 0, 0, 0, 0x3000, 4, 4, 1);
    blt.write_register(0x03, blitter::MODE_COLOR_KEY);
    blt.write_register(0x04, 0x55);
    blt.write_register(0x15, 0x55);
    strobe(&mut blt, blitter::CMD_FILL, &mut arenas.spaces());
    assert!(arenas.ram[0x3000..0x3004].iter().all(|&b| b == 0x55));
}
