use e6502_core::device::dma::{STATUS_ERROR, STATUS_OK};
use e6502_core::device::space::CPU_RAM_SIZE;
use e6502_core::device::xmc::{self, PAGE_COUNT, Xmc, XmcError};

fn exec(xmc: &mut Xmc, cmd: u8, ram: &mut [u8; CPU_RAM_SIZE]) {
    let pending = xmc.write_register(0x00, cmd).expect("CMD strobe");
    xmc.execute(pending, ram);
}

fn set_name(xmc: &mut Xmc, name: &str) {
    for (i, &b) in name.as_bytes().iter().enumerate() {
        xmc.write_register(0x20 + i as u8, b);
    }
    xmc.write_register(0x3C, name.len() as u8);
}

fn set16(xmc: &mut Xmc, base: u8, value: u16) {
    xmc.write_register(base, value as u8);
    xmc.write_register(base + 1, (value >> 8) as u8);
}

fn set_xaddr(xmc: &mut Xmc, value: u32) {
    xmc.write_register(0x04, value as u8);
    xmc.write_register(0x05, (value >> 8) as u8);
    xmc.write_register(0x06, (value >> 16) as u8);
}

fn result16(xmc: &Xmc) -> u16 {
    xmc.read_register(0x0D) as u16 | ((xmc.read_register(0x0E) as u16) << 8)
}

fn free_pages_via_xmem(xmc: &mut Xmc, ram: &mut [u8; CPU_RAM_SIZE]) -> u16 {
    exec(xmc, xmc::CMD_XMEM, ram);
    result16(xmc)
}

#[test]
fn test_stash_fetch_roundtrip() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    for i in 0..16 {
        ram[0x0800 + i] = 10 + i as u8;
    }
    set_name(&mut xmc, "MYDATA");
    set16(&mut xmc, 0x07, 0x0800);
    set16(&mut xmc, 0x09, 16);
    exec(&mut xmc, xmc::CMD_STASH, &mut ram);
    assert_eq!(xmc.status(), (STATUS_OK, 0));

    ram[0x0800..0x0810].fill(0);
    exec(&mut xmc, xmc::CMD_FETCH, &mut ram);
    assert_eq!(xmc.status(), (STATUS_OK, 0));
    assert_eq!(result16(&xmc), 16);
    for i in 0..16 {
        assert_eq!(ram[0x0800 + i], 10 + i as u8);
    }
}

#[test]
fn test_fetch_is_case_insensitive() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    ram[0x0900] = 0x77;
    set_name(&mut xmc, "Stuff");
    set16(&mut xmc, 0x07, 0x0900);
    set16(&mut xmc, 0x09, 1);
    exec(&mut xmc, xmc::CMD_STASH, &mut ram);

    ram[0x0900] = 0;
    set_name(&mut xmc, "STUFF");
    exec(&mut xmc, xmc::CMD_FETCH, &mut ram);
    assert_eq!(xmc.status(), (STATUS_OK, 0));
    assert_eq!(ram[0x0900], 0x77);
}

#[test]
fn test_del_frees_one_page() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    let before = free_pages_via_xmem(&mut xmc, &mut ram);
    assert_eq!(before as usize, PAGE_COUNT);

    set_name(&mut xmc, "MYDATA");
    set16(&mut xmc, 0x07, 0x0800);
    set16(&mut xmc, 0x09, 16);
    exec(&mut xmc, xmc::CMD_STASH, &mut ram);
    assert_eq!(free_pages_via_xmem(&mut xmc, &mut ram), before - 1);

    set_name(&mut xmc, "MYDATA");
    exec(&mut xmc, xmc::CMD_DEL, &mut ram);
    assert_eq!(xmc.status(), (STATUS_OK, 0));
    assert_eq!(free_pages_via_xmem(&mut xmc, &mut ram), before);
}

#[test]
fn test_stash_overwrites_in_place_when_it_fits() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    set_name(&mut xmc, "buf");
    set16(&mut xmc, 0x07, 0x0800);
    set16(&mut xmc, 0x09, 16);
    exec(&mut xmc, xmc::CMD_STASH, &mut ram);
    let free_after_first = free_pages_via_xmem(&mut xmc, &mut ram);

    // 200 bytes still fit the single allocated page.
    set_name(&mut xmc, "BUF");
    set16(&mut xmc, 0x09, 200);
    exec(&mut xmc, xmc::CMD_STASH, &mut ram);
    assert_eq!(xmc.status(), (STATUS_OK, 0));
    assert_eq!(free_pages_via_xmem(&mut xmc, &mut ram), free_after_first);

    // 600 bytes need a fresh three-page run.
    set_name(&mut xmc, "buf");
    set16(&mut xmc, 0x09, 600);
    exec(&mut xmc, xmc::CMD_STASH, &mut ram);
    assert_eq!(xmc.status(), (STATUS_OK, 0));
    assert_eq!(
        free_pages_via_xmem(&mut xmc, &mut ram),
        free_after_first + 1 - 3
    );
}

#[test]
fn test_free_releases_exactly_the_range() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    set16(&mut xmc, 0x09, 1024); // 4 pages
    exec(&mut xmc, xmc::CMD_ALLOC, &mut ram);
    assert_eq!(xmc.status(), (STATUS_OK, 0));
    let first_page = result16(&xmc) as u32;
    let before = free_pages_via_xmem(&mut xmc, &mut ram);

    // Free the middle two pages.
    set_xaddr(&mut xmc, first_page * 256 + 256);
    set16(&mut xmc, 0x09, 512);
    exec(&mut xmc, xmc::CMD_FREE, &mut ram);
    assert_eq!(xmc.status(), (STATUS_OK, 0));
    assert_eq!(free_pages_via_xmem(&mut xmc, &mut ram), before + 2);
}

#[test]
fn test_blank_name_rejected() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    set_name(&mut xmc, "   ");
    set16(&mut xmc, 0x07, 0);
    set16(&mut xmc, 0x09, 4);
    exec(&mut xmc, xmc::CMD_STASH, &mut ram);
    assert_eq!(xmc.status(), (STATUS_ERROR, XmcError::Name.code()));

    xmc.write_register(0x3C, 0);
    exec(&mut xmc, xmc::CMD_STASH, &mut ram);
    assert_eq!(xmc.status(), (STATUS_ERROR, XmcError::Name.code()));
}

#[test]
fn test_name_is_trimmed_for_lookup() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    set_name(&mut xmc, "  data  ");
    set16(&mut xmc, 0x07, 0x0800);
    set16(&mut xmc, 0x09, 8);
    exec(&mut xmc, xmc::CMD_STASH, &mut ram);
    assert_eq!(xmc.status(), (STATUS_OK, 0));

    set_name(&mut xmc, "DATA");
    exec(&mut xmc, xmc::CMD_FETCH, &mut ram);
    assert_eq!(xmc.status(), (STATUS_OK, 0));
}

#[test]
fn test_fetch_missing_reports_notfound() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    set_name(&mut xmc, "ghost");
    exec(&mut xmc, xmc::CMD_FETCH, &mut ram);
    assert_eq!(xmc.status(), (STATUS_ERROR, XmcError::NotFound.code()));
}

#[test]
fn test_fetch_into_rom_rejected() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    set_name(&mut xmc, "big");
    set16(&mut xmc, 0x07, 0x0800);
    set16(&mut xmc, 0x09, 64);
    exec(&mut xmc, xmc::CMD_STASH, &mut ram);

    set16(&mut xmc, 0x07, 0xBFF0);
    exec(&mut xmc, xmc::CMD_FETCH, &mut ram);
    assert_eq!(xmc.status(), (STATUS_ERROR, XmcError::Range.code()));
}

#[test]
fn test_dir_iterates_sorted_case_insensitive() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    for name in ["zeta", "Alpha", "mid"] {
        set_name(&mut xmc, name);
        set16(&mut xmc, 0x07, 0);
        set16(&mut xmc, 0x09, 4);
        exec(&mut xmc, xmc::CMD_STASH, &mut ram);
    }

    exec(&mut xmc, xmc::CMD_DIR_OPEN, &mut ram);
    let mut names = Vec::new();
    for _ in 0..3 {
        exec(&mut xmc, xmc::CMD_DIR_NEXT, &mut ram);
        assert_eq!(xmc.status(), (STATUS_OK, 0));
        let len = xmc.read_register(0x3C) as usize;
        let name: String = (0..len)
            .map(|i| xmc.read_register(0x20 + i as u8) as char)
            .collect();
        names.push(name);
    }
    assert_eq!(names, ["Alpha", "mid", "zeta"]);

    // Past the end: sticky EndOfDir.
    exec(&mut xmc, xmc::CMD_DIR_NEXT, &mut ram);
    assert_eq!(xmc.status(), (STATUS_ERROR, XmcError::EndOfDir.code()));
    exec(&mut xmc, xmc::CMD_DIR_NEXT, &mut ram);
    assert_eq!(xmc.status(), (STATUS_ERROR, XmcError::EndOfDir.code()));
}

#[test]
fn test_peek_poke_bank_addressing() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    xmc.write_register(0x03, 3); // bank 3
    set_xaddr(&mut xmc, 0x0042);
    xmc.write_register(0x0B, 0x99);
    exec(&mut xmc, xmc::CMD_POKE, &mut ram);
    assert_eq!(xmc.xram()[0x3_0042], 0x99);

    xmc.write_register(0x0B, 0);
    exec(&mut xmc, xmc::CMD_PEEK, &mut ram);
    assert_eq!(xmc.read_register(0x0B), 0x99);
}

#[test]
fn test_bulk_read_rejects_rom_destination() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    set_xaddr(&mut xmc, 0);
    set16(&mut xmc, 0x07, 0xBFFF);
    set16(&mut xmc, 0x09, 2);
    exec(&mut xmc, xmc::CMD_READ, &mut ram);
    assert_eq!(xmc.status(), (STATUS_ERROR, XmcError::Range.code()));
}

#[test]
fn test_bulk_write_and_read_roundtrip() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    for i in 0..32 {
        ram[0x0400 + i] = (i * 3) as u8;
    }
    xmc.write_register(0x03, 1);
    set_xaddr(&mut xmc, 0x0100);
    set16(&mut xmc, 0x07, 0x0400);
    set16(&mut xmc, 0x09, 32);
    exec(&mut xmc, xmc::CMD_WRITE, &mut ram);
    assert_eq!(xmc.status(), (STATUS_OK, 0));

    set16(&mut xmc, 0x07, 0x0600);
    exec(&mut xmc, xmc::CMD_READ, &mut ram);
    assert_eq!(xmc.status(), (STATUS_OK, 0));
    for i in 0..32 {
        assert_eq!(ram[0x0600 + i], (i * 3) as u8);
    }
}

#[test]
fn test_window_mapping_rounds_to_page() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    xmc.write_register(0x0C, 1);
    set_xaddr(&mut xmc, 0x0234); // rounds down to page 2
    exec(&mut xmc, xmc::CMD_MAP, &mut ram);
    assert_eq!(xmc.status(), (STATUS_OK, 0));

    assert!(xmc.window_write(1, 0x10, 0xAB));
    assert_eq!(xmc.xram()[0x0210], 0xAB);
    assert_eq!(xmc.window_read(1, 0x10), Some(0xAB));

    // Other windows stay unmapped.
    assert_eq!(xmc.window_read(0, 0x10), None);
    assert!(!xmc.window_write(2, 0, 1));

    exec(&mut xmc, xmc::CMD_UNMAP, &mut ram);
    assert_eq!(xmc.window_read(1, 0x10), None);
}

#[test]
fn test_window_index_out_of_range() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    xmc.write_register(0x0C, 4);
    set_xaddr(&mut xmc, 0);
    exec(&mut xmc, xmc::CMD_MAP, &mut ram);
    assert_eq!(xmc.status(), (STATUS_ERROR, XmcError::BadArgs.code()));
}

#[test]
fn test_xreset_preserves_bytes_but_clears_tracking() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    set_name(&mut xmc, "keep");
    set16(&mut xmc, 0x07, 0x0800);
    set16(&mut xmc, 0x09, 4);
    ram[0x0800..0x0804].copy_from_slice(&[1, 2, 3, 4]);
    exec(&mut xmc, xmc::CMD_STASH, &mut ram);
    let page = {
        exec(&mut xmc, xmc::CMD_XMEM, &mut ram);
        (PAGE_COUNT as u16 - result16(&xmc)) as usize
    };
    assert_eq!(page, 1);

    exec(&mut xmc, xmc::CMD_XRESET, &mut ram);
    assert_eq!(free_pages_via_xmem(&mut xmc, &mut ram) as usize, PAGE_COUNT);
    // The directory is gone but the raw bytes survive.
    set_name(&mut xmc, "keep");
    exec(&mut xmc, xmc::CMD_FETCH, &mut ram);
    assert_eq!(xmc.status(), (STATUS_ERROR, XmcError::NotFound.code()));
    assert_eq!(&xmc.xram()[0..4], &[1, 2, 3, 4]);
}

#[test]
fn test_alloc_exhausts_handles() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    set16(&mut xmc, 0x09, 1);
    for _ in 0..255 {
        exec(&mut xmc, xmc::CMD_ALLOC, &mut ram);
        assert_eq!(xmc.status(), (STATUS_OK, 0));
    }
    exec(&mut xmc, xmc::CMD_ALLOC, &mut ram);
    assert_eq!(xmc.status(), (STATUS_ERROR, XmcError::NoSpace.code()));
}

#[test]
fn test_alloc_zero_rejected() {
    let mut ram = Box::new([0u8; CPU_RAM_SIZE]);
    let mut xmc = Xmc::new();
    set16(&mut xmc, 0x09, 0);
    exec(&mut xmc, xmc::CMD_ALLOC, &mut ram);
    assert_eq!(xmc.status(), (STATUS_ERROR, XmcError::BadArgs.code()));
}
