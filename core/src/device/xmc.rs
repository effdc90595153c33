use crate::device::dma::{STATUS_ERROR, STATUS_IDLE, STATUS_OK};
use crate::device::space::{CPU_RAM_SIZE, ROM_BASE};
use log::debug;

pub const XRAM_SIZE: usize = 512 * 1024;
pub const PAGE_SIZE: usize = 256;
pub const PAGE_COUNT: usize = XRAM_SIZE / PAGE_SIZE; // 2048
/// One bank is the 64 KiB slice space-5 addressing sees.
pub const BANK_SIZE: usize = 0x10000;
pub const BANK_COUNT: usize = XRAM_SIZE / BANK_SIZE; // 8
pub const WINDOW_COUNT: usize = 4;
/// Maximum stored-block name length after whitespace trimming.
pub const MAX_NAME: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmcError {
    Range = 1,
    BadArgs = 2,
    NotFound = 3,
    NoSpace = 4,
    Name = 5,
    EndOfDir = 6,
}

impl XmcError {
    pub fn code(self) -> u8 {
        self as u8
    }
}

// Command strobes.
pub const CMD_PEEK: u8 = 1;
pub const CMD_POKE: u8 = 2;
pub const CMD_READ: u8 = 3;
pub const CMD_WRITE: u8 = 4;
pub const CMD_ALLOC: u8 = 5;
pub const CMD_FREE: u8 = 6;
pub const CMD_STASH: u8 = 7;
pub const CMD_FETCH: u8 = 8;
pub const CMD_DEL: u8 = 9;
pub const CMD_DIR_OPEN: u8 = 10;
pub const CMD_DIR_NEXT: u8 = 11;
pub const CMD_MAP: u8 = 12;
pub const CMD_UNMAP: u8 = 13;
pub const CMD_XMEM: u8 = 14;
pub const CMD_XRESET: u8 = 15;

/// A directory entry: a contiguous page run holding `length` bytes.
/// Anonymous allocations (from ALLOC) carry an empty name and are skipped
/// by name lookup and directory iteration.
struct Block {
    handle: u8,
    name: String,
    first_page: usize,
    page_count: usize,
    length: usize,
}

#[derive(Clone, Copy, Default)]
struct Window {
    enabled: bool,
    page: usize,
}

/// Expansion memory controller: 512 KiB backing store in 2048 pages of
/// 256 bytes.
///
/// # Register map (offsets from `BA00`)
///
/// | Offset    | Name     | Description                                 |
/// |-----------|----------|---------------------------------------------|
/// | 0x00      | CMD      | Command strobe (CMD_* constants)            |
/// | 0x01      | STATUS   | 0 idle, 2 ok, 3 error (read-only)           |
/// | 0x02      | ERR      | `XmcError` code, 0 = none (read-only)       |
/// | 0x03      | XBANK    | Space-5 bank, masked to 0-7                 |
/// | 0x04-0x06 | XADDR    | 24-bit XRAM offset                          |
/// | 0x07-0x08 | RAMADDR  | 16-bit CPU address for bulk transfers       |
/// | 0x09-0x0A | LEN      | 16-bit length                               |
/// | 0x0B      | DATA     | Byte operand/result (PEEK/POKE, handle)     |
/// | 0x0C      | WINDOW   | Window index 0-3 for MAP/UNMAP              |
/// | 0x0D-0x0E | RESULT   | 16-bit result (page, length, free count)    |
/// | 0x20-0x3B | NAME     | Stored-block name buffer                    |
/// | 0x3C      | NAME_LEN | Name length in bytes                        |
///
/// The allocator is first-fit over the page bitmap with a pool of 255
/// handles; exhausting either reports NoSpace. Names are trimmed and
/// compared case-insensitively. XRESET discards all allocation tracking
/// but preserves raw XRAM bytes.
pub struct Xmc {
    xram: Box<[u8]>,
    used: [u64; PAGE_COUNT / 64],
    handles: [bool; 256],
    blocks: Vec<Block>,

    dir_names: Vec<String>,
    dir_pos: usize,

    windows: [Window; WINDOW_COUNT],

    status: u8,
    err: u8,
    xbank: u8,
    xaddr: u32,
    ramaddr: u16,
    len: u16,
    data: u8,
    window_sel: u8,
    result: u16,
    name_buf: [u8; MAX_NAME],
    name_len: u8,
}

impl Xmc {
    pub fn new() -> Self {
        Self {
            xram: vec![0; XRAM_SIZE].into_boxed_slice(),
            used: [0; PAGE_COUNT / 64],
            handles: [false; 256],
            blocks: Vec::new(),
            dir_names: Vec::new(),
            dir_pos: 0,
            windows: [Window::default(); WINDOW_COUNT],
            status: STATUS_IDLE,
            err: 0,
            xbank: 0,
            xaddr: 0,
            ramaddr: 0,
            len: 0,
            data: 0,
            window_sel: 0,
            result: 0,
            name_buf: [0; MAX_NAME],
            name_len: 0,
        }
    }

    // --- Register file ---

    /// Read a register (offset 0x00-0x3F).
    pub fn read_register(&self, offset: u8) -> u8 {
        match offset {
            0x01 => self.status,
            0x02 => self.err,
            0x03 => self.xbank,
            0x04 => self.xaddr as u8,
            0x05 => (self.xaddr >> 8) as u8,
            0x06 => (self.xaddr >> 16) as u8,
            0x07 => self.ramaddr as u8,
            0x08 => (self.ramaddr >> 8) as u8,
            0x09 => self.len as u8,
            0x0A => (self.len >> 8) as u8,
            0x0B => self.data,
            0x0C => self.window_sel,
            0x0D => self.result as u8,
            0x0E => (self.result >> 8) as u8,
            0x20..=0x3B => self.name_buf[(offset - 0x20) as usize],
            0x3C => self.name_len,
            _ => 0,
        }
    }

    /// Write a register. A write to CMD returns the command byte for the
    /// board to execute with CPU RAM access.
    pub fn write_register(&mut self, offset: u8, value: u8) -> Option<u8> {
        match offset {
            0x00 => return Some(value),
            0x03 => self.xbank = value % BANK_COUNT as u8,
            0x04 => self.xaddr = (self.xaddr & 0xFF_FF00) | value as u32,
            0x05 => self.xaddr = (self.xaddr & 0xFF_00FF) | ((value as u32) << 8),
            0x06 => self.xaddr = (self.xaddr & 0x00_FFFF) | ((value as u32) << 16),
            0x07 => self.ramaddr = (self.ramaddr & 0xFF00) | value as u16,
            0x08 => self.ramaddr = (self.ramaddr & 0x00FF) | ((value as u16) << 8),
            0x09 => self.len = (self.len & 0xFF00) | value as u16,
            0x0A => self.len = (self.len & 0x00FF) | ((value as u16) << 8),
            0x0B => self.data = value,
            0x0C => self.window_sel = value,
            0x20..=0x3B => self.name_buf[(offset - 0x20) as usize] = value,
            0x3C => self.name_len = value,
            _ => {}
        }
        None
    }

    /// Execute a strobed command and update the status/error pair.
    pub fn execute(&mut self, cmd: u8, ram: &mut [u8; CPU_RAM_SIZE]) {
        match self.run(cmd, ram) {
            Ok(()) => {
                self.status = STATUS_OK;
                self.err = 0;
            }
            Err(e) => {
                debug!("xmc command {cmd} rejected: {e:?}");
                self.status = STATUS_ERROR;
                self.err = e.code();
            }
        }
    }

    pub fn status(&self) -> (u8, u8) {
        (self.status, self.err)
    }

    fn run(&mut self, cmd: u8, ram: &mut [u8; CPU_RAM_SIZE]) -> Result<(), XmcError> {
        match cmd {
            CMD_PEEK => {
                self.data = self.xram[self.bank_addr()];
                Ok(())
            }
            CMD_POKE => {
                let addr = self.bank_addr();
                self.xram[addr] = self.data;
                Ok(())
            }
            CMD_READ => self.bulk_read(ram),
            CMD_WRITE => self.bulk_write(ram),
            CMD_ALLOC => self.alloc(),
            CMD_FREE => self.free(),
            CMD_STASH => self.stash(ram),
            CMD_FETCH => self.fetch(ram),
            CMD_DEL => self.del(),
            CMD_DIR_OPEN => {
                self.dir_open();
                Ok(())
            }
            CMD_DIR_NEXT => self.dir_next(),
            CMD_MAP => self.map(),
            CMD_UNMAP => self.unmap(),
            CMD_XMEM => {
                self.result = self.free_pages() as u16;
                Ok(())
            }
            CMD_XRESET => {
                self.xreset();
                Ok(())
            }
            _ => Err(XmcError::BadArgs),
        }
    }

    // --- Byte and bulk access ---

    /// PEEK/POKE address: XBANK selects the 64 KiB bank, XADDR's low 16
    /// bits the offset inside it.
    fn bank_addr(&self) -> usize {
        ((self.xbank as usize) << 16) | (self.xaddr as usize & 0xFFFF)
    }

    fn bulk_read(&mut self, ram: &mut [u8; CPU_RAM_SIZE]) -> Result<(), XmcError> {
        let len = self.len as usize;
        if len == 0 {
            return Err(XmcError::BadArgs);
        }
        let src = self.bank_addr();
        if (src & 0xFFFF) + len > BANK_SIZE {
            return Err(XmcError::Range);
        }
        let dst = self.ramaddr as usize;
        if dst + len > ROM_BASE {
            return Err(XmcError::Range);
        }
        ram[dst..dst + len].copy_from_slice(&self.xram[src..src + len]);
        Ok(())
    }

    fn bulk_write(&mut self, ram: &mut [u8; CPU_RAM_SIZE]) -> Result<(), XmcError> {
        let len = self.len as usize;
        if len == 0 {
            return Err(XmcError::BadArgs);
        }
        let dst = self.bank_addr();
        if (dst & 0xFFFF) + len > BANK_SIZE {
            return Err(XmcError::Range);
        }
        let src = self.ramaddr as usize;
        if src + len > CPU_RAM_SIZE {
            return Err(XmcError::Range);
        }
        self.xram[dst..dst + len].copy_from_slice(&ram[src..src + len]);
        Ok(())
    }

    // --- Page allocator ---

    fn page_used(&self, page: usize) -> bool {
        self.used[page / 64] & (1 << (page % 64)) != 0
    }

    fn set_page(&mut self, page: usize, used: bool) {
        if used {
            self.used[page / 64] |= 1 << (page % 64);
        } else {
            self.used[page / 64] &= !(1 << (page % 64));
        }
    }

    pub fn free_pages(&self) -> usize {
        PAGE_COUNT - self.used.iter().map(|w| w.count_ones() as usize).sum::<usize>()
    }

    /// Lowest-index run of `pages` contiguous free pages.
    fn find_run(&self, pages: usize) -> Option<usize> {
        let mut run = 0;
        for page in 0..PAGE_COUNT {
            if self.page_used(page) {
                run = 0;
            } else {
                run += 1;
                if run == pages {
                    return Some(page + 1 - pages);
                }
            }
        }
        None
    }

    fn alloc_handle(&mut self) -> Option<u8> {
        let handle = (1..=255u8).find(|&h| !self.handles[h as usize])?;
        self.handles[handle as usize] = true;
        Some(handle)
    }

    /// Reserve pages for `length` bytes and record a block. Returns the
    /// block index.
    fn alloc_block(&mut self, name: String, length: usize) -> Result<usize, XmcError> {
        let pages = length.div_ceil(PAGE_SIZE);
        let first_page = self.find_run(pages).ok_or(XmcError::NoSpace)?;
        let handle = self.alloc_handle().ok_or(XmcError::NoSpace)?;
        for page in first_page..first_page + pages {
            self.set_page(page, true);
        }
        self.blocks.push(Block {
            handle,
            name,
            first_page,
            page_count: pages,
            length,
        });
        Ok(self.blocks.len() - 1)
    }

    fn alloc(&mut self) -> Result<(), XmcError> {
        let length = self.len as usize;
        if length == 0 {
            return Err(XmcError::BadArgs);
        }
        let index = self.alloc_block(String::new(), length)?;
        self.result = self.blocks[index].first_page as u16;
        self.data = self.blocks[index].handle;
        Ok(())
    }

    /// Release every page in `[XADDR, XADDR + LEN)` and drop any block
    /// whose page run overlaps the range.
    fn free(&mut self) -> Result<(), XmcError> {
        let len = self.len as usize;
        if len == 0 {
            return Err(XmcError::BadArgs);
        }
        let start = self.xaddr as usize;
        if start + len > XRAM_SIZE {
            return Err(XmcError::Range);
        }
        let first_page = start / PAGE_SIZE;
        let last_page = (start + len - 1) / PAGE_SIZE;
        for page in first_page..=last_page {
            self.set_page(page, false);
        }
        // Overlapping blocks drop out of the directory and give back their
        // handles; only pages inside the freed range change state.
        let handles = &mut self.handles;
        self.blocks.retain(|b| {
            let overlaps = b.first_page <= last_page && first_page < b.first_page + b.page_count;
            if overlaps {
                handles[b.handle as usize] = false;
            }
            !overlaps
        });
        Ok(())
    }

    // --- Named blocks ---

    /// Trimmed, validated name from the name buffer.
    fn parse_name(&self) -> Result<String, XmcError> {
        let len = (self.name_len as usize).min(MAX_NAME);
        let raw = &self.name_buf[..len];
        let text = String::from_utf8_lossy(raw);
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_NAME {
            return Err(XmcError::Name);
        }
        Ok(trimmed.to_string())
    }

    fn find_block(&self, name: &str) -> Option<usize> {
        self.blocks
            .iter()
            .position(|b| !b.name.is_empty() && b.name.eq_ignore_ascii_case(name))
    }

    fn release_block(&mut self, index: usize) {
        let block = self.blocks.remove(index);
        self.handles[block.handle as usize] = false;
        for page in block.first_page..block.first_page + block.page_count {
            self.set_page(page, false);
        }
    }

    fn stash(&mut self, ram: &mut [u8; CPU_RAM_SIZE]) -> Result<(), XmcError> {
        let name = self.parse_name()?;
        let length = self.len as usize;
        if length == 0 {
            return Err(XmcError::BadArgs);
        }
        let src = self.ramaddr as usize;
        if src + length > CPU_RAM_SIZE {
            return Err(XmcError::Range);
        }

        let index = match self.find_block(&name) {
            // Overwrite in place when the existing allocation fits.
            Some(i) if length <= self.blocks[i].page_count * PAGE_SIZE => {
                self.blocks[i].length = length;
                i
            }
            Some(i) => {
                self.release_block(i);
                self.alloc_block(name, length)?
            }
            None => self.alloc_block(name, length)?,
        };

        let block = &self.blocks[index];
        let base = block.first_page * PAGE_SIZE;
        self.xram[base..base + length].copy_from_slice(&ram[src..src + length]);
        self.result = block.handle as u16;
        Ok(())
    }

    fn fetch(&mut self, ram: &mut [u8; CPU_RAM_SIZE]) -> Result<(), XmcError> {
        let name = self.parse_name()?;
        let index = self.find_block(&name).ok_or(XmcError::NotFound)?;
        let block = &self.blocks[index];
        let dst = self.ramaddr as usize;
        if dst + block.length > ROM_BASE {
            return Err(XmcError::Range);
        }
        let base = block.first_page * PAGE_SIZE;
        ram[dst..dst + block.length].copy_from_slice(&self.xram[base..base + block.length]);
        self.result = block.length as u16;
        Ok(())
    }

    fn del(&mut self) -> Result<(), XmcError> {
        let name = self.parse_name()?;
        let index = self.find_block(&name).ok_or(XmcError::NotFound)?;
        self.release_block(index);
        Ok(())
    }

    // --- Directory iteration ---

    fn dir_open(&mut self) {
        self.dir_names = self
            .blocks
            .iter()
            .filter(|b| !b.name.is_empty())
            .map(|b| b.name.clone())
            .collect();
        self.dir_names.sort_by_key(|n| n.to_ascii_lowercase());
        self.dir_pos = 0;
    }

    fn dir_next(&mut self) -> Result<(), XmcError> {
        let Some(name) = self.dir_names.get(self.dir_pos) else {
            // Sticky: every read past the end keeps reporting EndOfDir.
            return Err(XmcError::EndOfDir);
        };
        self.name_buf = [0; MAX_NAME];
        let bytes = name.as_bytes();
        self.name_buf[..bytes.len()].copy_from_slice(bytes);
        self.name_len = bytes.len() as u8;
        self.result = self
            .find_block(name)
            .map(|i| self.blocks[i].length as u16)
            .unwrap_or(0);
        self.dir_pos += 1;
        Ok(())
    }

    // --- CPU window mapping ---

    fn map(&mut self) -> Result<(), XmcError> {
        let window = self.window_sel as usize;
        if window >= WINDOW_COUNT {
            return Err(XmcError::BadArgs);
        }
        let offset = self.xaddr as usize;
        if offset >= XRAM_SIZE {
            return Err(XmcError::Range);
        }
        self.windows[window] = Window {
            enabled: true,
            page: offset / PAGE_SIZE,
        };
        Ok(())
    }

    fn unmap(&mut self) -> Result<(), XmcError> {
        let window = self.window_sel as usize;
        if window >= WINDOW_COUNT {
            return Err(XmcError::BadArgs);
        }
        self.windows[window].enabled = false;
        Ok(())
    }

    /// CPU read through a window; `None` when the window is disabled (the
    /// access falls through to flat RAM).
    pub fn window_read(&self, window: usize, offset: u8) -> Option<u8> {
        let w = self.windows.get(window)?;
        if !w.enabled {
            return None;
        }
        Some(self.xram[w.page * PAGE_SIZE + offset as usize])
    }

    /// CPU write through a window; returns false when disabled.
    pub fn window_write(&mut self, window: usize, offset: u8, value: u8) -> bool {
        match self.windows.get(window) {
            Some(w) if w.enabled => {
                let index = w.page * PAGE_SIZE + offset as usize;
                self.xram[index] = value;
                true
            }
            _ => false,
        }
    }

    // --- Reset and board plumbing ---

    /// Discard allocation tracking (page bitmap, handle pool, directory);
    /// raw XRAM bytes are preserved.
    fn xreset(&mut self) {
        self.used = [0; PAGE_COUNT / 64];
        self.handles = [false; 256];
        self.blocks.clear();
        self.dir_names.clear();
        self.dir_pos = 0;
    }

    pub fn xbank(&self) -> u8 {
        self.xbank
    }

    pub fn xram(&self) -> &[u8] {
        &self.xram
    }

    pub fn xram_mut(&mut self) -> &mut [u8] {
        &mut self.xram
    }
}

impl Default for Xmc {
    fn default() -> Self {
        Self::new()
    }
}
