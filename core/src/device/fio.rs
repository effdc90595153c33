use crate::device::dma::{STATUS_ERROR, STATUS_IDLE, STATUS_OK};
use crate::device::space::{CPU_RAM_SIZE, ROM_BASE};
use log::debug;
use std::io;
use std::path::{Path, PathBuf};

/// Guest-visible file I/O errors. Host-side `std::io::Error`s are caught
/// at this boundary and mapped; they never escape to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FioError {
    NotFound = 1,
    Io = 2,
    EndOfDir = 3,
}

impl FioError {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for FioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "file not found"),
            Self::Io => write!(f, "I/O error"),
            Self::EndOfDir => write!(f, "end of directory"),
        }
    }
}

impl std::error::Error for FioError {}

impl From<io::Error> for FioError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            _ => Self::Io,
        }
    }
}

// Command strobes.
pub const CMD_SAVE: u8 = 1;
pub const CMD_LOAD: u8 = 2;
pub const CMD_DIR_OPEN: u8 = 3;
pub const CMD_DIR_NEXT: u8 = 4;
pub const CMD_DEL: u8 = 5;

/// Maximum filename length in bytes, before the `.bas` extension is
/// appended.
pub const MAX_FILENAME: usize = 63;

/// File I/O controller: SAVE/LOAD/DIR/DEL against a host backing
/// directory.
///
/// # Register map (offsets from `B9A0`)
///
/// | Offset    | Name     | Description                                |
/// |-----------|----------|--------------------------------------------|
/// | 0x00      | CMD      | Command strobe (CMD_* constants)           |
/// | 0x01      | STATUS   | 0 idle, 2 ok, 3 error (read-only)          |
/// | 0x02      | ERR      | `FioError` code, 0 = none (read-only)      |
/// | 0x03-0x04 | START    | 16-bit CPU start address                   |
/// | 0x05-0x06 | END      | 16-bit CPU end address (exclusive)         |
/// | 0x07      | NAME_LEN | Filename length in bytes                   |
/// | 0x08-0x09 | SIZE     | Bytes of the last LOAD / DIR_NEXT entry    |
/// | 0x10-0x4E | NAME     | Filename buffer                            |
///
/// Filenames accept `[A-Za-z0-9_.\-]`, 1-63 bytes; anything else reports
/// Io. A missing `.bas` extension (case-insensitive) is appended. DIR
/// enumerates `.bas` files alphabetically; iterating past the last entry
/// reports EndOfDir until the next DIR_OPEN.
pub struct Fio {
    root: PathBuf,
    status: u8,
    err: u8,
    start: u16,
    end: u16,
    name_len: u8,
    size: u16,
    name_buf: [u8; MAX_FILENAME],
    dir: Vec<(String, u64)>,
    dir_pos: usize,
}

impl Fio {
    /// Create a controller backed by the process working directory.
    pub fn new() -> Self {
        Self::with_root(".")
    }

    /// Create a controller backed by `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            status: STATUS_IDLE,
            err: 0,
            start: 0,
            end: 0,
            name_len: 0,
            size: 0,
            name_buf: [0; MAX_FILENAME],
            dir: Vec::new(),
            dir_pos: 0,
        }
    }

    pub fn set_root(&mut self, root: impl Into<PathBuf>) {
        self.root = root.into();
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // --- Register file ---

    /// Read a register (offset 0x00-0x4F).
    pub fn read_register(&self, offset: u8) -> u8 {
        match offset {
            0x01 => self.status,
            0x02 => self.err,
            0x03 => self.start as u8,
            0x04 => (self.start >> 8) as u8,
            0x05 => self.end as u8,
            0x06 => (self.end >> 8) as u8,
            0x07 => self.name_len,
            0x08 => self.size as u8,
            0x09 => (self.size >> 8) as u8,
            0x10..=0x4E => self.name_buf[(offset - 0x10) as usize],
            _ => 0,
        }
    }

    /// Write a register. A write to CMD returns the command byte for the
    /// board to execute with CPU RAM access.
    pub fn write_register(&mut self, offset: u8, value: u8) -> Option<u8> {
        match offset {
            0x00 => return Some(value),
            0x03 => self.start = (self.start & 0xFF00) | value as u16,
            0x04 => self.start = (self.start & 0x00FF) | ((value as u16) << 8),
            0x05 => self.end = (self.end & 0xFF00) | value as u16,
            0x06 => self.end = (self.end & 0x00FF) | ((value as u16) << 8),
            0x07 => self.name_len = value,
            0x10..=0x4E => self.name_buf[(offset - 0x10) as usize] = value,
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
                debug!("fio command {cmd} failed: {e}");
                self.status = STATUS_ERROR;
                self.err = e.code();
            }
        }
    }

    pub fn status(&self) -> (u8, u8) {
        (self.status, self.err)
    }

    pub fn reset(&mut self) {
        self.status = STATUS_IDLE;
        self.err = 0;
        self.start = 0;
        self.end = 0;
        self.name_len = 0;
        self.size = 0;
        self.name_buf = [0; MAX_FILENAME];
        self.dir.clear();
        self.dir_pos = 0;
    }

    fn run(&mut self, cmd: u8, ram: &mut [u8; CPU_RAM_SIZE]) -> Result<(), FioError> {
        match cmd {
            CMD_SAVE => self.save(ram),
            CMD_LOAD => self.load(ram),
            CMD_DIR_OPEN => self.dir_open(),
            CMD_DIR_NEXT => self.dir_next(),
            CMD_DEL => self.del(),
            _ => Err(FioError::Io),
        }
    }

    // --- Filename parsing ---

    /// Validate the name buffer and return the filename with a `.bas`
    /// extension ensured.
    fn parse_filename(&self) -> Result<String, FioError> {
        let len = self.name_len as usize;
        if len == 0 || len > MAX_FILENAME {
            return Err(FioError::Io);
        }
        let raw = &self.name_buf[..len];
        if !raw
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'-')
        {
            return Err(FioError::Io);
        }
        let mut name = String::from_utf8_lossy(raw).into_owned();
        if !name.to_ascii_lowercase().ends_with(".bas") {
            name.push_str(".bas");
        }
        Ok(name)
    }

    // --- Commands ---

    fn save(&mut self, ram: &[u8; CPU_RAM_SIZE]) -> Result<(), FioError> {
        let name = self.parse_filename()?;
        let (start, end) = (self.start as usize, self.end as usize);
        if end <= start {
            return Err(FioError::Io);
        }
        std::fs::write(self.root.join(name), &ram[start..end])?;
        Ok(())
    }

    fn load(&mut self, ram: &mut [u8; CPU_RAM_SIZE]) -> Result<(), FioError> {
        let name = self.parse_filename()?;
        let data = std::fs::read(self.root.join(name))?;
        let start = self.start as usize;
        // Clip at the ROM base; a load can never overwrite ROM.
        let len = data.len().min(ROM_BASE.saturating_sub(start));
        ram[start..start + len].copy_from_slice(&data[..len]);
        self.size = len.min(u16::MAX as usize) as u16;
        self.end = (start + len).min(u16::MAX as usize) as u16;
        Ok(())
    }

    fn dir_open(&mut self) -> Result<(), FioError> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            if name.to_ascii_lowercase().ends_with(".bas") {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                entries.push((name, size));
            }
        }
        entries.sort_by_key(|(name, _)| name.to_ascii_lowercase());
        self.dir = entries;
        self.dir_pos = 0;
        Ok(())
    }

    fn dir_next(&mut self) -> Result<(), FioError> {
        let Some((name, size)) = self.dir.get(self.dir_pos) else {
            // Sticky until the next DIR_OPEN.
            return Err(FioError::EndOfDir);
        };
        self.name_buf = [0; MAX_FILENAME];
        let bytes = name.as_bytes();
        let len = bytes.len().min(MAX_FILENAME);
        self.name_buf[..len].copy_from_slice(&bytes[..len]);
        self.name_len = len as u8;
        self.size = (*size).min(u16::MAX as u64) as u16;
        self.dir_pos += 1;
        Ok(())
    }

    fn del(&mut self) -> Result<(), FioError> {
        let name = self.parse_filename()?;
        std::fs::remove_file(self.root.join(name))?;
        Ok(())
    }
}

impl Default for Fio {
    fn default() -> Self {
        Self::new()
    }
}
