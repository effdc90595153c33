/// Raster-synchronous register-write lists ("copper").
///
/// The VGC keeps 128 lists of up to 256 events each. An event is a
/// `(position, register, value)` triple where `position = y * 320 + x` on
/// the 320x200 canvas. The CPU edits the *target* list through VGC
/// commands; the compositor replays the *active* list as its raster walk
/// passes each event's position. Switching the active list only happens at
/// a frame boundary, so a frame never sees a half-edited program.
pub const COPPER_LISTS: usize = 128;

/// Maximum events per list. Additions beyond this are dropped.
pub const COPPER_LIST_CAP: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopperEvent {
    /// Raster position, `y * 320 + x`.
    pub position: u32,
    /// Either a VGC register index (0-15) or an absolute sprite register
    /// address in `A040..A0BF`. Anything else is stored but inert.
    pub register: u16,
    pub value: u8,
}

pub struct Copper {
    lists: Vec<Vec<CopperEvent>>,
    target: usize,
    active: usize,
    pending_active: Option<usize>,
    enabled: bool,
}

impl Copper {
    pub fn new() -> Self {
        Self {
            lists: vec![Vec::new(); COPPER_LISTS],
            target: 0,
            active: 0,
            pending_active: None,
            enabled: false,
        }
    }

    /// Insert an event into the target list, keeping the list sorted by
    /// `(position, register)`. An event with an existing key replaces the
    /// prior value.
    pub fn add(&mut self, position: u32, register: u16, value: u8) {
        let list = &mut self.lists[self.target];
        match list.binary_search_by_key(&(position, register), |e| (e.position, e.register)) {
            Ok(i) => list[i].value = value,
            Err(i) => {
                if list.len() < COPPER_LIST_CAP {
                    list.insert(
                        i,
                        CopperEvent {
                            position,
                            register,
                            value,
                        },
                    );
                }
            }
        }
    }

    /// Empty the target list.
    pub fn clear(&mut self) {
        self.lists[self.target].clear();
    }

    /// Select the target (write cursor) list. Indices >= 128 are ignored.
    pub fn set_target(&mut self, list: u8) {
        if (list as usize) < COPPER_LISTS {
            self.target = list as usize;
        }
    }

    /// Schedule `list` to become the active list at the next frame
    /// boundary. Indices >= 128 are ignored.
    pub fn schedule_active(&mut self, list: u8) {
        if (list as usize) < COPPER_LISTS {
            self.pending_active = Some(list as usize);
        }
    }

    /// Restore the target cursor to the active list.
    pub fn end_target(&mut self) {
        self.target = self.active;
    }

    pub fn set_enabled(&mut self, on: bool) {
        self.enabled = on;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Frame-boundary update: a pending active-list swap takes effect
    /// atomically here and nowhere else.
    pub fn begin_frame(&mut self) {
        if let Some(list) = self.pending_active.take() {
            self.active = list;
        }
    }

    pub fn active_events(&self) -> &[CopperEvent] {
        &self.lists[self.active]
    }

    /// Events of an arbitrary list, for inspection. Indices >= 128 read as
    /// empty.
    pub fn events(&self, list: u8) -> &[CopperEvent] {
        self.lists
            .get(list as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn target(&self) -> u8 {
        self.target as u8
    }

    pub fn active(&self) -> u8 {
        self.active as u8
    }
}

impl Default for Copper {
    fn default() -> Self {
        Self::new()
    }
}
