/// Fixed-capacity, wrap-around byte tape with a movable cursor.
///
/// The cursor always stays in `0..capacity`, moving past either end wraps
/// around, and cell arithmetic wraps modulo 256.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tape {
    cells: Vec<u8>,
    cursor: usize,
}

impl Tape {
    /// Creates a zeroed tape.
    ///
    /// # Panics
    /// Panics if `capacity` is zero. Configuration validation rejects that
    /// value before a tape is ever built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "tape capacity must be at least one cell");
        Self {
            cells: vec![0; capacity],
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    #[inline]
    pub fn move_right(&mut self) {
        self.cursor = if self.cursor + 1 == self.cells.len() {
            0
        } else {
            self.cursor + 1
        };
    }

    #[inline]
    pub fn move_left(&mut self) {
        self.cursor = if self.cursor == 0 {
            self.cells.len() - 1
        } else {
            self.cursor - 1
        };
    }

    #[inline]
    pub fn increment(&mut self) {
        let cell = &mut self.cells[self.cursor];
        *cell = cell.wrapping_add(1);
    }

    #[inline]
    pub fn decrement(&mut self) {
        let cell = &mut self.cells[self.cursor];
        *cell = cell.wrapping_sub(1);
    }

    #[inline]
    pub fn get(&self) -> u8 {
        self.cells[self.cursor]
    }

    #[inline]
    pub fn set(&mut self, value: u8) {
        self.cells[self.cursor] = value;
    }

    /// Zeroes every cell and returns the cursor to the first one.
    pub fn reset(&mut self) {
        self.cells.fill(0);
        self.cursor = 0;
    }
}
