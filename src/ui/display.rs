use std::io::{self, Write};

pub const COLUMNS: usize = 20;
pub const ROWS: usize = 4;

/// 5x8 custom character, one byte per row.
pub type Glyph = [u8; 8];

pub const DOWN_ARROW_SLOT: u8 = 0;
pub const DOWN_ARROW: Glyph = [
    0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b11111, 0b01110, 0b00100,
];

/// Character LCD as seen by the menu and the main screen.
pub trait Display {
    fn clear(&mut self);
    fn set_cursor(&mut self, column: usize, row: usize);
    fn print(&mut self, text: &str);
    fn define_glyph(&mut self, slot: u8, glyph: Glyph);
    fn write_glyph(&mut self, slot: u8);
    fn set_backlight(&mut self, on: bool);
    fn show_cursor(&mut self, visible: bool);
    /// Pushes pending changes to the device.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn center_column(len: usize) -> usize {
    COLUMNS.saturating_sub(len) / 2
}

pub fn center_print(display: &mut dyn Display, text: &str, row: usize) {
    display.set_cursor(center_column(text.chars().count()), row);
    display.print(text);
}

/// In-memory 20x4 grid. Text past the last column is dropped.
#[derive(Debug, Clone)]
pub struct TextGrid {
    cells: [[char; COLUMNS]; ROWS],
    cursor: (usize, usize),
    cursor_visible: bool,
    backlight: bool,
    glyphs: [Option<Glyph>; 8],
}

impl Default for TextGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl TextGrid {
    pub fn new() -> Self {
        Self {
            cells: [[' '; COLUMNS]; ROWS],
            cursor: (0, 0),
            cursor_visible: false,
            backlight: false,
            glyphs: [None; 8],
        }
    }

    pub fn row_text(&self, row: usize) -> String {
        self.cells
            .get(row)
            .map(|cells| cells.iter().collect())
            .unwrap_or_default()
    }

    pub fn rows(&self) -> Vec<String> {
        (0..ROWS).map(|row| self.row_text(row)).collect()
    }

    pub fn cursor(&self) -> (usize, usize) {
        self.cursor
    }

    pub fn cursor_visible(&self) -> bool {
        self.cursor_visible
    }

    pub fn backlight(&self) -> bool {
        self.backlight
    }

    fn put_char(&mut self, ch: char) {
        let (column, row) = self.cursor;
        if row < ROWS && column < COLUMNS {
            self.cells[row][column] = ch;
        }
        self.cursor.0 = column.saturating_add(1);
    }
}

impl Display for TextGrid {
    fn clear(&mut self) {
        self.cells = [[' '; COLUMNS]; ROWS];
        self.cursor = (0, 0);
    }

    fn set_cursor(&mut self, column: usize, row: usize) {
        self.cursor = (column, row);
    }

    fn print(&mut self, text: &str) {
        for ch in text.chars() {
            self.put_char(ch);
        }
    }

    fn define_glyph(&mut self, slot: u8, glyph: Glyph) {
        if let Some(entry) = self.glyphs.get_mut(usize::from(slot)) {
            *entry = Some(glyph);
        }
    }

    fn write_glyph(&mut self, slot: u8) {
        let defined = self
            .glyphs
            .get(usize::from(slot))
            .copied()
            .flatten();
        let ch = match defined {
            Some(glyph) if glyph == DOWN_ARROW => '▼',
            Some(_) => '#',
            None => '?',
        };
        self.put_char(ch);
    }

    fn set_backlight(&mut self, on: bool) {
        self.backlight = on;
    }

    fn show_cursor(&mut self, visible: bool) {
        self.cursor_visible = visible;
    }
}

/// Draws the grid on stdout whenever it changed since the last flush.
pub struct TerminalDisplay {
    grid: TextGrid,
    last_frame: String,
}

impl TerminalDisplay {
    pub fn new() -> Self {
        Self {
            grid: TextGrid::new(),
            last_frame: String::new(),
        }
    }

    fn frame(&self) -> String {
        let border = "-".repeat(COLUMNS);
        let light = if self.grid.backlight() { "on" } else { "off" };
        let mut frame = format!("+{border}+ backlight {light}\n");
        let (cursor_column, cursor_row) = self.grid.cursor();
        for (index, row) in self.grid.rows().iter().enumerate() {
            let marker = if self.grid.cursor_visible() && cursor_row == index && cursor_column == 0
            {
                '>'
            } else {
                '|'
            };
            frame.push_str(&format!("{marker}{row}|\n"));
        }
        frame.push_str(&format!("+{border}+\n"));
        frame
    }
}

impl Display for TerminalDisplay {
    fn clear(&mut self) {
        self.grid.clear();
    }

    fn set_cursor(&mut self, column: usize, row: usize) {
        self.grid.set_cursor(column, row);
    }

    fn print(&mut self, text: &str) {
        self.grid.print(text);
    }

    fn define_glyph(&mut self, slot: u8, glyph: Glyph) {
        self.grid.define_glyph(slot, glyph);
    }

    fn write_glyph(&mut self, slot: u8) {
        self.grid.write_glyph(slot);
    }

    fn set_backlight(&mut self, on: bool) {
        self.grid.set_backlight(on);
    }

    fn show_cursor(&mut self, visible: bool) {
        self.grid.show_cursor(visible);
    }

    fn flush(&mut self) -> io::Result<()> {
        let frame = self.frame();
        if frame == self.last_frame {
            return Ok(());
        }
        let mut stdout = io::stdout().lock();
        stdout.write_all(frame.as_bytes())?;
        stdout.flush()?;
        self.last_frame = frame;
        Ok(())
    }
}
