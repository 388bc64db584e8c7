pub(crate) const GLYPH_WIDTH: usize = 5;
pub(crate) const GLYPH_HEIGHT: usize = 7;

// One row per byte, the most significant of the five low bits is the leftmost column.
const GLYPHS: [[u8; GLYPH_HEIGHT]; 10] = [
    [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
    [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
    [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
    [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
    [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
    [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
    [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
    [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
    [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
    [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
];

/// Whether the cell at `(row, col)` of the digit's bitmap is inked.
///
/// Cells outside the bitmap are blank.
pub(crate) fn is_inked(digit: usize, row: usize, col: usize) -> bool {
    if row >= GLYPH_HEIGHT || col >= GLYPH_WIDTH {
        return false;
    }

    match GLYPHS.get(digit) {
        Some(rows) => rows[row] & (1 << (GLYPH_WIDTH - 1 - col)) != 0,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(digit: usize) -> Vec<String> {
        (0..GLYPH_HEIGHT)
            .map(|row| {
                (0..GLYPH_WIDTH)
                    .map(|col| if is_inked(digit, row, col) { '#' } else { '.' })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn one_is_a_vertical_bar() {
        assert_eq!(
            render(1),
            vec!["..#..", ".##..", "..#..", "..#..", "..#..", "..#..", ".###."]
        );
    }

    #[test]
    fn glyphs_are_distinct() {
        for a in 0..10 {
            for b in (a + 1)..10 {
                assert_ne!(render(a), render(b), "digits {a} and {b} share a glyph");
            }
        }
    }

    #[test]
    fn out_of_range_cells_are_blank() {
        assert!(!is_inked(8, GLYPH_HEIGHT, 0));
        assert!(!is_inked(8, 0, GLYPH_WIDTH));
        assert!(!is_inked(10, 0, 1));
    }
}
