//! # Key Code Table
//!
//! Fixed mapping from Linux input key codes to the characters a
//! keyboard-wedge barcode scanner types. Scanners emit upper-case
//! letters without Shift, so Shift state is not tracked.
//!
//! ```text
//!   codes  2..=11   →  1 2 3 4 5 6 7 8 9 0
//!   codes 16..=25   →  Q W E R T Y U I O P
//!   codes 30..=38   →  A S D F G H J K L
//!   codes 44..=50   →  Z X C V B N M
//!   12 -   13 =   39 ;   40 '   52 .   53 /   57 space
//!   28 Enter, 96 keypad Enter  →  terminators
//! ```

/// Main Enter key.
pub const KEY_ENTER: u16 = 28;

/// Keypad Enter key.
pub const KEY_KPENTER: u16 = 96;

/// Codes that end a scan.
pub const TERMINATOR_CODES: [u16; 2] = [KEY_ENTER, KEY_KPENTER];

/// Digit key codes (`1` through `0`), used to recognise scanner-like devices.
pub const DIGIT_CODES: std::ops::RangeInclusive<u16> = 2..=11;

const DIGIT_ROW: &[u8; 10] = b"1234567890";
const TOP_ROW: &[u8; 10] = b"QWERTYUIOP";
const HOME_ROW: &[u8; 9] = b"ASDFGHJKL";
const BOTTOM_ROW: &[u8; 7] = b"ZXCVBNM";

/// Decodes a key code into its character, or `None` for codes outside the table.
pub fn decode(code: u16) -> Option<char> {
    let c = match code {
        2..=11 => DIGIT_ROW[usize::from(code - 2)],
        16..=25 => TOP_ROW[usize::from(code - 16)],
        30..=38 => HOME_ROW[usize::from(code - 30)],
        44..=50 => BOTTOM_ROW[usize::from(code - 44)],
        12 => b'-',
        13 => b'=',
        39 => b';',
        40 => b'\'',
        52 => b'.',
        53 => b'/',
        57 => b' ',
        _ => return None,
    };
    Some(char::from(c))
}

/// Returns true for Enter and keypad Enter.
pub fn is_terminator(code: u16) -> bool {
    TERMINATOR_CODES.contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_row() {
        assert_eq!(decode(2), Some('1'));
        assert_eq!(decode(10), Some('9'));
        assert_eq!(decode(11), Some('0'));
    }

    #[test]
    fn test_letter_rows() {
        assert_eq!(decode(16), Some('Q'));
        assert_eq!(decode(25), Some('P'));
        assert_eq!(decode(30), Some('A'));
        assert_eq!(decode(38), Some('L'));
        assert_eq!(decode(44), Some('Z'));
        assert_eq!(decode(50), Some('M'));
    }

    #[test]
    fn test_symbols() {
        assert_eq!(decode(12), Some('-'));
        assert_eq!(decode(13), Some('='));
        assert_eq!(decode(39), Some(';'));
        assert_eq!(decode(40), Some('\''));
        assert_eq!(decode(52), Some('.'));
        assert_eq!(decode(53), Some('/'));
        assert_eq!(decode(57), Some(' '));
    }

    #[test]
    fn test_unmapped_codes() {
        // Shift, Enter and gaps between rows are not characters
        assert_eq!(decode(42), None);
        assert_eq!(decode(KEY_ENTER), None);
        assert_eq!(decode(26), None);
        assert_eq!(decode(0), None);
    }

    #[test]
    fn test_terminators() {
        assert!(is_terminator(28));
        assert!(is_terminator(96));
        assert!(!is_terminator(57));
    }
}
