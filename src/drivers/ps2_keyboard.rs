//! PS/2 keyboard on IRQ1, scancode set 1.
//!
//! The interrupt handler reads one scancode from the controller, decodes it
//! and queues the resulting byte. Readers drain the queue with
//! [`Keyboard::getchar`].

use crate::arch::PortIo;
use crate::interrupts::InterruptFrame;
use crate::kernel::Kernel;

pub const KEYBOARD_DATA_PORT: u16 = 0x60;

const BUFFER_SIZE: usize = 256;

const RELEASE_BIT: u8 = 0x80;
const EXTENDED_PREFIX: u8 = 0xE0;

const LEFT_SHIFT: u8 = 0x2A;
const RIGHT_SHIFT: u8 = 0x36;
const CTRL: u8 = 0x1D;
const ALT: u8 = 0x38;

/// Unshifted ASCII for set 1 make codes. Zero means no character.
const SCANCODE_ASCII: [u8; 0x3A] = [
    0, 27, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0x08,
    b'\t', b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n',
    0, b'a', b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`',
    0, b'\\', b'z', b'x', b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/', 0,
    b'*', 0, b' ',
];

fn shifted(c: u8) -> u8 {
    match c {
        b'a'..=b'z' => c.to_ascii_uppercase(),
        b'1' => b'!',
        b'2' => b'@',
        b'3' => b'#',
        b'4' => b'$',
        b'5' => b'%',
        b'6' => b'^',
        b'7' => b'&',
        b'8' => b'*',
        b'9' => b'(',
        b'0' => b')',
        b'-' => b'_',
        b'=' => b'+',
        b'[' => b'{',
        b']' => b'}',
        b'\\' => b'|',
        b';' => b':',
        b'\'' => b'"',
        b'`' => b'~',
        b',' => b'<',
        b'.' => b'>',
        b'/' => b'?',
        _ => c,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub byte: u8,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

/// Tracks modifier state across scancodes.
#[derive(Debug, Default)]
pub struct ScancodeDecoder {
    is_extended: bool,
    shift_pressed: bool,
    ctrl_pressed: bool,
    alt_pressed: bool,
}

impl ScancodeDecoder {
    pub const fn new() -> Self {
        Self {
            is_extended: false,
            shift_pressed: false,
            ctrl_pressed: false,
            alt_pressed: false,
        }
    }

    pub fn process_scancode(&mut self, scancode: u8) -> Option<KeyEvent> {
        if scancode == EXTENDED_PREFIX {
            self.is_extended = true;
            return None;
        }

        let is_release = scancode & RELEASE_BIT != 0;
        let key_code = scancode & !RELEASE_BIT;
        let extended = core::mem::replace(&mut self.is_extended, false);

        match key_code {
            LEFT_SHIFT | RIGHT_SHIFT if !extended => {
                self.shift_pressed = !is_release;
                return None;
            }
            CTRL => {
                self.ctrl_pressed = !is_release;
                return None;
            }
            ALT => {
                self.alt_pressed = !is_release;
                return None;
            }
            _ => {}
        }

        // Extended keys (arrows, keypad enter, ...) have no byte form here.
        if is_release || extended {
            return None;
        }

        let base = *SCANCODE_ASCII.get(key_code as usize)?;
        if base == 0 {
            return None;
        }

        let mut byte = if self.shift_pressed { shifted(base) } else { base };
        if self.ctrl_pressed && base.is_ascii_lowercase() {
            // Ctrl+A = 1 ... Ctrl+Z = 26
            byte = base - b'a' + 1;
        }

        Some(KeyEvent {
            byte,
            ctrl: self.ctrl_pressed,
            alt: self.alt_pressed,
            shift: self.shift_pressed,
        })
    }
}

/// Decoder plus the input queue. A full queue drops new input.
pub struct Keyboard {
    decoder: ScancodeDecoder,
    buffer: [u8; BUFFER_SIZE],
    start: usize,
    count: usize,
}

impl Keyboard {
    pub const fn new() -> Self {
        Self {
            decoder: ScancodeDecoder::new(),
            buffer: [0; BUFFER_SIZE],
            start: 0,
            count: 0,
        }
    }

    /// Decode `scancode` and queue any byte it produces.
    pub fn handle_scancode(&mut self, scancode: u8) -> Option<KeyEvent> {
        let event = self.decoder.process_scancode(scancode)?;
        self.push(event.byte);
        Some(event)
    }

    fn push(&mut self, byte: u8) -> bool {
        if self.count == BUFFER_SIZE {
            return false;
        }
        self.buffer[(self.start + self.count) % BUFFER_SIZE] = byte;
        self.count += 1;
        true
    }

    pub fn getchar(&mut self) -> Option<u8> {
        if self.count == 0 {
            return None;
        }
        let byte = self.buffer[self.start];
        self.start = (self.start + 1) % BUFFER_SIZE;
        self.count -= 1;
        Some(byte)
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }

    pub fn pending(&self) -> usize {
        self.count
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

/// IRQ1 handler.
pub fn keyboard_interrupt_handler<P: PortIo>(kernel: &Kernel<P>, _frame: &mut InterruptFrame) {
    let scancode = kernel.ports().read_u8(KEYBOARD_DATA_PORT);
    kernel.keyboard().handle_scancode(scancode);
}
