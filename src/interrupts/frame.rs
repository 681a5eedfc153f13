//! Register image left on the stack by the interrupt entry stubs.
//!
//! ```text
//! higher addresses
//!   eflags  cs  eip            pushed by the CPU (same-ring entry)
//!   error_code                 pushed by the CPU or a zero from the stub
//!   vector                     pushed by the stub
//!   eax ecx edx ebx esp ebp esi edi   pushad
//! lower addresses  <- stack pointer handed to the kernel
//! ```

/// Size in bytes of one [`InterruptFrame`].
pub const FRAME_SIZE: u32 = 52;

const FIELDS: usize = FRAME_SIZE as usize / 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct InterruptFrame {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    /// Stack pointer at the time of `pushad`. Ignored by `popad`.
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub vector: u32,
    pub error_code: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
}

impl InterruptFrame {
    fn to_words(self) -> [u32; FIELDS] {
        [
            self.edi,
            self.esi,
            self.ebp,
            self.esp,
            self.ebx,
            self.edx,
            self.ecx,
            self.eax,
            self.vector,
            self.error_code,
            self.eip,
            self.cs,
            self.eflags,
        ]
    }

    /// Serialize into `out` in stack order. `out` must hold [`FRAME_SIZE`]
    /// bytes.
    pub fn write_to(&self, out: &mut [u8]) {
        for (chunk, word) in out.chunks_exact_mut(4).zip(self.to_words()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
    }

    /// Inverse of [`write_to`](Self::write_to). Returns `None` if `raw` is too
    /// short.
    pub fn read_from(raw: &[u8]) -> Option<Self> {
        if raw.len() < FRAME_SIZE as usize {
            return None;
        }
        let mut words = [0u32; FIELDS];
        for (word, chunk) in words.iter_mut().zip(raw.chunks_exact(4)) {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(chunk);
            *word = u32::from_le_bytes(bytes);
        }
        let [edi, esi, ebp, esp, ebx, edx, ecx, eax, vector, error_code, eip, cs, eflags] = words;
        Some(Self {
            edi,
            esi,
            ebp,
            esp,
            ebx,
            edx,
            ecx,
            eax,
            vector,
            error_code,
            eip,
            cs,
            eflags,
        })
    }

    /// Vector as the dispatch tables index it.
    pub fn vector(&self) -> u8 {
        self.vector as u8
    }
}

const _: () = assert!(core::mem::size_of::<InterruptFrame>() == FRAME_SIZE as usize);
